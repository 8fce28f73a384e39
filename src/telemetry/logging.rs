use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` is used. Returns
/// `false` when a global subscriber was already installed, which makes the
/// call safe to repeat from tests.
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging("debug");
        assert!(!init_logging("debug"));
    }
}
