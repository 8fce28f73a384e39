//! In-process simulated accelerator.
//!
//! Binaries are plain text, one kernel entry point per line (`#` starts a
//! comment). Every device queue is a thread that runs its submissions in
//! order, sleeping `base_latency + per_item * work_items` for each one.

use super::backend::DeviceBackend;
use super::completion::{completion, Completion, CompletionSignal};
use crate::error::{Error, Result};
use crate::task::TaskDims;
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimProgram {
    name: String,
    entry_points: Vec<String>,
}

impl SimProgram {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }
}

/// Kernel invocation value; arguments are bound by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimKernel {
    program: String,
    entry_point: String,
    args: Vec<u64>,
}

impl SimKernel {
    pub fn with_arg(mut self, arg: u64) -> Self {
        self.args.push(arg);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn args(&self) -> &[u64] {
        &self.args
    }
}

/// One finished launch as seen by the simulated device.
#[derive(Debug, Clone)]
pub struct SimExecution {
    pub queue: usize,
    pub program: String,
    pub entry_point: String,
    pub args: Vec<u64>,
    pub work_items: usize,
    pub started: Instant,
    pub finished: Instant,
}

struct Job {
    kernel: SimKernel,
    work_items: usize,
    duration: Duration,
    fail: bool,
    signal: CompletionSignal,
}

pub struct SimQueue {
    id: usize,
    tx: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl SimQueue {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for SimQueue {
    fn drop(&mut self) {
        // closing the channel lets the device thread run out its backlog
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for SimQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimQueue").field("id", &self.id).finish()
    }
}

#[derive(Debug)]
pub struct SimDevice {
    base_latency: Duration,
    per_item: Duration,
    failing: Mutex<HashSet<String>>,
    log: Arc<Mutex<Vec<SimExecution>>>,
    queues_created: AtomicUsize,
    programs_loaded: AtomicUsize,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::with_timing(Duration::from_micros(200), Duration::ZERO)
    }

    pub fn with_timing(base_latency: Duration, per_item: Duration) -> Self {
        Self {
            base_latency,
            per_item,
            failing: Mutex::new(HashSet::new()),
            log: Arc::new(Mutex::new(Vec::new())),
            queues_created: AtomicUsize::new(0),
            programs_loaded: AtomicUsize::new(0),
        }
    }

    /// Encode a binary exposing `entry_points`.
    pub fn binary(entry_points: &[&str]) -> Vec<u8> {
        entry_points.join("\n").into_bytes()
    }

    /// Make every later launch of `entry_point` fault on the device.
    pub fn fail_kernel<S: Into<String>>(&self, entry_point: S) {
        self.failing.lock().insert(entry_point.into());
    }

    pub fn executions(&self) -> Vec<SimExecution> {
        self.log.lock().clone()
    }

    pub fn queues_created(&self) -> usize {
        self.queues_created.load(Ordering::Relaxed)
    }

    pub fn programs_loaded(&self) -> usize {
        self.programs_loaded.load(Ordering::Relaxed)
    }

    fn duration_for(&self, work_items: usize) -> Duration {
        let scaled = self.per_item.as_nanos().saturating_mul(work_items as u128);
        let scaled = u64::try_from(scaled).unwrap_or(u64::MAX);
        self.base_latency
            .saturating_add(Duration::from_nanos(scaled))
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for SimDevice {
    type Program = SimProgram;
    type Kernel = SimKernel;
    type Queue = SimQueue;

    fn load_program(&self, name: &str, binary: &[u8]) -> Result<SimProgram> {
        let text = std::str::from_utf8(binary)
            .map_err(|e| Error::configuration(format!("{}: malformed binary: {}", name, e)))?;

        let entry_points: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        if entry_points.is_empty() {
            return Err(Error::configuration(format!(
                "{}: binary exposes no kernels",
                name
            )));
        }

        self.programs_loaded.fetch_add(1, Ordering::Relaxed);
        Ok(SimProgram {
            name: name.to_string(),
            entry_points,
        })
    }

    fn compile_kernel(&self, program: &SimProgram, entry_point: &str) -> Result<SimKernel> {
        if !program.entry_points.iter().any(|e| e == entry_point) {
            return Err(Error::compile(format!(
                "{} has no entry point {}",
                program.name, entry_point
            )));
        }

        Ok(SimKernel {
            program: program.name.clone(),
            entry_point: entry_point.to_string(),
            args: Vec::new(),
        })
    }

    fn create_queue(&self) -> Result<SimQueue> {
        let id = self.queues_created.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded::<Job>();
        let log = Arc::clone(&self.log);

        let thread = thread::Builder::new()
            .name(format!("sim-device-{}", id))
            .spawn(move || {
                for job in rx {
                    let started = Instant::now();
                    thread::sleep(job.duration);
                    let finished = Instant::now();

                    if job.fail {
                        job.signal
                            .fail(format!("{} faulted on device", job.kernel.entry_point));
                        continue;
                    }

                    log.lock().push(SimExecution {
                        queue: id,
                        program: job.kernel.program,
                        entry_point: job.kernel.entry_point,
                        args: job.kernel.args,
                        work_items: job.work_items,
                        started,
                        finished,
                    });
                    job.signal.complete();
                }
            })
            .map_err(|e| Error::device(format!("spawn failed: {}", e)))?;

        Ok(SimQueue {
            id,
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    fn submit(&self, queue: &SimQueue, kernel: SimKernel, dims: &TaskDims) -> Result<Completion> {
        let tx = queue
            .tx
            .as_ref()
            .ok_or_else(|| Error::device("device queue shut down"))?;

        let (signal, completion) = completion();
        let work_items = dims.work_items();
        let job = Job {
            fail: self.failing.lock().contains(kernel.entry_point()),
            duration: self.duration_for(work_items),
            kernel,
            work_items,
            signal,
        };

        tx.send(job)
            .map_err(|_| Error::device(format!("device queue {} is gone", queue.id)))?;
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_program() {
        let device = SimDevice::new();
        let program = device
            .load_program("multi_empty", b"# two kernels\nempty1\n\nempty2\n")
            .unwrap();
        assert_eq!(program.entry_points(), &["empty1", "empty2"]);
        assert_eq!(device.programs_loaded(), 1);
    }

    #[test]
    fn test_malformed_binaries() {
        let device = SimDevice::new();
        assert!(matches!(
            device.load_program("bad", &[0xff, 0xfe]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            device.load_program("empty", b"# nothing\n"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_compile_missing_entry_point() {
        let device = SimDevice::new();
        let program = device
            .load_program("hello_world", &SimDevice::binary(&["hello_world"]))
            .unwrap();
        assert!(device.compile_kernel(&program, "hello_world").is_ok());
        assert!(matches!(
            device.compile_kernel(&program, "goodbye"),
            Err(Error::Compile(_))
        ));
    }

    #[test]
    fn test_queue_runs_in_order() {
        let device = SimDevice::with_timing(Duration::from_millis(1), Duration::ZERO);
        let program = device
            .load_program("p", &SimDevice::binary(&["k"]))
            .unwrap();
        let queue = device.create_queue().unwrap();
        let kernel = device.compile_kernel(&program, "k").unwrap();

        let completions: Vec<Completion> = (0..4)
            .map(|i| {
                device
                    .submit(&queue, kernel.clone().with_arg(i), &TaskDims::new_1d(8))
                    .unwrap()
            })
            .collect();
        for completion in completions {
            completion.wait().unwrap();
        }

        let log = device.executions();
        let args: Vec<u64> = log.iter().map(|e| e.args[0]).collect();
        assert_eq!(args, vec![0, 1, 2, 3]);
        for pair in log.windows(2) {
            assert!(pair[0].finished <= pair[1].started);
        }
        assert_eq!(log[0].work_items, 8);
    }

    #[test]
    fn test_fault_injection() {
        let device = SimDevice::with_timing(Duration::ZERO, Duration::ZERO);
        let program = device
            .load_program("p", &SimDevice::binary(&["bad"]))
            .unwrap();
        let queue = device.create_queue().unwrap();
        let kernel = device.compile_kernel(&program, "bad").unwrap();
        device.fail_kernel("bad");

        let completion = device
            .submit(&queue, kernel, &TaskDims::default())
            .unwrap();
        assert!(completion.wait().unwrap_err().is_device());
        assert!(device.executions().is_empty());
    }

    #[test]
    fn test_duration_scales_with_items() {
        let device = SimDevice::with_timing(Duration::from_micros(10), Duration::from_nanos(5));
        assert_eq!(device.duration_for(0), Duration::from_micros(10));
        assert_eq!(device.duration_for(1000), Duration::from_micros(15));
    }
}
