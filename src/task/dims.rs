//! Launch geometry for a kernel dispatch.

use std::fmt;

/// A fixed-rank (1 to 3) tuple of unsigned sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NdRange {
    sizes: [usize; 3],
    rank: u8,
}

impl NdRange {
    pub fn d1(x: usize) -> Self {
        Self {
            sizes: [x, 1, 1],
            rank: 1,
        }
    }

    pub fn d2(x: usize, y: usize) -> Self {
        Self {
            sizes: [x, y, 1],
            rank: 2,
        }
    }

    pub fn d3(x: usize, y: usize, z: usize) -> Self {
        Self {
            sizes: [x, y, z],
            rank: 3,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank as usize
    }

    /// Sizes of the used dimensions only.
    pub fn as_slice(&self) -> &[usize] {
        &self.sizes[..self.rank as usize]
    }

    pub fn get(&self, dim: usize) -> usize {
        self.sizes.get(dim).copied().unwrap_or(1)
    }

    /// Saturates at `usize::MAX` instead of overflowing.
    pub fn product(&self) -> usize {
        self.as_slice()
            .iter()
            .fold(1usize, |acc, &size| acc.saturating_mul(size))
    }
}

impl fmt::Display for NdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.as_slice().iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Global size, work-group size and offset of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskDims {
    pub global: NdRange,
    pub local: NdRange,
    pub offset: NdRange,
}

impl TaskDims {
    pub fn new(global: NdRange, local: NdRange, offset: NdRange) -> Self {
        Self {
            global,
            local,
            offset,
        }
    }

    pub fn new_1d(global: usize) -> Self {
        Self::new(NdRange::d1(global), NdRange::d1(1), NdRange::d1(0))
    }

    pub fn new_2d(global: [usize; 2], local: [usize; 2]) -> Self {
        Self::new(
            NdRange::d2(global[0], global[1]),
            NdRange::d2(local[0], local[1]),
            NdRange::d2(0, 0),
        )
    }

    pub fn new_3d(global: [usize; 3], local: [usize; 3]) -> Self {
        Self::new(
            NdRange::d3(global[0], global[1], global[2]),
            NdRange::d3(local[0], local[1], local[2]),
            NdRange::d3(0, 0, 0),
        )
    }

    pub fn with_offset(mut self, offset: NdRange) -> Self {
        self.offset = offset;
        self
    }

    /// Problem size fed to the flop metric.
    pub fn work_items(&self) -> usize {
        self.global.product()
    }
}

impl Default for TaskDims {
    // run once, no parallel decomposition
    fn default() -> Self {
        Self::new_1d(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_item() {
        let dims = TaskDims::default();
        assert_eq!(dims.global.rank(), 1);
        assert_eq!(dims.work_items(), 1);
        assert_eq!(dims.local.as_slice(), &[1]);
        assert_eq!(dims.offset.as_slice(), &[0]);
    }

    #[test]
    fn test_work_items_is_global_product() {
        let dims = TaskDims::new_2d([64, 32], [8, 8]);
        assert_eq!(dims.work_items(), 2048);

        let dims = TaskDims::new_3d([4, 5, 6], [1, 1, 1]);
        assert_eq!(dims.work_items(), 120);
        assert_eq!(dims.global.get(2), 6);
        assert_eq!(dims.global.get(7), 1);
    }

    #[test]
    fn test_work_items_saturates() {
        let dims = TaskDims::new_3d([1 << 22; 3], [1, 1, 1]);
        assert_eq!(dims.work_items(), usize::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(NdRange::d2(16, 4).to_string(), "[16, 4]");
    }
}
