//! Weighted random workload generation.

use super::dims::TaskDims;
use super::task::Task;
use crate::device::DeviceBackend;
use crate::error::{Error, Result};
use rand::Rng;
use std::fmt;

const PROBABILITY_TOLERANCE: f32 = 1e-4;

type SizeGenerator = Box<dyn FnMut() -> TaskDims + Send>;

/// Draws task templates according to a discrete distribution and gives each
/// draw a freshly generated launch geometry.
pub struct RandomTasks<B: DeviceBackend> {
    templates: Vec<Task<B>>,
    offsets: Vec<f32>,
    size_gens: Vec<SizeGenerator>,
}

impl<B: DeviceBackend> RandomTasks<B> {
    pub fn new() -> Self {
        Self {
            templates: Vec::new(),
            offsets: Vec::new(),
            size_gens: Vec::new(),
        }
    }

    /// Register `template` to be drawn with probability `prob`.
    pub fn add_kernel<F>(&mut self, prob: f32, template: Task<B>, size_gen: F)
    where
        F: FnMut() -> TaskDims + Send + 'static,
    {
        let base = self.offsets.last().copied().unwrap_or(0.0);
        self.templates.push(template);
        self.offsets.push(base + prob);
        self.size_gens.push(Box::new(size_gen));
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn next_task<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Task<B>> {
        let total = match self.offsets.last() {
            Some(total) => *total,
            None => return Err(Error::config("no kernels registered")),
        };
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(Error::config(format!(
                "kernel probabilities sum to {}, expected 1",
                total
            )));
        }

        let draw: f32 = rng.gen();
        // rounding can leave the last offset a hair below 1.0
        let index = self
            .offsets
            .iter()
            .position(|&offset| offset > draw)
            .unwrap_or(self.offsets.len() - 1);

        let mut task = self.templates[index].clone();
        task.set_dims((self.size_gens[index])());
        tracing::debug!("Generated task: {}", task);
        Ok(task)
    }
}

impl<B: DeviceBackend> Default for RandomTasks<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: DeviceBackend> fmt::Debug for RandomTasks<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomTasks")
            .field("templates", &self.templates)
            .field("offsets", &self.offsets)
            .finish()
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::device::SimDevice;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_empty_generator_fails() {
        let mut tasks: RandomTasks<SimDevice> = RandomTasks::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(tasks.next_task(&mut rng).is_err());
    }

    #[test]
    fn test_probabilities_must_sum_to_one() {
        let mut tasks: RandomTasks<SimDevice> = RandomTasks::new();
        tasks.add_kernel(0.5, Task::new("a"), TaskDims::default);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(tasks.next_task(&mut rng), Err(Error::Config(_))));

        tasks.add_kernel(0.5, Task::new("b"), TaskDims::default);
        assert!(tasks.next_task(&mut rng).is_ok());
    }

    #[test]
    fn test_distribution_and_sizes() {
        let mut tasks: RandomTasks<SimDevice> = RandomTasks::new();
        tasks.add_kernel(0.25, Task::new("small"), || TaskDims::new_1d(16));
        let mut n = 0;
        tasks.add_kernel(0.75, Task::new("large"), move || {
            n += 1;
            TaskDims::new_2d([64 * n, 64], [8, 8])
        });

        let mut rng = StdRng::seed_from_u64(42);
        let mut large = 0;
        for _ in 0..2000 {
            let task = tasks.next_task(&mut rng).unwrap();
            match task.kernel_name() {
                "small" => assert_eq!(task.dims().work_items(), 16),
                "large" => {
                    large += 1;
                    assert_eq!(task.dims().work_items(), 64 * large * 64);
                }
                other => panic!("unexpected kernel {}", other),
            }
            assert!(task.id().is_none());
        }

        // 0.75 expected; generous bounds for a fixed seed
        assert!(large > 1300 && large < 1700, "large = {}", large);
    }
}
