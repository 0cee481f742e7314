//! Runs independent jobs, possibly in parallel.

use std::fmt;
use std::num::NonZero;
use std::thread;

use bevy::tasks::{TaskPool, TaskPoolBuilder};

use crate::*;

/// A unit of work. Jobs may borrow from the caller, [`ParallelExecutor::execute`] doesn't return until all of them finished.
pub type Job<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Runs batches of independent jobs.
pub trait ParallelExecutor: Send + Sync {
	/// How many jobs can run at once, used to decide how finely to split work.
	fn worker_count(&self) -> usize;

	/// Runs every job and waits for all of them. Completion order is unspecified.
	fn execute<'a>(&self, jobs: Vec<Job<'a>>);
}

/// Runs jobs one after the other on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;
impl ParallelExecutor for SequentialExecutor {
	fn worker_count(&self) -> usize {
		1
	}

	fn execute<'a>(&self, jobs: Vec<Job<'a>>) {
		for job in jobs {
			job();
		}
	}
}

/// Runs jobs on a dedicated bevy [`TaskPool`].
pub struct TaskPoolExecutor {
	pool: TaskPool,
	threads: usize,
}
impl TaskPoolExecutor {
	/// Creates a pool with `threads` workers, or one per available core if `None`.
	pub fn new(threads: Option<usize>) -> Self {
		let threads = threads
			.unwrap_or_else(|| thread::available_parallelism().map(NonZero::get).unwrap_or(1))
			.max(1);

		let pool = TaskPoolBuilder::new().num_threads(threads).thread_name("map builder".s()).build();

		Self { pool, threads }
	}
}
impl fmt::Debug for TaskPoolExecutor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskPoolExecutor").field("threads", &self.threads).finish_non_exhaustive()
	}
}
impl ParallelExecutor for TaskPoolExecutor {
	fn worker_count(&self) -> usize {
		self.threads
	}

	fn execute<'a>(&self, jobs: Vec<Job<'a>>) {
		if jobs.len() <= 1 {
			return SequentialExecutor.execute(jobs);
		}

		self.pool.scope(|scope| {
			for job in jobs {
				scope.spawn(async move { job() });
			}
		});
	}
}

/// Applies `f` to every pair of `inputs` and `outputs`, splitting the work across `executor`'s workers.
///
/// Each output slot is written by exactly one job, so results land at their input's index no matter which job finishes first.
pub fn map_into_slots<I, O, F>(executor: &dyn ParallelExecutor, inputs: &[I], outputs: &mut [O], f: F)
where
	I: Sync,
	O: Send,
	F: Fn(usize, &I) -> O + Sync,
{
	debug_assert_eq!(inputs.len(), outputs.len());
	if inputs.is_empty() {
		return;
	}

	// A few chunks per worker so one slow chunk doesn't stall the rest.
	let chunk_size = inputs.len().div_ceil(executor.worker_count() * 4).max(1);
	let f = &f;

	let jobs: Vec<Job> = inputs
		.chunks(chunk_size)
		.zip(outputs.chunks_mut(chunk_size))
		.enumerate()
		.map(|(chunk_index, (inputs, outputs))| {
			let job: Job = Box::new(move || {
				for (i, (input, output)) in inputs.iter().zip(outputs).enumerate() {
					*output = f(chunk_index * chunk_size + i, input);
				}
			});
			job
		})
		.collect();

	executor.execute(jobs);
}

#[cfg(test)]
mod tests {
	use super::*;

	fn squares(executor: &dyn ParallelExecutor) -> Vec<usize> {
		let inputs = (0..1000).collect_vec();
		let mut outputs = vec![0; inputs.len()];
		map_into_slots(executor, &inputs, &mut outputs, |index, input| {
			assert_eq!(index, *input);
			input * input
		});
		outputs
	}

	#[test]
	fn slots_keep_order() {
		let expected = (0..1000).map(|i| i * i).collect_vec();
		assert_eq!(squares(&SequentialExecutor), expected);
		assert_eq!(squares(&TaskPoolExecutor::new(Some(1))), expected);
		assert_eq!(squares(&TaskPoolExecutor::new(Some(4))), expected);
	}

	#[test]
	fn borrowed_jobs() {
		let mut a = 0;
		let mut b = 0;
		let jobs: Vec<Job> = vec![Box::new(|| a = 1), Box::new(|| b = 2)];
		TaskPoolExecutor::new(Some(2)).execute(jobs);
		assert_eq!((a, b), (1, 2));

		let mut nothing: Vec<u8> = Vec::new();
		map_into_slots(&SequentialExecutor, &[], &mut nothing, |_, _: &u8| 0);
	}
}
