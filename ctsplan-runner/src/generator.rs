// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs description tasks on a bounded pool of workers.
//!
//! Every task runs to completion: a task that fails or panics is recorded and the others
//! carry on. There is no cancellation and no timeout.

use crate::{
    config::CtsPlanConfig,
    description::DescriptionTask,
    errors::{DescriptionGenerateError, GeneratorBuildError},
};
use camino::Utf8PathBuf;
use future_queue::{FutureQueueContext, StreamExt as _};
use futures::StreamExt as _;
use std::num::NonZeroUsize;
use tokio::{runtime::Runtime, task::JoinError};
use tracing::{debug, info};

/// Builds a [`DescriptionGenerator`].
#[derive(Clone, Debug)]
pub struct DescriptionGeneratorBuilder {
    workers: NonZeroUsize,
}

impl Default for DescriptionGeneratorBuilder {
    fn default() -> Self {
        Self {
            workers: CtsPlanConfig::DEFAULT_WORKERS,
        }
    }
}

impl DescriptionGeneratorBuilder {
    /// Creates a new builder with the default worker count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of tasks that run at the same time.
    pub fn set_workers(&mut self, workers: NonZeroUsize) -> &mut Self {
        self.workers = workers;
        self
    }

    /// Creates the generator, along with the runtime that drives it.
    pub fn build(self) -> Result<DescriptionGenerator, GeneratorBuildError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(self.workers.get())
            .max_blocking_threads(self.workers.get())
            .thread_name("ctsplan-generator")
            .build()
            .map_err(GeneratorBuildError::TokioRuntimeCreate)?;
        Ok(DescriptionGenerator {
            workers: self.workers,
            runtime,
        })
    }
}

/// Runs [`DescriptionTask`]s concurrently.
#[derive(Debug)]
pub struct DescriptionGenerator {
    workers: NonZeroUsize,
    runtime: Runtime,
}

impl DescriptionGenerator {
    /// Returns the number of tasks that run at the same time.
    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    /// Runs every task and waits for all of them to finish.
    ///
    /// When this returns, every task has finished writing its output.
    pub fn generate(&self, tasks: Vec<Box<dyn DescriptionTask>>) -> GenerationResult {
        info!(
            "generating {} test descriptions with {} workers",
            tasks.len(),
            self.workers
        );

        let mut outcomes: Vec<TaskOutcome> = self.runtime.block_on(async {
            futures::stream::iter(tasks)
                .map(|task| {
                    let package = task.package_name().to_owned();
                    let output_path = task.output_path().to_owned();
                    // Each task takes one slot, so at most `workers` tasks run at a time.
                    let fut = move |_cx: FutureQueueContext| async move {
                        debug!(package = %package, "starting description task");
                        let status = match tokio::task::spawn_blocking(move || task.generate())
                            .await
                        {
                            Ok(Ok(())) => TaskStatus::Succeeded,
                            Ok(Err(error)) => TaskStatus::Failed(error),
                            Err(error) => TaskStatus::Panicked(panic_message(error)),
                        };
                        debug!(package = %package, code = status.code(), "finished description task");
                        TaskOutcome {
                            package,
                            output_path,
                            status,
                        }
                    };
                    (1, fut)
                })
                .future_queue(self.workers.get())
                .collect()
                .await
        });

        outcomes.sort_by(|a, b| a.package.cmp(&b.package));
        GenerationResult { outcomes }
    }
}

fn panic_message(error: JoinError) -> String {
    match error.try_into_panic() {
        Ok(payload) => {
            if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_owned()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "(non-string panic payload)".to_owned()
            }
        }
        Err(error) => error.to_string(),
    }
}

/// How one task ended.
#[derive(Debug)]
pub enum TaskStatus {
    /// The description was written.
    Succeeded,

    /// The task returned an error.
    Failed(DescriptionGenerateError),

    /// The task panicked with this message.
    Panicked(String),
}

impl TaskStatus {
    /// Returns the status code this outcome contributes: zero on success.
    pub fn code(&self) -> i64 {
        match self {
            TaskStatus::Succeeded => 0,
            TaskStatus::Failed(error) => error.status_code(),
            TaskStatus::Panicked(_) => 1,
        }
    }
}

/// The outcome of one task.
#[derive(Debug)]
pub struct TaskOutcome {
    /// The package the task generated a description for.
    pub package: String,

    /// Where the description was to be written.
    pub output_path: Utf8PathBuf,

    /// How the task ended.
    pub status: TaskStatus,
}

/// The outcomes of every task passed to [`DescriptionGenerator::generate`], sorted by
/// package.
#[derive(Debug)]
pub struct GenerationResult {
    outcomes: Vec<TaskOutcome>,
}

impl GenerationResult {
    /// Returns the sum of every task's status code. Zero means every task succeeded.
    pub fn status(&self) -> i64 {
        self.outcomes.iter().map(|outcome| outcome.status.code()).sum()
    }

    /// Returns true if every task succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| matches!(outcome.status, TaskStatus::Succeeded))
    }

    /// Returns every outcome.
    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    /// Returns the outcomes of the tasks that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> + '_ {
        self.outcomes
            .iter()
            .filter(|outcome| !matches!(outcome.status, TaskStatus::Succeeded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };

    #[derive(Debug, Default)]
    struct Counters {
        running: AtomicUsize,
        max_running: AtomicUsize,
        finished: AtomicUsize,
    }

    #[derive(Copy, Clone, Debug)]
    enum Behavior {
        Succeed,
        Fail(i32),
        Panic,
    }

    #[derive(Debug)]
    struct FakeTask {
        package: String,
        output_path: Utf8PathBuf,
        behavior: Behavior,
        counters: Arc<Counters>,
    }

    impl FakeTask {
        fn boxed(package: &str, behavior: Behavior, counters: &Arc<Counters>) -> Box<dyn DescriptionTask> {
            Box::new(Self {
                package: package.to_owned(),
                output_path: Utf8Path::new("/nonexistent").join(format!("{package}.xml")),
                behavior,
                counters: counters.clone(),
            })
        }
    }

    impl DescriptionTask for FakeTask {
        fn package_name(&self) -> &str {
            &self.package
        }

        fn output_path(&self) -> &Utf8Path {
            &self.output_path
        }

        fn generate(&self) -> Result<(), DescriptionGenerateError> {
            let running = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_running.fetch_max(running, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(25));
            self.counters.running.fetch_sub(1, Ordering::SeqCst);

            match self.behavior {
                Behavior::Succeed => {
                    self.counters.finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                Behavior::Fail(code) => {
                    self.counters.finished.fetch_add(1, Ordering::SeqCst);
                    Err(DescriptionGenerateError::DocletFailed {
                        package: self.package.clone(),
                        command: "javadoc DescriptionGenerator".to_owned(),
                        exit_code: Some(code),
                        stderr: String::new(),
                    })
                }
                Behavior::Panic => panic!("doclet crashed for {}", self.package),
            }
        }
    }

    fn generator(workers: usize) -> DescriptionGenerator {
        let mut builder = DescriptionGeneratorBuilder::new();
        builder.set_workers(NonZeroUsize::new(workers).unwrap());
        builder.build().unwrap()
    }

    #[test]
    fn concurrency_is_bounded() {
        let counters = Arc::new(Counters::default());
        let tasks = (0..8)
            .map(|i| FakeTask::boxed(&format!("android.pkg{i}"), Behavior::Succeed, &counters))
            .collect();

        let result = generator(2).generate(tasks);
        assert_eq!(result.status(), 0);
        assert!(result.is_success());
        assert_eq!(result.outcomes().len(), 8);
        assert_eq!(counters.finished.load(Ordering::SeqCst), 8);
        let max_running = counters.max_running.load(Ordering::SeqCst);
        assert!(
            (1..=2).contains(&max_running),
            "at most 2 tasks ran at once, saw {max_running}"
        );
    }

    #[test]
    fn failures_are_isolated_and_summed() {
        let counters = Arc::new(Counters::default());
        let tasks = vec![
            FakeTask::boxed("android.app", Behavior::Succeed, &counters),
            FakeTask::boxed("android.hardware", Behavior::Fail(3), &counters),
            FakeTask::boxed("android.media", Behavior::Panic, &counters),
            FakeTask::boxed("android.net", Behavior::Succeed, &counters),
            FakeTask::boxed("android.webkit", Behavior::Fail(1), &counters),
        ];

        let result = generator(2).generate(tasks);
        assert_eq!(result.status(), 5);
        assert!(!result.is_success());
        assert_eq!(counters.finished.load(Ordering::SeqCst), 4);

        let failed: Vec<_> = result.failures().map(|o| o.package.as_str()).collect();
        assert_eq!(failed, vec!["android.hardware", "android.media", "android.webkit"]);

        let TaskStatus::Panicked(message) = &result.outcomes()[2].status else {
            panic!("expected android.media to have panicked");
        };
        assert_eq!(message, "doclet crashed for android.media");
    }

    #[test]
    fn no_tasks() {
        let result = generator(1).generate(Vec::new());
        assert_eq!(result.status(), 0);
        assert!(result.is_success());
    }
}
