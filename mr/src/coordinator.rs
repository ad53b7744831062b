use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::JobConfig;
use crate::counters::{JobCounters, JobReport};
use crate::error::{MrError, MrResult};
use crate::input::{InputFile, InputSource};
use crate::output::OutputSink;
use crate::shuffle::{Partition, Shuffle};
use crate::split::{Split, Splitter};
use crate::task::{Task, TaskStatus, TaskType};
use crate::worker::{with_retries, JobFunctions, RetryPolicy, Worker};

fn attempts_of(e: &MrError) -> u32 {
    match e {
        MrError::WorkerFailure { attempts, .. } => *attempts,
        _ => 0,
    }
}

/// Drives one job from input to committed output.
pub struct Coordinator {
    config: JobConfig,
    functions: JobFunctions,
    splits: Vec<Arc<Split>>,
    tasks: Vec<Task>,
    counters: JobCounters,
    cancel: Arc<AtomicBool>,
}

impl Coordinator {
    /// Rejects the job up front if the configuration is invalid.
    pub fn new(config: JobConfig, functions: JobFunctions) -> MrResult<Self> {
        config.validate()?;
        let functions = if config.use_combiner {
            functions
        } else {
            functions.without_combiner()
        };
        Ok(Coordinator {
            config,
            functions,
            splits: vec![],
            tasks: vec![],
            counters: JobCounters::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    // one map task per split, ids [0, n_map)
    fn slice(&mut self, files: &[InputFile]) {
        let splitter = Splitter::new(self.config.split_size());
        for file in files {
            self.counters.input_files += 1;
            self.counters.input_bytes += file.data.len() as u64;
            for split in splitter.split(file, self.splits.len()) {
                let task = Task::new(self.tasks.len(), split.get_id(), TaskType::Map);
                self.tasks.push(task);
                self.splits.push(Arc::new(split));
            }
        }
        self.counters.splits = self.splits.len() as u64;
    }

    // ids [n_map, n_map + n_reduce); not runnable until the map phase is done
    fn add_reduce_tasks(&mut self) {
        let n_map = self.map_task_count();
        for i in 0..self.config.reducers() {
            let mut task = Task::new(n_map + i, i, TaskType::Reduce);
            task.set_status(TaskStatus::NotReady);
            self.tasks.push(task);
        }
    }

    fn map_task_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.get_task_type() == TaskType::Map)
            .count()
    }

    /// The shuffle barrier: reduce tasks become runnable once every map task is done.
    fn release_reduce_tasks(&mut self) -> bool {
        let ready = self
            .tasks
            .iter()
            .filter(|task| task.get_task_type() == TaskType::Map)
            .all(|task| task.get_task_status() == TaskStatus::Done);
        if ready {
            for task in &mut self.tasks {
                if task.get_task_type() == TaskType::Reduce {
                    task.set_status(TaskStatus::Init);
                }
            }
        }
        ready
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.max_attempts,
            backoff: Duration::from_millis(self.config.retry_backoff_ms),
        }
    }

    fn new_worker(&self, id: usize) -> Worker {
        Worker::new(
            id,
            self.config.reducers(),
            self.functions.clone(),
            Arc::clone(&self.cancel),
        )
    }

    fn finish_task(&mut self, id: usize, status: TaskStatus, attempts: u32) {
        let task = &mut self.tasks[id];
        task.set_status(status);
        task.set_attempts(attempts);
    }

    /// Runs the job. On any error the output sink is aborted so that no
    /// partial results are left behind, and in-flight tasks are told to stop.
    #[tracing::instrument(name = "Run job", skip_all, fields(job = %self.config.job_name))]
    pub async fn run(
        mut self,
        input: &dyn InputSource,
        output: Arc<dyn OutputSink>,
    ) -> MrResult<JobReport> {
        let started = Instant::now();
        tracing::info!("submitting job, output {}", output.location());

        output.check()?;
        let files = input.read()?;
        self.slice(&files);
        drop(files);
        self.add_reduce_tasks();
        output.setup()?;

        if let Err(e) = self.execute(Arc::clone(&output)).await {
            self.cancel.store(true, Ordering::SeqCst);
            output.abort();
            tracing::error!("job {} failed: {}", self.config.job_name, e);
            return Err(e);
        }

        let report = JobReport {
            job_name: self.config.job_name.clone(),
            output: output.location(),
            map_tasks: self.map_task_count(),
            reduce_tasks: self.config.reducers(),
            counters: self.counters,
            elapsed_ms: started.elapsed().as_millis(),
        };
        tracing::info!(
            "job {} completed successfully in {} ms",
            report.job_name,
            report.elapsed_ms
        );
        tracing::info!("counters:\n{}", report.counters);
        Ok(report)
    }

    async fn execute(&mut self, output: Arc<dyn OutputSink>) -> MrResult<()> {
        let shuffle = self.map_phase().await?;
        if !self.release_reduce_tasks() {
            return Err(MrError::WorkerFailure {
                task: "shuffle".to_string(),
                attempts: 1,
                reason: "map phase ended with unfinished tasks".to_string(),
            });
        }
        self.reduce_phase(shuffle.into_partitions(), Arc::clone(&output))
            .await?;
        output.commit(self.config.reducers())
    }

    #[tracing::instrument(name = "Map phase", skip_all, fields(tasks = self.splits.len()))]
    async fn map_phase(&mut self) -> MrResult<Shuffle> {
        let policy = self.retry_policy();
        // never more workers than there are splits to hand out
        let worker_count = self.config.map_workers.min(self.splits.len()).max(1);
        let workers: Vec<Worker> = (0..worker_count).map(|id| self.new_worker(id)).collect();

        let mut jobs = vec![];
        for (i, split) in self.splits.iter().enumerate() {
            let worker = workers[i % workers.len()].clone();
            let task = &mut self.tasks[i];
            task.set_worker_id(worker.get_id());
            task.set_status(TaskStatus::Ongoing);
            jobs.push((task.get_task_id(), task.to_string(), worker, Arc::clone(split)));
        }

        let mut results = stream::iter(jobs)
            .map(|(id, name, worker, split)| async move {
                tracing::debug!("{} starting on {}", name, worker);
                let outcome = with_retries(name, policy, move || worker.do_map(&split)).await;
                (id, outcome)
            })
            .buffer_unordered(worker_count);

        let mut shuffle = Shuffle::new(self.config.reducers());
        while let Some((id, outcome)) = results.next().await {
            match outcome {
                Ok(((map_output, counters), failures)) => {
                    self.counters.merge(&counters);
                    self.counters.failed_attempts += failures as u64;
                    self.finish_task(id, TaskStatus::Done, failures + 1);
                    shuffle.absorb(map_output);
                }
                Err(e) => {
                    self.cancel.store(true, Ordering::SeqCst);
                    self.finish_task(id, TaskStatus::Failed, attempts_of(&e));
                    return Err(e);
                }
            }
        }
        tracing::info!("map phase done: {} record(s) in", self.counters.map_input_records);
        Ok(shuffle)
    }

    #[tracing::instrument(name = "Reduce phase", skip_all, fields(tasks = partitions.len()))]
    async fn reduce_phase(
        &mut self,
        partitions: Vec<Partition>,
        output: Arc<dyn OutputSink>,
    ) -> MrResult<()> {
        let policy = self.retry_policy();
        let n_map = self.map_task_count();

        let mut jobs = vec![];
        for partition in partitions {
            let index = partition.get_index();
            let worker = self.new_worker(index);
            let task = &mut self.tasks[n_map + index];
            task.set_worker_id(worker.get_id());
            task.set_status(TaskStatus::Ongoing);
            jobs.push((
                task.get_task_id(),
                task.to_string(),
                worker,
                Arc::new(partition),
            ));
        }

        let mut results = stream::iter(jobs)
            .map(|(id, name, worker, partition)| {
                let sink = Arc::clone(&output);
                async move {
                    let outcome = with_retries(name, policy, move || {
                        worker.do_reduce(&partition, sink.as_ref())
                    })
                    .await;
                    (id, outcome)
                }
            })
            .buffer_unordered(self.config.reducers());

        while let Some((id, outcome)) = results.next().await {
            match outcome {
                Ok((counters, failures)) => {
                    self.counters.merge(&counters);
                    self.counters.failed_attempts += failures as u64;
                    self.finish_task(id, TaskStatus::Done, failures + 1);
                }
                Err(e) => {
                    self.cancel.store(true, Ordering::SeqCst);
                    self.finish_task(id, TaskStatus::Failed, attempts_of(&e));
                    return Err(e);
                }
            }
        }
        tracing::info!(
            "reduce phase done: {} result(s) out",
            self.counters.reduce_output_records
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MemoryInput;
    use std::path::PathBuf;

    fn config(split: i64, reducers: i64) -> JobConfig {
        JobConfig::new(vec![PathBuf::from("mem")], "mem", split, reducers)
            .with_retry_backoff_ms(0)
    }

    fn files(texts: &[&str]) -> Vec<InputFile> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| InputFile::new(format!("f{}", i), t.as_bytes()))
            .collect()
    }

    #[test]
    fn test_coordinator_new_validates() {
        assert!(matches!(
            Coordinator::new(config(10, 0), JobFunctions::word_count()),
            Err(MrError::InvalidConfiguration(_))
        ));
        assert!(Coordinator::new(config(10, 2), JobFunctions::word_count()).is_ok());
    }

    #[test]
    fn test_coordinator_slice() {
        let mut coordinator = Coordinator::new(config(6, 2), JobFunctions::word_count()).unwrap();
        coordinator.slice(&files(&["aa bb\ncc\n", "", "dd\n"]));

        assert_eq!(coordinator.splits.len(), 3);
        assert_eq!(coordinator.counters.input_files, 3);
        assert_eq!(coordinator.counters.input_bytes, 12);
        for (i, task) in coordinator.tasks.iter().enumerate() {
            assert_eq!(task.get_task_id(), i);
            assert_eq!(task.get_input(), coordinator.splits[i].get_id());
            assert_eq!(task.get_task_type(), TaskType::Map);
        }
    }

    #[test]
    fn test_coordinator_slice_with_no_file() {
        let mut coordinator = Coordinator::new(config(6, 2), JobFunctions::word_count()).unwrap();
        coordinator.slice(&[]);
        coordinator.add_reduce_tasks();

        assert_eq!(coordinator.map_task_count(), 0);
        assert_eq!(coordinator.tasks.len(), 2);
        // nothing to wait for
        assert!(coordinator.release_reduce_tasks());
    }

    #[test]
    fn test_reduce_tasks_wait_for_map_tasks() {
        let mut coordinator = Coordinator::new(config(100, 2), JobFunctions::word_count()).unwrap();
        coordinator.slice(&files(&["a\n", "b\n"]));
        coordinator.add_reduce_tasks();

        let reduce_ids = [2, 3];
        for id in reduce_ids {
            assert_eq!(coordinator.tasks[id].get_task_type(), TaskType::Reduce);
            assert_eq!(coordinator.tasks[id].get_task_status(), TaskStatus::NotReady);
        }

        coordinator.finish_task(0, TaskStatus::Done, 1);
        assert!(!coordinator.release_reduce_tasks());
        assert_eq!(coordinator.tasks[2].get_task_status(), TaskStatus::NotReady);

        coordinator.finish_task(1, TaskStatus::Done, 1);
        assert!(coordinator.release_reduce_tasks());
        for id in reduce_ids {
            assert_eq!(coordinator.tasks[id].get_task_status(), TaskStatus::Init);
        }
    }

    #[tokio::test]
    async fn test_coordinator_run_marks_tasks_done() {
        let input = MemoryInput::new().with_text("t", "x y\nz x\n");
        let mut coordinator =
            Coordinator::new(config(4, 3), JobFunctions::word_count()).unwrap();
        coordinator.slice(&input.read().unwrap());
        coordinator.add_reduce_tasks();

        let sink = Arc::new(crate::output::MemoryOutput::new());
        sink.setup().unwrap();
        coordinator.execute(sink.clone()).await.unwrap();

        assert!(coordinator
            .tasks()
            .iter()
            .all(|t| t.get_task_status() == TaskStatus::Done && t.get_attempts() == 1));
        assert_eq!(coordinator.counters.reduce_output_records, 3);
        assert_eq!(sink.results().len(), 3);
    }
}
