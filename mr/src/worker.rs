use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::aggregator::{Aggregator, Sum};
use crate::counters::JobCounters;
use crate::error::{AttemptError, MrError};
use crate::mapper::{Mapper, WordCount};
use crate::output::OutputSink;
use crate::shuffle::{MapOutput, Partition};
use crate::split::Split;

/// The user functions of a job. The combiner runs on each map task's output
/// before the shuffle, the reducer once per key after it; they are separate
/// slots because only associative aggregations can serve as both.
#[derive(Clone)]
pub struct JobFunctions {
    pub mapper: Arc<dyn Mapper>,
    pub combiner: Option<Arc<dyn Aggregator>>,
    pub reducer: Arc<dyn Aggregator>,
}

impl JobFunctions {
    pub fn new(mapper: Arc<dyn Mapper>, reducer: Arc<dyn Aggregator>) -> Self {
        JobFunctions {
            mapper,
            combiner: None,
            reducer,
        }
    }

    pub fn with_combiner(mut self, combiner: Arc<dyn Aggregator>) -> Self {
        self.combiner = Some(combiner);
        self
    }

    pub fn without_combiner(mut self) -> Self {
        self.combiner = None;
        self
    }

    /// `WordCount` mapper with `Sum` as both combiner and reducer.
    pub fn word_count() -> Self {
        let sum: Arc<dyn Aggregator> = Arc::new(Sum);
        JobFunctions::new(Arc::new(WordCount), Arc::clone(&sum)).with_combiner(sum)
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Linear backoff plus up to one `backoff` of random jitter, never more
    /// than `MAX_RETRY_DELAY`.
    fn delay(&self, failures: u32) -> Duration {
        let base = self.backoff.min(MAX_RETRY_DELAY).as_millis() as u64;
        let jitter = rand::thread_rng().gen_range(0..=base);
        let delay = base.saturating_mul(failures as u64).saturating_add(jitter);
        Duration::from_millis(delay).min(MAX_RETRY_DELAY)
    }
}

/// Executes map and reduce tasks. Cheap to clone; clones share the
/// cancellation flag.
#[derive(Clone)]
pub struct Worker {
    id: usize,
    partitions: usize,
    functions: JobFunctions,
    cancel: Arc<AtomicBool>,
}

impl std::fmt::Display for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Worker {{ id: {}, partitions: {} }}", self.id, self.partitions)
    }
}

impl Worker {
    pub fn new(
        id: usize,
        partitions: usize,
        functions: JobFunctions,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Worker {
            id,
            partitions,
            functions,
            cancel,
        }
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    fn check_cancelled(&self) -> Result<(), AttemptError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(AttemptError::Cancelled);
        }
        Ok(())
    }

    /// Maps every record of `split`, then combines and partitions the emissions.
    pub fn do_map(&self, split: &Split) -> Result<(MapOutput, JobCounters), AttemptError> {
        let records = split.records().map_err(|e| {
            AttemptError::Failed(format!(
                "{} at byte {}: {}",
                split.get_source(),
                split.get_offset(),
                e
            ))
        })?;

        let mut output = MapOutput::new(self.partitions);
        let mut counters = JobCounters::default();
        let mapper = &self.functions.mapper;
        for record in records {
            self.check_cancelled()?;
            counters.map_input_records += 1;
            mapper.map(record.key, record.text, &mut |key, value| output.emit(key, value));
        }
        counters.map_output_records = output.record_count();

        if let Some(combiner) = &self.functions.combiner {
            let (consumed, produced) =
                output.combine(|key, values| combiner.reduce(key, &mut values.iter().copied()));
            counters.combine_input_records = consumed;
            counters.combine_output_records = produced;
        }
        Ok((output, counters))
    }

    /// Reduces every group of `partition` and writes the results as one unit.
    pub fn do_reduce(
        &self,
        partition: &Partition,
        sink: &dyn OutputSink,
    ) -> Result<JobCounters, AttemptError> {
        let mut results = Vec::with_capacity(partition.group_count());
        for (key, values) in partition.groups() {
            self.check_cancelled()?;
            let total = self
                .functions
                .reducer
                .reduce(key, &mut values.iter().copied());
            results.push((key.to_string(), total));
        }
        sink.write_partition(partition.get_index(), &results)?;

        Ok(JobCounters {
            reduce_input_groups: partition.group_count() as u64,
            reduce_input_records: partition.value_count(),
            reduce_output_records: results.len() as u64,
            ..JobCounters::default()
        })
    }
}

/// Runs `attempt` on the blocking pool until it succeeds or the policy runs
/// out of attempts. Returns the value and the number of failed attempts.
/// A panic counts as a failed attempt.
pub async fn with_retries<T, F>(
    task: String,
    policy: RetryPolicy,
    attempt: F,
) -> Result<(T, u32), MrError>
where
    T: Send + 'static,
    F: Fn() -> Result<T, AttemptError> + Send + Sync + 'static,
{
    let attempt = Arc::new(attempt);
    let mut failures = 0u32;
    loop {
        let run = Arc::clone(&attempt);
        let reason = match tokio::task::spawn_blocking(move || run()).await {
            Ok(Ok(value)) => return Ok((value, failures)),
            Ok(Err(AttemptError::Cancelled)) => {
                return Err(MrError::WorkerFailure {
                    task,
                    attempts: failures + 1,
                    reason: AttemptError::Cancelled.to_string(),
                })
            }
            Ok(Err(AttemptError::Failed(reason))) => reason,
            Err(e) => format!("panicked: {}", e),
        };

        failures += 1;
        if failures >= policy.max_attempts {
            tracing::error!("{} failed for good after {} attempt(s): {}", task, failures, reason);
            return Err(MrError::WorkerFailure {
                task,
                attempts: failures,
                reason,
            });
        }
        tracing::warn!("{} attempt {} failed, retrying: {}", task, failures, reason);
        sleep(policy.delay(failures)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemoryOutput;
    use crate::shuffle::Shuffle;
    use std::sync::atomic::AtomicU32;

    fn worker(partitions: usize, functions: JobFunctions) -> Worker {
        Worker::new(1, partitions, functions, Arc::new(AtomicBool::new(false)))
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn test_worker_do_map_with_combiner() {
        let split = Split::new(0, "t", 0, b"the quick fox\nthe lazy fox the\n".to_vec());
        let (output, counters) = worker(2, JobFunctions::word_count()).do_map(&split).unwrap();

        assert_eq!(counters.map_input_records, 2);
        assert_eq!(counters.map_output_records, 7);
        assert_eq!(counters.combine_input_records, 7);
        assert_eq!(counters.combine_output_records, 4);
        assert_eq!(output.record_count(), 4);
    }

    #[test]
    fn test_worker_do_map_without_combiner() {
        let split = Split::new(0, "t", 0, b"a a a\n".to_vec());
        let functions = JobFunctions::word_count().without_combiner();
        let (output, counters) = worker(1, functions).do_map(&split).unwrap();
        assert_eq!(output.record_count(), 3);
        assert_eq!(counters.combine_input_records, 0);
    }

    #[test]
    fn test_worker_do_map_invalid_utf8() {
        let split = Split::new(0, "bad.txt", 10, vec![0xc3, 0x28]);
        let err = worker(1, JobFunctions::word_count()).do_map(&split).unwrap_err();
        assert!(matches!(err, AttemptError::Failed(reason) if reason.contains("bad.txt")));
    }

    #[test]
    fn test_worker_stops_when_cancelled() {
        let cancel = Arc::new(AtomicBool::new(true));
        let worker = Worker::new(0, 1, JobFunctions::word_count(), cancel);
        let split = Split::new(0, "t", 0, b"a\n".to_vec());
        assert!(matches!(worker.do_map(&split), Err(AttemptError::Cancelled)));
    }

    #[test]
    fn test_worker_do_reduce() {
        let w = worker(1, JobFunctions::word_count().without_combiner());
        let split = Split::new(0, "t", 0, b"b a b\n".to_vec());
        let (output, _) = w.do_map(&split).unwrap();
        let mut shuffle = Shuffle::new(1);
        shuffle.absorb(output);
        let partition = shuffle.into_partitions().remove(0);

        let sink = MemoryOutput::new();
        let counters = w.do_reduce(&partition, &sink).unwrap();
        sink.commit(1).unwrap();

        assert_eq!(counters.reduce_input_groups, 2);
        assert_eq!(counters.reduce_input_records, 3);
        assert_eq!(counters.reduce_output_records, 2);
        assert_eq!(
            sink.results(),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        let huge = RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(u64::MAX / 2),
        };
        assert!(huge.delay(u32::MAX) <= MAX_RETRY_DELAY);

        let small = RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(10),
        };
        let delay = small.delay(3);
        assert!(delay >= Duration::from_millis(30) && delay <= Duration::from_millis(40));
        assert_eq!(policy(1).delay(7), Duration::ZERO);
    }

    #[test]
    fn test_worker_display() {
        let w = worker(3, JobFunctions::word_count());
        assert_eq!(w.to_string(), "Worker { id: 1, partitions: 3 }");
    }

    #[tokio::test]
    async fn test_with_retries_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let (value, failures) = with_retries("flaky".to_string(), policy(3), move || {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AttemptError::Failed("boom".to_string()))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!((value, failures), (42, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retries_gives_up() {
        let result: Result<((), u32), MrError> =
            with_retries("doomed".to_string(), policy(2), || {
                Err(AttemptError::Failed("always".to_string()))
            })
            .await;
        assert!(matches!(
            result,
            Err(MrError::WorkerFailure { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_with_retries_counts_panics() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let (_, failures) = with_retries("panicky".to_string(), policy(2), move || {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first attempt");
            }
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_with_retries_does_not_retry_cancelled() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let result: Result<((), u32), MrError> =
            with_retries("cancelled".to_string(), policy(5), move || {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(AttemptError::Cancelled)
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
