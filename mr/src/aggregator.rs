/// Folds every value seen for one key into a single value.
///
/// When an aggregator is used as a combiner its output is fed back into the
/// reducer, so it must give the same final answer whether it sees all values
/// at once or partial results of earlier runs.
pub trait Aggregator: Send + Sync {
    fn reduce(&self, key: &str, values: &mut dyn Iterator<Item = u64>) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sum;

impl Aggregator for Sum {
    fn reduce(&self, _key: &str, values: &mut dyn Iterator<Item = u64>) -> u64 {
        values.sum()
    }
}
