use crate::tokenizer::tokenize;

/// Turns one input record into `(key, count)` emissions.
///
/// Implementations are shared across map tasks running on different threads,
/// so they hold no per-call state; `emit` is the only output channel.
pub trait Mapper: Send + Sync {
    fn map(&self, key: u64, value: &str, emit: &mut dyn FnMut(&str, u64));
}

/// Emits `(word, 1)` for every whitespace-delimited token, unnormalized.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordCount;

impl Mapper for WordCount {
    fn map(&self, _key: u64, value: &str, emit: &mut dyn FnMut(&str, u64)) {
        for word in tokenize(value) {
            emit(word, 1);
        }
    }
}
