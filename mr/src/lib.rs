//! A local MapReduce engine for word-frequency jobs: input is split at line
//! boundaries, mapped in parallel, optionally combined, shuffled by key and
//! reduced into one `word<TAB>count` line per distinct word.

pub mod aggregator;
pub mod config;
pub mod coordinator;
pub mod counters;
pub mod error;
pub mod input;
pub mod mapper;
pub mod output;
pub mod shuffle;
pub mod split;
pub mod task;
pub mod tokenizer;
pub mod worker;

pub use aggregator::{Aggregator, Sum};
pub use config::JobConfig;
pub use coordinator::Coordinator;
pub use counters::{JobCounters, JobReport};
pub use error::{MrError, MrResult};
pub use input::{FileInput, InputSource, MemoryInput};
pub use mapper::{Mapper, WordCount};
pub use output::{DirOutput, MemoryOutput, OutputSink};
pub use worker::JobFunctions;
