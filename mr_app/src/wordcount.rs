use anyhow::Context;
use clap::Parser;
use mr::{Coordinator, DirOutput, FileInput, JobConfig, JobFunctions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Count how often every word occurs in the input and write one
/// `word<TAB>count` line per distinct word.
#[derive(Parser, Debug)]
#[command(name = "wordcount", version, allow_negative_numbers = true)]
struct Args {
    /// Input files or directories, comma separated
    #[arg(required_unless_present = "config")]
    input: Option<String>,

    /// Output directory; must not exist yet
    #[arg(required_unless_present = "config")]
    output: Option<PathBuf>,

    /// Maximum bytes of input per map task
    #[arg(required_unless_present = "config")]
    split_max_size: Option<i64>,

    /// Number of reduce tasks (and output part files)
    #[arg(required_unless_present = "config")]
    num_reducers: Option<i64>,

    /// Load the job from a JSON file; positional arguments override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    job_name: Option<String>,

    /// Concurrent map tasks [default: available cores]
    #[arg(long)]
    map_workers: Option<usize>,

    /// Attempts per task before the job fails
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Skip the map-side combine step
    #[arg(long)]
    no_combiner: bool,

    /// Write the job report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn job_config(&self) -> anyhow::Result<JobConfig> {
        let mut config = match &self.config {
            Some(path) => JobConfig::from_json_file(path)?,
            None => JobConfig::new(vec![], PathBuf::new(), 0, 0),
        };
        if let Some(input) = &self.input {
            config.inputs = input
                .split(',')
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(size) = self.split_max_size {
            config.max_split_size = size;
        }
        if let Some(n) = self.num_reducers {
            config.reducer_count = n;
        }
        if let Some(name) = &self.job_name {
            config = config.with_job_name(name.clone());
        }
        if let Some(n) = self.map_workers {
            config = config.with_map_workers(n);
        }
        if let Some(n) = self.max_attempts {
            config = config.with_max_attempts(n);
        }
        if self.no_combiner {
            config = config.with_combiner(false);
        }
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 2)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    tracing::debug!("{:?}", args);

    let config = args.job_config()?;
    let input = FileInput::new(config.inputs.clone());
    let output = Arc::new(DirOutput::new(config.output.clone()));
    let coordinator = Coordinator::new(config, JobFunctions::word_count())?;

    let report = coordinator
        .run(&input, output)
        .await
        .context("word count job failed")?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_positional() {
        let args = Args::parse_from(["wordcount", "a.txt,dir", "out", "128", "2"]);
        let config = args.job_config().unwrap();
        assert_eq!(config.inputs, vec![PathBuf::from("a.txt"), PathBuf::from("dir")]);
        assert_eq!(config.output, PathBuf::from("out"));
        assert_eq!(config.max_split_size, 128);
        assert_eq!(config.reducer_count, 2);
        assert!(config.use_combiner);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_args_flags() {
        let args = Args::parse_from([
            "wordcount",
            "in",
            "out",
            "64",
            "3",
            "--job-name",
            "wc",
            "--map-workers",
            "2",
            "--max-attempts",
            "1",
            "--no-combiner",
        ]);
        let config = args.job_config().unwrap();
        assert_eq!(config.job_name, "wc");
        assert_eq!(config.map_workers, 2);
        assert_eq!(config.max_attempts, 1);
        assert!(!config.use_combiner);
    }

    #[test]
    fn test_args_non_positive_reducers_reach_validation() {
        let args = Args::parse_from(["wordcount", "in", "out", "64", "-1"]);
        let config = args.job_config().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_args_missing_positionals() {
        assert!(Args::try_parse_from(["wordcount", "in", "out"]).is_err());
    }
}
