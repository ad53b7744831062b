use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub input_files: u64,
    pub input_bytes: u64,
    pub splits: u64,
    pub map_input_records: u64,
    pub map_output_records: u64,
    pub combine_input_records: u64,
    pub combine_output_records: u64,
    pub reduce_input_groups: u64,
    pub reduce_input_records: u64,
    pub reduce_output_records: u64,
    pub failed_attempts: u64,
}

impl JobCounters {
    pub fn merge(&mut self, other: &JobCounters) {
        self.input_files += other.input_files;
        self.input_bytes += other.input_bytes;
        self.splits += other.splits;
        self.map_input_records += other.map_input_records;
        self.map_output_records += other.map_output_records;
        self.combine_input_records += other.combine_input_records;
        self.combine_output_records += other.combine_output_records;
        self.reduce_input_groups += other.reduce_input_groups;
        self.reduce_input_records += other.reduce_input_records;
        self.reduce_output_records += other.reduce_output_records;
        self.failed_attempts += other.failed_attempts;
    }
}

impl fmt::Display for JobCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("Input files", self.input_files),
            ("Input bytes", self.input_bytes),
            ("Splits", self.splits),
            ("Map input records", self.map_input_records),
            ("Map output records", self.map_output_records),
            ("Combine input records", self.combine_input_records),
            ("Combine output records", self.combine_output_records),
            ("Reduce input groups", self.reduce_input_groups),
            ("Reduce input records", self.reduce_input_records),
            ("Reduce output records", self.reduce_output_records),
            ("Failed attempts", self.failed_attempts),
        ];
        for (name, value) in rows {
            writeln!(f, "\t{}={}", name, value)?;
        }
        Ok(())
    }
}

/// Summary of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_name: String,
    pub output: String,
    pub map_tasks: usize,
    pub reduce_tasks: usize,
    pub counters: JobCounters,
    pub elapsed_ms: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_merge() {
        let mut total = JobCounters::default();
        let part = JobCounters {
            map_input_records: 2,
            map_output_records: 5,
            failed_attempts: 1,
            ..JobCounters::default()
        };
        total.merge(&part);
        total.merge(&part);
        assert_eq!(total.map_input_records, 4);
        assert_eq!(total.map_output_records, 10);
        assert_eq!(total.failed_attempts, 2);
        assert_eq!(total.reduce_output_records, 0);
    }

    #[test]
    fn test_counters_display() {
        let counters = JobCounters {
            reduce_output_records: 4,
            ..JobCounters::default()
        };
        assert!(counters.to_string().contains("\tReduce output records=4\n"));
    }
}
