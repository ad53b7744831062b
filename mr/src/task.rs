use std::fmt;

#[derive(Debug, PartialEq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum TaskStatus {
    NotReady,
    Init,
    Ongoing,
    Done,
    Failed,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Map,
    Reduce,
}

/// One schedulable unit. A map task owns a split, a reduce task owns a
/// partition; `input` is the index of that split or partition.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct Task {
    id: usize,
    input: usize,
    status: TaskStatus,
    task_type: TaskType,
    worker_id: Option<usize>,
    attempts: u32,
}

impl Task {
    pub fn new(id: usize, input: usize, task_type: TaskType) -> Task {
        Task {
            id,
            input,
            status: TaskStatus::Init,
            task_type,
            worker_id: None,
            attempts: 0,
        }
    }

    pub fn get_task_id(&self) -> usize {
        self.id
    }

    pub fn get_input(&self) -> usize {
        self.input
    }

    pub fn get_task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn get_task_status(&self) -> TaskStatus {
        self.status
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    pub fn get_worker_id(&self) -> Option<usize> {
        self.worker_id
    }

    pub fn set_worker_id(&mut self, id: usize) {
        self.worker_id = Some(id);
    }

    pub fn get_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.task_type {
            TaskType::Map => write!(f, "map task {} (split {})", self.id, self.input),
            TaskType::Reduce => write!(f, "reduce task {} (partition {})", self.id, self.input),
        }
    }
}
