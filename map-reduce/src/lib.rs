use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod app;
mod coordinator;
mod registry;
pub mod store;
mod worker;
pub use coordinator::{coordinator_sock, Coordinator};
pub use registry::{Registry, TaskDescriptor, TaskState};
pub use worker::{group_by_key, ihash, partition, Worker};

/// Liveness bound after which an assigned task may be handed out again.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a worker sleeps after being told to wait.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

#[tarpc::service]
pub trait Scheduler {
    /// Ask for the next unit of work.
    async fn request_task() -> TaskAssignment;
    /// Tell the coordinator how task `id` of `phase` ended.
    async fn report_task(id: usize, phase: Phase, outcome: Outcome);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    Map,
    Reduce,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskAssignment {
    /// Map `input` and split the records into `nreduce` partitions.
    Map {
        id: usize,
        input: PathBuf,
        nreduce: usize,
    },
    /// Gather partition `id` from each of the `nmap` map tasks.
    Reduce { id: usize, nmap: usize },
    /// Nothing to hand out right now; ask again later.
    Wait,
    /// The job is finished.
    Exit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// User map function: `(input name, contents) -> records`.
pub type MapFn = fn(&str, &str) -> Vec<KeyValue>;
/// User reduce function: `(key, values) -> aggregated value`.
pub type ReduceFn = fn(&str, &[String]) -> String;
