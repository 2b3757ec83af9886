use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};
use log::{debug, info, warn};

use crate::{Outcome, Phase, TaskAssignment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Unassigned,
    Assigned(Instant),
    Completed,
    Failed,
}

impl TaskState {
    /// Whether a task in this state may be handed to a worker at `now`.
    pub fn reassignable(&self, now: Instant, timeout: Duration) -> bool {
        match *self {
            TaskState::Unassigned | TaskState::Failed => true,
            TaskState::Assigned(since) => now.saturating_duration_since(since) > timeout,
            TaskState::Completed => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub id: usize,
    pub phase: Phase,
    /// Input file of a map task; reduce tasks read partition `id`.
    pub input: Option<PathBuf>,
    pub state: TaskState,
}

/// Authoritative record of every task of one job.
#[derive(Debug)]
pub struct Registry {
    map_tasks: Vec<TaskDescriptor>,
    reduce_tasks: Vec<TaskDescriptor>,
    nreduce: usize,
    timeout: Duration,

    maps_done: bool,
    reduces_done: bool,
}

impl Registry {
    pub fn new(files: Vec<PathBuf>, nreduce: usize, timeout: Duration) -> Result<Self> {
        ensure!(nreduce > 0, "number of reduce tasks must be non-zero");
        let map_tasks = files
            .into_iter()
            .enumerate()
            .map(|(id, f)| TaskDescriptor {
                id,
                phase: Phase::Map,
                input: Some(f),
                state: TaskState::Unassigned,
            })
            .collect();
        let reduce_tasks = (0..nreduce)
            .map(|id| TaskDescriptor {
                id,
                phase: Phase::Reduce,
                input: None,
                state: TaskState::Unassigned,
            })
            .collect();
        Ok(Self {
            map_tasks,
            reduce_tasks,
            nreduce,
            timeout,
            maps_done: false,
            reduces_done: false,
        })
    }

    pub fn nmap(&self) -> usize {
        self.map_tasks.len()
    }

    pub fn nreduce(&self) -> usize {
        self.nreduce
    }

    pub fn tasks(&self, phase: Phase) -> &[TaskDescriptor] {
        match phase {
            Phase::Map => &self.map_tasks,
            Phase::Reduce => &self.reduce_tasks,
        }
    }

    pub fn maps_done(&self) -> bool {
        self.maps_done
    }

    pub fn done(&self) -> bool {
        self.maps_done && self.reduces_done
    }

    /// Hand out the lowest-indexed reassignable task of the active phase.
    pub fn request_task(&mut self, now: Instant) -> TaskAssignment {
        if !self.maps_done {
            match self.assign(Phase::Map, now) {
                Some(id) => {
                    return TaskAssignment::Map {
                        id,
                        input: self.map_tasks[id].input.clone().unwrap_or_default(),
                        nreduce: self.nreduce,
                    }
                }
                None if self.all_completed(Phase::Map) => self.finish(Phase::Map),
                None => return TaskAssignment::Wait,
            }
        }
        if !self.reduces_done {
            match self.assign(Phase::Reduce, now) {
                Some(id) => {
                    return TaskAssignment::Reduce {
                        id,
                        nmap: self.nmap(),
                    }
                }
                None if self.all_completed(Phase::Reduce) => self.finish(Phase::Reduce),
                None => return TaskAssignment::Wait,
            }
        }
        TaskAssignment::Exit
    }

    /// Record the outcome of a task. `Completed` is never overwritten.
    pub fn report_task(&mut self, id: usize, phase: Phase, outcome: Outcome) {
        let tasks = match phase {
            Phase::Map => &mut self.map_tasks,
            Phase::Reduce => &mut self.reduce_tasks,
        };
        let task = match tasks.get_mut(id) {
            Some(t) => t,
            None => {
                warn!("ignoring report for unknown {:?} task {}", phase, id);
                return;
            }
        };
        match (task.state, outcome) {
            (TaskState::Completed, Outcome::Failed) => {
                debug!("{:?} task {} already completed, late failure ignored", phase, id);
            }
            (_, Outcome::Completed) => task.state = TaskState::Completed,
            (_, Outcome::Failed) => {
                warn!("{:?} task {} reported failed", phase, id);
                task.state = TaskState::Failed;
            }
        }
        if outcome == Outcome::Completed && self.all_completed(phase) {
            self.finish(phase);
        }
    }

    fn assign(&mut self, phase: Phase, now: Instant) -> Option<usize> {
        let timeout = self.timeout;
        let tasks = match phase {
            Phase::Map => &mut self.map_tasks,
            Phase::Reduce => &mut self.reduce_tasks,
        };
        let task = tasks.iter_mut().find(|t| t.state.reassignable(now, timeout))?;
        if let TaskState::Assigned(_) = task.state {
            warn!("{:?} task {} timed out, reassigning", phase, task.id);
        }
        task.state = TaskState::Assigned(now);
        debug!("assigned {:?} task {}", phase, task.id);
        Some(task.id)
    }

    fn all_completed(&self, phase: Phase) -> bool {
        self.tasks(phase)
            .iter()
            .all(|t| t.state == TaskState::Completed)
    }

    fn finish(&mut self, phase: Phase) {
        let flag = match phase {
            Phase::Map => &mut self.maps_done,
            Phase::Reduce => &mut self.reduces_done,
        };
        if !*flag {
            info!("all {:?} tasks completed", phase);
            *flag = true;
        }
    }
}
