//! Node groups.
//!
//! The selected nodes are cut into contiguous groups and every group gets
//! exactly one job for its whole lifetime.

use std::fmt;

use crate::error::SbenchError;
use crate::hostlist;
use crate::launch::RunningJob;
use crate::report::Bucket;

/// Lifecycle of a group's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupStatus {
    Pending,
    Running,
    /// The job exited on its own. `None` if it was killed by a signal.
    Completed(Option<i32>),
    /// The job was still running at the deadline and has been terminated.
    TimedOut,
    /// The launcher could not be started.
    FailedToStart(String),
}

impl GroupStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GroupStatus::Pending | GroupStatus::Running)
    }

    /// Bucket of a terminal status. `None` while the job is still pending or running.
    pub fn bucket(&self) -> Option<Bucket> {
        match self {
            GroupStatus::Pending | GroupStatus::Running => None,
            GroupStatus::Completed(code) => Some(Bucket::classify(*code)),
            GroupStatus::TimedOut | GroupStatus::FailedToStart(_) => Some(Bucket::Unknown),
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GroupStatus::Pending => write!(f, "pending"),
            GroupStatus::Running => write!(f, "running"),
            GroupStatus::Completed(Some(code)) => write!(f, "exit {}", code),
            GroupStatus::Completed(None) => write!(f, "killed by signal"),
            GroupStatus::TimedOut => write!(f, "timed out"),
            GroupStatus::FailedToStart(reason) => write!(f, "failed to start: {}", reason),
        }
    }
}

#[derive(Debug)]
pub struct JobGroup {
    /// Position in the plan.
    pub index: usize,
    /// Never empty.
    pub nodes: Vec<String>,
    pub status: GroupStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Present while the job runs.
    pub(crate) job: Option<RunningJob>,
}

impl JobGroup {
    pub fn new(index: usize, nodes: Vec<String>) -> Self {
        Self {
            index,
            nodes,
            status: GroupStatus::Pending,
            stdout: Vec::new(),
            stderr: Vec::new(),
            job: None,
        }
    }

    /// The group's nodes in range notation, as handed to the launcher.
    pub fn nodelist(&self) -> String {
        hostlist::compress(&self.nodes)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Cuts `nodes` into contiguous groups of `group_size`. The last group may be smaller.
pub fn plan(nodes: &[String], group_size: usize) -> Result<Vec<JobGroup>, SbenchError> {
    if group_size == 0 {
        return Err(SbenchError::InvalidConfiguration(
            "group size must be at least 1".to_string(),
        ));
    }
    Ok(nodes
        .chunks(group_size)
        .enumerate()
        .map(|(index, chunk)| JobGroup::new(index, chunk.to_vec()))
        .collect())
}
