//! Cluster topology queries.
//!
//! Nodes and partitions are scraped from `scontrol --oneliner`, which prints
//! one record per line as whitespace separated `Key=Value` tokens. The rest of
//! sbench only sees [`Node`] and [`Partition`] values through [`Directory`].

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::SbenchError;
use crate::hostlist;

/// Snapshot of one compute node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    /// State as reported by the cluster manager, e.g. `IDLE` or `DOWN*`.
    pub state: String,
}

impl Node {
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
        }
    }

    /// Case-insensitive match against a list of states. An empty list matches.
    pub fn in_states(&self, states: &[String]) -> bool {
        states.is_empty() || states.iter().any(|s| s.eq_ignore_ascii_case(&self.state))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub name: String,
    pub nodes: Vec<String>,
}

/// Read-only view of the cluster manager.
#[async_trait]
pub trait Directory {
    /// All nodes whose state is in `states`, or every node if `states` is empty.
    ///
    /// The filter only narrows the query. [`select`](crate::select::select)
    /// applies it again, so an implementation may return extra nodes.
    async fn list_nodes(&self, states: &[String]) -> Result<Vec<Node>, SbenchError>;

    /// Names of the nodes belonging to partition `name`.
    async fn list_partition_nodes(&self, name: &str) -> Result<Vec<String>, SbenchError>;
}

/// [`Directory`] backed by the `scontrol` command line tool.
#[derive(Debug, Clone)]
pub struct Scontrol {
    program: PathBuf,
}

impl Scontrol {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn query(&self, args: &[&str]) -> Result<String, SbenchError> {
        let unavailable = |reason: String| {
            SbenchError::DirectoryUnavailable(format!(
                "{} --oneliner {}: {}",
                self.program.display(),
                args.join(" "),
                reason
            ))
        };
        let output = Command::new(&self.program)
            .arg("--oneliner")
            .args(args)
            .output()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unavailable(format!("{} ({})", output.status, stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Directory for Scontrol {
    async fn list_nodes(&self, states: &[String]) -> Result<Vec<Node>, SbenchError> {
        let output = self.query(&["show", "nodes"]).await?;
        Ok(parse_nodes(&output)
            .into_iter()
            .filter(|node| node.in_states(states))
            .collect())
    }

    async fn list_partition_nodes(&self, name: &str) -> Result<Vec<String>, SbenchError> {
        let output = self.query(&["show", "partition", name]).await?;
        Ok(parse_partitions(&output)
            .into_iter()
            .flat_map(|partition| partition.nodes)
            .collect())
    }
}

/// Splits a record on whitespace into `Key=Value` pairs.
///
/// Only the first `=` separates key from value, so `TRES=cpu=4,mem=8G` keeps
/// its whole value.
fn parse_record(line: &str) -> HashMap<&str, &str> {
    line.split_whitespace()
        .filter_map(|token| token.split_once('='))
        .collect()
}

/// Parses `scontrol --oneliner show nodes`. Lines lacking `NodeName` or
/// `State` are skipped.
pub fn parse_nodes(output: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let record = parse_record(line);
        match (record.get("NodeName"), record.get("State")) {
            (Some(name), Some(state)) => nodes.push(Node::new(*name, *state)),
            _ => debug!("Skipping unrecognized node record: {}", line),
        }
    }
    nodes
}

/// Parses `scontrol --oneliner show partition`. Lines lacking
/// `PartitionName` or carrying a malformed `Nodes` range are skipped.
pub fn parse_partitions(output: &str) -> Vec<Partition> {
    let mut partitions = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let record = parse_record(line);
        let Some(name) = record.get("PartitionName") else {
            debug!("Skipping unrecognized partition record: {}", line);
            continue;
        };
        let nodes = match record.get("Nodes") {
            None | Some(&"(null)") => Vec::new(),
            Some(range) => match hostlist::expand(range) {
                Ok(nodes) => nodes,
                Err(e) => {
                    debug!("Skipping partition {}: {}", name, e);
                    continue;
                }
            },
        };
        partitions.push(Partition {
            name: name.to_string(),
            nodes,
        });
    }
    partitions
}
