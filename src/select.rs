//! Target node selection.

use std::collections::{BTreeSet, HashSet};

use crate::directory::Node;
use crate::error::SbenchError;
use crate::hostlist;

/// Expands a user supplied node range, rejecting malformed ones.
pub fn parse_nodelist(expr: &str) -> Result<Vec<String>, SbenchError> {
    hostlist::expand(expr)
        .map_err(|e| SbenchError::InvalidConfiguration(format!("--nodelist '{}': {}", expr, e)))
}

/// Intersects the known nodes with every filter that is present.
///
/// `states` is compared case-insensitively; an empty list accepts every state.
/// `partition` and `nodelist` are node name lists, `None` meaning "no
/// restriction". The result is sorted and free of duplicates.
pub fn select(
    nodes: &[Node],
    states: &[String],
    partition: Option<&[String]>,
    nodelist: Option<&[String]>,
) -> Vec<String> {
    let partition: Option<HashSet<&str>> =
        partition.map(|names| names.iter().map(String::as_str).collect());
    let nodelist: Option<HashSet<&str>> =
        nodelist.map(|names| names.iter().map(String::as_str).collect());

    nodes
        .iter()
        .filter(|node| node.in_states(states))
        .filter(|node| partition.as_ref().map_or(true, |p| p.contains(node.name.as_str())))
        .filter(|node| nodelist.as_ref().map_or(true, |l| l.contains(node.name.as_str())))
        .map(|node| node.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
