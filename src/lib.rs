//! sbench: run a check on every group of cluster nodes and summarize the results.

// Command line arguments and configuration.
pub mod config;
// Error handling.
pub mod error;
// Node range notation.
pub mod hostlist;
// Cluster topology queries.
pub mod directory;
// Target node selection.
pub mod select;
// Node groups and their lifecycle.
pub mod group;
// Capturing job output.
pub mod output;
// Starting jobs.
pub mod launch;
// Supervising jobs.
pub mod monitor;
// Aggregated results.
pub mod report;

use tracing::debug;

pub use config::{Config, LaunchOptions};
pub use directory::{Directory, Node, Partition, Scontrol};
pub use error::SbenchError;
pub use group::{plan, GroupStatus, JobGroup};
pub use launch::{launch, Launcher, RunningJob, Srun};
pub use monitor::{Monitor, RunState, POLL_INTERVAL};
pub use report::{Bucket, Report};
pub use select::{parse_nodelist, select};

/// Selects the target nodes, launches one job per group and waits for all of them.
///
/// Configuration errors and directory failures abort before anything is
/// launched. Once jobs are running, every outcome ends up in the report.
pub async fn run(
    config: &Config,
    directory: &dyn Directory,
    launcher: &dyn Launcher,
    monitor: &Monitor,
) -> Result<Report, SbenchError> {
    let group_size = config.group_size()?;
    let nodelist = config.nodelist.as_deref().map(parse_nodelist).transpose()?;

    let nodes = directory.list_nodes(&config.state).await?;
    let partition = match &config.partition {
        Some(name) => Some(directory.list_partition_nodes(name).await?),
        None => None,
    };

    let targets = select(&nodes, &config.state, partition.as_deref(), nodelist.as_deref());
    debug!("nodes: {}", targets.len());

    let groups = plan(&targets, group_size)?;
    let state = RunState::dispatch(groups, launcher);
    let state = monitor.run(state).await;
    Ok(state.into_report())
}
