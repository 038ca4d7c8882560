//! Configuration for sbench.
//!
//! Everything comes from the command line. Most flags are handed to the
//! launcher untouched; the rest drive node selection and supervision.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::SbenchError;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Launch a check on groups of cluster nodes and summarize the results")]
pub struct Config {
    /// Enable debug logging (default: info)
    #[arg(long)]
    pub debug: bool,

    /// Print a line per node group as soon as it finishes
    #[arg(long)]
    pub progress: bool,

    /// Partition used for node selection and job submission
    #[arg(long)]
    pub partition: Option<String>,

    /// Node states accepted during node selection (repeatable)
    #[arg(long)]
    pub state: Vec<String>,

    /// Restrict node selection to this node range
    #[arg(long)]
    pub nodelist: Option<String>,

    /// Number of nodes per launched job
    #[arg(long)]
    pub nodes: Option<usize>,

    /// Number of tasks to run for each job
    #[arg(long)]
    pub ntasks: Option<String>,

    /// Number of tasks per node for each job
    #[arg(long)]
    pub ntasks_per_node: Option<String>,

    /// Account charged for the jobs
    #[arg(long)]
    pub account: Option<String>,

    /// Working directory of the jobs
    #[arg(long)]
    pub chdir: Option<String>,

    /// Time limit handed to the launcher
    #[arg(long)]
    pub time: Option<String>,

    /// Copy the executable to the compute nodes, optionally to the given path
    #[arg(long, num_args = 0..=1, require_equals = true, value_name = "MODE")]
    pub bcast: Option<Option<String>>,

    /// Request exclusive use of the compute nodes
    #[arg(long)]
    pub exclusive: bool,

    /// MPI type handed to the launcher
    #[arg(long)]
    pub mpi: Option<String>,

    /// Terminate jobs still running after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Path of the job launcher
    #[arg(long, default_value = "/usr/bin/srun")]
    pub srun: PathBuf,

    /// Path of the cluster query tool
    #[arg(long, default_value = "/usr/bin/scontrol")]
    pub scontrol: PathBuf,

    /// Executable to run on every node group
    pub executable: String,

    /// Arguments for the executable
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub executable_args: Vec<String>,
}

/// Launcher flags forwarded verbatim to every job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub partition: Option<String>,
    /// Forward `--nodes` with the size of each group.
    pub forward_nodes: bool,
    pub ntasks: Option<String>,
    pub ntasks_per_node: Option<String>,
    pub account: Option<String>,
    pub chdir: Option<String>,
    pub time: Option<String>,
    /// `Some(None)` is a bare `--bcast`.
    pub bcast: Option<Option<String>>,
    pub exclusive: bool,
    pub mpi: Option<String>,
}

impl Config {
    /// Nodes per launched job. Defaults to 1.
    pub fn group_size(&self) -> Result<usize, SbenchError> {
        match self.nodes {
            Some(0) => Err(SbenchError::InvalidConfiguration(
                "--nodes must be at least 1".to_string(),
            )),
            Some(n) => Ok(n),
            None => Ok(1),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            partition: self.partition.clone(),
            forward_nodes: self.nodes.is_some(),
            ntasks: self.ntasks.clone(),
            ntasks_per_node: self.ntasks_per_node.clone(),
            account: self.account.clone(),
            chdir: self.chdir.clone(),
            time: self.time.clone(),
            bcast: self.bcast.clone(),
            exclusive: self.exclusive,
            mpi: self.mpi.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("sbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["./check"]);
        assert_eq!(cli.executable, "./check");
        assert!(cli.executable_args.is_empty());
        assert_eq!(cli.group_size().unwrap(), 1);
        assert_eq!(cli.timeout(), None);
        assert_eq!(cli.srun, PathBuf::from("/usr/bin/srun"));
        assert_eq!(cli.launch_options(), LaunchOptions::default());
    }

    #[test]
    fn test_repeatable_state() {
        let cli = parse(&["--state", "idle", "--state", "MIXED", "./check"]);
        assert_eq!(cli.state, vec!["idle".to_string(), "MIXED".to_string()]);
    }

    #[test]
    fn test_bcast_with_and_without_value() {
        let bare = parse(&["--bcast", "./check"]);
        assert_eq!(bare.bcast, Some(None));
        assert_eq!(bare.executable, "./check");

        let valued = parse(&["--bcast=/tmp/check", "./check"]);
        assert_eq!(valued.bcast, Some(Some("/tmp/check".to_string())));

        assert_eq!(parse(&["./check"]).bcast, None);
    }

    #[test]
    fn test_executable_arguments_pass_through() {
        let cli = parse(&["--timeout", "30", "./check", "--size", "10", "-v"]);
        assert_eq!(cli.executable, "./check");
        assert_eq!(cli.executable_args, vec!["--size", "10", "-v"]);
        assert_eq!(cli.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_group_size_validation() {
        assert_eq!(parse(&["--nodes", "4", "./check"]).group_size().unwrap(), 4);
        assert!(matches!(
            parse(&["--nodes", "0", "./check"]).group_size(),
            Err(SbenchError::InvalidConfiguration(_))
        ));
        assert!(Config::try_parse_from(["sbench", "--nodes", "-1", "./check"]).is_err());
    }

    #[test]
    fn test_launch_options_projection() {
        let cli = parse(&[
            "--partition",
            "batch",
            "--nodes",
            "2",
            "--exclusive",
            "--mpi",
            "pmix",
            "./check",
        ]);
        let options = cli.launch_options();
        assert_eq!(options.partition.as_deref(), Some("batch"));
        assert!(options.forward_nodes);
        assert!(options.exclusive);
        assert_eq!(options.mpi.as_deref(), Some("pmix"));
    }
}
