//! Starting one job per node group.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use itertools::Itertools;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::LaunchOptions;
use crate::error::SbenchError;
use crate::group::JobGroup;
use crate::output::{capture, Captured, SharedCapture};

/// Builds the command that runs a check on one group of nodes.
pub trait Launcher {
    fn command(&self, group: &JobGroup) -> Command;
}

/// Launches checks through `srun`, scoped to the group's nodes.
#[derive(Debug, Clone)]
pub struct Srun {
    program: PathBuf,
    options: LaunchOptions,
    executable: String,
    executable_args: Vec<String>,
}

impl Srun {
    pub fn new(
        program: impl Into<PathBuf>,
        options: LaunchOptions,
        executable: impl Into<String>,
        executable_args: Vec<String>,
    ) -> Self {
        Self {
            program: program.into(),
            options,
            executable: executable.into(),
            executable_args,
        }
    }

    /// Arguments passed to `srun` for `group`.
    pub fn args(&self, group: &JobGroup) -> Vec<String> {
        let options = &self.options;
        let mut args = Vec::new();
        if let Some(partition) = &options.partition {
            args.extend(["--partition".to_string(), partition.clone()]);
        }
        args.extend(["--nodelist".to_string(), group.nodelist()]);
        if options.forward_nodes {
            args.extend(["--nodes".to_string(), group.nodes.len().to_string()]);
        }
        let valued = [
            ("--ntasks", &options.ntasks),
            ("--ntasks-per-node", &options.ntasks_per_node),
            ("--account", &options.account),
            ("--chdir", &options.chdir),
            ("--time", &options.time),
        ];
        for (flag, value) in valued {
            if let Some(value) = value {
                args.extend([flag.to_string(), value.clone()]);
            }
        }
        match &options.bcast {
            Some(Some(mode)) => args.push(format!("--bcast={}", mode)),
            Some(None) => args.push("--bcast".to_string()),
            None => {}
        }
        if options.exclusive {
            args.push("--exclusive".to_string());
        }
        if let Some(mpi) = &options.mpi {
            args.extend(["--mpi".to_string(), mpi.clone()]);
        }
        args.push(self.executable.clone());
        args.extend(self.executable_args.iter().cloned());
        args
    }
}

impl Launcher for Srun {
    fn command(&self, group: &JobGroup) -> Command {
        let args = self.args(group);
        debug!("{} {}", self.program.display(), args.iter().join(" "));
        let mut command = Command::new(&self.program);
        command.args(args);
        command
    }
}

/// A launched job whose output is being captured in the background.
#[derive(Debug)]
pub struct RunningJob {
    child: Child,
    output: SharedCapture,
    capture: JoinHandle<()>,
}

impl RunningJob {
    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Collects the captured output of a job that has exited.
    ///
    /// Waits at most `grace` for both pipes to close. A background process
    /// left behind by the job may keep them open; capturing then stops and
    /// the lines read so far are returned.
    pub async fn finish(mut self, grace: Duration) -> Captured {
        if tokio::time::timeout(grace, &mut self.capture).await.is_err() {
            debug!("Output still open after exit, stopped capturing");
            self.capture.abort();
        }
        self.output.take()
    }

    /// Sends SIGTERM to the job and stops capturing its output. Returns the
    /// lines captured so far.
    ///
    /// The job is not waited for; tokio reaps it once it exits.
    pub fn terminate(self) -> Captured {
        if let Some(pid) = self.child.id() {
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!("Failed to signal process {}: {}", pid, e);
            }
        }
        self.capture.abort();
        self.output.take()
    }
}

/// Starts the job of `group`. Spawns exactly once; never retried.
pub fn launch(launcher: &dyn Launcher, group: &JobGroup) -> Result<RunningJob, SbenchError> {
    let mut command = launcher.command(group);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|source| SbenchError::LaunchFailed {
        nodelist: group.nodelist(),
        source,
    })?;
    let output = SharedCapture::new();
    let capture = tokio::spawn(capture(
        child.stdout.take(),
        child.stderr.take(),
        output.clone(),
    ));
    Ok(RunningJob {
        child,
        output,
        capture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(nodes: &[&str]) -> JobGroup {
        JobGroup::new(0, nodes.iter().map(|s| s.to_string()).collect())
    }

    fn srun(options: LaunchOptions) -> Srun {
        Srun::new(
            "/usr/bin/srun",
            options,
            "./check_stream",
            vec!["--size".to_string(), "-1".to_string()],
        )
    }

    #[test]
    fn test_minimal_command_line() {
        let args = srun(LaunchOptions::default()).args(&group(&["n1"]));
        assert_eq!(args, vec!["--nodelist", "n1", "./check_stream", "--size", "-1"]);
    }

    #[test]
    fn test_full_command_line() {
        let options = LaunchOptions {
            partition: Some("batch".to_string()),
            forward_nodes: true,
            ntasks: Some("4".to_string()),
            ntasks_per_node: Some("2".to_string()),
            account: Some("ops".to_string()),
            chdir: Some("/scratch".to_string()),
            time: Some("10:00".to_string()),
            bcast: Some(Some("/tmp/check".to_string())),
            exclusive: true,
            mpi: Some("pmix".to_string()),
        };
        let args = srun(options).args(&group(&["n3", "n4"]));
        assert_eq!(
            args,
            vec![
                "--partition",
                "batch",
                "--nodelist",
                "n[3-4]",
                "--nodes",
                "2",
                "--ntasks",
                "4",
                "--ntasks-per-node",
                "2",
                "--account",
                "ops",
                "--chdir",
                "/scratch",
                "--time",
                "10:00",
                "--bcast=/tmp/check",
                "--exclusive",
                "--mpi",
                "pmix",
                "./check_stream",
                "--size",
                "-1",
            ]
        );
    }

    #[test]
    fn test_bare_bcast_and_short_last_group() {
        let options = LaunchOptions {
            forward_nodes: true,
            bcast: Some(None),
            ..Default::default()
        };
        let args = srun(options).args(&group(&["n5"]));
        assert_eq!(&args[..5], &["--nodelist", "n5", "--nodes", "1", "--bcast"]);
    }

    #[tokio::test]
    async fn test_missing_launcher_is_launch_failed() {
        let launcher = Srun::new("/nonexistent/srun", LaunchOptions::default(), "true", vec![]);
        let result = launch(&launcher, &group(&["n1", "n2"]));
        match result {
            Err(SbenchError::LaunchFailed { nodelist, .. }) => assert_eq!(nodelist, "n[1-2]"),
            other => panic!("expected LaunchFailed, got {:?}", other),
        }
    }

    fn shell(script: &'static str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    struct Shell(&'static str);

    impl Launcher for Shell {
        fn command(&self, _group: &JobGroup) -> Command {
            shell(self.0)
        }
    }

    async fn wait_for_exit(job: &mut RunningJob) -> ExitStatus {
        loop {
            if let Some(status) = job.try_wait().unwrap() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_finish_is_bounded_by_inherited_pipes() {
        let mut job = launch(&Shell("echo started; sleep 5 & exit 0"), &group(&["n1"])).unwrap();
        let status = wait_for_exit(&mut job).await;
        assert_eq!(status.code(), Some(0));

        let started = std::time::Instant::now();
        let captured = job.finish(Duration::from_millis(300)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(captured.stdout, vec!["started"]);
    }

    #[tokio::test]
    async fn test_terminate_keeps_output_read_so_far() {
        let job = launch(&Shell("echo partial >&2; exec sleep 30"), &group(&["n1"])).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let captured = job.terminate();
        assert_eq!(captured.stderr, vec!["partial"]);
        assert!(captured.stdout.is_empty());
    }
}
