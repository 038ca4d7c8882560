//! Supervising launched jobs.
//!
//! A single loop polls every running job without blocking, collects the ones
//! that exited, and terminates everything still running once the global
//! deadline has passed. The loop returns when every group is terminal.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use colored::{ColoredString, Colorize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::group::{GroupStatus, JobGroup};
use crate::launch::{launch, Launcher};
use crate::report::{Bucket, Report};

/// Time between two sweeps over the running jobs.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long to keep reading a job's output after it exited.
pub const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Everything one invocation knows about its jobs.
#[derive(Debug)]
pub struct RunState {
    groups: Vec<JobGroup>,
    started: Instant,
    /// Indices of groups whose terminal status has been accumulated.
    finished: BTreeSet<usize>,
    report: Report,
}

impl RunState {
    /// Launches one job per group.
    ///
    /// A group whose launcher cannot be started is terminal right away and
    /// counts as unknown; the other groups are launched regardless.
    pub fn dispatch(groups: Vec<JobGroup>, launcher: &dyn Launcher) -> Self {
        let mut state = Self {
            groups,
            started: Instant::now(),
            finished: BTreeSet::new(),
            report: Report::new(),
        };
        for index in 0..state.groups.len() {
            let group = &mut state.groups[index];
            match launch(launcher, group) {
                Ok(job) => {
                    group.job = Some(job);
                    group.status = GroupStatus::Running;
                }
                Err(e) => {
                    warn!("{}", e);
                    group.status = GroupStatus::FailedToStart(e.to_string());
                    state.settle(index);
                }
            }
        }
        state
    }

    /// Accumulates a terminal group into its bucket. Idempotent.
    fn settle(&mut self, index: usize) -> bool {
        let group = &self.groups[index];
        match group.status.bucket() {
            Some(bucket) if self.finished.insert(index) => {
                self.report.accumulate(bucket, group.nodes.as_slice());
                true
            }
            _ => false,
        }
    }

    pub fn groups(&self) -> &[JobGroup] {
        &self.groups
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_report(self) -> Report {
        self.report
    }

    pub fn is_finished(&self) -> bool {
        self.finished.len() == self.groups.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Clone)]
pub struct Monitor {
    poll_interval: Duration,
    timeout: Option<Duration>,
    progress: bool,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            timeout: None,
            progress: false,
        }
    }
}

impl Monitor {
    /// `timeout` is measured from dispatch; `None` waits forever.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    /// Monitor honouring `--timeout` and `--progress`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.timeout()).with_progress(config.progress)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Print a line to stderr whenever a group finishes.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Polls until every group is terminal.
    pub async fn run(&self, mut state: RunState) -> RunState {
        if self.progress {
            for group in state.groups.iter().filter(|g| g.is_terminal()) {
                print_progress(group);
            }
        }
        loop {
            for index in 0..state.groups.len() {
                if state.groups[index].is_terminal() {
                    continue;
                }
                let started = state.started;
                if self.poll(&mut state.groups[index], started).await
                    && state.settle(index)
                    && self.progress
                {
                    print_progress(&state.groups[index]);
                }
            }
            if state.is_finished() {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        debug!(
            "All {} groups finished after {:.1?}",
            state.groups.len(),
            state.elapsed()
        );
        state
    }

    /// Checks one group once. Returns whether it became terminal.
    async fn poll(&self, group: &mut JobGroup, started: Instant) -> bool {
        let Some(job) = group.job.as_mut() else {
            group.status = GroupStatus::FailedToStart("not launched".to_string());
            return true;
        };
        match job.try_wait() {
            Ok(Some(status)) => {
                if let Some(job) = group.job.take() {
                    let captured = job.finish(DRAIN_GRACE).await;
                    group.stdout = captured.stdout;
                    group.stderr = captured.stderr;
                }
                group.status = GroupStatus::Completed(status.code());
                log_output(group);
                true
            }
            Ok(None) => {
                if !self.timeout.map_or(false, |t| started.elapsed() >= t) {
                    return false;
                }
                debug!("{}: timeout", group.nodelist());
                terminate(group);
                group.status = GroupStatus::TimedOut;
                log_output(group);
                true
            }
            Err(e) => {
                warn!("{}: failed to poll job: {}", group.nodelist(), e);
                terminate(group);
                group.status = GroupStatus::Completed(None);
                log_output(group);
                true
            }
        }
    }
}

fn terminate(group: &mut JobGroup) {
    if let Some(job) = group.job.take() {
        let captured = job.terminate();
        group.stdout = captured.stdout;
        group.stderr = captured.stderr;
    }
}

/// Logs stderr and the summary line a check prints first on stdout.
fn log_output(group: &JobGroup) {
    let nodelist = group.nodelist();
    for line in &group.stderr {
        debug!("{}: {}", nodelist, line);
    }
    if let Some(line) = group.stdout.first() {
        debug!("{}: {}", nodelist, line);
    }
}

fn colorize(bucket: Bucket) -> ColoredString {
    let label = bucket.as_str();
    let label = match bucket {
        Bucket::Ok => label.green(),
        Bucket::Warning => label.yellow(),
        Bucket::Critical => label.red(),
        Bucket::Unknown => label.magenta(),
    };
    label.bold()
}

fn print_progress(group: &JobGroup) {
    if let Some(bucket) = group.status.bucket() {
        eprintln!(
            "[{}] {} ({})",
            group.nodelist(),
            colorize(bucket),
            group.status
        );
    }
}
