//! Health checks: run an external command and report whether it exited 0.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::metrics::{self, CheckOutcomeKind, Timer};
use crate::store::RecordId;

/// Outcome of one check, addressed to the record it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    /// Record the check was run for.
    pub id: RecordId,
    /// True iff the command exited with status 0.
    pub success: bool,
}

/// Everything needed to check one record.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Record the check belongs to.
    pub id: RecordId,
    /// Human-readable record text, for logs.
    pub label: Arc<str>,
    /// Binary followed by its arguments.
    pub command: Arc<[String]>,
    /// Time between runs.
    pub interval: Duration,
    /// Upper bound on a single run.
    pub timeout: Duration,
}

/// How a check command ended.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The command ran to completion.
    Exited(ExitStatus),
    /// The command could not be started or waited on.
    Failed(std::io::Error),
    /// The command exceeded its timeout and was killed.
    TimedOut,
}

impl CheckOutcome {
    /// Only a zero exit status counts as healthy.
    pub fn is_success(&self) -> bool {
        matches!(self, CheckOutcome::Exited(status) if status.success())
    }

    fn kind(&self) -> CheckOutcomeKind {
        match self {
            CheckOutcome::Exited(status) if status.success() => CheckOutcomeKind::Success,
            CheckOutcome::Exited(_) => CheckOutcomeKind::Failure,
            CheckOutcome::Failed(_) => CheckOutcomeKind::SpawnError,
            CheckOutcome::TimedOut => CheckOutcomeKind::Timeout,
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Exited(status) => write!(f, "{status}"),
            CheckOutcome::Failed(e) => write!(f, "failed to run: {e}"),
            CheckOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Run a command with no input and wait for it, at most `timeout`.
///
/// On Unix the command leads its own process group. The whole group is
/// killed if the timeout elapses or the returned future is dropped, so
/// processes forked by a shell check do not outlive it.
pub async fn execute(command: &[String], timeout: Duration) -> CheckOutcome {
    let Some((program, args)) = command.split_first() else {
        return CheckOutcome::Failed(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command",
        ));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return CheckOutcome::Failed(e),
    };
    let mut group = ProcessGroup::new(child.id());

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            group.disarm();
            CheckOutcome::Exited(status)
        }
        Ok(Err(e)) => {
            group.disarm();
            CheckOutcome::Failed(e)
        }
        Err(_) => {
            group.kill();
            if let Err(e) = child.kill().await {
                debug!(program = %program, error = %e, "failed to kill timed out check");
            }
            CheckOutcome::TimedOut
        }
    }
}

/// Process group of a running check, killed on drop unless disarmed.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self { pgid: leader }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        let Ok(pgid) = libc::pid_t::try_from(pgid) else {
            return;
        };
        // SAFETY: kill(2) with a negative pid only signals the group.
        if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
            debug!(
                pgid,
                error = %std::io::Error::last_os_error(),
                "failed to kill check process group"
            );
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Runs checks and forwards their results to the status processor.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    results: mpsc::Sender<CheckResult>,
}

impl HealthChecker {
    /// Create a checker that reports into the given channel.
    pub fn new(results: mpsc::Sender<CheckResult>) -> Self {
        Self { results }
    }

    /// Run one check and report its result. Returns the reported success.
    ///
    /// Failures to start the command are reported as unsuccessful checks.
    pub async fn run(&self, check: &HealthCheck) -> bool {
        let timer = Timer::start();
        let outcome = execute(&check.command, check.timeout).await;
        let success = outcome.is_success();

        metrics::record_check(outcome.kind(), timer.elapsed());
        match &outcome {
            CheckOutcome::Failed(e) => warn!(
                id = %check.id,
                record = %check.label,
                command = %check.command.join(" "),
                error = %e,
                "health check could not be run"
            ),
            CheckOutcome::TimedOut => warn!(
                id = %check.id,
                record = %check.label,
                timeout = ?check.timeout,
                "health check timed out"
            ),
            CheckOutcome::Exited(_) => debug!(
                id = %check.id,
                record = %check.label,
                outcome = %outcome,
                success,
                "health check finished"
            ),
        }

        let result = CheckResult {
            id: check.id,
            success,
        };
        if self.results.send(result).await.is_err() {
            debug!(id = %check.id, "status processor gone, dropping check result");
        }

        success
    }
}
