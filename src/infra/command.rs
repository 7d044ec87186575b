//! Session executor backed by an external program.
//!
//! Each attempt spawns the configured program once. Account data travels in
//! environment variables so credentials never appear in the process list:
//!
//! - `ROSTER_ACCOUNT_ID`
//! - `ROSTER_ACCOUNT_CREDENTIAL`
//! - `ROSTER_RUN_MODE` (`toggle` or `check_only`)
//!
//! Exit code 0 is success; the last non-empty stdout line may carry a JSON
//! [`SessionOutcome`]. Any other exit is a failure described by the last
//! non-empty stderr line in `Kind: message` form. Both streams are read
//! line by line while the child runs; only the last non-empty line of each
//! is kept.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::config::SessionConfig;
use crate::core::{Account, Failure, RunMode, SessionExecutor, SessionOutcome};

/// Environment variable carrying the account identifier.
pub const ENV_ACCOUNT_ID: &str = "ROSTER_ACCOUNT_ID";
/// Environment variable carrying the account credential.
pub const ENV_ACCOUNT_CREDENTIAL: &str = "ROSTER_ACCOUNT_CREDENTIAL";
/// Environment variable carrying the run mode.
pub const ENV_RUN_MODE: &str = "ROSTER_RUN_MODE";

/// Runs one child process per session attempt.
#[derive(Debug, Clone)]
pub struct CommandSessionExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandSessionExecutor {
    /// Create an executor for the configured program.
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl SessionExecutor for CommandSessionExecutor {
    async fn run(&self, account: &Account, mode: RunMode) -> Result<SessionOutcome, Failure> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(ENV_ACCOUNT_ID, &account.identifier)
            .env(ENV_ACCOUNT_CREDENTIAL, &account.credential)
            .env(ENV_RUN_MODE, mode.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A cancelled attempt drops this future; the child must die with it.
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Failure::new("OSError", format!("failed to spawn {}: {e}", self.program)))?;

        // Drain both pipes while waiting so a chatty child never blocks on a full pipe.
        let (stdout, stderr, status) = tokio::join!(
            last_line(child.stdout.take()),
            last_line(child.stderr.take()),
            child.wait()
        );
        let status = status
            .map_err(|e| Failure::new("OSError", format!("failed to wait for {}: {e}", self.program)))?;

        if status.success() {
            Ok(parse_outcome(stdout.as_deref()))
        } else {
            debug!(status = %status, "session program failed");
            Err(parse_failure(stderr.as_deref(), &status.to_string()))
        }
    }
}

/// Read `pipe` to the end, keeping only its last non-empty line.
async fn last_line<R: AsyncRead + Unpin>(pipe: Option<R>) -> Option<String> {
    let mut reader = BufReader::new(pipe?);
    let mut buf = Vec::new();
    let mut last = None;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if !line.is_empty() {
                    last = Some(line.to_owned());
                }
            }
            Err(e) => {
                debug!(error = %e, "session output read failed");
                break;
            }
        }
    }
    last
}

fn parse_outcome(last_stdout: Option<&str>) -> SessionOutcome {
    last_stdout
        .and_then(|line| serde_json::from_str(line).ok())
        .unwrap_or_default()
}

fn parse_failure(last_stderr: Option<&str>, status: &str) -> Failure {
    last_stderr.map_or_else(
        || Failure::new("ProcessExit", format!("session program {status}")),
        Failure::parse,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_line_skips_blank_tail() {
        let text: &[u8] = b"starting\n{\"enabled\":true}\n  \n\n";
        assert_eq!(last_line(Some(text)).await.as_deref(), Some("{\"enabled\":true}"));
        let unterminated: &[u8] = b"one\ntwo";
        assert_eq!(last_line(Some(unterminated)).await.as_deref(), Some("two"));
        assert_eq!(last_line(Some(&b"\n\n"[..])).await, None);
        assert_eq!(last_line(None::<&[u8]>).await, None);
    }

    #[tokio::test]
    async fn last_line_tolerates_invalid_utf8() {
        let text: &[u8] = b"\xff\xfe garbage\nConnectionError: refused\n";
        assert_eq!(
            last_line(Some(text)).await.as_deref(),
            Some("ConnectionError: refused")
        );
    }

    #[test]
    fn outcome_from_last_line() {
        let out = parse_outcome(Some("{\"enabled\":true,\"changed\":true}"));
        assert_eq!(out, SessionOutcome { enabled: true, changed: true });
        assert_eq!(parse_outcome(Some("no json here")), SessionOutcome::default());
        assert_eq!(parse_outcome(None), SessionOutcome::default());
    }

    #[test]
    fn failure_from_stderr() {
        let f = parse_failure(Some("ConnectionError: refused"), "exit status: 1");
        assert_eq!(f, Failure::new("ConnectionError", "refused"));
        let f = parse_failure(None, "exit status: 3");
        assert_eq!(f.kind, "ProcessExit");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_shell_program() {
        let exec = CommandSessionExecutor::new(&SessionConfig {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "test \"$ROSTER_RUN_MODE\" = check_only && echo '{\"enabled\":false,\"changed\":false}' || { echo \"$ROSTER_ACCOUNT_ID: wrong mode\" >&2; exit 2; }".into(),
            ],
        });
        let account = Account::new("alice", "secret");
        let ok = exec.run(&account, RunMode::CheckOnly).await.unwrap();
        assert_eq!(ok, SessionOutcome::default());
        let err = exec.run(&account, RunMode::Toggle).await.unwrap_err();
        assert_eq!(err, Failure::new("alice", "wrong mode"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn verbose_program_reports_final_line() {
        // Far more output than a pipe buffer holds, on both streams.
        let exec = CommandSessionExecutor::new(&SessionConfig {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "seq 1 200000; seq 1 50000 >&2; echo '{\"enabled\":true,\"changed\":true}'".into(),
            ],
        });
        let outcome = exec.run(&Account::new("alice", "secret"), RunMode::Toggle).await.unwrap();
        assert_eq!(outcome, SessionOutcome { enabled: true, changed: true });
    }

    #[tokio::test]
    async fn missing_program_is_system_failure() {
        let exec = CommandSessionExecutor::new(&SessionConfig {
            program: "/nonexistent/roster-session".into(),
            args: vec![],
        });
        let err = exec.run(&Account::new("a", "b"), RunMode::Toggle).await.unwrap_err();
        assert_eq!(err.kind, "OSError");
    }
}
