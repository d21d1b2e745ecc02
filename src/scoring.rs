//! Adapter around the external answer-sheet scoring engine.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{instrument, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::intake::DocumentHandle;

/// Anything that can turn a stored document into a numeric mark.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Scores one document. Called exactly once per submission.
    async fn score(&self, document: &DocumentHandle) -> PipelineResult<f64>;
}

/// Runs an external program with the document path as its last argument and
/// reads the mark from the last non-empty line of its stdout.
#[derive(Debug, Clone)]
pub struct CommandScorer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandScorer {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Fixed arguments placed before the document path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl Scorer for CommandScorer {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn score(&self, document: &DocumentHandle) -> PipelineResult<f64> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(document.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                warn!("scoring engine timed out");
                PipelineError::ScoringFailure(format!(
                    "scoring engine timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|err| {
                PipelineError::ScoringFailure(format!("failed to start scoring engine: {err}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "scoring engine exited with failure");
            return Err(PipelineError::ScoringFailure(format!(
                "scoring engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_mark(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extracts the mark from engine output. Only the last non-empty line counts,
/// so engines may log progress before printing the result.
pub fn parse_mark(stdout: &str) -> PipelineResult<f64> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .ok_or_else(|| PipelineError::ScoringFailure("scoring engine printed no mark".into()))?;

    let mark: f64 = line.parse().map_err(|_| {
        PipelineError::ScoringFailure(format!("scoring engine printed {line:?}, not a number"))
    })?;

    if !mark.is_finite() {
        return Err(PipelineError::ScoringFailure(format!(
            "scoring engine printed non-finite mark {line:?}"
        )));
    }

    Ok(mark)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_last_line() {
        assert_eq!(parse_mark("loading model\n78.5\n").unwrap(), 78.5);
        assert_eq!(parse_mark("  42 \n\n").unwrap(), 42.0);
    }

    #[test]
    fn rejects_garbage() {
        for out in ["", "\n\n", "seventy", "NaN", "inf"] {
            assert!(
                matches!(parse_mark(out), Err(PipelineError::ScoringFailure(_))),
                "accepted {out:?}"
            );
        }
    }

    #[cfg(unix)]
    mod process {
        use std::path::Path;
        use std::time::Duration;

        use crate::error::PipelineError;
        use crate::intake::{DocumentHandle, DocumentStore, UploadedBlob};
        use crate::scoring::{CommandScorer, Scorer};

        async fn handle_in(dir: &Path) -> DocumentHandle {
            let store = DocumentStore::new(dir);
            store
                .intake(&UploadedBlob {
                    file_name: "sheet.png".into(),
                    bytes: b"img".to_vec(),
                })
                .await
                .unwrap()
        }

        fn shell(script: &str, timeout: Duration) -> CommandScorer {
            CommandScorer::new("sh", timeout).with_args(vec![
                "-c".into(),
                script.into(),
                "scorer".into(),
            ])
        }

        #[tokio::test]
        async fn reads_mark_from_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let handle = handle_in(dir.path()).await;

            let scorer = shell("test -f \"$1\" && echo 78.5", Duration::from_secs(5));
            assert_eq!(scorer.score(&handle).await.unwrap(), 78.5);
        }

        #[tokio::test]
        async fn non_zero_exit_is_failure() {
            let dir = tempfile::tempdir().unwrap();
            let handle = handle_in(dir.path()).await;

            let scorer = shell("echo unreadable >&2; exit 3", Duration::from_secs(5));
            let err = scorer.score(&handle).await.unwrap_err();
            assert!(matches!(err, PipelineError::ScoringFailure(ref msg) if msg.contains("unreadable")));
        }

        #[tokio::test]
        async fn slow_engine_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let handle = handle_in(dir.path()).await;

            let scorer = shell("sleep 5; echo 1", Duration::from_millis(200));
            let err = scorer.score(&handle).await.unwrap_err();
            assert!(matches!(err, PipelineError::ScoringFailure(ref msg) if msg.contains("timed out")));
        }

        #[tokio::test]
        async fn missing_program_is_failure() {
            let dir = tempfile::tempdir().unwrap();
            let handle = handle_in(dir.path()).await;

            let scorer = CommandScorer::new("/nonexistent/scorer", Duration::from_secs(1));
            assert!(matches!(
                scorer.score(&handle).await,
                Err(PipelineError::ScoringFailure(_))
            ));
        }
    }
}
