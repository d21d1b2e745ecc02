//! Submission pipeline: intake, one scoring call, then a ledger append.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db;
use crate::error::PipelineResult;
use crate::intake::{DocumentStore, UploadedBlob};
use crate::models::{ReportOutcome, ResultRecord, SubmissionIdentity};
use crate::report;
use crate::scoring::Scorer;

pub struct Pipeline {
    pool: SqlitePool,
    documents: DocumentStore,
    scorer: Arc<dyn Scorer>,
    graph_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        pool: SqlitePool,
        documents: DocumentStore,
        scorer: Arc<dyn Scorer>,
        graph_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pool,
            documents,
            scorer,
            graph_dir: graph_dir.into(),
        }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn graph_dir(&self) -> &std::path::Path {
        &self.graph_dir
    }

    /// Runs one submission end to end. A record is written only after the
    /// scorer returns a mark; any earlier failure leaves the ledger untouched.
    pub async fn submit(
        &self,
        identity: SubmissionIdentity,
        blob: &UploadedBlob,
    ) -> PipelineResult<ResultRecord> {
        let identity = identity.trimmed();
        let handle = self.documents.intake(blob).await?;

        let mark = match self.scorer.score(&handle).await {
            Ok(mark) => mark,
            Err(err) => {
                warn!(document = %handle.path().display(), "submission discarded: {err}");
                return Err(err);
            }
        };

        let record = db::append(&self.pool, &identity, mark).await?;
        info!(id = record.id, roll_no = %record.identity.roll_no, mark, "recorded result");
        Ok(record)
    }

    pub async fn results(&self) -> PipelineResult<Vec<ResultRecord>> {
        db::list_descending(&self.pool).await
    }

    pub async fn report(&self) -> PipelineResult<ReportOutcome> {
        report::render_report(&self.pool, &self.graph_dir).await
    }
}
