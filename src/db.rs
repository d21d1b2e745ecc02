use std::str::FromStr;

use anyhow::Context;
use chrono::{Local, NaiveDateTime, Timelike};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::warn;

use crate::error::PipelineResult;
use crate::models::{ResultRecord, SubmissionIdentity, DATE_FORMAT};

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url {database_url}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to open the results ledger")
}

/// Creates the ledger schema if absent. Safe to run on every start.
pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Appends one record. The id is assigned and the row written by a single
/// statement, so concurrent appends never share an id or leave a partial row.
pub async fn append(
    pool: &SqlitePool,
    identity: &SubmissionIdentity,
    mark: f64,
) -> PipelineResult<ResultRecord> {
    let now = Local::now().naive_local();
    let timestamp = now.with_nanosecond(0).unwrap_or(now);

    let id: i64 = sqlx::query(
        r#"
        INSERT INTO results (name, roll_no, semester, marks, date)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING id
        "#,
    )
    .bind(&identity.name)
    .bind(&identity.roll_no)
    .bind(&identity.semester)
    .bind(mark)
    .bind(timestamp.format(DATE_FORMAT).to_string())
    .fetch_one(pool)
    .await?
    .try_get("id")?;

    Ok(ResultRecord {
        id,
        identity: identity.clone(),
        mark,
        timestamp: Some(timestamp),
    })
}

/// Newest first, for the results listing.
pub async fn list_descending(pool: &SqlitePool) -> PipelineResult<Vec<ResultRecord>> {
    fetch_ordered(
        pool,
        "SELECT id, name, roll_no, semester, marks, date FROM results ORDER BY id DESC",
    )
    .await
}

/// Oldest first, so the chart follows submission order.
pub async fn list_ascending(pool: &SqlitePool) -> PipelineResult<Vec<ResultRecord>> {
    fetch_ordered(
        pool,
        "SELECT id, name, roll_no, semester, marks, date FROM results ORDER BY id ASC",
    )
    .await
}

pub async fn count(pool: &SqlitePool) -> PipelineResult<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

async fn fetch_ordered(pool: &SqlitePool, query: &str) -> PipelineResult<Vec<ResultRecord>> {
    let rows = sqlx::query(query).fetch_all(pool).await?;
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        records.push(record_from_row(&row)?);
    }

    Ok(records)
}

fn record_from_row(row: &SqliteRow) -> Result<ResultRecord, sqlx::Error> {
    // Rows written by older tooling may carry NULL text columns.
    let text = |column: &str| -> Result<String, sqlx::Error> {
        Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
    };

    let id: i64 = row.try_get("id")?;
    let date = text("date")?;
    let timestamp = match NaiveDateTime::parse_from_str(&date, DATE_FORMAT) {
        Ok(timestamp) => Some(timestamp),
        Err(err) => {
            warn!(id, date = %date, "result has no readable date: {err}");
            None
        }
    };

    Ok(ResultRecord {
        id,
        identity: SubmissionIdentity {
            name: text("name")?,
            roll_no: text("roll_no")?,
            semester: text("semester")?,
        },
        mark: row.try_get::<Option<f64>, _>("marks")?.unwrap_or_default(),
        timestamp,
    })
}
