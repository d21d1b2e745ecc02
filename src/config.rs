use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Runtime configuration, resolved once at start-up from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub graph_dir: PathBuf,
    /// Scoring program followed by its fixed arguments.
    pub scorer_cmd: Option<Vec<String>>,
    pub scorer_timeout: Duration,
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            database_url: text("DATABASE_URL", "sqlite://results.db"),
            upload_dir: PathBuf::from(text("UPLOAD_DIR", "static/uploads")),
            graph_dir: PathBuf::from(text("GRAPH_DIR", "static/graphs")),
            scorer_cmd: lookup("SCORER_CMD")
                .map(|value| value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                .filter(|words| !words.is_empty()),
            scorer_timeout: Duration::from_secs(parsed(
                &text("SCORER_TIMEOUT_SECS", "60"),
                "SCORER_TIMEOUT_SECS",
            )?),
            bind_addr: parsed(&text("BIND_ADDR", "127.0.0.1:5000"), "BIND_ADDR")?,
            max_upload_bytes: parsed(&text("MAX_UPLOAD_BYTES", "16777216"), "MAX_UPLOAD_BYTES")?,
        })
    }

    /// Creates the upload and graph directories if they are missing.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in [&self.upload_dir, &self.graph_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

fn parsed<T>(value: &str, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} has invalid value {value:?}"))
}
