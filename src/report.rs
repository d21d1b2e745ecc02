use std::fmt::Write;
use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ChartBar, ReportOutcome, ResultRecord, ResultRow};

pub const ARTIFACT_NAME: &str = "performance.svg";

const WIDTH: f64 = 700.0;
const HEIGHT: f64 = 400.0;
const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const TICKS: usize = 5;
const BAR_FILL: &str = "#1f77b4";

/// One bar per record, in the order given. Same-name entries stay separate.
pub fn build_bars(records: &[ResultRecord]) -> Vec<ChartBar> {
    records
        .iter()
        .map(|record| ChartBar {
            name: record.identity.name.clone(),
            mark: record.mark,
        })
        .collect()
}

/// Writes the listing as CSV with the ledger's column names.
pub fn export_csv<W: std::io::Write>(records: &[ResultRecord], out: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for record in records {
        writer.serialize(ResultRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Re-reads the whole ledger and replaces the chart in `graph_dir`.
pub async fn render_report(pool: &SqlitePool, graph_dir: &Path) -> PipelineResult<ReportOutcome> {
    let records = db::list_ascending(pool).await?;
    if records.is_empty() {
        info!("no results recorded, skipping chart");
        return Ok(ReportOutcome::Empty);
    }

    let bars = build_bars(&records);
    let svg = render_svg(&bars);
    let path = graph_dir.join(ARTIFACT_NAME);
    publish(&path, svg.as_bytes()).await?;

    info!(bars = bars.len(), path = %path.display(), "rendered performance chart");
    Ok(ReportOutcome::Rendered { path, bars })
}

/// Writes next to the target and renames over it, so viewers never see a
/// half-written chart.
async fn publish(path: &Path, contents: &[u8]) -> PipelineResult<()> {
    let render_err = |action: &str, target: &Path, err: std::io::Error| {
        PipelineError::ReportRenderFailure(format!("failed to {action} {}: {err}", target.display()))
    };

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(ARTIFACT_NAME);
    let staging: PathBuf = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    tokio::fs::write(&staging, contents)
        .await
        .map_err(|err| render_err("write", &staging, err))?;

    if let Err(err) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(render_err("publish", path, err));
    }

    Ok(())
}

pub fn render_svg(bars: &[ChartBar]) -> String {
    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let (low, high) = value_range(bars);
    let scale_y = |value: f64| MARGIN_TOP + plot_h * (high - value) / (high - low);
    let zero_y = scale_y(0.0);

    let slot = plot_w / bars.len().max(1) as f64;
    let bar_w = slot * 0.8;
    let rotate_labels = bars.len() > 8;

    let mut output = String::new();
    let _ = writeln!(
        output,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="11">"#
    );
    let _ = writeln!(output, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        output,
        r#"<text x="{}" y="22" text-anchor="middle" font-size="14">Student Performance</text>"#,
        WIDTH / 2.0
    );

    for i in 0..=TICKS {
        let value = low + (high - low) * i as f64 / TICKS as f64;
        let y = scale_y(value);
        let _ = writeln!(
            output,
            r##"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#dddddd"/>"##,
            WIDTH - MARGIN_RIGHT
        );
        let _ = writeln!(
            output,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"#,
            MARGIN_LEFT - 6.0,
            y + 4.0,
            format_tick(value)
        );
    }

    for (i, bar) in bars.iter().enumerate() {
        let x = MARGIN_LEFT + slot * i as f64 + (slot - bar_w) / 2.0;
        let top = scale_y(bar.mark.max(0.0));
        let height = (scale_y(bar.mark.min(0.0)) - top).max(0.0);
        let label = escape_xml(&bar.name);
        let _ = writeln!(
            output,
            r#"<rect x="{x:.1}" y="{top:.1}" width="{bar_w:.1}" height="{height:.1}" fill="{BAR_FILL}"><title>{label}: {}</title></rect>"#,
            bar.mark
        );

        let cx = x + bar_w / 2.0;
        let ly = HEIGHT - MARGIN_BOTTOM + 14.0;
        if rotate_labels {
            let _ = writeln!(
                output,
                r#"<text x="{cx:.1}" y="{ly:.1}" text-anchor="end" transform="rotate(-45 {cx:.1} {ly:.1})">{label}</text>"#
            );
        } else {
            let _ = writeln!(
                output,
                r#"<text x="{cx:.1}" y="{ly:.1}" text-anchor="middle">{label}</text>"#
            );
        }
    }

    let _ = writeln!(
        output,
        r#"<line x1="{MARGIN_LEFT}" y1="{zero_y:.1}" x2="{:.1}" y2="{zero_y:.1}" stroke="black"/>"#,
        WIDTH - MARGIN_RIGHT
    );
    let _ = writeln!(
        output,
        r#"<line x1="{MARGIN_LEFT}" y1="{MARGIN_TOP}" x2="{MARGIN_LEFT}" y2="{:.1}" stroke="black"/>"#,
        HEIGHT - MARGIN_BOTTOM
    );
    let _ = writeln!(
        output,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">STUDENT NAME</text>"#,
        MARGIN_LEFT + plot_w / 2.0,
        HEIGHT - 8.0
    );
    let _ = writeln!(
        output,
        r#"<text x="16" y="{:.1}" text-anchor="middle" transform="rotate(-90 16 {:.1})">Marks</text>"#,
        MARGIN_TOP + plot_h / 2.0,
        MARGIN_TOP + plot_h / 2.0
    );
    let _ = writeln!(output, "</svg>");

    output
}

/// Value axis always includes zero so bars grow from a common baseline.
fn value_range(bars: &[ChartBar]) -> (f64, f64) {
    let low = bars.iter().map(|bar| bar.mark).fold(0.0_f64, f64::min);
    let high = bars.iter().map(|bar| bar.mark).fold(0.0_f64, f64::max);
    if high - low > f64::EPSILON {
        (low, high)
    } else {
        (low, low + 1.0)
    }
}

fn format_tick(value: f64) -> String {
    if value.fract().abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
