//! Human-readable status text.

use std::time::Duration;

use crate::progress::ProgressSnapshot;

const BAR_CELLS: usize = 14;
const NAME_LIMIT: usize = 30;

/// `1.23 MB`, `456 KB`: two decimals below 10, one above.
pub fn human_bytes(bytes: f64) -> String {
    let mut value = bytes;
    for unit in ["B", "KB", "MB", "GB"] {
        if value.abs() < 1024.0 {
            return if value >= 10.0 {
                format!("{value:.1} {unit}")
            } else {
                format!("{value:.2} {unit}")
            };
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB")
}

pub fn human_speed(bytes_per_second: f64) -> String {
    format!("{}/s", human_bytes(bytes_per_second))
}

/// Fixed-width bar of filled and empty cells.
pub fn progress_bar(fraction: f64) -> String {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (fraction * BAR_CELLS as f64).round() as usize;
    let mut bar = "▓".repeat(filled);
    bar.push_str(&"░".repeat(BAR_CELLS - filled));
    bar
}

/// `42s`, `3m 5s`, `2h 10m`, or `∞` when unknown.
pub fn eta_text(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "∞".into();
    };
    let secs = eta.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Truncates to at most 30 characters, ending in an ellipsis when cut.
pub fn truncate_name(name: &str) -> String {
    if name.chars().count() <= NAME_LIMIT {
        return name.to_string();
    }
    let mut out: String = name.chars().take(NAME_LIMIT - 3).collect();
    out.push('…');
    out
}

/// Multi-line status message for one transfer.
pub fn render_status(snap: &ProgressSnapshot) -> String {
    let dl = snap.download_fraction();
    let ul = snap.upload_fraction();

    let mut lines = vec![
        format!(
            "File {}/{} [{}]",
            snap.file_index,
            snap.file_count,
            snap.phase.label()
        ),
        truncate_name(&snap.name),
        human_bytes(snap.total_bytes as f64),
        String::new(),
        format!("Download  {}  {:.0}%", progress_bar(dl), dl * 100.0),
        format!(
            "    {} • {} • ETA {}",
            human_bytes(snap.downloaded as f64),
            human_speed(snap.download_speed),
            eta_text(snap.download_eta)
        ),
        String::new(),
        format!("Upload    {}  {:.0}%", progress_bar(ul), ul * 100.0),
        format!(
            "    {} • {} • ETA {}",
            human_bytes(snap.uploaded as f64),
            human_speed(snap.upload_speed),
            eta_text(snap.upload_eta)
        ),
    ];

    let elapsed = snap.elapsed.as_secs();
    if elapsed >= 1 {
        lines.push(String::new());
        lines.push(format!("Elapsed: {}m {}s", elapsed / 60, elapsed % 60));
    }

    lines.join("\n")
}
