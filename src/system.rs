//! Host memory statistics for the health report

use serde::Serialize;

const MEMINFO_PATH: &str = "/proc/meminfo";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub total_mb: f64,
    pub used_mb: f64,
    pub available_mb: f64,
    pub usage_percent: f64,
}

/// Read `/proc/meminfo`; `None` where it is missing or unreadable
pub fn memory_usage() -> Option<MemoryUsage> {
    match std::fs::read_to_string(MEMINFO_PATH) {
        Ok(raw) => parse_meminfo(&raw),
        Err(err) => {
            tracing::debug!(%err, "failed to read {MEMINFO_PATH}");
            None
        }
    }
}

/// Parse the `MemTotal` / `MemAvailable` lines (values in kB)
#[allow(clippy::cast_precision_loss)]
pub fn parse_meminfo(raw: &str) -> Option<MemoryUsage> {
    let mut total = None;
    let mut available = None;
    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let kb = value.split_whitespace().next().and_then(|v| v.parse::<u64>().ok());
        match key.trim() {
            "MemTotal" => total = kb,
            "MemAvailable" => available = kb,
            _ => {}
        }
    }

    let total = total?;
    let available = available.unwrap_or(0).min(total);
    let used = total - available;
    Some(MemoryUsage {
        total_mb: total as f64 / 1024.0,
        used_mb: used as f64 / 1024.0,
        available_mb: available as f64 / 1024.0,
        usage_percent: if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        },
    })
}
