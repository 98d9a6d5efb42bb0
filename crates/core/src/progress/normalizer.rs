use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::converter::RawProgress;

/// One normalized progress tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Completion in percent, always within `0..=100`.
    pub percent: f64,
    /// Wall-clock seconds since the conversion started.
    pub elapsed_secs: f64,
    /// Estimated seconds left. Only known while `0 < percent < 100`.
    pub remaining_secs: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub target_size_bytes: Option<u64>,
    /// Engine position, unmodified.
    pub timemark: String,
}

/// Parses `[-]HH:MM:SS[.fraction]` into seconds.
///
/// Returns `None` for anything else, including ffmpeg's `N/A`.
pub fn parse_timemark(timemark: &str) -> Option<f64> {
    let trimmed = timemark.trim();
    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed),
    };

    let mut parts = body.split(':');
    let hours = parts.next()?.parse::<u64>().ok()?;
    let minutes = parts.next()?.parse::<u64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || !seconds.is_finite() {
        return None;
    }

    Some(sign * (hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds))
}

/// Normalizes a raw tick against the probed duration.
///
/// An unparseable timemark counts as position 0 and a non-positive duration
/// yields 0 percent.
pub fn normalize(raw: &RawProgress, total_duration_secs: f64, elapsed: Duration) -> ProgressEvent {
    let position = parse_timemark(&raw.timemark).unwrap_or(0.0);

    let percent = if total_duration_secs > 0.0 {
        (position / total_duration_secs * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let elapsed_secs = elapsed.as_secs_f64();
    let remaining_secs = if percent > 0.0 && percent < 100.0 {
        let estimated_total = elapsed_secs / (percent / 100.0);
        Some(estimated_total - elapsed_secs)
    } else {
        None
    };

    ProgressEvent {
        percent,
        elapsed_secs,
        remaining_secs,
        bitrate_kbps: raw.current_kbps,
        target_size_bytes: raw.target_size_bytes,
        timemark: raw.timemark.clone(),
    }
}
