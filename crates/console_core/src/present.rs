//! Pure display helpers shared by front ends.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTone {
    Running,
    Stopped,
    Degraded,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerStatus {
    pub label: String,
    pub tone: PowerTone,
}

pub fn describe_power_status(status: &str) -> PowerStatus {
    let normalized = status.trim().to_lowercase();
    let (label, tone) = match normalized.as_str() {
        "running" => ("Running".to_string(), PowerTone::Running),
        "stopped" => ("Stopped".to_string(), PowerTone::Stopped),
        "services-down" => ("Services down".to_string(), PowerTone::Degraded),
        "" => ("Unknown".to_string(), PowerTone::Unknown),
        _ => (normalized, PowerTone::Unknown),
    };
    PowerStatus { label, tone }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut index = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && index < UNITS.len() - 1 {
        value /= 1024.0;
        index += 1;
    }
    if index == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[index])
    }
}

/// "just now", "5m ago", "3h ago", "2d ago"; `-` when the timestamp is
/// missing or unparsable.
pub fn format_relative_time(timestamp: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(parsed) = timestamp
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
    else {
        return "-".to_string();
    };
    let elapsed = now.signed_duration_since(parsed.with_timezone(&Utc));
    if elapsed.num_seconds() < 30 {
        return "just now".to_string();
    }
    let minutes = elapsed.num_minutes();
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}
