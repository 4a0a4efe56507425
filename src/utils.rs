// ABOUTME: Pure text helpers shared by the renderers
// ABOUTME: HTML escaping, French date formatting and human durations

use chrono::{DateTime, NaiveDate};

/// Escape the characters that are significant in HTML text content.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Format an ISO date (or RFC 3339 timestamp) as `dd/mm/yyyy`.
///
/// Input that cannot be parsed is returned as-is.
pub fn format_date(date: &str) -> String {
    let trimmed = date.trim();
    if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return day.format("%d/%m/%Y").to_string();
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return ts.date_naive().format("%d/%m/%Y").to_string();
    }
    date.to_string()
}

/// Render a number of seconds as `1h 1m 5s`, `2m 5s` or `45s`.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
