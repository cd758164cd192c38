//! Output formatting utilities for CLI commands: tables and relative
//! timestamps for queue/retry listings.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use std::time::{Duration, SystemTime};

/// Format a timestamp as "X time ago", falling back to an absolute date
/// once it's more than a week old.
pub fn format_time(time: SystemTime) -> String {
    let now = SystemTime::now();
    match now.duration_since(time) {
        Ok(duration) => format_duration_ago(duration),
        Err(_) => "just now".to_string(),
    }
}

fn format_duration_ago(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{} second{} ago", secs, if secs == 1 { "" } else { "s" })
    } else if secs < 3600 {
        let mins = secs / 60;
        format!("{} minute{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if secs < 86400 {
        let hours = secs / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if secs < 604800 {
        let days = secs / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_absolute_time(duration)
    }
}

fn format_absolute_time(duration_ago: Duration) -> String {
    use chrono::Local;
    let now = Local::now();
    let time = now - chrono::Duration::seconds(duration_ago.as_secs() as i64);
    time.format("%Y-%m-%d %H:%M").to_string()
}

/// Print a table with cyan headers and the condensed UTF-8 preset.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)).collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}

/// Format a number with thousands separators, e.g. `1234567` -> `1,234,567`.
pub fn format_number(n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_seconds_minutes_hours_days() {
        assert_eq!(format_duration_ago(Duration::from_secs(5)), "5 seconds ago");
        assert_eq!(format_duration_ago(Duration::from_secs(1)), "1 second ago");
        assert_eq!(format_duration_ago(Duration::from_secs(120)), "2 minutes ago");
        assert_eq!(format_duration_ago(Duration::from_secs(3600)), "1 hour ago");
        assert_eq!(format_duration_ago(Duration::from_secs(86400)), "1 day ago");
    }

    #[test]
    fn formats_thousands_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
