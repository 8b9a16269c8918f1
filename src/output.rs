//! Result formatting for terminal front ends.

use crate::index::types::{Entry, EntryKind};
use chrono::{Local, LocalResult, TimeZone};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Print entries as aligned rows: name, size, mtime, path.
pub fn print_entries(entries: &[Entry], color: bool) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);

    for entry in entries {
        let mut name_spec = ColorSpec::new();
        match entry.kind {
            EntryKind::Directory => {
                name_spec.set_fg(Some(Color::Blue)).set_bold(true);
            }
            EntryKind::Symlink => {
                name_spec.set_fg(Some(Color::Cyan));
            }
            EntryKind::File => {}
        }
        stdout.set_color(&name_spec)?;
        write!(stdout, "{:<40}", entry.name)?;
        stdout.reset()?;

        let size = match entry.kind {
            EntryKind::Directory => "<DIR>".to_string(),
            _ => format_size(entry.size),
        };
        write!(stdout, " {:>10}", size)?;
        write!(stdout, " {}", format_timestamp(entry.modified))?;

        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        writeln!(stdout, " {}", entry.path)?;
        stdout.reset()?;
    }

    Ok(())
}

/// Emit entries as a JSON array.
pub fn print_entries_json(entries: &[Entry]) -> io::Result<()> {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    serde_json::to_writer_pretty(&mut lock, entries).map_err(io::Error::other)?;
    writeln!(lock)
}

/// Format byte size to human readable.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Format a unix timestamp in local time.
pub fn format_timestamp(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0) {
        LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_timestamp_valid() {
        let formatted = format_timestamp(1_700_000_000);
        assert_eq!(formatted.len(), 16); // "YYYY-MM-DD HH:MM"
        assert!(formatted.starts_with("20"));
    }
}
