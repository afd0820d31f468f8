//! Shared CLI output helpers and argument validators for pangenomer binaries.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use colored::Colorize;

pub fn banner(subtitle: &str) {
    eprintln!();
    eprintln!("{} {}", "Pangenomer".bold().cyan(), subtitle.dimmed());
    eprintln!();
}

pub fn section(title: &str) {
    let bar = "─".repeat(50);
    eprintln!("{} {}", title.bold().blue(), bar.dimmed());
}

pub fn kv(key: &str, value: &str) {
    eprintln!("  {:<20} {}", key.dimmed(), value);
}

pub fn success(msg: &str) {
    eprintln!("  {} {}", "✓".green().bold(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("  {} {}", "⚠".yellow(), msg.yellow());
}

/// Echoes the command line of an external tool before it runs.
pub fn command(line: &str) {
    eprintln!("  {} {}", "$".bold(), line.dimmed());
}

/// Forwards one line of captured external tool output.
pub fn tool_output(line: &str) {
    eprintln!("    {}", line.dimmed());
}

pub fn print_summary(start: Instant) {
    eprintln!();
    eprintln!(
        "{}  {}",
        "Time".dimmed(),
        run_time(start.elapsed()).bold()
    );
    eprintln!();
}

/// Wall-clock run time, e.g. `01:02:03.4`.
fn run_time(elapsed: Duration) -> String {
    let tenths = elapsed.as_millis() / 100;
    let secs = tenths / 10;
    format!(
        "{:02}:{:02}:{:02}.{}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60,
        tenths % 10
    )
}

/// Clap value parser accepting only an existing, non-empty regular file.
pub fn nonempty_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(path),
        Ok(meta) if meta.is_file() => Err(format!("{s} must not be empty")),
        Ok(_) => Err(format!("{s} is not a regular file")),
        Err(_) => Err(format!("{s} does not exist")),
    }
}

/// Clap value parser accepting only an existing directory.
pub fn existing_dir(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("{s} must be an existing directory"))
    }
}
