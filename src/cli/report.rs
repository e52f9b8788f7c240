//! Human-readable output for CLI commands.

use std::time::Duration;

use crate::InstallReport;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Formats a byte count using binary units.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.2} {unit}")
}

/// Formats a short duration as milliseconds or seconds.
#[must_use]
pub fn format_elapsed(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

/// Prints the outcome of `install`.
pub fn print_install(report: &InstallReport, deleted: &[String]) {
    println!("{SEPARATOR}");
    println!("Installed cache {}", report.version);
    println!("{SEPARATOR}");
    println!("  Entries:        {}", report.entries);
    println!("  Total size:     {}", format_bytes(report.bytes));
    println!("  Time:           {}", format_elapsed(report.elapsed));
    if deleted.is_empty() {
        println!("  Stale caches:   none");
    } else {
        println!("  Deleted:        {}", deleted.join(", "));
    }
    println!("{SEPARATOR}");
}

/// Prints the cache registry, marking the current version.
pub fn print_caches(current: &str, caches: &[(String, usize)]) {
    if caches.is_empty() {
        println!("No cache stores.");
        return;
    }
    for (name, entries) in caches {
        let marker = if name == current { "*" } else { " " };
        println!("{marker} {name} ({entries} entries)");
    }
}
