//! Transfer summary rendering

use gbn::TransferReport;
use std::fmt::Write;
use std::time::Duration;

/// Scale `value` to the largest unit it reaches
///
/// `units` lists the base unit first; each further unit is `step` times the
/// previous one.
fn scaled(value: u64, step: u64, units: &[&str]) -> String {
    let mut divisor = 1u64;
    let mut index = 0;
    while index + 1 < units.len() && value / divisor >= step {
        divisor *= step;
        index += 1;
    }
    if index == 0 {
        format!("{value} {}", units[0])
    } else {
        format!("{:.2} {}", value as f64 / divisor as f64, units[index])
    }
}

/// Byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    scaled(bytes, 1024, &["B", "KB", "MB", "GB"])
}

/// Bit rate with decimal units
pub fn format_bandwidth(bps: u64) -> String {
    scaled(bps, 1000, &["bps", "Kbps", "Mbps", "Gbps"])
}

/// Format duration in human-readable form
///
/// Transfers on a local link finish in well under a second, so short
/// durations keep millisecond precision.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else if secs > 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Wire throughput of a transfer, in bits per second
fn throughput_bps(report: &TransferReport) -> u64 {
    let secs = report.elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    ((report.bytes_sent * 8) as f64 / secs) as u64
}

/// Render a finished transfer as a small table
pub fn format_report(report: &TransferReport) -> String {
    let final_ack = report
        .final_ack
        .map_or_else(|| "-".to_string(), |ack| ack.to_string());

    let mut out = String::new();
    let _ = writeln!(out, "┌──────────────────────────────────────────┐");
    let _ = writeln!(out, "│ TRANSFER COMPLETE                        │");
    let _ = writeln!(out, "├──────────────────────────────────────────┤");
    let _ = writeln!(out, "│ Destination: {:<27} │", report.destination.to_string());
    let _ = writeln!(out, "│ Chunks:      {:<27} │", report.chunks);
    let _ = writeln!(
        out,
        "│ Frames sent: {:<27} │",
        format!("{} ({:.2} per chunk)", report.frames_sent, report.overhead())
    );
    let _ = writeln!(out, "│ Sweeps:      {:<27} │", report.retransmit_sweeps);
    let _ = writeln!(out, "│ Final ack:   {:<27} │", final_ack);
    let _ = writeln!(out, "│ Bytes:       {:<27} │", format_bytes(report.bytes_sent));
    let _ = writeln!(out, "│ Elapsed:     {:<27} │", format_duration(report.elapsed));
    let _ = writeln!(
        out,
        "│ Rate:        {:<27} │",
        format_bandwidth(throughput_bps(report))
    );
    let _ = write!(out, "└──────────────────────────────────────────┘");
    out
}

/// Print a finished transfer to stdout
pub fn display_report(report: &TransferReport) {
    println!("{}", format_report(report));
}
