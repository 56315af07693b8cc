use crate::core::{BagSummary, FilterPlan, FilterReport};
use chrono::{DateTime, Utc};
use std::fmt::Write;

pub fn format_timestamp(ns: i64) -> String {
    let secs = ns.div_euclid(1_000_000_000);
    let nanos = ns.rem_euclid(1_000_000_000) as u32;
    match DateTime::<Utc>::from_timestamp(secs, nanos) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => format!("{} ns", ns),
    }
}

pub fn format_duration(ns: i64) -> String {
    format!("{:.3}s", ns as f64 / 1e9)
}

pub fn render_bag_summary(summary: &BagSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📦 Bag: {}", summary.bag_path.display());
    let _ = writeln!(out, "  Storage: {}", summary.storage_identifier);
    for file in &summary.storage_files {
        let _ = writeln!(out, "  File: {}", file.display());
    }
    match (summary.start_ns, summary.end_ns) {
        (Some(start), Some(end)) => {
            let _ = writeln!(out, "  Start: {}", format_timestamp(start));
            let _ = writeln!(out, "  End: {}", format_timestamp(end));
            let _ = writeln!(out, "  Duration: {}", format_duration(summary.duration_ns()));
        }
        _ => {
            let _ = writeln!(out, "  (no messages)");
        }
    }
    let _ = writeln!(out, "  Messages: {}", summary.message_count);
    let _ = writeln!(out, "  Topics:");
    for topic in &summary.topics {
        let _ = writeln!(out, "    {}", topic.display_text());
    }
    out
}

pub fn render_plan(plan: &FilterPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🔍 Filter plan:");
    let _ = writeln!(out, "  Topics:");
    for topic in &plan.topics {
        let _ = writeln!(out, "    {}", topic.display_text());
    }
    match &plan.range {
        Some(range) => {
            let _ = writeln!(out, "  From: {}", format_timestamp(range.start_ns));
            let _ = writeln!(
                out,
                "  To: {}",
                range
                    .end_ns
                    .map(format_timestamp)
                    .unwrap_or_else(|| "end of bag".to_string())
            );
        }
        None => {
            let _ = writeln!(out, "  Input bag has no messages; only topics will be created");
        }
    }
    let selected: u64 = plan.topics.iter().map(|t| t.message_count).sum();
    let _ = writeln!(
        out,
        "  Up to {} of {} messages before time filtering",
        selected, plan.input_message_count
    );
    out
}

pub fn render_report(report: &FilterReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "✅ Bag processed successfully!");
    let _ = writeln!(out, "📁 Output saved to: {}", report.output_path.display());
    let _ = writeln!(
        out,
        "  Messages written: {} of {} on the selected topics",
        report.messages_written, report.messages_read
    );
    for topic in &report.topics {
        let _ = writeln!(
            out,
            "    {} ({}) [{} messages]",
            topic.name, topic.type_name, topic.message_count
        );
    }
    if let (Some(start), Some(end)) = (report.start_ns, report.end_ns) {
        let _ = writeln!(
            out,
            "  Span: {} .. {} ({})",
            format_timestamp(start),
            format_timestamp(end),
            format_duration(end - start)
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(1_746_525_600_123_000_000),
            "2025-05-06 10:00:00.123 UTC"
        );
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00.000 UTC");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(1_500_000_000), "1.500s");
    }
}
