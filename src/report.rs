//! Report rendering
//!
//! Turns a `CompletenessReport` into terminal output or JSON. Pure
//! formatting; all numbers come from the analysis engine.

use colored::*;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::analysis::CompletenessReport;
use crate::error::{InclineError, Result};
use crate::presence::Coverage;

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Message")]
    name: String,
    #[tabled(rename = "Count")]
    count: usize,
}

#[derive(Tabled)]
struct CoverageRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Present")]
    present: usize,
    #[tabled(rename = "Absent")]
    absent: usize,
    #[tabled(rename = "Coverage")]
    coverage: String,
}

impl CoverageRow {
    fn new(field: &'static str, cov: Coverage) -> Self {
        Self {
            field,
            present: cov.present,
            absent: cov.absent(),
            coverage: format!("{:.1}%", cov.percent()),
        }
    }
}

#[derive(Tabled)]
struct LapRow {
    #[tabled(rename = "Lap")]
    index: u64,
    #[tabled(rename = "Ascent")]
    ascent: String,
    #[tabled(rename = "Descent")]
    descent: String,
    #[tabled(rename = "Missing enhanced")]
    missing: String,
}

#[derive(Tabled)]
struct DevFieldRow {
    #[tabled(rename = "Dev idx")]
    index: u8,
    #[tabled(rename = "Field")]
    number: u8,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Count")]
    count: usize,
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn flag(present: bool) -> String {
    if present {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}

/// Render the report for a terminal.
pub fn render(report: &CompletenessReport) -> String {
    let mut out = String::new();
    let mut push = |line: String| {
        out.push_str(&line);
        out.push('\n');
    };

    push(format!(
        "{} ({} messages)",
        "FILE ANALYSIS".bold(),
        report.total_messages
    ));
    push(format!(
        "file type {}  manufacturer {}  product {}",
        opt(report.file_info.file_type),
        opt(report.file_info.manufacturer),
        opt(report.file_info.product)
    ));
    push(format!(
        "sport {}  sub-sport {} (from: {})  profile {}",
        opt(report.sport_info.sport),
        opt(report.sport_info.sub_sport),
        if report.sport_info.sub_sport_sources.is_empty() {
            "-".to_string()
        } else {
            report.sport_info.sub_sport_sources.join(", ")
        },
        opt(report.sport_info.profile_name.as_deref())
    ));
    push(String::new());

    let counts: Vec<CountRow> = report
        .message_counts
        .values()
        .map(|c| CountRow {
            name: c.name.clone(),
            count: c.count,
        })
        .collect();
    push(Table::new(counts).with(Style::sharp()).to_string());
    push(String::new());

    push(format!(
        "{} ({} records)",
        "RECORD COVERAGE".bold(),
        report.records.total
    ));
    let rows = vec![
        CoverageRow::new("position", report.records.position),
        CoverageRow::new("distance", report.records.distance),
        CoverageRow::new("altitude", report.records.altitude),
        CoverageRow::new("enhanced altitude", report.records.enhanced_altitude),
        CoverageRow::new("speed", report.records.speed),
        CoverageRow::new("enhanced speed", report.records.enhanced_speed),
        CoverageRow::new("grade", report.records.grade),
        CoverageRow::new("vertical ratio", report.records.vertical_ratio),
    ];
    push(Table::new(rows).with(Style::sharp()).to_string());
    push(String::new());

    push("SESSION".bold().to_string());
    match &report.session {
        Some(s) => {
            push(format!(
                "distance {} m  ascent {} m  descent {} m",
                opt(s.total_distance_meters),
                opt(s.total_ascent_meters),
                opt(s.total_descent_meters)
            ));
            push(format!(
                "start position {}  end position {}  bounding box {}",
                flag(s.start_position),
                flag(s.end_position),
                flag(s.bounding_box)
            ));
            push(format!(
                "enhanced speed {}/{}  enhanced altitude {}/{}  fractional ascent {}",
                flag(s.enhanced_avg_speed),
                flag(s.enhanced_max_speed),
                flag(s.enhanced_min_altitude),
                flag(s.enhanced_max_altitude),
                flag(s.fractional_ascent)
            ));
        }
        None => push("no session message".yellow().to_string()),
    }
    push(String::new());

    if report.laps.count > 0 {
        push(format!(
            "{} ({} laps, ascent sum {} m, descent sum {} m)",
            "LAPS".bold(),
            report.laps.count,
            report.laps.sum_ascent,
            report.laps.sum_descent
        ));
        let rows: Vec<LapRow> = report
            .laps
            .laps
            .iter()
            .map(|l| LapRow {
                index: l.index,
                ascent: opt(l.total_ascent),
                descent: opt(l.total_descent),
                missing: {
                    let missing = l.missing_enhanced();
                    if missing.is_empty() {
                        "-".to_string()
                    } else {
                        missing.join(", ")
                    }
                },
            })
            .collect();
        push(Table::new(rows).with(Style::sharp()).to_string());
        push(String::new());
    }

    if !report.event_kinds.is_empty() {
        push(format!("events: {}", report.event_kinds.join(", ")));
    }

    if report.developer_fields.total_instances > 0 {
        push(format!(
            "{} ({} instances)",
            "DEVELOPER FIELDS".bold(),
            report.developer_fields.total_instances
        ));
        let rows: Vec<DevFieldRow> = report
            .developer_fields
            .distinct
            .iter()
            .map(|d| DevFieldRow {
                index: d.developer_data_index,
                number: d.field_number,
                name: d.name.clone(),
                count: d.count,
            })
            .collect();
        push(Table::new(rows).with(Style::sharp()).to_string());
        push(String::new());
    }

    if !report.record_dumps.is_empty() {
        push("FIRST RECORDS".bold().to_string());
        for dump in &report.record_dumps {
            let fields: Vec<String> = dump
                .fields
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect();
            push(format!(
                "#{} {}  {}",
                dump.index,
                opt(dump.timestamp.as_deref()),
                fields.join(" ")
            ));
        }
        push(String::new());
    }

    let verdict = if report.gap_ready {
        "READY for grade-adjusted pace".green().bold()
    } else {
        "NOT ready for grade-adjusted pace".red().bold()
    };
    push(verdict.to_string());

    out
}

/// Render the report as pretty JSON.
pub fn render_json(report: &CompletenessReport) -> Result<String> {
    serde_json::to_string_pretty(report)
        .map_err(|e| InclineError::Internal(format!("report serialization failed: {}", e)))
}
