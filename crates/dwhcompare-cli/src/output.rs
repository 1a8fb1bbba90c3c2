//! Report rendering: console summary, markdown and CSV

use colored::Colorize;
use dwhcompare_core::{Report, Severity, Window, WindowStatus};
use std::io;

/// Print report summary to stdout
pub fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Data Warehouse Comparison Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!("As of: {}", report.as_of.to_rfc3339());
    println!(
        "Left:  {} ({}) - {} tables, {} columns",
        report.left.name, report.left.engine, report.left.tables, report.left.columns
    );
    println!(
        "Right: {} ({}) - {} tables, {} columns",
        report.right.name, report.right.engine, report.right.tables, report.right.columns
    );
    println!();

    let summary = &report.summary;
    println!("{}", "Summary:".bold());
    println!("  Tables compared:       {}", summary.tables_compared);
    println!("  Tables only in left:   {}", count(summary.tables_only_in_left));
    println!("  Tables only in right:  {}", count(summary.tables_only_in_right));
    println!("  Columns only in left:  {}", count(summary.columns_only_in_left));
    println!("  Columns only in right: {}", count(summary.columns_only_in_right));
    println!("  Type mismatches:       {}", count(summary.type_mismatches));
    println!(
        "  Windows:               {} matched, {} mismatched, {} skipped",
        summary.windows_matched.to_string().green(),
        count(summary.windows_mismatched),
        summary.windows_skipped
    );
    println!();

    let findings = report.findings();
    if !report.has_discrepancies() {
        println!("{}", "✓ No discrepancies found!".green().bold());
    } else {
        println!("{}", "Discrepancies:".bold());
        for finding in findings.iter().filter(|f| f.severity != Severity::Info) {
            let severity = match finding.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            match finding.window {
                Some(window) => println!(
                    "  [{}] {} {} ({}): {}",
                    severity, finding.code, finding.join_key, window, finding.message
                ),
                None => println!("  [{}] {} {}: {}", severity, finding.code, finding.join_key, finding.message),
            }
        }
    }

    let skipped = findings.iter().filter(|f| f.severity == Severity::Info).count();
    if skipped > 0 {
        println!();
        println!("{} {} windows skipped (see report for reasons)", "ℹ".cyan(), skipped);
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

fn count(n: usize) -> colored::ColoredString {
    if n > 0 {
        n.to_string().red().bold()
    } else {
        n.to_string().green()
    }
}

/// Generate markdown report
pub fn generate_markdown_report(report: &Report) -> String {
    let mut md = String::new();

    md.push_str("# Data Warehouse Comparison Report\n\n");
    md.push_str(&format!("**Version:** {}\n\n", report.version));
    md.push_str(&format!("**Timestamp:** {}\n\n", report.timestamp));
    md.push_str(&format!("**As of:** {}\n\n", report.as_of.to_rfc3339()));
    md.push_str(&format!(
        "**Sources:** `{}` ({}) vs `{}` ({})\n\n",
        report.left.name, report.left.engine, report.right.name, report.right.engine
    ));

    let summary = &report.summary;
    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Tables compared: {}\n", summary.tables_compared));
    md.push_str(&format!("- Tables only in left: {}\n", summary.tables_only_in_left));
    md.push_str(&format!("- Tables only in right: {}\n", summary.tables_only_in_right));
    md.push_str(&format!("- Columns only in left: {}\n", summary.columns_only_in_left));
    md.push_str(&format!("- Columns only in right: {}\n", summary.columns_only_in_right));
    md.push_str(&format!("- Type mismatches: {}\n", summary.type_mismatches));
    md.push_str(&format!(
        "- Windows: {} matched, {} mismatched, {} skipped\n",
        summary.windows_matched, summary.windows_mismatched, summary.windows_skipped
    ));
    md.push('\n');

    if !report.has_discrepancies() {
        md.push_str("✅ **No discrepancies found!**\n");
        return md;
    }

    md.push_str("## Tables\n\n");
    md.push_str("| Join key | Left | Right |");
    for window in Window::ALL {
        md.push_str(&format!(" {} |", window));
    }
    md.push('\n');
    md.push_str("|---|---|---|");
    for _ in Window::ALL {
        md.push_str("---|");
    }
    md.push('\n');

    for row in report.rows.iter().filter(|r| r.has_discrepancy()) {
        md.push_str(&format!(
            "| `{}` | {} | {} |",
            row.join_key,
            row.left_table.as_deref().unwrap_or("-"),
            row.right_table.as_deref().unwrap_or("-")
        ));
        for window in Window::ALL {
            md.push_str(&format!(" {} |", window_cell(row.window(window))));
        }
        md.push('\n');
    }
    md.push('\n');

    md.push_str("## Findings\n\n");
    for finding in report.findings() {
        let emoji = match finding.severity {
            Severity::Error => "❌",
            Severity::Warn => "⚠️",
            Severity::Info => "ℹ️",
        };
        let scope = match finding.window {
            Some(window) => format!("`{}` ({})", finding.join_key, window),
            None => format!("`{}`", finding.join_key),
        };
        md.push_str(&format!("- {} **{}** {}: {}\n", emoji, finding.code, scope, finding.message));
    }

    md
}

fn window_cell(status: Option<&WindowStatus>) -> String {
    match status {
        None => String::new(),
        Some(WindowStatus::Match { .. }) => "✓".to_string(),
        Some(WindowStatus::Skipped { .. }) => "skipped".to_string(),
        Some(WindowStatus::Mismatch {
            row_count_delta,
            differing_columns,
            ..
        }) => {
            let mut cell = format!("Δrows {}", row_count_delta);
            if !differing_columns.is_empty() {
                cell.push_str(&format!(", {}", differing_columns.join(", ")));
            }
            cell
        }
    }
}

/// CSV header: one status, row-count delta and column list per window
pub fn csv_header() -> Vec<String> {
    let mut header: Vec<String> = [
        "join_key",
        "left_table",
        "right_table",
        "columns_only_in_left",
        "columns_only_in_right",
        "type_mismatches",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for window in Window::ALL {
        header.push(format!("{}_status", window));
        header.push(format!("{}_row_count_delta", window));
        header.push(format!("{}_differing_columns", window));
    }
    header
}

/// Write one CSV record per join key
pub fn write_csv<W: io::Write>(report: &Report, writer: W) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(csv_header())?;

    for row in &report.rows {
        let mut record = vec![
            row.join_key.clone(),
            row.left_table.clone().unwrap_or_default(),
            row.right_table.clone().unwrap_or_default(),
            row.columns_only_in_left.join(";"),
            row.columns_only_in_right.join(";"),
            row.type_mismatches
                .iter()
                .map(|m| format!("{}:{}->{}", m.column, m.left_type, m.right_type))
                .collect::<Vec<_>>()
                .join(";"),
        ];

        for window in Window::ALL {
            let (status, delta, columns) = match row.window(window) {
                None => (String::new(), String::new(), String::new()),
                Some(WindowStatus::Match { .. }) => ("match".to_string(), "0".to_string(), String::new()),
                Some(WindowStatus::Skipped { .. }) => ("skipped".to_string(), String::new(), String::new()),
                Some(WindowStatus::Mismatch {
                    row_count_delta,
                    differing_columns,
                    ..
                }) => (
                    "mismatch".to_string(),
                    row_count_delta.to_string(),
                    differing_columns.join(";"),
                ),
            };
            record.extend([status, delta, columns]);
        }

        out.write_record(&record)?;
    }

    out.flush()?;
    Ok(())
}
