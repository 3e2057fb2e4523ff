pub mod json;
pub mod table;

use chrono::{DateTime, Utc};

use crate::charts::ChartReport;
use crate::scan::ScanResult;

/// How a chart is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartFormat {
    Table,
    Json,
    List,
}

pub fn print_chart(report: &ChartReport, format: ChartFormat) {
    match format {
        ChartFormat::Table => print!("{}", table::render_chart(report)),
        ChartFormat::Json => println!("{}", json::render_chart(report)),
        ChartFormat::List => print!("{}", render_list(report)),
    }
}

pub fn print_scan(result: &ScanResult, json_output: bool) {
    if json_output {
        println!("{}", json::render_scan(result));
    } else {
        print!("{}", table::render_scan(result));
        print_diagnostics(result);
    }
}

/// Application ids in chart order, one per line.
pub fn render_list(report: &ChartReport) -> String {
    let mut output = String::new();
    for row in &report.entries {
        output.push_str(&row.app_id.to_string());
        output.push('\n');
    }
    output
}

fn print_diagnostics(result: &ScanResult) {
    if result.diagnostics.is_empty() {
        return;
    }

    println!();
    for diagnostic in &result.diagnostics {
        println!("[diagnostic] {diagnostic}");
    }
}

pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub(crate) fn display(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::ChartRow;
    use crate::model::ChartType;
    use chrono::TimeZone;

    #[test]
    fn list_prints_ids_in_order() {
        let report = ChartReport {
            chart_type: ChartType::Free,
            genre: 36,
            genre_name: None,
            store: "us".into(),
            timestamp: Utc.with_ymd_and_hms(2020, 5, 1, 10, 0, 0).unwrap(),
            entries: vec![
                ChartRow { position: 1, app_id: 497799835, bundle_id: None, name: None },
                ChartRow { position: 3, app_id: 409183694, bundle_id: None, name: None },
            ],
        };
        assert_eq!(render_list(&report), "497799835\n409183694\n");
    }
}
