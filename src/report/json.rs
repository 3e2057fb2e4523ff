//! Compact JSON output for scripting and piping.

use serde::Serialize;

use crate::charts::ChartReport;
use crate::metadata::MetadataReport;
use crate::scan::ScanResult;

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

pub fn render_chart(report: &ChartReport) -> String {
    render(report)
}

pub fn render_metadata(report: &MetadataReport) -> String {
    render(report)
}

pub fn render_scan(result: &ScanResult) -> String {
    render(result)
}
