//! Plain-text rendering for the terminal.
//!
//! Charts print a short header (store, genre, type, snapshot time) followed
//! by one row per entry in chart order. Missing bundle ids and names are
//! shown as '-'.

use std::collections::{BTreeMap, HashSet};

use crate::charts::ChartReport;
use crate::model::{Genre, ScanRun};
use crate::scan::ScanResult;

use super::{display, format_timestamp};

const BUNDLE_WIDTH: usize = 50;

pub fn render_chart(report: &ChartReport) -> String {
    let mut output = String::new();

    let genre = match &report.genre_name {
        Some(name) => format!("{name} [{}]", report.genre),
        None => report.genre.to_string(),
    };
    output.push_str(&format!("Store: {}\n", report.store));
    output.push_str(&format!("Genre: {genre}\n"));
    output.push_str(&format!("Type:  {}\n", report.chart_type.label()));
    output.push_str(&format!("State: {}\n\n", format_timestamp(&report.timestamp)));

    if report.entries.is_empty() {
        output.push_str("No entries.\n");
        return output;
    }

    output.push_str(&format!("{:>3} {:<11} {:<50} {}\n", "Pos", "ID", "Bundle ID", "Name"));
    output.push_str(&"-".repeat(80));
    output.push('\n');

    for row in &report.entries {
        output.push_str(&format!(
            "{:>3} {:<11} {:<50} {}\n",
            row.position,
            row.app_id,
            truncate(display(row.bundle_id.as_deref()), BUNDLE_WIDTH),
            display(row.name.as_deref())
        ));
    }

    output
}

pub fn render_scan(result: &ScanResult) -> String {
    let counts = &result.counts;
    let mut output = String::new();

    output.push_str(&format!("cache: {}\n", result.cache_file));
    if let Some(run) = result.scan_run {
        output.push_str(&format!("scan run: #{run}\n"));
    }
    output.push_str(&format!(
        "resources: {} ({} skipped)\n",
        counts.resources, counts.skipped
    ));
    output.push_str(&format!("  {:24} {:>6}\n", "new applications", counts.applications_added));
    output.push_str(&format!("  {:24} {:>6}\n", "new observations", counts.observations_added));
    output.push_str(&format!("  {:24} {:>6}\n", "new genres", counts.genres_added));
    output.push_str(&format!("  {:24} {:>6}\n", "new charts", counts.charts_added));

    if let Some(ms) = result.duration_ms {
        output.push_str(&format!("scan duration: {:.2}s\n", ms as f64 / 1000.0));
    }

    output
}

/// Genres as a tree: top-level genres first, children indented below
/// their parent. Genres whose parent is unknown are shown at the top level.
pub fn render_genres(genres: &[Genre]) -> String {
    if genres.is_empty() {
        return String::from("No genres found. Run 'mas-cache scan' to collect some.\n");
    }

    let known: HashSet<u32> = genres.iter().map(|g| g.itunes_id).collect();
    let mut children: BTreeMap<u32, Vec<&Genre>> = BTreeMap::new();
    let mut roots = Vec::new();
    for genre in genres {
        match genre.parent {
            Some(parent) if known.contains(&parent) && parent != genre.itunes_id => {
                children.entry(parent).or_default().push(genre)
            }
            _ => roots.push(genre),
        }
    }

    let mut output = String::new();
    let mut seen = HashSet::new();
    // genres caught in a parent cycle have no root; they start a tree of their own
    for start in roots.into_iter().chain(genres) {
        let mut stack = vec![(start, 0)];
        while let Some((genre, depth)) = stack.pop() {
            if !seen.insert(genre.itunes_id) {
                continue;
            }
            output.push_str(&format!(
                "{}{:<8} {}\n",
                "  ".repeat(depth),
                genre.itunes_id,
                display(genre.name.as_deref())
            ));
            if let Some(kids) = children.get(&genre.itunes_id) {
                stack.extend(kids.iter().rev().map(|g| (*g, depth + 1)));
            }
        }
    }

    output
}

pub fn render_runs(runs: &[ScanRun]) -> String {
    if runs.is_empty() {
        return String::from("No scan runs found. Run 'mas-cache scan' to create one.\n");
    }

    let mut output = String::from("Scan runs:\n");
    output.push_str(&format!(
        "{:<6} {:<20} {:>9} {:>8} {:>6} {:>7}  {}\n",
        "ID", "Date", "Resources", "Apps", "Charts", "Genres", "Status"
    ));
    output.push_str(&"-".repeat(72));
    output.push('\n');

    for run in runs {
        let date = run.started_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let status = if run.finished_at.is_some() { "done" } else { "incomplete" };
        output.push_str(&format!(
            "{:<6} {:<20} {:>9} {:>8} {:>6} {:>7}  {}\n",
            run.id,
            date,
            run.counts.resources,
            run.counts.applications_added,
            run.counts.charts_added,
            run.counts.genres_added,
            status
        ));
    }

    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::ChartRow;
    use crate::model::{ChartType, ScanCounts};
    use chrono::{TimeZone, Utc};

    fn report() -> ChartReport {
        ChartReport {
            chart_type: ChartType::Free,
            genre: 36,
            genre_name: Some("App Store".into()),
            store: "us".into(),
            timestamp: Utc.with_ymd_and_hms(2020, 5, 1, 10, 0, 0).unwrap(),
            entries: vec![
                ChartRow {
                    position: 1,
                    app_id: 497799835,
                    bundle_id: Some("com.apple.dt.Xcode".into()),
                    name: Some("Xcode".into()),
                },
                ChartRow { position: 2, app_id: 1, bundle_id: None, name: None },
            ],
        }
    }

    #[test]
    fn chart_table_lists_rows_in_order() {
        let text = render_chart(&report());
        assert!(text.contains("Store: us\n"));
        assert!(text.contains("Genre: App Store [36]\n"));
        assert!(text.contains("Type:  Top Free Apps\n"));
        assert!(text.contains("State: 2020-05-01 10:00:00 UTC\n"));

        let rows: Vec<&str> = text.lines().skip_while(|l| !l.starts_with("---")).skip(1).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with(&format!("  1 {:<11} com.apple.dt.Xcode", 497799835)));
        assert!(rows[0].ends_with(" Xcode"));
        assert!(rows[1].starts_with(&format!("  2 {:<11} -", 1)));
        assert!(rows[1].ends_with(" -"));
    }

    #[test]
    fn empty_chart_says_so() {
        let mut empty = report();
        empty.entries.clear();
        assert!(render_chart(&empty).ends_with("No entries.\n"));
    }

    #[test]
    fn genres_nest_under_parent() {
        let genres = vec![
            Genre { itunes_id: 36, name: Some("App Store".into()), parent: None },
            Genre { itunes_id: 6026, name: Some("Developer Tools".into()), parent: Some(36) },
            Genre { itunes_id: 6000, name: Some("Business".into()), parent: Some(36) },
            Genre { itunes_id: 7000, name: None, parent: Some(99) },
        ];
        let text = render_genres(&genres);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("36 "));
        assert!(lines[1].starts_with("  6026"));
        assert!(lines[2].starts_with("  6000"));
        assert!(lines[3].starts_with("7000"));
        assert!(lines[3].ends_with(" -"));
    }

    #[test]
    fn genres_in_a_parent_cycle_are_listed() {
        let genres = vec![
            Genre { itunes_id: 36, name: Some("App Store".into()), parent: None },
            Genre { itunes_id: 100, name: Some("Loop A".into()), parent: Some(200) },
            Genre { itunes_id: 200, name: Some("Loop B".into()), parent: Some(100) },
        ];
        let text = render_genres(&genres);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("36 "));
        assert!(lines[1].starts_with("100 "));
        assert!(lines[2].starts_with("  200 "));
    }

    #[test]
    fn runs_show_incomplete_status() {
        let runs = vec![ScanRun {
            id: 7,
            started_at: Utc.with_ymd_and_hms(2020, 5, 1, 10, 0, 0).unwrap(),
            finished_at: None,
            cache_file: "/tmp/Cache.db".into(),
            counts: ScanCounts { resources: 12, ..ScanCounts::default() },
        }];
        let text = render_runs(&runs);
        let last = text.lines().last().unwrap();
        assert!(last.starts_with(&format!("{:<6} 2020-05-01 10:00:00", 7)));
        assert!(last.ends_with("incomplete"));
    }

    #[test]
    fn truncate_long_bundle_ids() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("com.example.very.long", 10), "com.ex...");
    }
}
