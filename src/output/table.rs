use std::borrow::Cow;
use std::collections::HashSet;

use comfy_table::{Table, presets::ASCII_BORDERS_ONLY_CONDENSED};

use super::Report;

/// Maximum width for list-valued columns
const MAX_LIST_COLUMN_WIDTH: usize = 80;

/// Columns that should have width limits in table mode
const WIDE_COLUMNS: &[&str] = &["IMAGES", "SOURCES"];

/// Truncate a string to max_len chars, adding "..." if truncated
fn truncate_value(s: &str, max_len: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_len {
        Cow::Borrowed(s)
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        Cow::Owned(format!("{}...", truncated))
    }
}

pub struct TableFormatter;

impl TableFormatter {
    pub fn format(report: &Report, no_headers: bool) -> String {
        if report.rows.is_empty() {
            return "(0 rows)".to_string();
        }

        let mut table = Table::new();
        table.load_preset(ASCII_BORDERS_ONLY_CONDENSED);

        let truncate_cols: HashSet<usize> = report
            .columns
            .iter()
            .enumerate()
            .filter(|(_, col)| WIDE_COLUMNS.contains(&col.as_str()))
            .map(|(idx, _)| idx)
            .collect();

        if !no_headers {
            table.set_header(&report.columns);
        }

        for row in &report.rows {
            let cells: Vec<Cow<'_, str>> = row
                .iter()
                .enumerate()
                .map(|(idx, val)| {
                    if truncate_cols.contains(&idx) {
                        truncate_value(val, MAX_LIST_COLUMN_WIDTH)
                    } else {
                        Cow::Borrowed(val.as_str())
                    }
                })
                .collect();
            table.add_row(cells);
        }

        format!("{}\n({} rows)", table, report.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn report(columns: &[&str], row: Vec<String>) -> Report {
        Report {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![row],
            document: Value::Null,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_truncate_value_short() {
        let result = truncate_value("hello", 10);
        assert_eq!(result, "hello");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_truncate_value_too_long() {
        let result = truncate_value("this is a very long string that needs truncation", 20);
        assert!(result.ends_with("..."));
        assert_eq!(result.chars().count(), 20);
        assert!(matches!(result, Cow::Owned(_)));
    }

    #[test]
    fn test_truncate_value_unicode() {
        let result = truncate_value("日本語テストです長い文字列", 8);
        assert!(result.chars().count() <= 8);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncates_images_column() {
        let r = report(&["NAME", "IMAGES"], vec!["web".to_string(), "a".repeat(100)]);
        let output = TableFormatter::format(&r, false);
        assert!(!output.contains(&"a".repeat(100)));
        assert!(output.contains("..."));
        assert!(output.ends_with("(1 rows)"));
    }

    #[test]
    fn test_keeps_name_column() {
        let r = report(&["NAME", "IMAGES"], vec!["n".repeat(100), String::new()]);
        let output = TableFormatter::format(&r, false);
        assert!(output.contains(&"n".repeat(100)));
    }

    #[test]
    fn test_no_headers_and_empty() {
        let r = report(&["NAME"], vec!["web".to_string()]);
        assert!(!TableFormatter::format(&r, true).contains("NAME"));

        let empty = Report {
            rows: Vec::new(),
            ..r
        };
        assert_eq!(TableFormatter::format(&empty, false), "(0 rows)");
    }
}
