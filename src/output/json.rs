use super::Report;

pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format(report: &Report) -> String {
        serde_json::to_string_pretty(&report.document).unwrap_or_else(|_| "[]".to_string())
    }
}
