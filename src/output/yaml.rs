use super::Report;

pub struct YamlFormatter;

impl YamlFormatter {
    pub fn format(report: &Report) -> String {
        serde_yaml::to_string(&report.document).unwrap_or_else(|_| "[]".to_string())
    }
}
