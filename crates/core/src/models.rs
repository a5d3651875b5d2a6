use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Confidence reported when the value was found for the exact year and unit.
pub const CONFIDENCE_CERTAIN: f64 = 1.0;
/// Confidence reported when the value was found but is ambiguous.
pub const CONFIDENCE_AMBIGUOUS: f64 = 0.5;
/// Confidence reported when nothing was found, and for every fallback record.
pub const CONFIDENCE_NOT_FOUND: f64 = 0.0;

/// A named ESG metric to extract, with its expected unit and comma-separated search hints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Indicator {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub hints: String,
}

impl Indicator {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, hints: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            hints: hints.into(),
        }
    }

    pub fn hint_phrases(&self) -> Vec<String> {
        self.hints
            .split(',')
            .map(|phrase| phrase.trim().to_string())
            .filter(|phrase| !phrase.is_empty())
            .collect()
    }
}

/// One company's report for one year, located by file path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanyReport {
    pub name: String,
    pub year: i32,
    pub file: PathBuf,
}

impl CompanyReport {
    pub fn new(name: impl Into<String>, year: i32, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            year,
            file: file.into(),
        }
    }
}

/// The extracted value keeps the JSON type the model answered with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ExtractedValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ExtractedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Canonical extraction result. One live record per (company, year, indicator_name).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionRecord {
    pub company: String,
    pub year: i32,
    pub indicator_name: String,
    pub value: Option<ExtractedValue>,
    pub unit: String,
    pub confidence: f64,
    pub source_page: u32,
    pub notes: String,
}

impl ExtractionRecord {
    /// Placeholder handed downstream when the extraction call failed in any way.
    pub fn fallback(
        report: &CompanyReport,
        indicator: &Indicator,
        description: impl fmt::Display,
    ) -> Self {
        Self {
            company: report.name.clone(),
            year: report.year,
            indicator_name: indicator.name.clone(),
            value: None,
            unit: indicator.unit.clone(),
            confidence: CONFIDENCE_NOT_FOUND,
            source_page: 0,
            notes: format!("Error: {description}"),
        }
    }

    pub fn key(&self) -> (&str, i32, &str) {
        (&self.company, self.year, &self.indicator_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_phrases_are_trimmed_and_skip_empty_entries() {
        let indicator = Indicator::new(
            "Total Scope 1 GHG Emissions",
            "tCO2e",
            "direct emissions, , gross direct ",
        );
        assert_eq!(indicator.hint_phrases(), vec!["direct emissions", "gross direct"]);
    }

    #[test]
    fn extracted_value_accepts_numbers_and_strings() {
        let number: ExtractedValue = serde_json::from_str("500").unwrap();
        let text: ExtractedValue = serde_json::from_str("\"1,250 tCO2e\"").unwrap();

        assert_eq!(number, ExtractedValue::Number(500.0));
        assert_eq!(number.to_string(), "500");
        assert_eq!(text, ExtractedValue::Text("1,250 tCO2e".to_string()));
    }

    #[test]
    fn fallback_record_has_no_value_and_zero_confidence() {
        let report = CompanyReport::new("AIB", 2024, "data/reports/AIB_2024.pdf");
        let indicator = Indicator::new("Total Employees", "FTE", "headcount");

        let record = ExtractionRecord::fallback(&report, &indicator, "timeout");

        assert_eq!(record.value, None);
        assert_eq!(record.unit, "FTE");
        assert_eq!(record.confidence, CONFIDENCE_NOT_FOUND);
        assert_eq!(record.source_page, 0);
        assert_eq!(record.notes, "Error: timeout");
        assert_eq!(record.key(), ("AIB", 2024, "Total Employees"));
    }
}
