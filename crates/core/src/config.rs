use crate::context::DEFAULT_MAX_PAGES;
use crate::error::ConfigError;
use crate::models::{CompanyReport, Indicator};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE_PATH: &str = "data/csrd_data.db";
pub const DEFAULT_EXPORT_PATH: &str = "data/csrd_results.csv";

/// Everything a batch run needs, fixed for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub max_pages: usize,
    pub database_path: PathBuf,
    pub export_path: PathBuf,
    pub reports: Vec<CompanyReport>,
    pub indicators: Vec<Indicator>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            export_path: PathBuf::from(DEFAULT_EXPORT_PATH),
            reports: default_reports(),
            indicators: default_indicators(),
        }
    }
}

impl BatchConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Applies a command-line page budget, then re-validates the whole config.
    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Result<Self, ConfigError> {
        if let Some(max_pages) = max_pages {
            self.max_pages = max_pages;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid("max_pages must be at least 1".to_string()));
        }
        if self.reports.is_empty() {
            return Err(ConfigError::Invalid("no reports configured".to_string()));
        }
        if self.indicators.is_empty() {
            return Err(ConfigError::Invalid("no indicators configured".to_string()));
        }

        let mut seen = HashSet::new();
        for indicator in &self.indicators {
            if indicator.name.trim().is_empty() {
                return Err(ConfigError::Invalid("indicator with empty name".to_string()));
            }
            if !seen.insert(indicator.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate indicator: {}",
                    indicator.name
                )));
            }
        }

        Ok(())
    }
}

fn default_reports() -> Vec<CompanyReport> {
    vec![
        CompanyReport::new("AIB", 2024, "data/reports/AIB_2024.pdf"),
        CompanyReport::new("BBVA", 2024, "data/reports/BBVA_2024.pdf"),
        CompanyReport::new("BPCE", 2024, "data/reports/BPCE_2024.pdf"),
    ]
}

fn default_indicators() -> Vec<Indicator> {
    [
        // Environmental
        ("Total Scope 1 GHG Emissions", "tCO2e", "direct emissions, gross direct"),
        ("Total Scope 2 GHG Emissions", "tCO2e", "market-based, location-based, indirect"),
        ("Total Scope 3 GHG Emissions", "tCO2e", "value chain, financed emissions, category 1-15"),
        ("GHG Emissions Intensity", "tCO2e/€M", "intensity ratio, carbon footprint per revenue"),
        ("Total Energy Consumption", "MWh", "gigajoules, electricity, gas, oil"),
        ("Renewable Energy Percentage", "%", "green electricity, renewable sources"),
        ("Net Zero Target Year", "Year", "carbon neutrality, ambition"),
        (
            "Green Financing Volume",
            "€ Millions",
            "sustainable finance, green bonds, mobilization",
        ),
        // Social
        ("Total Employees", "FTE", "headcount, workforce, full time equivalent"),
        ("Female Employees", "%", "women, gender balance, diversity"),
        ("Gender Pay Gap", "%", "equal pay, remuneration difference"),
        ("Training Hours per Employee", "Hours", "learning, development, average training"),
        ("Employee Turnover Rate", "%", "attrition, departure, new hires"),
        ("Work-Related Accidents", "Count", "injuries, frequency rate, LTIR"),
        ("Collective Bargaining Coverage", "%", "union, labor agreement, social dialogue"),
        // Governance
        ("Board Female Representation", "%", "women on board, director diversity"),
        ("Board Meetings", "Count", "attendance, number of meetings"),
        ("Corruption Incidents", "Count", "bribery, whistleblowing, ethics violations"),
        ("Avg Payment Period to Suppliers", "Days", "payment terms, invoices"),
        ("Suppliers Screened for ESG", "%", "procurement, supply chain audits, eco-vadis"),
    ]
    .into_iter()
    .map(|(name, unit, hints)| Indicator::new(name, unit, hints))
    .collect()
}
