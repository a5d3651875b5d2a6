use crate::error::LlmError;
use crate::llm::ExtractionClient;
use crate::models::{CompanyReport, ExtractedValue, ExtractionRecord, Indicator};
use crate::prompt::{response_schema, user_prompt, SYSTEM_PROMPT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

const REQUIRED_FIELDS: [&str; 5] = ["value", "unit", "source_page", "notes", "confidence"];

#[derive(Debug, Deserialize)]
struct ModelAnswer {
    value: Option<ExtractedValue>,
    unit: String,
    source_page: u32,
    notes: String,
    confidence: f64,
}

/// What the extractor produced for one indicator. Both variants carry a complete record.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Extracted(ExtractionRecord),
    Fallback {
        record: ExtractionRecord,
        reason: String,
    },
}

impl Extraction {
    pub fn record(&self) -> &ExtractionRecord {
        match self {
            Self::Extracted(record) | Self::Fallback { record, .. } => record,
        }
    }

    pub fn into_record(self) -> ExtractionRecord {
        match self {
            Self::Extracted(record) | Self::Fallback { record, .. } => record,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

pub struct IndicatorExtractor<C> {
    client: C,
    schema: Value,
}

impl<C> IndicatorExtractor<C>
where
    C: ExtractionClient + Send + Sync,
{
    pub fn new(client: C) -> Self {
        Self {
            client,
            schema: response_schema(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Never fails: any call, transport, or schema problem becomes a fallback record.
    pub async fn extract(
        &self,
        context: &str,
        indicator: &Indicator,
        report: &CompanyReport,
    ) -> Extraction {
        match self.try_extract(context, indicator, report).await {
            Ok(record) => {
                debug!(
                    company = %report.name,
                    indicator = %indicator.name,
                    confidence = record.confidence,
                    "indicator extracted"
                );
                Extraction::Extracted(record)
            }
            Err(error) => {
                warn!(
                    company = %report.name,
                    indicator = %indicator.name,
                    error = %error,
                    "extraction failed, using fallback record"
                );
                let reason = error.to_string();
                Extraction::Fallback {
                    record: ExtractionRecord::fallback(report, indicator, &reason),
                    reason,
                }
            }
        }
    }

    pub async fn try_extract(
        &self,
        context: &str,
        indicator: &Indicator,
        report: &CompanyReport,
    ) -> Result<ExtractionRecord, LlmError> {
        let prompt = user_prompt(context, indicator, report);
        let reply = self
            .client
            .extract(SYSTEM_PROMPT, &prompt, &self.schema)
            .await?;

        to_record(reply, indicator, report)
    }
}

/// Validates a model reply and merges in the identifying fields.
pub fn to_record(
    reply: Value,
    indicator: &Indicator,
    report: &CompanyReport,
) -> Result<ExtractionRecord, LlmError> {
    let object = reply
        .as_object()
        .ok_or_else(|| LlmError::MalformedResponse("reply is not a JSON object".to_string()))?;

    let missing = REQUIRED_FIELDS
        .iter()
        .filter(|field| !object.contains_key(**field))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(LlmError::MalformedResponse(format!(
            "missing fields: {}",
            missing.join(", ")
        )));
    }

    let answer: ModelAnswer = serde_json::from_value(reply)?;

    if !answer.confidence.is_finite() || !(0.0..=1.0).contains(&answer.confidence) {
        return Err(LlmError::MalformedResponse(format!(
            "confidence {} is outside [0, 1]",
            answer.confidence
        )));
    }

    Ok(ExtractionRecord {
        company: report.name.clone(),
        year: report.year,
        indicator_name: indicator.name.clone(),
        value: answer.value,
        unit: answer.unit,
        confidence: answer.confidence,
        source_page: answer.source_page,
        notes: answer.notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CONFIDENCE_NOT_FOUND;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeClient {
        reply: Result<Value, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn replying(reply: Value) -> Self {
            Self {
                reply: Ok(reply),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExtractionClient for FakeClient {
        async fn extract(
            &self,
            _system: &str,
            user: &str,
            _schema: &Value,
        ) -> Result<Value, LlmError> {
            self.prompts.lock().unwrap().push(user.to_string());
            match &self.reply {
                Ok(value) => Ok(value.clone()),
                Err(message) => Err(LlmError::Status {
                    status: 503,
                    body: message.clone(),
                }),
            }
        }
    }

    fn scope1() -> Indicator {
        Indicator::new("Total Scope 1 GHG Emissions", "tCO2e", "direct emissions, gross direct")
    }

    fn aib() -> CompanyReport {
        CompanyReport::new("AIB", 2024, "data/reports/AIB_2024.pdf")
    }

    fn assert_fallback(extraction: &Extraction) {
        assert!(extraction.is_fallback());
        let record = extraction.record();
        assert_eq!(record.value, None);
        assert_eq!(record.confidence, CONFIDENCE_NOT_FOUND);
        assert_eq!(record.source_page, 0);
        assert_eq!(record.unit, "tCO2e");
        assert!(record.notes.starts_with("Error: "));
        assert_eq!(record.key(), ("AIB", 2024, "Total Scope 1 GHG Emissions"));
    }

    #[tokio::test]
    async fn successful_reply_is_merged_with_company_and_indicator() {
        let extractor = IndicatorExtractor::new(FakeClient::replying(json!({
            "value": 500,
            "unit": "tCO2e",
            "source_page": 12,
            "notes": "gross scope 1",
            "confidence": 1.0
        })));

        let extraction = extractor
            .extract("--- PAGE 12 ---\nscope 1 500 tCO2e", &scope1(), &aib())
            .await;

        assert!(!extraction.is_fallback());
        let record = extraction.into_record();
        assert_eq!(record.company, "AIB");
        assert_eq!(record.year, 2024);
        assert_eq!(record.indicator_name, "Total Scope 1 GHG Emissions");
        assert_eq!(record.value, Some(ExtractedValue::Number(500.0)));
        assert_eq!(record.source_page, 12);
        assert_eq!(record.confidence, 1.0);
    }

    #[tokio::test]
    async fn not_disclosed_reply_keeps_null_value() {
        let extractor = IndicatorExtractor::new(FakeClient::replying(json!({
            "value": null,
            "unit": "tCO2e",
            "source_page": 0,
            "notes": "not disclosed",
            "confidence": 0.0
        })));

        let extraction = extractor.extract("", &scope1(), &aib()).await;

        assert!(!extraction.is_fallback());
        let record = extraction.record();
        assert_eq!(record.indicator_name, "Total Scope 1 GHG Emissions");
        assert_eq!(record.value, None);
        assert_eq!(record.confidence, 0.0);
        assert_eq!(record.notes, "not disclosed");
    }

    #[tokio::test]
    async fn empty_context_still_calls_the_model() {
        let extractor = IndicatorExtractor::new(FakeClient::replying(json!({
            "value": null,
            "unit": "tCO2e",
            "source_page": 0,
            "notes": "",
            "confidence": 0.0
        })));

        extractor.extract("", &scope1(), &aib()).await;

        assert_eq!(extractor.client().prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn call_failure_becomes_fallback() {
        let extractor = IndicatorExtractor::new(FakeClient::failing("service unavailable"));

        let extraction = extractor.extract("context", &scope1(), &aib()).await;

        assert_fallback(&extraction);
        assert!(extraction.record().notes.contains("service unavailable"));
    }

    #[tokio::test]
    async fn missing_field_becomes_fallback() {
        let extractor = IndicatorExtractor::new(FakeClient::replying(json!({
            "value": 12,
            "unit": "tCO2e",
            "notes": "",
            "confidence": 1.0
        })));

        let extraction = extractor.extract("context", &scope1(), &aib()).await;

        assert_fallback(&extraction);
        assert!(extraction.record().notes.contains("source_page"));
    }

    #[tokio::test]
    async fn wrongly_typed_field_becomes_fallback() {
        let extractor = IndicatorExtractor::new(FakeClient::replying(json!({
            "value": 12,
            "unit": "tCO2e",
            "source_page": "twelve",
            "notes": "",
            "confidence": 1.0
        })));

        assert_fallback(&extractor.extract("context", &scope1(), &aib()).await);
    }

    #[test]
    fn confidence_out_of_range_is_rejected() {
        let reply = json!({
            "value": "12%",
            "unit": "%",
            "source_page": 3,
            "notes": "",
            "confidence": 1.5
        });

        let result = to_record(reply, &scope1(), &aib());
        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
    }

    #[test]
    fn intermediate_confidence_is_tolerated() {
        let reply = json!({
            "value": "about 40%",
            "unit": "%",
            "source_page": 3,
            "notes": "rounded",
            "confidence": 0.8,
            "extra": true
        });

        let record = to_record(reply, &scope1(), &aib()).expect("reply should validate");
        assert_eq!(record.confidence, 0.8);
        assert_eq!(record.value, Some(ExtractedValue::Text("about 40%".to_string())));
    }
}
