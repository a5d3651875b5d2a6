use crate::models::{CompanyReport, Indicator};
use serde_json::{json, Value};

pub const SYSTEM_PROMPT: &str = "You are an expert Sustainability Data Auditor. \
Your job is to extract precise data points from Corporate Sustainability Reports (CSRD). \
You must output valid JSON.";

const NO_CONTEXT_NOTICE: &str =
    "(No page of the report matched the search terms for this indicator.)";

/// JSON schema the model must answer with.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "value": {
                "anyOf": [
                    {"type": "string"},
                    {"type": "number"},
                    {"type": "null"}
                ]
            },
            "unit": {"type": "string"},
            "source_page": {"type": "integer"},
            "notes": {"type": "string"},
            "confidence": {"type": "number"}
        },
        "required": ["value", "unit", "source_page", "notes", "confidence"],
        "additionalProperties": false
    })
}

pub fn user_prompt(context: &str, indicator: &Indicator, report: &CompanyReport) -> String {
    let context = if context.trim().is_empty() {
        NO_CONTEXT_NOTICE
    } else {
        context
    };

    format!(
        "Analyze the text below from {company}'s {year} report.\n\
         \n\
         TARGET DATA POINT:\n\
         - Indicator: {name}\n\
         - Desired Unit: {unit}\n\
         - Search Hints: {hints}\n\
         \n\
         RULES:\n\
         1. Extract the numeric value for the year {year}.\n\
         2. If the exact unit differs (e.g., MWh vs GJ), convert it if trivial, or note it.\n\
         3. If not found, set value to null.\n\
         4. Confidence score: 1.0 (Certain), 0.5 (Ambiguous), 0.0 (Not found).\n\
         5. source_page is your best guess based on the PAGE markers, 0 if unknown.\n\
         \n\
         --- REPORT CONTEXT ---\n\
         {context}",
        company = report.name,
        year = report.year,
        name = indicator.name,
        unit = indicator.unit,
        hints = indicator.hints,
    )
}
