pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod indicator;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod store;

pub use config::{BatchConfig, DEFAULT_DATABASE_PATH, DEFAULT_EXPORT_PATH};
pub use context::{derive_keywords, page_marker, ContextBlob, ContextSelector, DEFAULT_MAX_PAGES};
pub use document::{DocumentSource, LopdfSource, PageIndex, PageText};
pub use error::{ConfigError, DocumentError, LlmError, StoreError};
pub use indicator::{Extraction, IndicatorExtractor};
pub use llm::{ExtractionClient, OpenAiClient, OpenAiConfig};
pub use models::{
    CompanyReport, ExtractedValue, ExtractionRecord, Indicator, CONFIDENCE_AMBIGUOUS,
    CONFIDENCE_CERTAIN, CONFIDENCE_NOT_FOUND,
};
pub use orchestrator::{
    BatchOrchestrator, DocumentOutcome, IndicatorOutcome, RunObserver, RunReport, Silent,
};
pub use store::{write_csv, ExtractionStore, RecordStore, SqliteStore};
