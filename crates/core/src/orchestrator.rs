use crate::context::ContextSelector;
use crate::document::{DocumentSource, PageIndex};
use crate::indicator::{Extraction, IndicatorExtractor};
use crate::llm::ExtractionClient;
use crate::models::{CompanyReport, ExtractionRecord, Indicator};
use crate::store::{ExtractionStore, RecordStore};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorOutcome {
    Extracted,
    Fallback { reason: String },
    SaveFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Skipped {
        company: String,
        reason: String,
    },
    Processed {
        company: String,
        indicators: Vec<(String, IndicatorOutcome)>,
    },
}

impl DocumentOutcome {
    pub fn company(&self) -> &str {
        match self {
            Self::Skipped { company, .. } | Self::Processed { company, .. } => company,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents: Vec<DocumentOutcome>,
    pub exported: Vec<ExtractionRecord>,
}

impl RunReport {
    pub fn processed_documents(&self) -> usize {
        self.documents
            .iter()
            .filter(|outcome| matches!(outcome, DocumentOutcome::Processed { .. }))
            .count()
    }

    pub fn skipped_documents(&self) -> usize {
        self.documents.len() - self.processed_documents()
    }

    pub fn fallback_count(&self) -> usize {
        self.count_indicators(|outcome| matches!(outcome, IndicatorOutcome::Fallback { .. }))
    }

    pub fn save_failures(&self) -> usize {
        self.count_indicators(|outcome| matches!(outcome, IndicatorOutcome::SaveFailed { .. }))
    }

    fn count_indicators(&self, predicate: impl Fn(&IndicatorOutcome) -> bool) -> usize {
        self.documents
            .iter()
            .map(|document| match document {
                DocumentOutcome::Processed { indicators, .. } => indicators
                    .iter()
                    .filter(|(_, outcome)| predicate(outcome))
                    .count(),
                DocumentOutcome::Skipped { .. } => 0,
            })
            .sum()
    }
}

/// Per-document progress hooks, called in processing order. Every method defaults to a no-op.
pub trait RunObserver {
    /// The document opened; `indicators` calls to `indicator_finished` follow.
    fn document_started(&self, _report: &CompanyReport, _indicators: usize) {}

    fn indicator_finished(
        &self,
        _report: &CompanyReport,
        _indicator: &Indicator,
        _outcome: &IndicatorOutcome,
    ) {
    }

    /// Called for processed and skipped documents alike.
    fn document_finished(&self, _outcome: &DocumentOutcome) {}
}

/// Observer that ignores every event.
pub struct Silent;

impl RunObserver for Silent {}

/// Drives every report through every indicator, one at a time and in configured order.
///
/// A document that cannot be opened is skipped whole. Within a document each
/// indicator stands alone: a fallback or a failed save is recorded and the loop
/// moves on. Export runs exactly once at the end.
pub struct BatchOrchestrator<D, C, S> {
    source: D,
    selector: ContextSelector,
    extractor: IndicatorExtractor<C>,
    store: ExtractionStore<S>,
}

impl<D, C, S> BatchOrchestrator<D, C, S>
where
    D: DocumentSource,
    C: ExtractionClient + Send + Sync,
    S: RecordStore,
{
    pub fn new(
        source: D,
        selector: ContextSelector,
        extractor: IndicatorExtractor<C>,
        store: ExtractionStore<S>,
    ) -> Self {
        Self {
            source,
            selector,
            extractor,
            store,
        }
    }

    pub fn store(&self) -> &ExtractionStore<S> {
        &self.store
    }

    pub async fn run(&self, reports: &[CompanyReport], indicators: &[Indicator]) -> RunReport {
        self.run_with(reports, indicators, &Silent).await
    }

    pub async fn run_with(
        &self,
        reports: &[CompanyReport],
        indicators: &[Indicator],
        observer: &dyn RunObserver,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            reports = reports.len(),
            indicators = indicators.len(),
            max_pages = self.selector.max_pages(),
            "batch started"
        );

        let mut documents = Vec::with_capacity(reports.len());
        for report in reports {
            let outcome = self.process_document(report, indicators, observer).await;
            observer.document_finished(&outcome);
            documents.push(outcome);
        }

        let exported = self.store.export();

        let summary = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            documents,
            exported,
        };

        info!(
            %run_id,
            processed = summary.processed_documents(),
            skipped = summary.skipped_documents(),
            fallbacks = summary.fallback_count(),
            save_failures = summary.save_failures(),
            exported = summary.exported.len(),
            "batch finished"
        );

        summary
    }

    async fn process_document(
        &self,
        report: &CompanyReport,
        indicators: &[Indicator],
        observer: &dyn RunObserver,
    ) -> DocumentOutcome {
        let pages = match self.source.open(&report.file) {
            Ok(pages) => pages,
            Err(error) => {
                warn!(
                    company = %report.name,
                    path = %report.file.display(),
                    error = %error,
                    "document unavailable, skipping"
                );
                return DocumentOutcome::Skipped {
                    company: report.name.clone(),
                    reason: error.to_string(),
                };
            }
        };

        info!(
            company = %report.name,
            year = report.year,
            pages = pages.page_count(),
            "processing document"
        );
        observer.document_started(report, indicators.len());

        let mut outcomes = Vec::with_capacity(indicators.len());
        for indicator in indicators {
            let outcome = self.process_indicator(&pages, report, indicator).await;
            observer.indicator_finished(report, indicator, &outcome);
            outcomes.push((indicator.name.clone(), outcome));
        }

        // `pages` drops here, before the next document is opened.
        DocumentOutcome::Processed {
            company: report.name.clone(),
            indicators: outcomes,
        }
    }

    async fn process_indicator(
        &self,
        pages: &PageIndex,
        report: &CompanyReport,
        indicator: &Indicator,
    ) -> IndicatorOutcome {
        let context = self.selector.context_for(pages, indicator);
        debug!(
            company = %report.name,
            indicator = %indicator.name,
            pages = ?context.page_numbers(),
            "context selected"
        );

        let extraction = self
            .extractor
            .extract(&context.render(), indicator, report)
            .await;

        let outcome = match &extraction {
            Extraction::Extracted(_) => IndicatorOutcome::Extracted,
            Extraction::Fallback { reason, .. } => IndicatorOutcome::Fallback {
                reason: reason.clone(),
            },
        };

        match self.store.save(extraction.record()) {
            Ok(()) => outcome,
            Err(error) => IndicatorOutcome::SaveFailed {
                reason: error.to_string(),
            },
        }
    }
}
