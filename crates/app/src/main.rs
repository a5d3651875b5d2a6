use chrono::Utc;
use clap::{Parser, Subcommand};
use esg_extract_core::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use esg_extract_core::{
    BatchConfig, BatchOrchestrator, CompanyReport, ContextSelector, DocumentOutcome,
    DocumentSource, ExtractionStore, Indicator, IndicatorExtractor, IndicatorOutcome, LopdfSource,
    OpenAiClient, OpenAiConfig, RunObserver, SqliteStore,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "esg-extract", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML file with reports, indicators, and output paths.
    /// Built-in lists are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract every configured indicator from every configured report, then export CSV.
    Run {
        /// Override the page budget per indicator.
        #[arg(long)]
        max_pages: Option<usize>,

        /// API key for the chat-completions endpoint.
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Base URL of an OpenAI-compatible API.
        #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Model name.
        #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
        model: String,

        /// Per-request timeout in seconds.
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout_secs: u64,
    },
    /// Print the context that would be sent to the model for one indicator.
    Context {
        /// Report PDF.
        #[arg(long)]
        file: PathBuf,
        /// Indicator name; hints come from the config when the name is known there.
        #[arg(long)]
        indicator: String,
        /// Comma-separated hint phrases, overriding the configured ones.
        #[arg(long)]
        hints: Option<String>,
        /// Override the page budget.
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Re-export the stored results to CSV without extracting anything.
    Export,
}

/// One progress bar per company, advanced after every indicator.
struct ProgressReporter {
    bar: RefCell<Option<ProgressBar>>,
}

impl ProgressReporter {
    fn new() -> Self {
        Self {
            bar: RefCell::new(None),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }
}

impl RunObserver for ProgressReporter {
    fn document_started(&self, report: &CompanyReport, indicators: usize) {
        let bar = ProgressBar::with_draw_target(
            Some(indicators as u64),
            ProgressDrawTarget::stderr_with_hz(12),
        );
        bar.set_style(Self::style());
        bar.set_message(format!("Extracting {}", report.name));
        bar.enable_steady_tick(Duration::from_millis(120));
        *self.bar.borrow_mut() = Some(bar);
    }

    fn indicator_finished(
        &self,
        _report: &CompanyReport,
        indicator: &Indicator,
        _outcome: &IndicatorOutcome,
    ) {
        if let Some(bar) = self.bar.borrow().as_ref() {
            bar.set_message(indicator.name.clone());
            bar.inc(1);
        }
    }

    fn document_finished(&self, outcome: &DocumentOutcome) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.finish_with_message(format!("{} done", outcome.company()));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BatchConfig::from_toml_file(path)?,
        None => BatchConfig::default(),
    };

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "esg-extract boot"
    );

    match cli.command {
        Command::Run {
            max_pages,
            api_key,
            base_url,
            model,
            timeout_secs,
        } => {
            let config = config.with_max_pages(max_pages)?;

            let backend = SqliteStore::open(&config.database_path).map_err(|error| {
                error!(
                    path = %config.database_path.display(),
                    error = %error,
                    "cannot initialize store"
                );
                anyhow::anyhow!("fatal: could not initialize database: {error}")
            })?;
            let store = ExtractionStore::new(backend, &config.export_path);

            let client = OpenAiClient::new(OpenAiConfig {
                base_url,
                api_key,
                model,
                timeout: Duration::from_secs(timeout_secs),
            })?;

            let orchestrator = BatchOrchestrator::new(
                LopdfSource,
                ContextSelector::new(config.max_pages),
                IndicatorExtractor::new(client),
                store,
            );

            let progress = ProgressReporter::new();
            let report = orchestrator
                .run_with(&config.reports, &config.indicators, &progress)
                .await;

            for document in &report.documents {
                match document {
                    DocumentOutcome::Skipped { company, reason } => {
                        println!("{company}: skipped ({reason})");
                    }
                    DocumentOutcome::Processed { company, indicators } => {
                        let failed = indicators
                            .iter()
                            .filter(|(_, outcome)| *outcome != IndicatorOutcome::Extracted)
                            .collect::<Vec<_>>();
                        println!(
                            "{company}: {} of {} indicators extracted",
                            indicators.len() - failed.len(),
                            indicators.len()
                        );
                        for (name, outcome) in failed {
                            println!("  {name}: {outcome:?}");
                        }
                    }
                }
            }

            println!(
                "run {} finished: {} rows exported to {}",
                report.run_id,
                report.exported.len(),
                orchestrator.store().export_path().display()
            );
        }
        Command::Context {
            file,
            indicator,
            hints,
            max_pages,
        } => {
            let config = config.with_max_pages(max_pages)?;
            let known = config
                .indicators
                .iter()
                .find(|candidate| candidate.name.eq_ignore_ascii_case(&indicator))
                .cloned();
            let target = match (known, hints) {
                (Some(known), None) => known,
                (Some(known), Some(hints)) => Indicator::new(known.name, known.unit, hints),
                (None, hints) => {
                    warn!(
                        indicator = %indicator,
                        "indicator not in config, using name words only"
                    );
                    Indicator::new(indicator, "", hints.unwrap_or_default())
                }
            };

            let pages = LopdfSource.open(&file)?;
            let selector = ContextSelector::new(config.max_pages);
            let blob = selector.context_for(&pages, &target);

            println!("keywords: {:?}", esg_extract_core::derive_keywords(&target));
            println!("selected pages: {:?}", blob.page_numbers());
            if blob.is_empty() {
                println!("no page matched");
            } else {
                println!("{}", blob.render());
            }
        }
        Command::Export => {
            let backend = SqliteStore::open(&config.database_path)?;
            let store = ExtractionStore::new(backend, &config.export_path);
            let records = store.try_export()?;

            println!(
                "{} rows exported to {}",
                records.len(),
                config.export_path.display()
            );
        }
    }

    Ok(())
}
