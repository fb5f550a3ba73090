//! Command-line front end for the Page-Proof QA core: ingest a PDF into
//! the embedded store, then ask grounded questions against it.
//!
//! ```bash
//! pageproof ingest document.pdf --pdfium-library-path ./libpdfium.so
//! pageproof ask <document-id> "Who signed the order?"
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pageproof_model::Settings;
use pageproof_pdf::ocr::NullOcrEngine;
use pageproof_qa::OpenAiClient;
use pageproof_store::{DocumentLocks, RedbStore};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "pageproof", version, about)]
struct Cli {
    /// Directory holding the embedded database and per-document page images.
    #[arg(long, default_value = "./pageproof-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingests a PDF: extracts text (with OCR fallback), rasterizes pages,
    /// and builds retrievable chunks.
    Ingest {
        /// Path to the source PDF.
        pdf: PathBuf,

        /// Path to the native pdfium shared library. Required unless this
        /// binary was built with the `pdfium` feature disabled for testing.
        #[arg(long)]
        pdfium_library_path: Option<PathBuf>,
    },
    /// Asks a grounded question against an already-ingested, ready document.
    Ask {
        document_id: Uuid,
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("loading PAGEPROOF_* settings from the environment")?;

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating data directory {}", cli.data_dir.display()))?;
    let store = RedbStore::new(cli.data_dir.join("pageproof.redb")).context("opening the embedded store")?;
    let locks = DocumentLocks::new();

    match cli.command {
        Command::Ingest { pdf, pdfium_library_path } => {
            run_ingest(&settings, &store, &locks, &cli.data_dir, &pdf, pdfium_library_path).await
        }
        Command::Ask { document_id, question } => run_ask(&settings, &store, document_id, &question).await,
    }
}

async fn run_ingest(
    settings: &Settings,
    store: &RedbStore,
    locks: &DocumentLocks,
    data_dir: &std::path::Path,
    pdf: &std::path::Path,
    pdfium_library_path: Option<PathBuf>,
) -> Result<()> {
    let document_id = Uuid::new_v4();
    let pages_dir = pageproof_pdf::render::ensure_document_dir(data_dir, document_id)
        .context("creating the document's page-image directory")?;

    let filename = pdf
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());
    let dest = pageproof_pdf::render::document_dir(data_dir, document_id).join("source.pdf");
    std::fs::copy(pdf, &dest).with_context(|| format!("copying {} into the upload directory", pdf.display()))?;

    let library_path = pdfium_library_path.context(
        "a pdfium library path is required; pass --pdfium-library-path pointing at the native pdfium binding",
    )?;
    let raw_pages = pageproof_pdf::load_raw_pages(&library_path, &dest, &pages_dir)
        .context("extracting text and rendering pages")?;

    let ocr_engine = NullOcrEngine;
    let document = pageproof_pdf::ingest_document(
        settings,
        store,
        locks,
        &ocr_engine,
        data_dir,
        document_id,
        &filename,
        Some("application/pdf".to_string()),
        raw_pages,
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn run_ask(settings: &Settings, store: &RedbStore, document_id: Uuid, question: &str) -> Result<()> {
    let api_key = settings
        .openai_api_key
        .clone()
        .context("PAGEPROOF_OPENAI_API_KEY must be set to ask questions")?;
    let client = OpenAiClient::new(api_key);

    let response = pageproof_qa::ask_question(store, &client, &client, settings, document_id, question)
        .await
        .context("answering the question")?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
