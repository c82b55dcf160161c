pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs::File;
use tracing_subscriber::EnvFilter;

use api::{build_router, AppState};
use config::AppConfig;
use db::{DatabaseError, SqliteStore};
use pipeline::extraction::{
    BatchResult, DocumentPipeline, DocumentResult, ExtractionError, LopdfTextLayer, OcrEngine,
    OcrExtractor, OtsuBinarizer, PdfiumRenderer, PositionalLayoutExtractor, ReaderBody,
};
use pipeline::structuring::{OpenAiClient, SchemaMapper};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Extraction setup error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

#[cfg(feature = "ocr")]
fn build_ocr_engine(config: &AppConfig) -> Result<Arc<dyn OcrEngine>, ExtractionError> {
    let engine =
        pipeline::extraction::BundledTesseract::new(None)?.with_languages(&config.ocr_languages);
    tracing::info!(languages = %config.ocr_languages, "Using in-process Tesseract");
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "ocr"))]
fn build_ocr_engine(config: &AppConfig) -> Result<Arc<dyn OcrEngine>, ExtractionError> {
    let cli = pipeline::extraction::TesseractCli::new(&config.tesseract_binary)
        .with_languages(&config.ocr_languages);
    // Startup continues without Tesseract; scanned documents then fail individually.
    match cli.verify() {
        Ok(version) => tracing::info!(%version, languages = %config.ocr_languages, "Tesseract found"),
        Err(e) => tracing::warn!(
            binary = %config.tesseract_binary.display(),
            error = %e,
            "Tesseract unavailable, scanned documents will fail OCR"
        ),
    }
    Ok(Arc::new(cli))
}

/// Classification + extraction pipeline with real engines.
pub fn build_pipeline(config: &AppConfig) -> Result<DocumentPipeline, StartupError> {
    let renderer = match PdfiumRenderer::new() {
        Ok(renderer) => renderer,
        Err(e) => {
            tracing::warn!(error = %e, "PDFium unavailable, scanned documents will fail OCR");
            PdfiumRenderer
        }
    };

    let ocr = OcrExtractor::new(
        Arc::new(renderer),
        Arc::new(OtsuBinarizer),
        build_ocr_engine(config)?,
        config.render_dpi,
        config.ocr_workers,
    );

    Ok(DocumentPipeline::new(
        Arc::new(LopdfTextLayer),
        ocr,
        Arc::new(PositionalLayoutExtractor),
        config.pipeline_settings(),
    ))
}

/// Wire every service the HTTP API needs.
pub fn build_state(config: &AppConfig) -> Result<AppState, StartupError> {
    let pipeline = build_pipeline(config)?;

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    tracing::info!(path = %config.db_path.display(), "Database ready");

    if config.openai_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set, schema mapping requests will be unauthenticated");
    }
    let llm = OpenAiClient::new(
        &config.llm_url,
        config.openai_api_key.clone(),
        config.llm_timeout_secs,
    );
    let mapper = SchemaMapper::new(store.clone(), Arc::new(llm), &config.llm_model);

    Ok(AppState {
        pipeline: Arc::new(pipeline),
        store,
        mapper: Arc::new(mapper),
        environment: Arc::from(config.environment.as_str()),
    })
}

/// Serve the HTTP API until Ctrl-C.
pub async fn serve(config: AppConfig) -> Result<(), StartupError> {
    tracing::info!(
        "{} v{} starting in {} mode",
        config::APP_NAME,
        config::APP_VERSION,
        config.environment
    );

    let state = build_state(&config)?;
    let workers = state.pipeline.ocr().workers();
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, ocr_workers = workers, "Listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

/// Run the batch pipeline over local files, in the order given.
pub async fn extract_files(config: &AppConfig, paths: &[PathBuf]) -> Result<BatchResult, StartupError> {
    let pipeline = build_pipeline(config)?;
    Ok(extract_with(&pipeline, paths).await)
}

async fn extract_with(pipeline: &DocumentPipeline, paths: &[PathBuf]) -> BatchResult {
    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = display_name(path);
        let opened = async {
            let file = File::open(path).await?;
            let size = file.metadata().await?.len();
            Ok::<_, std::io::Error>((file, size))
        }
        .await;

        let result = match opened {
            Ok((file, size)) => {
                pipeline
                    .process_document(&filename, Some(size), &mut ReaderBody::new(file))
                    .await
            }
            Err(e) => DocumentResult::failed(&filename, &ExtractionError::Io(e)),
        };
        results.push(result);
    }
    BatchResult { results }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
