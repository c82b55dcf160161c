use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::extraction::{PipelineSettings, DEFAULT_OCR_LANG, DEFAULT_RENDER_DPI};
use crate::pipeline::structuring::{DEFAULT_LLM_MODEL, DEFAULT_LLM_URL};

/// Application-level constants
pub const APP_NAME: &str = "PDF Intake";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000);
pub const DEFAULT_MAX_FILE_MB: u64 = 200;
pub const DEFAULT_DOC_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,pdfintake_lib=debug"
    } else {
        "info"
    }
}

/// Get the application data directory (~/PDFIntake/).
///
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("PDFIntake")
}

/// Default SQLite location.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("pdfintake.db")
}

fn default_ocr_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration, assembled from defaults and `PDFINTAKE_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// Reported by `GET /info`.
    pub environment: String,
    pub max_file_mb: u64,
    pub ocr_workers: usize,
    pub render_dpi: u32,
    pub document_timeout_secs: u64,
    pub db_path: PathBuf,
    pub tesseract_binary: PathBuf,
    pub ocr_languages: String,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub openai_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            bind: parse_var("PDFINTAKE_BIND", get("PDFINTAKE_BIND"), || Ok(DEFAULT_BIND))?,
            environment: get("PDFINTAKE_ENV").unwrap_or_else(|| DEFAULT_ENVIRONMENT.into()),
            max_file_mb: parse_var("PDFINTAKE_MAX_FILE_MB", get("PDFINTAKE_MAX_FILE_MB"), || {
                Ok(DEFAULT_MAX_FILE_MB)
            })?,
            ocr_workers: parse_var("PDFINTAKE_OCR_WORKERS", get("PDFINTAKE_OCR_WORKERS"), || {
                Ok(default_ocr_workers())
            })?,
            render_dpi: parse_var("PDFINTAKE_RENDER_DPI", get("PDFINTAKE_RENDER_DPI"), || {
                Ok(DEFAULT_RENDER_DPI)
            })?,
            document_timeout_secs: parse_var(
                "PDFINTAKE_DOC_TIMEOUT_SECS",
                get("PDFINTAKE_DOC_TIMEOUT_SECS"),
                || Ok(DEFAULT_DOC_TIMEOUT_SECS),
            )?,
            db_path: get("PDFINTAKE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            tesseract_binary: get("PDFINTAKE_TESSERACT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tesseract")),
            ocr_languages: get("PDFINTAKE_OCR_LANG").unwrap_or_else(|| DEFAULT_OCR_LANG.into()),
            llm_url: get("PDFINTAKE_LLM_URL").unwrap_or_else(|| DEFAULT_LLM_URL.into()),
            llm_model: get("PDFINTAKE_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.into()),
            llm_timeout_secs: parse_var(
                "PDFINTAKE_LLM_TIMEOUT_SECS",
                get("PDFINTAKE_LLM_TIMEOUT_SECS"),
                || Ok(DEFAULT_LLM_TIMEOUT_SECS),
            )?,
            openai_api_key: get("OPENAI_API_KEY"),
        };
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        let positive = |var: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid {
                    var,
                    value: "0".into(),
                    reason: "must be greater than zero".into(),
                })
            } else {
                Ok(())
            }
        };
        positive("PDFINTAKE_MAX_FILE_MB", self.max_file_mb)?;
        positive("PDFINTAKE_OCR_WORKERS", self.ocr_workers as u64)?;
        positive("PDFINTAKE_RENDER_DPI", u64::from(self.render_dpi))?;
        positive("PDFINTAKE_DOC_TIMEOUT_SECS", self.document_timeout_secs)?;
        Ok(self)
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_file_bytes: self.max_file_bytes(),
            document_timeout: Duration::from_secs(self.document_timeout_secs),
            staging_dir: None,
        }
    }
}

fn parse_var<T, D>(var: &'static str, raw: Option<String>, default: D) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> Result<T, ConfigError>,
{
    match raw {
        None => default(),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
