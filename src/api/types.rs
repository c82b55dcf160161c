use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::SqliteStore;
use crate::pipeline::extraction::DocumentPipeline;
use crate::pipeline::structuring::SchemaMapper;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DocumentPipeline>,
    pub store: Arc<SqliteStore>,
    pub mapper: Arc<SchemaMapper>,
    /// Deployment label reported by `GET /info`.
    pub environment: Arc<str>,
}

impl AppState {
    /// Cap on a whole request body: a handful of maximum-size files plus
    /// multipart framing.
    pub fn request_body_limit(&self) -> usize {
        let per_file = self.pipeline.settings().max_file_bytes;
        usize::try_from(per_file.saturating_mul(MAX_FILES_PER_REQUEST))
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD)
    }
}

pub const MAX_FILES_PER_REQUEST: u64 = 10;
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractionQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}
