//! Diagnostic endpoints for the SVG compression codec.

use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use cantor_core::compression::{batch_compress, compression_stats, decompress, is_compressed_payload};

use crate::error::AppResult;
use crate::response::DataResponse;

#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    pub original: String,
    /// Compressed form to measure; computed when absent.
    pub compressed: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecompressRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompressResponse {
    pub value: String,
    pub was_compressed: bool,
}

/// POST /compression/stats
pub async fn stats(Json(body): Json<StatsRequest>) -> AppResult<impl IntoResponse> {
    let stats = compression_stats(&body.original, body.compressed.as_deref());
    Ok(Json(DataResponse::ok(stats)))
}

/// POST /compression/batch
pub async fn batch(Json(body): Json<BatchRequest>) -> AppResult<impl IntoResponse> {
    let result = batch_compress(body.items.as_slice());
    tracing::debug!(
        count = body.items.len(),
        ratio = result.stats.compression_ratio,
        "Batch compressed"
    );
    Ok(Json(DataResponse::ok(result)))
}

/// POST /compression/decompress
///
/// Plain (legacy) values come back unchanged with `wasCompressed: false`.
pub async fn decompress_value(
    Json(body): Json<DecompressRequest>,
) -> AppResult<impl IntoResponse> {
    let was_compressed = is_compressed_payload(&body.value);
    let value = decompress(&body.value);
    Ok(Json(DataResponse::ok(DecompressResponse {
        value,
        was_compressed,
    })))
}
