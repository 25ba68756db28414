//! SVG path compression codec.
//!
//! Annotation strokes are stored and transmitted as SVG path data, which is
//! verbose and highly repetitive. This module shrinks it in two stages:
//!
//! 1. [`optimize`] rewrites the text losslessly enough for rendering
//!    (whitespace, precision, redundant path commands).
//! 2. [`compress`] gzips the UTF-8 bytes at the best level and base64-encodes
//!    the result so it can live in a TEXT column or a JSON frame.
//!
//! Every function fails open: on an internal error the caller gets the
//! original (uncompressed) text back, never an error. Compressed payloads
//! carry no explicit tag, so [`decompress`] sniffs the base64 shape and the
//! gzip magic to tell them apart from legacy plain-SVG rows.

use std::io::{Read, Write};
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::{Captures, Regex};
use serde::Serialize;
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static INTER_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));

/// Keeps at most six fractional digits.
static PRECISION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d{6})\d+").expect("valid regex"));

static PATH_DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bd="([^"]*)""#).expect("valid regex"));

static BASE64_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").expect("valid regex"));

/// First two bytes of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest decompressed payload accepted. Anything that inflates past this
/// is treated as not-a-payload and returned as-is.
pub const MAX_DECOMPRESSED_BYTES: usize = 8 * 1024 * 1024;

/// SVG path command letters.
const PATH_COMMANDS: &str = "MmLlHhVvCcSsQqTtAaZz";

// ---------------------------------------------------------------------------
// Errors (internal only; the public API fails open)
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a gzip stream")]
    NotGzip,

    #[error("gzip stream error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decompressed payload exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

/// Shrink SVG text without changing how it renders.
///
/// Collapses whitespace runs, strips whitespace between tags, trims the
/// ends, truncates decimals past six digits, and merges consecutive
/// identical path commands (`L 1 2 L 3 4` becomes `L 1 2 3 4`). When the
/// input contains markup only `d="..."` attributes are treated as path data.
///
/// Deterministic and idempotent.
pub fn optimize(svg: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(svg, " ");
    let untagged = INTER_TAG_RE.replace_all(&collapsed, "><");
    let truncated = PRECISION_RE.replace_all(untagged.trim(), "${1}");

    if truncated.contains('<') {
        PATH_DATA_RE
            .replace_all(&truncated, |caps: &Captures| {
                format!("d=\"{}\"", merge_path_commands(&caps[1]))
            })
            .into_owned()
    } else {
        merge_path_commands(&truncated)
    }
}

/// Merge runs of the same path command into one command with its argument
/// lists concatenated. `M`/`m` are never merged (a repeated move starts a
/// new subpath); repeated close-path commands collapse to one.
fn merge_path_commands(data: &str) -> String {
    let mut prefix = String::new();
    let mut segments: Vec<(char, String)> = Vec::new();

    for ch in data.chars() {
        if PATH_COMMANDS.contains(ch) {
            segments.push((ch, String::new()));
        } else if let Some((_, args)) = segments.last_mut() {
            args.push(ch);
        } else {
            prefix.push(ch);
        }
    }

    let mut merged: Vec<(char, String)> = Vec::with_capacity(segments.len());
    for (cmd, args) in segments {
        if let Some((prev_cmd, prev_args)) = merged.last_mut() {
            if *prev_cmd == cmd {
                match cmd {
                    'Z' | 'z' => {
                        *prev_args = args;
                        continue;
                    }
                    'M' | 'm' => {}
                    _ if !prev_args.trim().is_empty() && !args.trim().is_empty() => {
                        *prev_args = format!("{} {}", prev_args.trim_end(), args.trim_start());
                        continue;
                    }
                    _ => {}
                }
            }
        }
        merged.push((cmd, args));
    }

    let mut out = prefix;
    for (cmd, args) in merged {
        out.push(cmd);
        out.push_str(&args);
    }
    out
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Gzip (best level) and base64-encode SVG text.
///
/// Returns the input unchanged if encoding fails.
pub fn compress(svg: &str) -> String {
    match try_compress(svg) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!(error = %e, "SVG compression failed, keeping uncompressed text");
            svg.to_string()
        }
    }
}

fn try_compress(svg: &str) -> Result<String, CodecError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(svg.len() / 2), Compression::best());
    encoder.write_all(svg.as_bytes())?;
    let bytes = encoder.finish()?;
    Ok(STANDARD.encode(bytes))
}

/// Reverse [`compress`].
///
/// Values that do not look like a compressed payload (legacy plain SVG) are
/// returned as-is, as is any payload that fails to decode.
pub fn decompress(value: &str) -> String {
    if !looks_like_base64(value) {
        return value.to_string();
    }
    match try_decompress(value) {
        Ok(svg) => svg,
        Err(e) => {
            tracing::debug!(error = %e, "Value is not a compressed payload, returning as-is");
            value.to_string()
        }
    }
}

fn try_decompress(value: &str) -> Result<String, CodecError> {
    let bytes = STANDARD.decode(value)?;
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Err(CodecError::NotGzip);
    }
    let limit = MAX_DECOMPRESSED_BYTES;
    let mut svg = String::new();
    GzDecoder::new(bytes.as_slice())
        .take(limit as u64 + 1)
        .read_to_string(&mut svg)?;
    if svg.len() > limit {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(svg)
}

/// Base64 alphabet, padding, and length-multiple-of-4 check.
fn looks_like_base64(value: &str) -> bool {
    !value.is_empty() && value.len() % 4 == 0 && BASE64_RE.is_match(value)
}

/// Whether `value` is a payload produced by [`compress`] (base64 of a gzip
/// stream). Plain SVG that merely fits the base64 alphabet is rejected by
/// the gzip magic check.
pub fn is_compressed_payload(value: &str) -> bool {
    looks_like_base64(value)
        && STANDARD
            .decode(value)
            .map(|bytes| bytes.starts_with(&GZIP_MAGIC))
            .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Size comparison between an original and a compressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStats {
    pub original_size: usize,
    pub compressed_size: usize,
    /// Fraction of bytes saved, in `[0, 1]`.
    pub compression_ratio: f64,
    pub saved_bytes: usize,
    pub is_compressed: bool,
}

impl CompressionStats {
    fn from_sizes(original_size: usize, compressed_size: usize) -> Self {
        let compression_ratio = ratio_from_sizes(original_size, compressed_size);
        Self {
            original_size,
            compressed_size,
            compression_ratio,
            saved_bytes: original_size.saturating_sub(compressed_size),
            is_compressed: compression_ratio > 0.0,
        }
    }
}

/// `max(0, 1 - compressed/original)` over UTF-8 byte lengths.
pub fn compression_ratio(original: &str, compressed: &str) -> f64 {
    ratio_from_sizes(original.len(), compressed.len())
}

fn ratio_from_sizes(original: usize, compressed: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - compressed as f64 / original as f64).max(0.0)
}

/// Compute stats for `original`, compressing it first unless a compressed
/// payload is supplied.
pub fn compression_stats(original: &str, compressed: Option<&str>) -> CompressionStats {
    let compressed_size = match compressed {
        Some(payload) => payload.len(),
        None => compress(original).len(),
    };
    CompressionStats::from_sizes(original.len(), compressed_size)
}

/// Result of [`batch_compress`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCompression {
    pub compressed: Vec<String>,
    pub stats: CompressionStats,
}

/// Optimize and compress every item, with one aggregate stats record over
/// the byte totals.
pub fn batch_compress<S: AsRef<str>>(items: &[S]) -> BatchCompression {
    let mut original_total = 0;
    let mut compressed_total = 0;
    let compressed: Vec<String> = items
        .iter()
        .map(|item| {
            let item = item.as_ref();
            let encoded = compress(&optimize(item));
            original_total += item.len();
            compressed_total += encoded.len();
            encoded
        })
        .collect();

    BatchCompression {
        compressed,
        stats: CompressionStats::from_sizes(original_total, compressed_total),
    }
}

// ---------------------------------------------------------------------------
// Storage pipeline
// ---------------------------------------------------------------------------

/// SVG text ready to be written to an annotation row.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedSvg {
    /// Compressed payload, or the optimized text when compression did not
    /// pay off (or is disabled).
    pub svg_path: String,
    /// Byte length of the stored payload when it is compressed.
    pub compressed_size: Option<i32>,
    /// SHA-256 (hex) of the optimized, uncompressed text.
    pub checksum: String,
}

/// Optimize, checksum, and (when `compress_enabled`) compress SVG text for
/// storage. A compressed payload is kept only when it is smaller than the
/// optimized text.
pub fn pack_svg(svg: &str, compress_enabled: bool) -> PackedSvg {
    let optimized = optimize(svg);
    let checksum = format!("{:x}", Sha256::digest(optimized.as_bytes()));

    if compress_enabled {
        let encoded = compress(&optimized);
        if encoded != optimized && encoded.len() < optimized.len() {
            return PackedSvg {
                compressed_size: i32::try_from(encoded.len()).ok(),
                svg_path: encoded,
                checksum,
            };
        }
    }

    PackedSvg {
        svg_path: optimized,
        compressed_size: None,
        checksum,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
