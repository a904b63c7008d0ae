//! Gzip content negotiation.

use std::io::Write;

use axum::http::{header, HeaderMap};
use flate2::write::GzEncoder;
use flate2::Compression;

/// Whether any `Accept-Encoding` value mentions gzip (case-insensitive).
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("gzip"))
}

/// Compress a payload into a complete gzip member.
pub fn gzip(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2 + 32), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}
