//! Optional stream compression around codec output
//!
//! Each call opens a fresh stream, feeds it the whole payload and finishes it
//! before the bytes are used; no compressor state survives between batches.
//! The mode is not carried in-band: sender and receiver must be configured
//! identically.

use crate::error::{Error, Result};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Compression mode applied after encoding (send) or before decoding (receive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Bytes pass through unchanged
    #[default]
    None,
    /// gzip stream (RFC 1952)
    Gzip,
    /// zlib stream (RFC 1950)
    Zlib,
}

impl Compression {
    /// Compress a complete payload
    pub fn compress(self, payload: &[u8], level: u32) -> Result<Vec<u8>> {
        let level = flate2::Compression::new(level.min(9));
        match self {
            Compression::None => Ok(payload.to_vec()),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), level);
                encoder.write_all(payload).map_err(compression_error)?;
                encoder.finish().map_err(compression_error)
            }
            Compression::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len() / 2), level);
                encoder.write_all(payload).map_err(compression_error)?;
                encoder.finish().map_err(compression_error)
            }
        }
    }

    /// Decompress a complete payload
    pub fn decompress(self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(payload.len() * 2);
        match self {
            Compression::None => return Ok(payload.to_vec()),
            Compression::Gzip => {
                GzDecoder::new(payload)
                    .read_to_end(&mut out)
                    .map_err(compression_error)?;
            }
            Compression::Zlib => {
                ZlibDecoder::new(payload)
                    .read_to_end(&mut out)
                    .map_err(compression_error)?;
            }
        }
        Ok(out)
    }
}

fn compression_error(e: std::io::Error) -> Error {
    Error::Compression(e.to_string())
}
