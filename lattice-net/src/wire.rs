//! Wire codec for envelope frames.
//!
//! Each message is one frame: a 4-byte big-endian length prefix followed by
//! the JSON-serialized envelope body. The length prefix keeps framing
//! intact even when a body fails to decode, so a malformed envelope costs
//! one frame, not the connection.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use lattice_core::Envelope;

/// Errors during frame encoding/decoding.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame too large: {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("truncated frame")]
    TruncatedFrame,

    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Codec turning envelopes into length-prefixed frames and back.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_frame: usize,
}

impl EnvelopeCodec {
    /// Default maximum frame body size (16 MB).
    pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

    /// Create a codec with the default size limit.
    pub fn new() -> Self {
        Self {
            max_frame: Self::DEFAULT_MAX_FRAME,
        }
    }

    /// Create a codec with a custom size limit.
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self { max_frame }
    }

    /// The configured frame body limit.
    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    /// Encode an envelope into a ready-to-send frame.
    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, WireError> {
        let body = serde_json::to_vec(envelope)?;

        if body.len() > self.max_frame {
            return Err(WireError::FrameTooLarge {
                size: body.len(),
                max: self.max_frame,
            });
        }

        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode an envelope from a complete frame.
    pub fn decode(&self, frame: &[u8]) -> Result<Envelope, WireError> {
        if frame.len() < 4 {
            return Err(WireError::TruncatedFrame);
        }

        let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;

        if length > self.max_frame {
            return Err(WireError::FrameTooLarge {
                size: length,
                max: self.max_frame,
            });
        }

        if frame.len() < 4 + length {
            return Err(WireError::TruncatedFrame);
        }

        Ok(serde_json::from_slice(&frame[4..4 + length])?)
    }

    /// Read one framed envelope from an async reader.
    ///
    /// A [`WireError::Malformed`] return leaves the stream positioned at the
    /// next frame; any other error leaves the stream unusable.
    pub async fn read_envelope<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> Result<Envelope, WireError> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let length = u32::from_be_bytes(len_buf) as usize;

        if length > self.max_frame {
            return Err(WireError::FrameTooLarge {
                size: length,
                max: self.max_frame,
            });
        }

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;

        Ok(serde_json::from_slice(&body)?)
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}
