//! Typed construction-time errors.
//!
//! Everything else in the crate reports failures through [`anyhow::Error`]; the
//! variants here are the fatal, non-retryable configuration mistakes that are
//! detected before any I/O happens. They travel inside `anyhow::Error`, so
//! callers that care can `downcast_ref::<TextIoError>()`.

use thiserror::Error;

/// Configuration errors raised while building sources and sinks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextIoError {
    /// The delimiter has no bytes.
    #[error("delimiter must be a non-empty byte sequence")]
    EmptyDelimiter,

    /// A proper suffix of the delimiter equals a proper prefix of it.
    #[error("delimiter {delimiter:?} must not self-overlap")]
    SelfOverlappingDelimiter {
        /// The rejected delimiter, lossily decoded for display.
        delimiter: String,
    },

    /// The escape byte appears inside the delimiter it is supposed to escape.
    #[error("escape byte {escape:#04x} must not be part of the delimiter")]
    EscapeInDelimiter {
        /// The rejected escape byte.
        escape: u8,
    },

    /// Read buffers must hold at least one byte.
    #[error("buffer size must be at least 1 byte")]
    InvalidBufferSize,

    /// The requested codec was compiled out.
    #[error("compression codec `{codec}` is not available (enable its cargo feature)")]
    CodecUnavailable {
        /// Codec name, e.g. `gzip`.
        codec: &'static str,
    },

    /// The shard name template cannot express the requested sharding.
    #[error("invalid shard name template {template:?}: {reason}")]
    InvalidShardTemplate {
        /// The template as configured.
        template: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}
