use thiserror::Error;

/// Errors produced while fetching, comparing, or reviewing duplicate groups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReviewError {
    #[error("Remote service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Remote service returned no duplicate candidates")]
    EmptyGroup,

    #[error("Failed to decode file {hash}: {message}")]
    Decode { hash: String, message: String },

    #[error("Failed to encode diff image: {0}")]
    Encode(String),

    #[error("Invalid image for comparison: {width}x{height}")]
    InvalidImage { width: u32, height: u32 },

    #[error("A group request is already pending")]
    ConcurrentPull,

    #[error("Gave up after {failures} consecutive failed fetches")]
    BufferExhausted { failures: u32 },

    #[error("Prefetch buffer has been shut down")]
    BufferClosed,

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),
}
