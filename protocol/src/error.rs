use thiserror::Error;

/// Failures raised while decoding a frame. Unknown commands are not errors;
/// they decode to "no packet" so the taxonomy can grow without breaking
/// old peers.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload ended before the named field was fully decoded.
    #[error("truncated payload while decoding field `{field}`")]
    Truncated { field: &'static str },

    /// The frame is shorter than the command byte it must carry.
    #[error("frame shorter than the minimum of one command byte")]
    ShortFrame,

    /// A JSON packet did not have the expected shape.
    #[error("invalid JSON packet: {0}")]
    Json(&'static str),
}
