/*!
    Error type shared across the ffmpeg crate ecosystem.
*/

/// Result alias used throughout the ecosystem.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by source, decode and transform operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem or network I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A codec-library call failed (open, send, receive, seek, ...).
    #[error("codec error: {0}")]
    Codec(String),

    /// A decoded frame or container was structurally invalid.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A pixel/sample format or container feature isn't supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl Error {
    /// Build a [`Error::Codec`] from anything `Display`-able.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Build a [`Error::InvalidData`] from anything `Display`-able.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Build a [`Error::UnsupportedFormat`] from anything `Display`-able.
    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_formats_message() {
        let err = Error::codec("no such decoder");
        assert_eq!(err.to_string(), "codec error: no such decoder");
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
