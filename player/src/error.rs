/*!
    Error type returned from fallible, non-blocking core operations.
*/

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlayerError>;

/// Errors returned by [`crate::Player`] operations.
///
/// Transient conditions (queue empty/full, decoder wants more data) and
/// shutdown (queue aborted) are never represented here; they resolve to
/// blocking, waiting, or `None`, not an `Err`.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Media(#[from] ffmpeg_types::Error),

    #[error("no such stream for requested media type")]
    NoSuchStream,

    #[error("player already closed")]
    AlreadyClosed,

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl PlayerError {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_error_displays_inner_message() {
        let err = PlayerError::from(ffmpeg_types::Error::codec("bad codec"));
        assert!(err.to_string().contains("bad codec"));
    }

    #[test]
    fn unsupported_carries_message() {
        let err = PlayerError::unsupported("12 channel audio");
        assert_eq!(err.to_string(), "unsupported: 12 channel audio");
    }
}
