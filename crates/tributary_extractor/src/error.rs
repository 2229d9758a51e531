//! Errors returned by extraction platform adapters.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The platform answered with a non-success status.
    #[error("API failed with status: {code} and body '{body}'")]
    Api { code: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid platform response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ExtractorError {
    pub fn api(code: u16, body: impl AsRef<[u8]>) -> Self {
        Self::Api {
            code,
            body: String::from_utf8_lossy(body.as_ref()).into_owned(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Status code reported by the platform, if it answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { code, .. } => Some(*code),
            Self::InvalidRequest(_) => Some(400),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, ExtractorError>;
