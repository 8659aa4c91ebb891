use crate::model::ItemId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignError {
    #[error("item {0} no longer exists")]
    NotFound(ItemId),
    #[error("backend call `{method}` failed: {message}")]
    Backend { method: &'static str, message: String },
    #[error("document could not be displayed: {0}")]
    DocumentInvalid(String),
    #[error("document viewer not ready after {attempts} attempts")]
    ViewerTimeout { attempts: u32 },
    #[error("settings error: {0}")]
    Settings(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature data: {0}")]
    Signature(#[from] base64::DecodeError),
}

impl SignError {
    pub fn backend<S: Into<String>>(method: &'static str, message: S) -> Self {
        SignError::Backend {
            method,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SignError>;
