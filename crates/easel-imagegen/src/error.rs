use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageGenError {
    /// Missing credentials, missing model selection, or an unknown provider key.
    #[error("Config error: {0}")]
    Config(String),

    /// Non-2xx response, failed/cancelled status, or unusable output.
    #[error("{0}")]
    Provider(String),

    #[error("generation timed out after {attempts} status checks")]
    TimedOut { attempts: u32 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] easel_core::EaselError),
}

impl ImageGenError {
    pub fn is_config(&self) -> bool {
        matches!(self, ImageGenError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, ImageGenError>;
