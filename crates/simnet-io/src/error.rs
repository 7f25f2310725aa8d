use simnet_core::TensorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored tensor is invalid: {0}")]
    Tensor(#[from] TensorError),

    #[error("no tensor named {0:?} in bundle")]
    MissingTensor(String),
}

pub type IoResult<T> = Result<T, IoError>;
