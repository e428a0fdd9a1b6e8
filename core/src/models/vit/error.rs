use crate::tensor::TensorError;
use thiserror::Error;

/// Errors raised while building, loading, saving or running a [`super::ViTBlock`].
#[derive(Error, Debug)]
pub enum ViTError {
    /// `forward` expects exactly one input tensor.
    #[error("ViTBlock expects exactly one input tensor, got {got}")]
    InputArity { got: usize },

    /// A checkpoint file could not be opened, read or written.
    #[error("cannot access checkpoint file {file}: {source}")]
    FileAccess {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint file holds the wrong number of elements.
    #[error("checkpoint file {file} has {got} elements, expected {expected}")]
    ShapeMismatch {
        file: String,
        expected: usize,
        got: usize,
    },

    /// A checkpoint file's byte length is not a whole number of f32 values.
    #[error("checkpoint file {file} is malformed: {bytes} bytes is not a multiple of 4")]
    Malformed { file: String, bytes: usize },

    /// The configuration does not describe the fixed checkpoint architecture.
    #[error(
        "configuration does not match the checkpoint architecture \
         (model_dim {model_dim}, head_dim {head_dim}, n_heads {n_heads}, mlp_dim {mlp_dim})"
    )]
    ArchitectureMismatch {
        model_dim: usize,
        head_dim: usize,
        n_heads: usize,
        mlp_dim: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot parse configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, ViTError>;
