use thiserror::Error;

use crate::dtype::DType;

/// Errors produced by the nls library crates.
#[derive(Debug, Error)]
pub enum NlsError {
    /// Boundary precondition: the named argument is not on a CUDA device.
    #[error("{arg} must be a CUDA tensor")]
    NotCuda { arg: String },

    /// Boundary precondition: the named argument is not contiguous.
    #[error("{arg} must be contiguous")]
    NotContiguous { arg: String },

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("unsupported dtype: {0}")]
    UnsupportedDType(DType),

    #[error("invalid reshape: {numel} elements into shape {shape:?}")]
    InvalidReshape { numel: usize, shape: Vec<usize> },

    #[error("tensors on different devices")]
    DeviceMismatch,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("CUDA error: {0}")]
    CudaError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_messages() {
        let e = NlsError::NotCuda { arg: "vid".into() };
        assert_eq!(e.to_string(), "vid must be a CUDA tensor");
        let e = NlsError::NotContiguous {
            arg: "patches".into(),
        };
        assert_eq!(e.to_string(), "patches must be contiguous");
    }
}
