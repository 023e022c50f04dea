//! # nls-core
//!
//! Core tensor engine for the nls non-local search library.
//!
//! Provides the foundational `Tensor` type with:
//! - F32/F64/I32/I64/U8 dtypes (ops use F32 data and I32 index tensors)
//! - CPU and CUDA device support (CUDA behind the `cuda` feature)
//! - Zero-copy views (reshape, transpose, narrow) over strided storage
//! - Boundary precondition checks (device placement, contiguity) that name
//!   the offending argument, used by the `nls-ops` dispatch layer

pub mod dtype;
pub mod device;
pub mod shape;
pub mod storage;
pub mod tensor;
pub mod error;
pub mod validate;

pub use dtype::DType;
pub use device::Device;
pub use shape::Shape;
pub use storage::Storage;
pub use tensor::Tensor;
pub use error::NlsError;

pub type Result<T> = std::result::Result<T, NlsError>;
