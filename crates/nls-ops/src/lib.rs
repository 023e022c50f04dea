//! # nls-ops
//!
//! The validated dispatch layer for the nls operation families. Every
//! operation here:
//!
//! 1. checks each tensor argument in declared order (CUDA residency first,
//!    then contiguity) and reports the first failure by argument name,
//! 2. launches the corresponding GPU kernel in place over the callers'
//!    tensors, blocking until the launch completes.
//!
//! No operation allocates output tensors; callers size and zero them.
//! Without the `cuda` feature every dispatch fails at the residency check,
//! since only GPU storage can satisfy it.

pub mod fold;
pub mod gather;
pub mod iunfold;
pub mod registry;
pub mod scatter;
pub mod search;
pub mod unfold;
pub mod wpsum;
pub mod xsearch;

pub use registry::{lookup, Family, OpEntry, Pass, OPS};

#[cfg(not(feature = "cuda"))]
pub(crate) fn no_cuda<T>() -> nls_core::Result<T> {
    Err(nls_core::NlsError::CudaError(
        "built without the `cuda` feature".into(),
    ))
}
