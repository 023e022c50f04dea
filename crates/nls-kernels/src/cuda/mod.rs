//! CUDA GPU backend for the nls operation families.
//!
//! Provides:
//! - Device context management (lazy singleton per GPU)
//! - Kernel launcher with PTX caching
//! - The gather/scatter/search/fold/unfold/iunfold/xsearch/wpsum kernels,
//!   compiled from embedded CUDA source at first use

pub mod context;
pub mod launch;
pub mod ops;

pub use context::{device_count, is_cuda_available, CudaError};
