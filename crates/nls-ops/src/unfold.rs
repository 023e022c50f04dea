//! Unfold: raster-grid patch extraction (video → patches).

use nls_core::validate::check_input;
use nls_core::{Result, Tensor};

/// Extract strided-grid patches from `vid` starting at query `q_start`.
pub fn forward(
    patches: &mut Tensor,
    vid: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<()> {
    check_input(patches, "patches")?;
    check_input(vid, "vid")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::unfold_forward(patches, vid, q_start, stride, dilation)
        .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = (q_start, stride, dilation);
        crate::no_cuda()
    };
    res
}

/// Accumulate `grad_patches` back into `grad_vid` (the adjoint of the
/// forward pass).
pub fn backward(
    grad_vid: &mut Tensor,
    grad_patches: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<()> {
    check_input(grad_vid, "grad_vid")?;
    check_input(grad_patches, "grad_patches")?;

    #[cfg(feature = "cuda")]
    let res =
        nls_kernels::cuda::ops::unfold_backward(grad_vid, grad_patches, q_start, stride, dilation)
            .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = (q_start, stride, dilation);
        crate::no_cuda()
    };
    res
}
