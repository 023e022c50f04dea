//! Fold: raster-grid patch accumulation (patches → video).

use nls_core::validate::check_input;
use nls_core::{Result, Tensor};

/// Accumulate `patches` into `vid` on the strided raster grid starting at
/// query `q_start`.
pub fn forward(
    vid: &mut Tensor,
    patches: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<()> {
    check_input(vid, "vid")?;
    check_input(patches, "patches")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::fold_forward(vid, patches, q_start, stride, dilation)
        .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = (q_start, stride, dilation);
        crate::no_cuda()
    };
    res
}

/// Extract grid patches from `grad_vid` (the adjoint of the forward pass).
pub fn backward(
    grad_patches: &mut Tensor,
    grad_vid: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<()> {
    check_input(grad_patches, "grad_patches")?;
    check_input(grad_vid, "grad_vid")?;

    #[cfg(feature = "cuda")]
    let res =
        nls_kernels::cuda::ops::fold_backward(grad_patches, grad_vid, q_start, stride, dilation)
            .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = (q_start, stride, dilation);
        crate::no_cuda()
    };
    res
}
