//! iunfold: unfold restricted to an inset rectangle of each frame.

use nls_core::validate::check_input;
use nls_core::{Result, Tensor};

/// Extract patches on the `[top, btm) x [left, right)` grid of each frame.
/// `adj` shifts the patch anchor (pass `ps/2` for top-left alignment).
#[allow(clippy::too_many_arguments)]
pub fn forward(
    patches: &mut Tensor,
    vid: &Tensor,
    coords: (usize, usize, usize, usize),
    q_start: usize,
    stride: usize,
    dilation: usize,
    adj: isize,
) -> Result<()> {
    check_input(patches, "patches")?;
    check_input(vid, "vid")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::iunfold_forward(
        patches, vid, coords, q_start, stride, dilation, adj,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = (coords, q_start, stride, dilation, adj);
        crate::no_cuda()
    };
    res
}

/// Accumulate `grad_patches` into `grad_vid` on the rectangle grid.
#[allow(clippy::too_many_arguments)]
pub fn backward(
    grad_vid: &mut Tensor,
    grad_patches: &Tensor,
    coords: (usize, usize, usize, usize),
    q_start: usize,
    stride: usize,
    dilation: usize,
    adj: isize,
) -> Result<()> {
    check_input(grad_vid, "grad_vid")?;
    check_input(grad_patches, "grad_patches")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::iunfold_backward(
        grad_vid,
        grad_patches,
        coords,
        q_start,
        stride,
        dilation,
        adj,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = (coords, q_start, stride, dilation, adj);
        crate::no_cuda()
    };
    res
}
