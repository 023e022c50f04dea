//! Scatter: patch extraction at neighbor indices (video → patches).

use nls_core::validate::check_input;
use nls_core::{Result, Tensor};

/// Fill `patches[q, k]` with the video patch anchored at `nl_inds[q, k]`.
pub fn forward(
    patches: &mut Tensor,
    vid: &Tensor,
    nl_inds: &Tensor,
    dilation: usize,
    reflect_bounds: bool,
) -> Result<()> {
    check_input(patches, "patches")?;
    check_input(vid, "vid")?;
    check_input(nl_inds, "nlInds")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::scatter_forward(
        patches, vid, nl_inds, dilation, reflect_bounds,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = (dilation, reflect_bounds);
        crate::no_cuda()
    };
    res
}

/// Accumulate `grad_patches` into `grad_vid` at `nl_inds`. The `exact`
/// flag selects the deterministic kernel over the atomic-add one.
pub fn backward(
    grad_vid: &mut Tensor,
    grad_patches: &Tensor,
    nl_inds: &Tensor,
    dilation: usize,
    reflect_bounds: bool,
    exact: bool,
) -> Result<()> {
    check_input(grad_vid, "grad_vid")?;
    check_input(grad_patches, "grad_patches")?;
    check_input(nl_inds, "nlInds")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::scatter_backward(
        grad_vid,
        grad_patches,
        nl_inds,
        dilation,
        reflect_bounds,
        exact,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = (dilation, reflect_bounds, exact);
        crate::no_cuda()
    };
    res
}
