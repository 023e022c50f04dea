//! Weighted patch sum: fused scatter + per-neighbor weighted reduction.

use nls_core::validate::check_input;
use nls_core::{Result, Tensor};
use nls_kernels::WpsumParams;

/// Accumulate `sum_k dists[q,k] * patch(inds[q,k])` into `wpatches`.
pub fn forward(
    wpatches: &mut Tensor,
    vid: &Tensor,
    dists: &Tensor,
    inds: &Tensor,
    params: &WpsumParams,
) -> Result<()> {
    check_input(wpatches, "wpatches")?;
    check_input(vid, "vid")?;
    check_input(dists, "nlDists")?;
    check_input(inds, "nlInds")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::wpsum_forward(wpatches, vid, dists, inds, params)
        .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = params;
        crate::no_cuda()
    };
    res
}

/// Backward pass: gradients for both the video and the weights.
pub fn backward(
    grad_vid: &mut Tensor,
    grad_dists: &mut Tensor,
    vid: &Tensor,
    dists: &Tensor,
    inds: &Tensor,
    grad_wpatches: &Tensor,
    params: &WpsumParams,
) -> Result<()> {
    check_input(grad_vid, "grad_vid")?;
    check_input(grad_dists, "grad_dists")?;
    check_input(vid, "vid")?;
    check_input(dists, "nlDists")?;
    check_input(inds, "nlInds")?;
    check_input(grad_wpatches, "grad_wpatches")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::wpsum_backward(
        grad_vid,
        grad_dists,
        vid,
        dists,
        inds,
        grad_wpatches,
        params,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = params;
        crate::no_cuda()
    };
    res
}
