//! Search: k-nearest patch search within one video.

use nls_core::validate::check_input;
use nls_core::{Result, Tensor};
use nls_kernels::SearchParams;

/// Write the `k` nearest neighbors of each query into `nl_dists`/`nl_inds`
/// (ascending; unfilled slots get `INFINITY` and `-1`).
pub fn forward(
    nl_dists: &mut Tensor,
    nl_inds: &mut Tensor,
    vid: &Tensor,
    query_inds: &Tensor,
    fflow: &Tensor,
    bflow: &Tensor,
    params: &SearchParams,
) -> Result<()> {
    check_input(nl_dists, "nlDists")?;
    check_input(nl_inds, "nlInds")?;
    check_input(vid, "vid")?;
    check_input(query_inds, "queryInds")?;
    check_input(fflow, "fflow")?;
    check_input(bflow, "bflow")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::search_forward(
        nl_dists, nl_inds, vid, query_inds, fflow, bflow, params,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = params;
        crate::no_cuda()
    };
    res
}

/// Propagate distance gradients back into `grad_vid`.
pub fn backward(
    grad_vid: &mut Tensor,
    vid: &Tensor,
    query_inds: &Tensor,
    grad_dists: &Tensor,
    nl_inds: &Tensor,
    params: &SearchParams,
) -> Result<()> {
    check_input(grad_vid, "grad_vid")?;
    check_input(vid, "vid")?;
    check_input(query_inds, "queryInds")?;
    check_input(grad_dists, "grad_dists")?;
    check_input(nl_inds, "nlInds")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::search_backward(
        grad_vid, vid, query_inds, grad_dists, nl_inds, params,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = params;
        crate::no_cuda()
    };
    res
}
