//! Cross search: patch search from one video into another.

use nls_core::validate::check_input;
use nls_core::{Result, Tensor};
use nls_kernels::XSearchParams;

/// Search `vid1` for the neighbors of each query patch in `vid0`. With
/// `use_k` off the whole window is emitted in scan order.
#[allow(clippy::too_many_arguments)]
pub fn forward(
    nl_dists: &mut Tensor,
    nl_inds: &mut Tensor,
    vid0: &Tensor,
    vid1: &Tensor,
    query_inds: &Tensor,
    fflow: &Tensor,
    bflow: &Tensor,
    params: &XSearchParams,
) -> Result<()> {
    check_input(nl_dists, "nlDists")?;
    check_input(nl_inds, "nlInds")?;
    check_input(vid0, "vid0")?;
    check_input(vid1, "vid1")?;
    check_input(query_inds, "queryInds")?;
    check_input(fflow, "fflow")?;
    check_input(bflow, "bflow")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::xsearch_forward(
        nl_dists, nl_inds, vid0, vid1, query_inds, fflow, bflow, params,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = params;
        crate::no_cuda()
    };
    res
}

/// Propagate distance gradients to both videos.
#[allow(clippy::too_many_arguments)]
pub fn backward(
    grad_vid0: &mut Tensor,
    grad_vid1: &mut Tensor,
    vid0: &Tensor,
    vid1: &Tensor,
    query_inds: &Tensor,
    grad_dists: &Tensor,
    nl_inds: &Tensor,
    params: &XSearchParams,
) -> Result<()> {
    check_input(grad_vid0, "grad_vid0")?;
    check_input(grad_vid1, "grad_vid1")?;
    check_input(vid0, "vid0")?;
    check_input(vid1, "vid1")?;
    check_input(query_inds, "queryInds")?;
    check_input(grad_dists, "grad_dists")?;
    check_input(nl_inds, "nlInds")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::xsearch_backward(
        grad_vid0, grad_vid1, vid0, vid1, query_inds, grad_dists, nl_inds, params,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = params;
        crate::no_cuda()
    };
    res
}
