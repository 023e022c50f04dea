//! Gather: weighted patch accumulation (patches → video).

use nls_core::validate::check_input;
use nls_core::{Result, Tensor};

/// Accumulate `exp(-lam * dist)`-weighted patches into `vid`, and the bare
/// weights into `wvid`, at the neighbor locations in `nl_inds`.
pub fn forward(
    vid: &mut Tensor,
    wvid: &mut Tensor,
    patches: &Tensor,
    nl_dists: &Tensor,
    nl_inds: &Tensor,
    lam: f32,
    dilation: usize,
) -> Result<()> {
    check_input(vid, "vid")?;
    check_input(wvid, "wvid")?;
    check_input(patches, "patches")?;
    check_input(nl_dists, "nlDists")?;
    check_input(nl_inds, "nlInds")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::gather_forward(
        vid, wvid, patches, nl_dists, nl_inds, lam, dilation,
    )
    .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = {
        let _ = (lam, dilation);
        crate::no_cuda()
    };
    res
}

/// Read patches back out of `grad_vid` at `nl_inds`. `nl_dists` is
/// validated for signature parity but does not enter the kernel.
pub fn backward(
    grad_vid: &Tensor,
    patches: &mut Tensor,
    nl_dists: &Tensor,
    nl_inds: &Tensor,
) -> Result<()> {
    check_input(grad_vid, "grad_vid")?;
    check_input(patches, "patches")?;
    check_input(nl_dists, "nlDists")?;
    check_input(nl_inds, "nlInds")?;

    #[cfg(feature = "cuda")]
    let res = nls_kernels::cuda::ops::gather_backward(patches, grad_vid, nl_inds)
        .map_err(nls_core::NlsError::from);
    #[cfg(not(feature = "cuda"))]
    let res = crate::no_cuda();
    res
}
