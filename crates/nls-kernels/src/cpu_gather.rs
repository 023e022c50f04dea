//! Gather: weighted patch accumulation (patches → video).
//!
//! Forward adds `exp(-lam * dist)`-weighted patch values into `vid` and the
//! bare weights into `wvid`, so `vid / wvid` is the weighted average once
//! every query has been gathered. Backward reads patches back out of the
//! incoming video gradient; weights do not enter the backward kernel.

use nls_core::{NlsError, Result, Tensor};

use crate::{f32s, f32s_mut, i32s, inds_dims, patch_dims, vid_dims};

/// Accumulate weighted patches into `vid`/`wvid` at `nl_inds`.
///
/// Weight for neighbor `k` of query `q` is `exp(-lam * nl_dists[q,k])`;
/// `lam == 0` gives unit weights. Out-of-frame pixels and `-1` neighbors
/// are skipped.
pub fn gather_forward(
    vid: &mut Tensor,
    wvid: &mut Tensor,
    patches: &Tensor,
    nl_dists: &Tensor,
    nl_inds: &Tensor,
    lam: f32,
    dilation: usize,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(vid, "vid")?;
    if wvid.shape() != vid.shape() {
        return Err(NlsError::ShapeMismatch {
            expected: vid.shape().dims().to_vec(),
            got: wvid.shape().dims().to_vec(),
        });
    }
    let (nq, k_sz, pt, pc, ps) = patch_dims(patches, "patches")?;
    let (inq, ik) = inds_dims(nl_inds, "nlInds")?;
    if (inq, ik) != (nq, k_sz) || pc != c_sz || nl_dists.shape().dims() != [nq, k_sz] {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, k_sz],
            got: nl_dists.shape().dims().to_vec(),
        });
    }

    let p = f32s(patches, "patches")?;
    let dists = f32s(nl_dists, "nlDists")?;
    let inds = i32s(nl_inds, "nlInds")?;

    let (ti, hi, wi) = (t_sz as isize, h_sz as isize, w_sz as isize);
    let ps_half = (ps / 2) as isize;
    let dil = dilation as isize;

    // Split mutable access: wvid borrows after vid.
    {
        let v = f32s_mut(vid, "vid")?;
        accumulate(
            v, p, dists, inds, nq, k_sz, pt, c_sz, ps, h_sz, w_sz, ti, hi, wi, ps_half, dil, lam,
            false,
        );
    }
    {
        let wv = f32s_mut(wvid, "wvid")?;
        accumulate(
            wv, p, dists, inds, nq, k_sz, pt, c_sz, ps, h_sz, w_sz, ti, hi, wi, ps_half, dil, lam,
            true,
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn accumulate(
    out: &mut [f32],
    patches: &[f32],
    dists: &[f32],
    inds: &[i32],
    nq: usize,
    k_sz: usize,
    pt: usize,
    c_sz: usize,
    ps: usize,
    h_sz: usize,
    w_sz: usize,
    ti: isize,
    hi: isize,
    wi: isize,
    ps_half: isize,
    dil: isize,
    lam: f32,
    weights_only: bool,
) {
    for q in 0..nq {
        for k in 0..k_sz {
            let ibase = (q * k_sz + k) * 3;
            let (t0, h0, w0) = (
                inds[ibase] as isize,
                inds[ibase + 1] as isize,
                inds[ibase + 2] as isize,
            );
            if t0 < 0 || h0 < 0 || w0 < 0 {
                continue;
            }
            let weight = (-lam * dists[q * k_sz + k]).exp();
            for pk in 0..pt {
                let t1 = t0 + pk as isize;
                if t1 >= ti {
                    continue;
                }
                for pi in 0..ps {
                    let h1 = h0 + dil * (pi as isize - ps_half);
                    if h1 < 0 || h1 >= hi {
                        continue;
                    }
                    for pj in 0..ps {
                        let w1 = w0 + dil * (pj as isize - ps_half);
                        if w1 < 0 || w1 >= wi {
                            continue;
                        }
                        for ci in 0..c_sz {
                            let vidx = ((t1 as usize * c_sz + ci) * h_sz + h1 as usize) * w_sz
                                + w1 as usize;
                            if weights_only {
                                out[vidx] += weight;
                            } else {
                                let pidx = ((((q * k_sz + k) * pt + pk) * c_sz + ci) * ps + pi)
                                    * ps
                                    + pj;
                                out[vidx] += weight * patches[pidx];
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Read patches out of `grad_vid` at `nl_inds` (the adjoint of unweighted
/// accumulation). `nl_dists` is accepted for signature parity with the
/// forward pass but does not enter the computation.
pub fn gather_backward(
    grad_vid: &Tensor,
    patches: &mut Tensor,
    nl_dists: &Tensor,
    nl_inds: &Tensor,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(grad_vid, "grad_vid")?;
    let (nq, k_sz, pt, pc, ps) = patch_dims(patches, "patches")?;
    let (inq, ik) = inds_dims(nl_inds, "nlInds")?;
    if (inq, ik) != (nq, k_sz) || pc != c_sz || nl_dists.shape().dims() != [nq, k_sz] {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, k_sz],
            got: nl_dists.shape().dims().to_vec(),
        });
    }

    let gv = f32s(grad_vid, "grad_vid")?;
    let inds = i32s(nl_inds, "nlInds")?;
    let p = f32s_mut(patches, "patches")?;

    let (ti, hi, wi) = (t_sz as isize, h_sz as isize, w_sz as isize);
    let ps_half = (ps / 2) as isize;

    for q in 0..nq {
        for k in 0..k_sz {
            let ibase = (q * k_sz + k) * 3;
            let (t0, h0, w0) = (
                inds[ibase] as isize,
                inds[ibase + 1] as isize,
                inds[ibase + 2] as isize,
            );
            if t0 < 0 || h0 < 0 || w0 < 0 {
                continue;
            }
            for pk in 0..pt {
                let t1 = t0 + pk as isize;
                for pi in 0..ps {
                    let h1 = h0 + pi as isize - ps_half;
                    for pj in 0..ps {
                        let w1 = w0 + pj as isize - ps_half;
                        let in_frame =
                            t1 < ti && h1 >= 0 && h1 < hi && w1 >= 0 && w1 < wi;
                        for ci in 0..c_sz {
                            let pidx =
                                ((((q * k_sz + k) * pt + pk) * c_sz + ci) * ps + pi) * ps + pj;
                            p[pidx] = if in_frame {
                                gv[((t1 as usize * c_sz + ci) * h_sz + h1 as usize) * w_sz
                                    + w1 as usize]
                            } else {
                                0.0
                            };
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
