//! Weighted patch sum: fuse scatter and the per-neighbor weighted
//! reduction into a single pass.
//!
//! Each output patch is `sum_k dists[q,k] * patch(inds[q,k])`, so the
//! `[NQ, K, ...]` patch tensor never materializes; the result is
//! `[NQ, PT, C, PS, PS]`.

use nls_core::{NlsError, Result, Tensor};

use crate::{f32s, f32s_mut, i32s, inds_dims, reflect, vid_dims};

/// Scalar parameters for the weighted-sum passes.
#[derive(Debug, Clone, Copy)]
pub struct WpsumParams {
    /// Additive row offset applied when reading frame pixels.
    pub h_off: isize,
    /// Additive column offset applied when reading frame pixels.
    pub w_off: isize,
    /// Patch dilation.
    pub dilation: usize,
    /// Anchor offset added to both patch axes.
    pub adj: isize,
    /// Reflect reads at frame edges instead of dropping them.
    pub reflect_bounds: bool,
}

/// `[NQ, PT, C, PS, PS]` weighted-patch dims; the two trailing dims must match.
fn wpatch_dims(t: &Tensor, arg: &str) -> Result<(usize, usize, usize, usize)> {
    crate::expect_ndim(t, 5, arg)?;
    let d = t.shape().dims();
    if d[3] != d[4] {
        return Err(NlsError::ShapeMismatch {
            expected: vec![d[3], d[3]],
            got: vec![d[3], d[4]],
        });
    }
    Ok((d[0], d[1], d[2], d[3]))
}

#[inline]
fn read_pixel(
    h0: isize,
    w0: isize,
    pi: usize,
    pj: usize,
    ps: usize,
    p: &WpsumParams,
    hi: isize,
    wi: isize,
) -> Option<(usize, usize)> {
    let ps_half = (ps / 2) as isize;
    let dil = p.dilation as isize;
    let mut h1 = h0 + dil * (pi as isize - ps_half) + p.adj + p.h_off;
    let mut w1 = w0 + dil * (pj as isize - ps_half) + p.adj + p.w_off;
    if p.reflect_bounds {
        h1 = reflect(h1, hi);
        w1 = reflect(w1, wi);
    } else if h1 < 0 || h1 >= hi || w1 < 0 || w1 >= wi {
        return None;
    }
    Some((h1 as usize, w1 as usize))
}

/// Accumulate the weighted patch sum of each query into `wpatches`.
pub fn wpsum_forward(
    wpatches: &mut Tensor,
    vid: &Tensor,
    dists: &Tensor,
    inds: &Tensor,
    p: &WpsumParams,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(vid, "vid")?;
    let (nq, pt, pc, ps) = wpatch_dims(wpatches, "wpatches")?;
    let (dnq, k_sz) = inds_dims(inds, "nlInds")?;
    if dnq != nq || pc != c_sz || dists.shape().dims() != [nq, k_sz] {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, k_sz],
            got: dists.shape().dims().to_vec(),
        });
    }
    let v = f32s(vid, "vid")?;
    let d = f32s(dists, "nlDists")?;
    let n_inds = i32s(inds, "nlInds")?;
    let out = f32s_mut(wpatches, "wpatches")?;

    let (hi, wi) = (h_sz as isize, w_sz as isize);
    for q in 0..nq {
        for k in 0..k_sz {
            let ibase = (q * k_sz + k) * 3;
            let (nt, nh, nw) = (
                n_inds[ibase] as isize,
                n_inds[ibase + 1] as isize,
                n_inds[ibase + 2] as isize,
            );
            if nt < 0 {
                continue;
            }
            let weight = d[q * k_sz + k];
            for pk in 0..pt {
                let t1 = (nt as usize + pk).min(t_sz - 1);
                for pi in 0..ps {
                    for pj in 0..ps {
                        let Some((h1, w1)) = read_pixel(nh, nw, pi, pj, ps, p, hi, wi) else {
                            continue;
                        };
                        for ci in 0..c_sz {
                            let pidx = (((q * pt + pk) * c_sz + ci) * ps + pi) * ps + pj;
                            out[pidx] += weight * v[((t1 * c_sz + ci) * h_sz + h1) * w_sz + w1];
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Backward pass: gradients for both the video and the weights.
pub fn wpsum_backward(
    grad_vid: &mut Tensor,
    grad_dists: &mut Tensor,
    vid: &Tensor,
    dists: &Tensor,
    inds: &Tensor,
    grad_wpatches: &Tensor,
    p: &WpsumParams,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(vid, "vid")?;
    let (nq, pt, pc, ps) = wpatch_dims(grad_wpatches, "grad_wpatches")?;
    let (dnq, k_sz) = inds_dims(inds, "nlInds")?;
    if dnq != nq || pc != c_sz || dists.shape().dims() != [nq, k_sz] {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, k_sz],
            got: dists.shape().dims().to_vec(),
        });
    }
    if grad_vid.shape() != vid.shape() || grad_dists.shape() != dists.shape() {
        return Err(NlsError::ShapeMismatch {
            expected: vid.shape().dims().to_vec(),
            got: grad_vid.shape().dims().to_vec(),
        });
    }
    let v = f32s(vid, "vid")?;
    let d = f32s(dists, "nlDists")?;
    let n_inds = i32s(inds, "nlInds")?;
    let g_patches = f32s(grad_wpatches, "grad_wpatches")?;

    let mut gv = vec![0.0f32; v.len()];
    let mut gd = vec![0.0f32; d.len()];

    let (hi, wi) = (h_sz as isize, w_sz as isize);
    for q in 0..nq {
        for k in 0..k_sz {
            let ibase = (q * k_sz + k) * 3;
            let (nt, nh, nw) = (
                n_inds[ibase] as isize,
                n_inds[ibase + 1] as isize,
                n_inds[ibase + 2] as isize,
            );
            if nt < 0 {
                continue;
            }
            let weight = d[q * k_sz + k];
            for pk in 0..pt {
                let t1 = (nt as usize + pk).min(t_sz - 1);
                for pi in 0..ps {
                    for pj in 0..ps {
                        let Some((h1, w1)) = read_pixel(nh, nw, pi, pj, ps, p, hi, wi) else {
                            continue;
                        };
                        for ci in 0..c_sz {
                            let pidx = (((q * pt + pk) * c_sz + ci) * ps + pi) * ps + pj;
                            let vidx = ((t1 * c_sz + ci) * h_sz + h1) * w_sz + w1;
                            let g = g_patches[pidx];
                            gv[vidx] += weight * g;
                            gd[q * k_sz + k] += v[vidx] * g;
                        }
                    }
                }
            }
        }
    }

    let out_v = f32s_mut(grad_vid, "grad_vid")?;
    for (o, g) in out_v.iter_mut().zip(&gv) {
        *o += *g;
    }
    let out_d = f32s_mut(grad_dists, "grad_dists")?;
    for (o, g) in out_d.iter_mut().zip(&gd) {
        *o += *g;
    }
    Ok(())
}
