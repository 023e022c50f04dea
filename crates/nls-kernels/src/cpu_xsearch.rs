//! Cross search: patch search from one video into another.
//!
//! Queries live in `vid0`, candidates in `vid1`. With `use_k` off the full
//! window is emitted in scan order (temporal offset outermost, then the
//! spatial window row-major), so `K` must equal `(2*wt + 1) * ws * ws`.

use nls_core::{NlsError, Result, Tensor};

use crate::cpu_search::{patch_l2, patch_pixel, window_centers, VidView};
use crate::{expect_ndim, f32s, f32s_mut, i32s, i32s_mut, inds_dims};

/// Scalar parameters for the cross-search passes.
#[derive(Debug, Clone, Copy)]
pub struct XSearchParams {
    /// Neighbors to keep when `use_k` is set.
    pub k: usize,
    /// Spatial patch size.
    pub ps: usize,
    /// Temporal patch extent.
    pub pt: usize,
    /// Spatial window size.
    pub ws: usize,
    /// Temporal window radius.
    pub wt: usize,
    /// Channels entering the distance.
    pub chnls: usize,
    /// Patch dilation.
    pub dilation: usize,
    /// Step between window samples in `vid1`.
    pub stride1: usize,
    /// Keep the k nearest instead of the whole window.
    pub use_k: bool,
    /// Reflect patch pixels at frame edges instead of skipping them.
    pub reflect_bounds: bool,
}

impl XSearchParams {
    /// Output slots per query.
    pub fn out_k(&self) -> usize {
        if self.use_k {
            self.k
        } else {
            (2 * self.wt + 1) * self.ws * self.ws
        }
    }
}

/// Search `vid1` for the neighbors of each query patch in `vid0`.
pub fn xsearch_forward(
    nl_dists: &mut Tensor,
    nl_inds: &mut Tensor,
    vid0: &Tensor,
    vid1: &Tensor,
    query_inds: &Tensor,
    fflow: &Tensor,
    bflow: &Tensor,
    p: &XSearchParams,
) -> Result<()> {
    let v0 = VidView::new(vid0, "vid0")?;
    let v1 = VidView::new(vid1, "vid1")?;
    expect_ndim(query_inds, 2, "queryInds")?;
    let nq = query_inds.shape().dims()[0];
    let out_k = p.out_k();
    let (dnq, k_sz) = inds_dims(nl_inds, "nlInds")?;
    if dnq != nq || k_sz != out_k || nl_dists.shape().dims() != [nq, out_k] {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, out_k],
            got: nl_dists.shape().dims().to_vec(),
        });
    }
    let q_inds = i32s(query_inds, "queryInds")?;
    let fview = VidView::new(fflow, "fflow")?;
    let bview = VidView::new(bflow, "bflow")?;

    let dil = p.dilation as isize;
    let ws_half = (p.ws / 2) as isize;
    let step = p.stride1 as isize;

    let mut results: Vec<(f32, [i32; 3])> = Vec::with_capacity(nq * out_k);
    for qi in 0..nq {
        let q = (
            q_inds[qi * 3] as usize,
            q_inds[qi * 3 + 1] as usize,
            q_inds[qi * 3 + 2] as usize,
        );
        let centers = window_centers(q, v1.t, p.wt, Some(&fview), Some(&bview));

        let mut found: Vec<(f32, [i32; 3])> = Vec::with_capacity(centers.len() * p.ws * p.ws);
        for center in &centers {
            for wi in 0..p.ws {
                for wj in 0..p.ws {
                    let Some((tj, ch, cw)) = *center else {
                        if !p.use_k {
                            found.push((f32::INFINITY, [-1, -1, -1]));
                        }
                        continue;
                    };
                    let nh = ch as isize + (wi as isize - ws_half) * step;
                    let nw = cw as isize + (wj as isize - ws_half) * step;
                    if nh < 0 || nh >= v1.h as isize || nw < 0 || nw >= v1.w as isize {
                        if !p.use_k {
                            found.push((f32::INFINITY, [-1, -1, -1]));
                        }
                        continue;
                    }
                    let n = (tj, nh as usize, nw as usize);
                    let d = patch_l2(&v0, &v1, q, n, p.ps, p.pt, p.chnls, dil, p.reflect_bounds);
                    found.push((d, [n.0 as i32, n.1 as i32, n.2 as i32]));
                }
            }
        }
        if p.use_k {
            found.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            found.truncate(p.k);
            while found.len() < p.k {
                found.push((f32::INFINITY, [-1, -1, -1]));
            }
        }
        results.extend(found);
    }

    let dists = f32s_mut(nl_dists, "nlDists")?;
    for (i, r) in results.iter().enumerate() {
        dists[i] = r.0;
    }
    let inds = i32s_mut(nl_inds, "nlInds")?;
    for (i, r) in results.iter().enumerate() {
        inds[i * 3..i * 3 + 3].copy_from_slice(&r.1);
    }
    Ok(())
}

/// Propagate distance gradients to both videos.
#[allow(clippy::too_many_arguments)]
pub fn xsearch_backward(
    grad_vid0: &mut Tensor,
    grad_vid1: &mut Tensor,
    vid0: &Tensor,
    vid1: &Tensor,
    query_inds: &Tensor,
    grad_dists: &Tensor,
    nl_inds: &Tensor,
    p: &XSearchParams,
) -> Result<()> {
    let v0 = VidView::new(vid0, "vid0")?;
    let v1 = VidView::new(vid1, "vid1")?;
    if grad_vid0.shape() != vid0.shape() || grad_vid1.shape() != vid1.shape() {
        return Err(NlsError::ShapeMismatch {
            expected: vid0.shape().dims().to_vec(),
            got: grad_vid0.shape().dims().to_vec(),
        });
    }
    expect_ndim(query_inds, 2, "queryInds")?;
    let nq = query_inds.shape().dims()[0];
    let (dnq, k_sz) = inds_dims(nl_inds, "nlInds")?;
    if dnq != nq || grad_dists.shape().dims() != [nq, k_sz] {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, k_sz],
            got: grad_dists.shape().dims().to_vec(),
        });
    }
    let q_inds = i32s(query_inds, "queryInds")?;
    let n_inds = i32s(nl_inds, "nlInds")?;
    let g_dists = f32s(grad_dists, "grad_dists")?;

    let dil = p.dilation as isize;
    let (h0i, w0i) = (v0.h as isize, v0.w as isize);
    let (h1i, w1i) = (v1.h as isize, v1.w as isize);

    // Accumulate into scratch, then add once into the outputs.
    let mut g0 = vec![0.0f32; v0.data.len()];
    let mut g1 = vec![0.0f32; v1.data.len()];

    for qi in 0..nq {
        let q = (
            q_inds[qi * 3] as usize,
            q_inds[qi * 3 + 1] as usize,
            q_inds[qi * 3 + 2] as usize,
        );
        for k in 0..k_sz {
            let ibase = (qi * k_sz + k) * 3;
            let (nt, nh, nw) = (
                n_inds[ibase] as isize,
                n_inds[ibase + 1] as isize,
                n_inds[ibase + 2] as isize,
            );
            if nt < 0 || nh < 0 || nw < 0 {
                continue;
            }
            let n = (nt as usize, nh as usize, nw as usize);
            let g = g_dists[qi * k_sz + k];
            for pk in 0..p.pt {
                let t0 = (q.0 + pk).min(v0.t - 1);
                let t1 = (n.0 + pk).min(v1.t - 1);
                for pi in 0..p.ps {
                    for pj in 0..p.ps {
                        let p0 = patch_pixel(
                            q.1 as isize,
                            q.2 as isize,
                            pi,
                            pj,
                            p.ps,
                            dil,
                            h0i,
                            w0i,
                            p.reflect_bounds,
                        );
                        let p1 = patch_pixel(
                            n.1 as isize,
                            n.2 as isize,
                            pi,
                            pj,
                            p.ps,
                            dil,
                            h1i,
                            w1i,
                            p.reflect_bounds,
                        );
                        let (Some((qh, qw)), Some((nh2, nw2))) = (p0, p1) else {
                            continue;
                        };
                        for ci in 0..p.chnls {
                            let diff = v0.at(t0, ci, qh, qw) - v1.at(t1, ci, nh2, nw2);
                            let i0 = ((t0 * v0.c + ci) * v0.h + qh) * v0.w + qw;
                            let i1 = ((t1 * v1.c + ci) * v1.h + nh2) * v1.w + nw2;
                            g0[i0] += 2.0 * diff * g;
                            g1[i1] -= 2.0 * diff * g;
                        }
                    }
                }
            }
        }
    }

    let out0 = f32s_mut(grad_vid0, "grad_vid0")?;
    for (o, v) in out0.iter_mut().zip(&g0) {
        *o += *v;
    }
    let out1 = f32s_mut(grad_vid1, "grad_vid1")?;
    for (o, v) in out1.iter_mut().zip(&g1) {
        *o += *v;
    }
    Ok(())
}
