//! Search: k-nearest patch search within one video.
//!
//! For each query pixel the candidate set is a `ws x ws` spatial window in
//! each of the `2*wt + 1` frames reachable forward/backward in time, with
//! the window center tracked through accumulated optical flow. Distances
//! are unnormalized L2 over the first `chnls` channels.

use nls_core::{NlsError, Result, Tensor};

use crate::{expect_ndim, f32s, f32s_mut, i32s, i32s_mut, inds_dims, reflect, vid_dims};

/// Scalar parameters shared by the search passes.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Neighbors to keep.
    pub k: usize,
    /// Spatial patch size.
    pub ps: usize,
    /// Temporal patch extent.
    pub pt: usize,
    /// Spatial window size.
    pub ws: usize,
    /// Temporal window radius (frames each direction).
    pub wt: usize,
    /// Channels entering the distance.
    pub chnls: usize,
    /// Patch dilation.
    pub dilation: usize,
    /// Step between window samples.
    pub stride: usize,
    /// Reflect patch pixels at frame edges instead of skipping them.
    pub reflect_bounds: bool,
}

pub(crate) struct VidView<'a> {
    pub data: &'a [f32],
    pub t: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl<'a> VidView<'a> {
    pub fn new(t: &'a Tensor, arg: &str) -> Result<Self> {
        let (ts, cs, hs, wsz) = vid_dims(t, arg)?;
        Ok(Self {
            data: f32s(t, arg)?,
            t: ts,
            c: cs,
            h: hs,
            w: wsz,
        })
    }

    #[inline]
    pub fn at(&self, t: usize, c: usize, h: usize, w: usize) -> f32 {
        self.data[((t * self.c + c) * self.h + h) * self.w + w]
    }
}

/// Map a patch pixel to a frame pixel, reflecting or rejecting at borders.
#[inline]
pub(crate) fn patch_pixel(
    h0: isize,
    w0: isize,
    pi: usize,
    pj: usize,
    ps: usize,
    dil: isize,
    hi: isize,
    wi: isize,
    reflect_bounds: bool,
) -> Option<(usize, usize)> {
    let ps_half = (ps / 2) as isize;
    let mut h1 = h0 + dil * (pi as isize - ps_half);
    let mut w1 = w0 + dil * (pj as isize - ps_half);
    if reflect_bounds {
        h1 = reflect(h1, hi);
        w1 = reflect(w1, wi);
    } else if h1 < 0 || h1 >= hi || w1 < 0 || w1 >= wi {
        return None;
    }
    Some((h1 as usize, w1 as usize))
}

/// Unnormalized L2 distance between the patch at `q` in `v0` and the patch
/// at `n` in `v1`. Pixels falling outside either frame contribute nothing.
#[allow(clippy::too_many_arguments)]
pub(crate) fn patch_l2(
    v0: &VidView<'_>,
    v1: &VidView<'_>,
    q: (usize, usize, usize),
    n: (usize, usize, usize),
    ps: usize,
    pt: usize,
    chnls: usize,
    dil: isize,
    reflect_bounds: bool,
) -> f32 {
    let (hi0, wi0) = (v0.h as isize, v0.w as isize);
    let (hi1, wi1) = (v1.h as isize, v1.w as isize);
    let mut acc = 0.0f32;
    for pk in 0..pt {
        let t0 = (q.0 + pk).min(v0.t - 1);
        let t1 = (n.0 + pk).min(v1.t - 1);
        for pi in 0..ps {
            for pj in 0..ps {
                let p0 = patch_pixel(
                    q.1 as isize,
                    q.2 as isize,
                    pi,
                    pj,
                    ps,
                    dil,
                    hi0,
                    wi0,
                    reflect_bounds,
                );
                let p1 = patch_pixel(
                    n.1 as isize,
                    n.2 as isize,
                    pi,
                    pj,
                    ps,
                    dil,
                    hi1,
                    wi1,
                    reflect_bounds,
                );
                let (Some((h0, w0)), Some((h1, w1))) = (p0, p1) else {
                    continue;
                };
                for ci in 0..chnls {
                    let d = v0.at(t0, ci, h0, w0) - v1.at(t1, ci, h1, w1);
                    acc += d * d;
                }
            }
        }
    }
    acc
}

/// Candidate window centers per temporal offset, tracked through flow.
///
/// Slot order is `dt = -wt ..= wt`; frames out of range yield `None`.
pub(crate) fn window_centers(
    q: (usize, usize, usize),
    t_sz: usize,
    wt: usize,
    fflow: Option<&VidView<'_>>,
    bflow: Option<&VidView<'_>>,
) -> Vec<Option<(usize, usize, usize)>> {
    let mut centers = vec![None; 2 * wt + 1];
    centers[wt] = Some(q);

    // Forward chain: follow fflow from the query frame.
    let (mut ch, mut cw) = (q.1 as f32, q.2 as f32);
    for dt in 1..=wt {
        let tj = q.0 + dt;
        if tj >= t_sz {
            break;
        }
        if let Some(flow) = fflow {
            let rh = (ch.round().max(0.0) as usize).min(flow.h - 1);
            let rw = (cw.round().max(0.0) as usize).min(flow.w - 1);
            cw += flow.at(tj - 1, 0, rh, rw);
            ch += flow.at(tj - 1, 1, rh, rw);
        }
        let hj = ch.round() as isize;
        let wj = cw.round() as isize;
        if hj >= 0 && wj >= 0 {
            centers[wt + dt] = Some((tj, hj as usize, wj as usize));
        }
    }

    // Backward chain: follow bflow from the query frame.
    let (mut ch, mut cw) = (q.1 as f32, q.2 as f32);
    for dt in 1..=wt {
        if dt > q.0 {
            break;
        }
        let tj = q.0 - dt;
        if let Some(flow) = bflow {
            let rh = (ch.round().max(0.0) as usize).min(flow.h - 1);
            let rw = (cw.round().max(0.0) as usize).min(flow.w - 1);
            cw += flow.at(tj + 1, 0, rh, rw);
            ch += flow.at(tj + 1, 1, rh, rw);
        }
        let hj = ch.round() as isize;
        let wj = cw.round() as isize;
        if hj >= 0 && wj >= 0 {
            centers[wt - dt] = Some((tj, hj as usize, wj as usize));
        }
    }
    centers
}

/// Write the `k` nearest neighbors of each query into `nl_dists`/`nl_inds`
/// (ascending; unfilled slots get `INFINITY` and `-1`).
pub fn search_forward(
    nl_dists: &mut Tensor,
    nl_inds: &mut Tensor,
    vid: &Tensor,
    query_inds: &Tensor,
    fflow: &Tensor,
    bflow: &Tensor,
    p: &SearchParams,
) -> Result<()> {
    let v = VidView::new(vid, "vid")?;
    expect_ndim(query_inds, 2, "queryInds")?;
    let nq = query_inds.shape().dims()[0];
    let (dnq, k_sz) = inds_dims(nl_inds, "nlInds")?;
    if dnq != nq || k_sz != p.k || nl_dists.shape().dims() != [nq, p.k] {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, p.k],
            got: nl_dists.shape().dims().to_vec(),
        });
    }
    let q_inds = i32s(query_inds, "queryInds")?;
    let fview = VidView::new(fflow, "fflow")?;
    let bview = VidView::new(bflow, "bflow")?;

    let dil = p.dilation as isize;
    let ws_half = (p.ws / 2) as isize;
    let step = p.stride as isize;

    // Gather results before taking the mutable output borrows.
    let mut results: Vec<(f32, [i32; 3])> = Vec::with_capacity(nq * p.k);
    for qi in 0..nq {
        let q = (
            q_inds[qi * 3] as usize,
            q_inds[qi * 3 + 1] as usize,
            q_inds[qi * 3 + 2] as usize,
        );
        let centers = window_centers(q, v.t, p.wt, Some(&fview), Some(&bview));

        let mut found: Vec<(f32, [i32; 3])> = Vec::new();
        for center in centers.iter().flatten() {
            let (tj, ch, cw) = *center;
            for wi in 0..p.ws {
                for wj in 0..p.ws {
                    let nh = ch as isize + (wi as isize - ws_half) * step;
                    let nw = cw as isize + (wj as isize - ws_half) * step;
                    if nh < 0 || nh >= v.h as isize || nw < 0 || nw >= v.w as isize {
                        continue;
                    }
                    let n = (tj, nh as usize, nw as usize);
                    let d = patch_l2(&v, &v, q, n, p.ps, p.pt, p.chnls, dil, p.reflect_bounds);
                    found.push((d, [n.0 as i32, n.1 as i32, n.2 as i32]));
                }
            }
        }
        found.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        found.truncate(p.k);
        while found.len() < p.k {
            found.push((f32::INFINITY, [-1, -1, -1]));
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

/// Propagate distance gradients back to the video:
/// `d = sum (v[p_q] - v[p_n])^2` gives `grad_vid[p_q] += 2*(..)*g` and
/// `grad_vid[p_n] -= 2*(..)*g`.
pub fn search_backward(
    grad_vid: &mut Tensor,
    vid: &Tensor,
    query_inds: &Tensor,
    grad_dists: &Tensor,
    nl_inds: &Tensor,
    p: &SearchParams,
) -> Result<()> {
    let v = VidView::new(vid, "vid")?;
    if grad_vid.shape() != vid.shape() {
        return Err(NlsError::ShapeMismatch {
            expected: vid.shape().dims().to_vec(),
            got: grad_vid.shape().dims().to_vec(),
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
    let gv = f32s_mut(grad_vid, "grad_vid")?;

    let (hi, wi) = (v.h as isize, v.w as isize);
    let dil = p.dilation as isize;

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
                let t0 = (q.0 + pk).min(v.t - 1);
                let t1 = (n.0 + pk).min(v.t - 1);
                for pi in 0..p.ps {
                    for pj in 0..p.ps {
                        let p0 = patch_pixel(
                            q.1 as isize,
                            q.2 as isize,
                            pi,
                            pj,
                            p.ps,
                            dil,
                            hi,
                            wi,
                            p.reflect_bounds,
                        );
                        let p1 = patch_pixel(
                            n.1 as isize,
                            n.2 as isize,
                            pi,
                            pj,
                            p.ps,
                            dil,
                            hi,
                            wi,
                            p.reflect_bounds,
                        );
                        let (Some((h0, w0)), Some((h1, w1))) = (p0, p1) else {
                            continue;
                        };
                        for ci in 0..p.chnls {
                            let diff = v.at(t0, ci, h0, w0) - v.at(t1, ci, h1, w1);
                            let i0 = ((t0 * v.c + ci) * v.h + h0) * v.w + w0;
                            let i1 = ((t1 * v.c + ci) * v.h + h1) * v.w + w1;
                            gv[i0] += 2.0 * diff * g;
                            gv[i1] -= 2.0 * diff * g;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nls_core::{DType, Tensor};

    fn zero_flow(t: usize, h: usize, w: usize) -> Tensor {
        Tensor::zeros(&[t, 2, h, w], DType::F32)
    }

    fn params(k: usize, ps: usize, ws: usize, wt: usize) -> SearchParams {
        SearchParams {
            k,
            ps,
            pt: 1,
            ws,
            wt,
            chnls: 1,
            dilation: 1,
            stride: 1,
            reflect_bounds: true,
        }
    }

    #[test]
    fn test_self_match_is_nearest() {
        let data: Vec<f32> = (0..36).map(|i| (i * i % 17) as f32).collect();
        let vid = Tensor::from_f32(&data, &[1, 1, 6, 6]);
        let queries = Tensor::from_i32(&[0, 3, 3], &[1, 3]);
        let p = params(1, 3, 3, 0);
        let mut dists = Tensor::zeros(&[1, 1], DType::F32);
        let mut inds = Tensor::zeros(&[1, 1, 3], DType::I32);
        search_forward(
            &mut dists,
            &mut inds,
            &vid,
            &queries,
            &zero_flow(1, 6, 6),
            &zero_flow(1, 6, 6),
            &p,
        )
        .unwrap();
        assert_eq!(dists.as_f32_slice().unwrap()[0], 0.0);
        assert_eq!(inds.as_i32_slice().unwrap(), &[0, 3, 3]);
    }

    #[test]
    fn test_topk_sorted_ascending() {
        let data: Vec<f32> = (0..25).map(|i| i as f32).collect();
        let vid = Tensor::from_f32(&data, &[1, 1, 5, 5]);
        let queries = Tensor::from_i32(&[0, 2, 2], &[1, 3]);
        let p = params(4, 1, 3, 0);
        let mut dists = Tensor::zeros(&[1, 4], DType::F32);
        let mut inds = Tensor::zeros(&[1, 4, 3], DType::I32);
        search_forward(
            &mut dists,
            &mut inds,
            &vid,
            &queries,
            &zero_flow(1, 5, 5),
            &zero_flow(1, 5, 5),
            &p,
        )
        .unwrap();
        let d = dists.as_f32_slice().unwrap();
        assert_eq!(d[0], 0.0);
        assert!(d.windows(2).all(|w| w[0] <= w[1]));
        // 1x1 patches on a ramp: nearest non-self values differ by 1.
        assert_eq!(d[1], 1.0);
        assert_eq!(d[2], 1.0);
    }

    #[test]
    fn test_unfilled_slots_marked_invalid() {
        // ws=1 window has a single candidate; ask for k=3.
        let vid = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[1, 1, 2, 2]);
        let queries = Tensor::from_i32(&[0, 0, 0], &[1, 3]);
        let p = params(3, 1, 1, 0);
        let mut dists = Tensor::zeros(&[1, 3], DType::F32);
        let mut inds = Tensor::zeros(&[1, 3, 3], DType::I32);
        search_forward(
            &mut dists,
            &mut inds,
            &vid,
            &queries,
            &zero_flow(1, 2, 2),
            &zero_flow(1, 2, 2),
            &p,
        )
        .unwrap();
        let d = dists.as_f32_slice().unwrap();
        let i = inds.as_i32_slice().unwrap();
        assert_eq!(d[0], 0.0);
        assert!(d[1].is_infinite() && d[2].is_infinite());
        assert_eq!(&i[3..9], &[-1, -1, -1, -1, -1, -1]);
    }

    #[test]
    fn test_temporal_window_spans_frames() {
        // Identical frames: the same pixel in the other frame is also
        // distance zero.
        let frame: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let mut data = frame.clone();
        data.extend_from_slice(&frame);
        let vid = Tensor::from_f32(&data, &[2, 1, 4, 4]);
        let queries = Tensor::from_i32(&[0, 2, 2], &[1, 3]);
        let p = params(2, 1, 1, 1);
        let mut dists = Tensor::zeros(&[1, 2], DType::F32);
        let mut inds = Tensor::zeros(&[1, 2, 3], DType::I32);
        search_forward(
            &mut dists,
            &mut inds,
            &vid,
            &queries,
            &zero_flow(2, 4, 4),
            &zero_flow(2, 4, 4),
            &p,
        )
        .unwrap();
        let d = dists.as_f32_slice().unwrap();
        assert_eq!(d[0], 0.0);
        assert_eq!(d[1], 0.0);
        let i = inds.as_i32_slice().unwrap();
        // Both hits are at (h,w) = (2,2), frames 0 and 1.
        assert_eq!(&i[1..3], &[2, 2]);
        assert_eq!(&i[4..6], &[2, 2]);
    }

    #[test]
    fn test_backward_single_pixel_gradient() {
        // 1x1 patch, one query/neighbor pair: d = (a - b)^2.
        let vid = Tensor::from_f32(&[5.0, 2.0, 0.0, 0.0], &[1, 1, 2, 2]);
        let queries = Tensor::from_i32(&[0, 0, 0], &[1, 3]);
        let n_inds = Tensor::from_i32(&[0, 0, 1], &[1, 1, 3]);
        let g = Tensor::from_f32(&[1.0], &[1, 1]);
        let mut gv = Tensor::zeros(&[1, 1, 2, 2], DType::F32);
        let p = params(1, 1, 1, 0);
        search_backward(&mut gv, &vid, &queries, &g, &n_inds, &p).unwrap();
        let out = gv.as_f32_slice().unwrap();
        // d(a-b)^2/da = 2(a-b) = 6, d/db = -6
        assert_eq!(out[0], 6.0);
        assert_eq!(out[1], -6.0);
    }
}
