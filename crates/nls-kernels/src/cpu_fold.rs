//! Fold: accumulate raster-grid patches into a video (patches → video).
//!
//! Queries enumerate a strided grid per frame: `nH = (H-1)/stride + 1`,
//! query `qStart + n` unravels over `[T, nH, nW]` and anchors at
//! `(t, ih*stride, iw*stride)`. Fold requires `K == 1` patches.

use nls_core::{NlsError, Result, Tensor};

use crate::{f32s, f32s_mut, patch_dims, vid_dims};

pub(crate) fn grid_size(len: usize, stride: usize) -> usize {
    (len - 1) / stride + 1
}

/// Unravel query `qi` over the `[T, nH, nW]` grid into an anchor pixel.
/// Returns `None` for queries past the end of the grid.
pub(crate) fn query_anchor(
    qi: usize,
    t_sz: usize,
    h_sz: usize,
    w_sz: usize,
    stride: usize,
) -> Option<(usize, usize, usize)> {
    let nh = grid_size(h_sz, stride);
    let nw = grid_size(w_sz, stride);
    if qi >= t_sz * nh * nw {
        return None;
    }
    let t = qi / (nh * nw);
    let rem = qi % (nh * nw);
    Some((t, (rem / nw) * stride, (rem % nw) * stride))
}

/// Accumulate `patches` into `vid` on the raster grid starting at `q_start`.
pub fn fold_forward(
    vid: &mut Tensor,
    patches: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(vid, "vid")?;
    let (nq, k_sz, pt, pc, ps) = patch_dims(patches, "patches")?;
    if k_sz != 1 || pc != c_sz {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, 1, pt, c_sz, ps, ps],
            got: patches.shape().dims().to_vec(),
        });
    }

    let p = f32s(patches, "patches")?;
    let v = f32s_mut(vid, "vid")?;

    let (ti, hi, wi) = (t_sz as isize, h_sz as isize, w_sz as isize);
    let ps_half = (ps / 2) as isize;
    let dil = dilation as isize;

    for n in 0..nq {
        let Some((t0, h0, w0)) = query_anchor(q_start + n, t_sz, h_sz, w_sz, stride) else {
            continue;
        };
        for pk in 0..pt {
            let t1 = t0 as isize + pk as isize;
            if t1 >= ti {
                continue;
            }
            for pi in 0..ps {
                let h1 = h0 as isize + dil * (pi as isize - ps_half);
                if h1 < 0 || h1 >= hi {
                    continue;
                }
                for pj in 0..ps {
                    let w1 = w0 as isize + dil * (pj as isize - ps_half);
                    if w1 < 0 || w1 >= wi {
                        continue;
                    }
                    for ci in 0..c_sz {
                        let pidx = (((n * pt + pk) * c_sz + ci) * ps + pi) * ps + pj;
                        let vidx = ((t1 as usize * c_sz + ci) * h_sz + h1 as usize) * w_sz
                            + w1 as usize;
                        v[vidx] += p[pidx];
                    }
                }
            }
        }
    }
    Ok(())
}

/// Extract grid patches from `grad_vid` (the adjoint of `fold_forward`).
pub fn fold_backward(
    grad_patches: &mut Tensor,
    grad_vid: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(grad_vid, "grad_vid")?;
    let (nq, k_sz, pt, pc, ps) = patch_dims(grad_patches, "grad_patches")?;
    if k_sz != 1 || pc != c_sz {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, 1, pt, c_sz, ps, ps],
            got: grad_patches.shape().dims().to_vec(),
        });
    }

    let gv = f32s(grad_vid, "grad_vid")?;
    let gp = f32s_mut(grad_patches, "grad_patches")?;

    let (ti, hi, wi) = (t_sz as isize, h_sz as isize, w_sz as isize);
    let ps_half = (ps / 2) as isize;
    let dil = dilation as isize;

    for n in 0..nq {
        let Some((t0, h0, w0)) = query_anchor(q_start + n, t_sz, h_sz, w_sz, stride) else {
            continue;
        };
        for pk in 0..pt {
            let t1 = t0 as isize + pk as isize;
            for pi in 0..ps {
                let h1 = h0 as isize + dil * (pi as isize - ps_half);
                for pj in 0..ps {
                    let w1 = w0 as isize + dil * (pj as isize - ps_half);
                    let in_frame = t1 < ti && h1 >= 0 && h1 < hi && w1 >= 0 && w1 < wi;
                    for ci in 0..c_sz {
                        let pidx = (((n * pt + pk) * c_sz + ci) * ps + pi) * ps + pj;
                        gp[pidx] = if in_frame {
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
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nls_core::{DType, Tensor};

    #[test]
    fn test_query_anchor() {
        // 2 frames, 4x6, stride 2 -> grid 2x3 per frame
        assert_eq!(query_anchor(0, 2, 4, 6, 2), Some((0, 0, 0)));
        assert_eq!(query_anchor(2, 2, 4, 6, 2), Some((0, 0, 4)));
        assert_eq!(query_anchor(3, 2, 4, 6, 2), Some((0, 2, 0)));
        assert_eq!(query_anchor(6, 2, 4, 6, 2), Some((1, 0, 0)));
        assert_eq!(query_anchor(12, 2, 4, 6, 2), None);
    }

    #[test]
    fn test_fold_ones_counts_multiplicity() {
        let (h, w, ps) = (4usize, 4usize, 3usize);
        let nq = h * w;
        let mut vid = Tensor::zeros(&[1, 1, h, w], DType::F32);
        let patches = Tensor::from_f32(&vec![1.0; nq * ps * ps], &[nq, 1, 1, 1, ps, ps]);
        fold_forward(&mut vid, &patches, 0, 1, 1).unwrap();
        let v = vid.as_f32_slice().unwrap();
        assert_eq!(v[1 * w + 1], 9.0);
        assert_eq!(v[0], 4.0);
        assert_eq!(v[3], 4.0);
    }

    #[test]
    fn test_fold_q_start_offsets_grid() {
        let (h, w, ps) = (3usize, 3usize, 1usize);
        let mut vid = Tensor::zeros(&[1, 1, h, w], DType::F32);
        // One 1x1 patch at query 4 -> pixel (1,1)
        let patches = Tensor::from_f32(&[7.0], &[1, 1, 1, 1, ps, ps]);
        fold_forward(&mut vid, &patches, 4, 1, 1).unwrap();
        let v = vid.as_f32_slice().unwrap();
        assert_eq!(v[4], 7.0);
        assert_eq!(v.iter().sum::<f32>(), 7.0);
    }

    #[test]
    fn test_fold_backward_matches_extraction() {
        let data: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let grad_vid = Tensor::from_f32(&data, &[1, 1, 3, 3]);
        let mut gp = Tensor::zeros(&[1, 1, 1, 1, 3, 3], DType::F32);
        // Query 4 anchors at (1,1): the full frame is the patch.
        fold_backward(&mut gp, &grad_vid, 4, 1, 1).unwrap();
        assert_eq!(gp.as_f32_slice().unwrap(), data.as_slice());
    }
}
