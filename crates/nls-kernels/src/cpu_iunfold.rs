//! iunfold: unfold restricted to an inset rectangle of each frame.
//!
//! The query grid covers `[top, btm) x [left, right)`; the `adj` offset
//! shifts the patch anchor (callers pass `ps/2` to convert the center
//! convention to top-left alignment).

use nls_core::{NlsError, Result, Tensor};

use crate::{f32s, f32s_mut, patch_dims, vid_dims};

use crate::cpu_fold::grid_size;

#[allow(clippy::too_many_arguments)]
fn region_anchor(
    qi: usize,
    t_sz: usize,
    top: usize,
    left: usize,
    btm: usize,
    right: usize,
    stride: usize,
) -> Option<(usize, usize, usize)> {
    let nh = grid_size(btm - top, stride);
    let nw = grid_size(right - left, stride);
    if qi >= t_sz * nh * nw {
        return None;
    }
    let t = qi / (nh * nw);
    let rem = qi % (nh * nw);
    Some((t, top + (rem / nw) * stride, left + (rem % nw) * stride))
}

fn check_coords(
    top: usize,
    left: usize,
    btm: usize,
    right: usize,
    h_sz: usize,
    w_sz: usize,
) -> Result<()> {
    if top >= btm || left >= right || btm > h_sz || right > w_sz {
        return Err(NlsError::ShapeMismatch {
            expected: vec![h_sz, w_sz],
            got: vec![top, left, btm, right],
        });
    }
    Ok(())
}

/// Extract patches on the rectangle grid from `vid` (zero-filled outside
/// the frame).
#[allow(clippy::too_many_arguments)]
pub fn iunfold_forward(
    patches: &mut Tensor,
    vid: &Tensor,
    top: usize,
    left: usize,
    btm: usize,
    right: usize,
    q_start: usize,
    stride: usize,
    dilation: usize,
    adj: isize,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(vid, "vid")?;
    check_coords(top, left, btm, right, h_sz, w_sz)?;
    let (nq, k_sz, pt, pc, ps) = patch_dims(patches, "patches")?;
    if k_sz != 1 || pc != c_sz {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, 1, pt, c_sz, ps, ps],
            got: patches.shape().dims().to_vec(),
        });
    }

    let v = f32s(vid, "vid")?;
    let p = f32s_mut(patches, "patches")?;

    let (ti, hi, wi) = (t_sz as isize, h_sz as isize, w_sz as isize);
    let ps_half = (ps / 2) as isize;
    let dil = dilation as isize;

    for n in 0..nq {
        let Some((t0, h0, w0)) =
            region_anchor(q_start + n, t_sz, top, left, btm, right, stride)
        else {
            continue;
        };
        for pk in 0..pt {
            let t1 = t0 as isize + pk as isize;
            for pi in 0..ps {
                let h1 = h0 as isize + dil * (pi as isize - ps_half) + adj;
                for pj in 0..ps {
                    let w1 = w0 as isize + dil * (pj as isize - ps_half) + adj;
                    let in_frame = t1 < ti && h1 >= 0 && h1 < hi && w1 >= 0 && w1 < wi;
                    for ci in 0..c_sz {
                        let pidx = (((n * pt + pk) * c_sz + ci) * ps + pi) * ps + pj;
                        p[pidx] = if in_frame {
                            v[((t1 as usize * c_sz + ci) * h_sz + h1 as usize) * w_sz
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

/// Accumulate `grad_patches` into `grad_vid` on the rectangle grid (the
/// adjoint of `iunfold_forward`).
#[allow(clippy::too_many_arguments)]
pub fn iunfold_backward(
    grad_vid: &mut Tensor,
    grad_patches: &Tensor,
    top: usize,
    left: usize,
    btm: usize,
    right: usize,
    q_start: usize,
    stride: usize,
    dilation: usize,
    adj: isize,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(grad_vid, "grad_vid")?;
    check_coords(top, left, btm, right, h_sz, w_sz)?;
    let (nq, k_sz, pt, pc, ps) = patch_dims(grad_patches, "grad_patches")?;
    if k_sz != 1 || pc != c_sz {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, 1, pt, c_sz, ps, ps],
            got: grad_patches.shape().dims().to_vec(),
        });
    }

    let gp = f32s(grad_patches, "grad_patches")?;
    let gv = f32s_mut(grad_vid, "grad_vid")?;

    let (ti, hi, wi) = (t_sz as isize, h_sz as isize, w_sz as isize);
    let ps_half = (ps / 2) as isize;
    let dil = dilation as isize;

    for n in 0..nq {
        let Some((t0, h0, w0)) =
            region_anchor(q_start + n, t_sz, top, left, btm, right, stride)
        else {
            continue;
        };
        for pk in 0..pt {
            let t1 = t0 as isize + pk as isize;
            if t1 >= ti {
                continue;
            }
            for pi in 0..ps {
                let h1 = h0 as isize + dil * (pi as isize - ps_half) + adj;
                if h1 < 0 || h1 >= hi {
                    continue;
                }
                for pj in 0..ps {
                    let w1 = w0 as isize + dil * (pj as isize - ps_half) + adj;
                    if w1 < 0 || w1 >= wi {
                        continue;
                    }
                    for ci in 0..c_sz {
                        let pidx = (((n * pt + pk) * c_sz + ci) * ps + pi) * ps + pj;
                        let vidx = ((t1 as usize * c_sz + ci) * h_sz + h1 as usize) * w_sz
                            + w1 as usize;
                        gv[vidx] += gp[pidx];
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
    use crate::cpu_unfold::unfold_forward;
    use nls_core::{DType, Tensor};

    #[test]
    fn test_full_frame_matches_unfold() {
        let data: Vec<f32> = (0..2 * 25).map(|i| i as f32).collect();
        let vid = Tensor::from_f32(&data, &[2, 1, 5, 5]);
        let nq = 2 * 25;
        let mut a = Tensor::zeros(&[nq, 1, 1, 1, 3, 3], DType::F32);
        let mut b = Tensor::zeros(&[nq, 1, 1, 1, 3, 3], DType::F32);
        iunfold_forward(&mut a, &vid, 0, 0, 5, 5, 0, 1, 1, 0).unwrap();
        unfold_forward(&mut b, &vid, 0, 1, 1).unwrap();
        assert_eq!(a.as_f32_slice().unwrap(), b.as_f32_slice().unwrap());
    }

    #[test]
    fn test_inset_rectangle_anchors() {
        let data: Vec<f32> = (0..25).map(|i| i as f32).collect();
        let vid = Tensor::from_f32(&data, &[1, 1, 5, 5]);
        // Region [1,4) x [1,4), 1x1 patches: exactly the 3x3 interior values.
        let mut p = Tensor::zeros(&[9, 1, 1, 1, 1, 1], DType::F32);
        iunfold_forward(&mut p, &vid, 1, 1, 4, 4, 0, 1, 1, 0).unwrap();
        assert_eq!(
            p.as_f32_slice().unwrap(),
            &[6.0, 7.0, 8.0, 11.0, 12.0, 13.0, 16.0, 17.0, 18.0]
        );
    }

    #[test]
    fn test_adj_shifts_anchor() {
        let data: Vec<f32> = (0..25).map(|i| i as f32).collect();
        let vid = Tensor::from_f32(&data, &[1, 1, 5, 5]);
        // 3x3 patch at region origin (0,0) with adj = ps/2 = 1: top-left
        // aligned, so the patch is rows 0..3 x cols 0..3.
        let mut p = Tensor::zeros(&[1, 1, 1, 1, 3, 3], DType::F32);
        iunfold_forward(&mut p, &vid, 0, 0, 5, 5, 0, 1, 1, 1).unwrap();
        assert_eq!(
            p.as_f32_slice().unwrap(),
            &[0.0, 1.0, 2.0, 5.0, 6.0, 7.0, 10.0, 11.0, 12.0]
        );
    }

    #[test]
    fn test_iunfold_backward_accumulates_in_region() {
        let mut gv = Tensor::zeros(&[1, 1, 5, 5], DType::F32);
        let gp = Tensor::from_f32(&[1.0; 4], &[4, 1, 1, 1, 1, 1]);
        iunfold_backward(&mut gv, &gp, 1, 1, 3, 3, 0, 1, 1, 0).unwrap();
        let v = gv.as_f32_slice().unwrap();
        assert_eq!(v[6], 1.0);
        assert_eq!(v[7], 1.0);
        assert_eq!(v[11], 1.0);
        assert_eq!(v[12], 1.0);
        assert_eq!(v.iter().sum::<f32>(), 4.0);
    }
}
