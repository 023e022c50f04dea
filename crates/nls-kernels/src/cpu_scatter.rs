//! Scatter: extract video patches at neighbor indices (video → patches).
//!
//! The forward pass reads; the backward pass accumulates patch gradients
//! back into the video. Neighbors with a `-1` coordinate are skipped and
//! leave their patch slots untouched.

use nls_core::{NlsError, Result, Tensor};

use crate::{f32s, f32s_mut, i32s, inds_dims, patch_dims, reflect, vid_dims};

/// Fill `patches[q, k]` with the video patch anchored at `nl_inds[q, k]`.
///
/// Out-of-frame pixels read zero, or the reflected in-frame pixel when
/// `reflect_bounds` is set.
pub fn scatter_forward(
    patches: &mut Tensor,
    vid: &Tensor,
    nl_inds: &Tensor,
    dilation: usize,
    reflect_bounds: bool,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(vid, "vid")?;
    let (nq, k_sz, pt, pc, ps) = patch_dims(patches, "patches")?;
    let (inq, ik) = inds_dims(nl_inds, "nlInds")?;
    if (inq, ik) != (nq, k_sz) || pc != c_sz {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, k_sz, c_sz],
            got: vec![inq, ik, pc],
        });
    }

    let v = f32s(vid, "vid")?;
    let inds = i32s(nl_inds, "nlInds")?;
    let p = f32s_mut(patches, "patches")?;

    let (ti, hi, wi) = (t_sz as isize, h_sz as isize, w_sz as isize);
    let ps_half = (ps / 2) as isize;
    let dil = dilation as isize;

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
                if t1 >= ti {
                    continue;
                }
                for pi in 0..ps {
                    for pj in 0..ps {
                        let mut h1 = h0 + dil * (pi as isize - ps_half);
                        let mut w1 = w0 + dil * (pj as isize - ps_half);
                        if reflect_bounds {
                            h1 = reflect(h1, hi);
                            w1 = reflect(w1, wi);
                        }
                        let in_frame = h1 >= 0 && h1 < hi && w1 >= 0 && w1 < wi;
                        for ci in 0..c_sz {
                            let pidx =
                                ((((q * k_sz + k) * pt + pk) * c_sz + ci) * ps + pi) * ps + pj;
                            p[pidx] = if in_frame {
                                let vidx = ((t1 as usize * c_sz + ci) * h_sz + h1 as usize)
                                    * w_sz
                                    + w1 as usize;
                                v[vidx]
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

/// Accumulate `grad_patches` into `grad_vid` at `nl_inds` (the adjoint of
/// `scatter_forward`). `exact` exists for kernel-path selection on the GPU;
/// the serial reference produces identical sums either way.
pub fn scatter_backward(
    grad_vid: &mut Tensor,
    grad_patches: &Tensor,
    nl_inds: &Tensor,
    dilation: usize,
    reflect_bounds: bool,
    _exact: bool,
) -> Result<()> {
    let (t_sz, c_sz, h_sz, w_sz) = vid_dims(grad_vid, "grad_vid")?;
    let (nq, k_sz, pt, pc, ps) = patch_dims(grad_patches, "grad_patches")?;
    let (inq, ik) = inds_dims(nl_inds, "nlInds")?;
    if (inq, ik) != (nq, k_sz) || pc != c_sz {
        return Err(NlsError::ShapeMismatch {
            expected: vec![nq, k_sz, c_sz],
            got: vec![inq, ik, pc],
        });
    }

    let gp = f32s(grad_patches, "grad_patches")?;
    let inds = i32s(nl_inds, "nlInds")?;
    let gv = f32s_mut(grad_vid, "grad_vid")?;

    let (ti, hi, wi) = (t_sz as isize, h_sz as isize, w_sz as isize);
    let ps_half = (ps / 2) as isize;
    let dil = dilation as isize;

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
                if t1 >= ti {
                    continue;
                }
                for pi in 0..ps {
                    for pj in 0..ps {
                        let mut h1 = h0 + dil * (pi as isize - ps_half);
                        let mut w1 = w0 + dil * (pj as isize - ps_half);
                        if reflect_bounds {
                            h1 = reflect(h1, hi);
                            w1 = reflect(w1, wi);
                        } else if h1 < 0 || h1 >= hi || w1 < 0 || w1 >= wi {
                            continue;
                        }
                        for ci in 0..c_sz {
                            let pidx =
                                ((((q * k_sz + k) * pt + pk) * c_sz + ci) * ps + pi) * ps + pj;
                            let vidx = ((t1 as usize * c_sz + ci) * h_sz + h1 as usize) * w_sz
                                + w1 as usize;
                            gv[vidx] += gp[pidx];
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

    fn ramp_vid(t: usize, c: usize, h: usize, w: usize) -> Tensor {
        let data: Vec<f32> = (0..t * c * h * w).map(|i| i as f32).collect();
        Tensor::from_f32(&data, &[t, c, h, w])
    }

    #[test]
    fn test_scatter_extracts_centered_patch() {
        let vid = ramp_vid(1, 1, 5, 5);
        let mut patches = Tensor::zeros(&[1, 1, 1, 1, 3, 3], DType::F32);
        let inds = Tensor::from_i32(&[0, 2, 2], &[1, 1, 3]);
        scatter_forward(&mut patches, &vid, &inds, 1, false).unwrap();
        let p = patches.as_f32_slice().unwrap();
        // 3x3 neighborhood of pixel (2,2) in a 5x5 ramp
        assert_eq!(p, &[6.0, 7.0, 8.0, 11.0, 12.0, 13.0, 16.0, 17.0, 18.0]);
    }

    #[test]
    fn test_scatter_zero_fills_out_of_frame() {
        let vid = ramp_vid(1, 1, 4, 4);
        let mut patches = Tensor::zeros(&[1, 1, 1, 1, 3, 3], DType::F32);
        let inds = Tensor::from_i32(&[0, 0, 0], &[1, 1, 3]);
        scatter_forward(&mut patches, &vid, &inds, 1, false).unwrap();
        let p = patches.as_f32_slice().unwrap();
        assert_eq!(p[0], 0.0); // (-1,-1) out of frame
        assert_eq!(p[4], 0.0); // center = vid[0,0]
        assert_eq!(p[5], 1.0); // (0,1)
    }

    #[test]
    fn test_scatter_reflects_at_border() {
        let vid = ramp_vid(1, 1, 4, 4);
        let mut patches = Tensor::zeros(&[1, 1, 1, 1, 3, 3], DType::F32);
        let inds = Tensor::from_i32(&[0, 0, 0], &[1, 1, 3]);
        scatter_forward(&mut patches, &vid, &inds, 1, true).unwrap();
        let p = patches.as_f32_slice().unwrap();
        // (-1,-1) reflects to (1,1) = 5.0
        assert_eq!(p[0], 5.0);
        assert_eq!(p[4], 0.0);
    }

    #[test]
    fn test_scatter_skips_invalid_neighbor() {
        let vid = ramp_vid(1, 1, 4, 4);
        let mut patches = Tensor::zeros(&[1, 1, 1, 1, 3, 3], DType::F32);
        let inds = Tensor::from_i32(&[-1, -1, -1], &[1, 1, 3]);
        scatter_forward(&mut patches, &vid, &inds, 1, false).unwrap();
        assert!(patches.as_f32_slice().unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_scatter_backward_accumulates() {
        // Two neighbors at the same site: gradients add up.
        let mut grad_vid = Tensor::zeros(&[1, 1, 5, 5], DType::F32);
        let grad_patches = Tensor::from_f32(&[1.0; 18], &[1, 2, 1, 1, 3, 3]);
        let inds = Tensor::from_i32(&[0, 2, 2, 0, 2, 2], &[1, 2, 3]);
        scatter_backward(&mut grad_vid, &grad_patches, &inds, 1, false, true).unwrap();
        let gv = grad_vid.as_f32_slice().unwrap();
        assert_eq!(gv[2 * 5 + 2], 2.0);
        assert_eq!(gv[1 * 5 + 1], 2.0);
        assert_eq!(gv[0], 0.0);
    }
}
