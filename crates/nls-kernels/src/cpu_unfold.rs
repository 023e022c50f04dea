//! Unfold: extract raster-grid patches from a video (video → patches).
//!
//! Shares the query grid of [`crate::cpu_fold`]; unfold and fold are exact
//! adjoints of one another.

use nls_core::{NlsError, Result, Tensor};

use crate::cpu_fold::query_anchor;
use crate::{f32s, f32s_mut, patch_dims, vid_dims};

/// Extract grid patches from `vid` into `patches` (zero-filled at borders).
pub fn unfold_forward(
    patches: &mut Tensor,
    vid: &Tensor,
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

    let v = f32s(vid, "vid")?;
    let p = f32s_mut(patches, "patches")?;

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

/// Accumulate `grad_patches` back into `grad_vid` (the adjoint of
/// `unfold_forward`).
pub fn unfold_backward(
    grad_vid: &mut Tensor,
    grad_patches: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<()> {
    // Same accumulation as fold's forward pass.
    crate::cpu_fold::fold_forward(grad_vid, grad_patches, q_start, stride, dilation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_fold::{fold_forward, grid_size};
    use nls_core::{DType, Tensor};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_unfold_constant_interior() {
        let (h, w, ps) = (5usize, 5usize, 3usize);
        let vid = Tensor::from_f32(&vec![3.0; h * w], &[1, 1, h, w]);
        let nq = h * w;
        let mut patches = Tensor::zeros(&[nq, 1, 1, 1, ps, ps], DType::F32);
        unfold_forward(&mut patches, &vid, 0, 1, 1).unwrap();
        let p = patches.as_f32_slice().unwrap();
        // Query 12 anchors at (2,2): fully interior patch, all 3.0.
        let base = 12 * ps * ps;
        assert!(p[base..base + 9].iter().all(|&x| x == 3.0));
        // Query 0 anchors at (0,0): top-left patch corner is out of frame.
        assert_eq!(p[0], 0.0);
        assert_eq!(p[4], 3.0);
    }

    #[test]
    fn test_fold_unfold_adjoint() {
        // <fold(P), G> == <P, unfold(G)> for random P, G.
        let mut rng = StdRng::seed_from_u64(123);
        let (t, c, h, w, ps, stride) = (2usize, 2usize, 6usize, 5usize, 3usize, 2usize);
        let nq = t * grid_size(h, stride) * grid_size(w, stride);

        let pdata: Vec<f32> = (0..nq * c * ps * ps).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let gdata: Vec<f32> = (0..t * c * h * w).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let patches = Tensor::from_f32(&pdata, &[nq, 1, 1, c, ps, ps]);
        let gvid = Tensor::from_f32(&gdata, &[t, c, h, w]);

        let mut folded = Tensor::zeros(&[t, c, h, w], DType::F32);
        fold_forward(&mut folded, &patches, 0, stride, 1).unwrap();

        let mut unfolded = Tensor::zeros(&[nq, 1, 1, c, ps, ps], DType::F32);
        unfold_forward(&mut unfolded, &gvid, 0, stride, 1).unwrap();

        let lhs: f64 = folded
            .as_f32_slice()
            .unwrap()
            .iter()
            .zip(gdata.iter())
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        let rhs: f64 = pdata
            .iter()
            .zip(unfolded.as_f32_slice().unwrap().iter())
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        assert!((lhs - rhs).abs() < 1e-3, "lhs={lhs} rhs={rhs}");
    }

    #[test]
    fn test_unfold_backward_is_fold() {
        let (h, w, ps) = (4usize, 4usize, 3usize);
        let nq = h * w;
        let gp = Tensor::from_f32(&vec![1.0; nq * ps * ps], &[nq, 1, 1, 1, ps, ps]);
        let mut gv = Tensor::zeros(&[1, 1, h, w], DType::F32);
        unfold_backward(&mut gv, &gp, 0, 1, 1).unwrap();
        assert_eq!(gv.as_f32_slice().unwrap()[1 * w + 1], 9.0);
    }
}
