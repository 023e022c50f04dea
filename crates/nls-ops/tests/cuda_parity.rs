#![cfg(feature = "cuda")]
//! GPU dispatch vs. CPU reference kernels. Requires a CUDA device.

use nls_core::{DType, Tensor};
use nls_kernels::{cpu_fold, cpu_gather, cpu_scatter, cpu_search, cpu_wpsum};
use nls_kernels::{SearchParams, WpsumParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEV: usize = 0;

fn rand_vid(rng: &mut StdRng, shape: &[usize]) -> Tensor {
    let n: usize = shape.iter().product();
    let data: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Tensor::from_f32(&data, shape)
}

fn assert_close(a: &Tensor, b: &Tensor, tol: f32) {
    let a = a.as_f32_slice().unwrap();
    let b = b.as_f32_slice().unwrap();
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() < tol, "elem {i}: {x} vs {y}");
    }
}

fn grid_inds(t: usize, h: usize, w: usize) -> Tensor {
    let mut inds = Vec::new();
    for ti in 0..t {
        for y in 0..h {
            for x in 0..w {
                inds.extend_from_slice(&[ti as i32, y as i32, x as i32]);
            }
        }
    }
    Tensor::from_i32(&inds, &[t * h * w, 1, 3])
}

#[test]
fn scatter_forward_matches_reference() {
    let mut rng = StdRng::seed_from_u64(7);
    let vid = rand_vid(&mut rng, &[2, 3, 8, 8]);
    let inds = grid_inds(2, 8, 8);
    let nq = 2 * 8 * 8;

    let mut cpu_patches = Tensor::zeros(&[nq, 1, 1, 3, 5, 5], DType::F32);
    cpu_scatter::scatter_forward(&mut cpu_patches, &vid, &inds, 1, true).unwrap();

    let mut gpu_patches = Tensor::zeros(&[nq, 1, 1, 3, 5, 5], DType::F32).cuda(DEV).unwrap();
    nls_ops::scatter::forward(
        &mut gpu_patches,
        &vid.cuda(DEV).unwrap(),
        &inds.cuda(DEV).unwrap(),
        1,
        true,
    )
    .unwrap();
    assert_close(&cpu_patches, &gpu_patches.cpu().unwrap(), 1e-5);
}

#[test]
fn scatter_backward_exact_matches_reference() {
    let mut rng = StdRng::seed_from_u64(8);
    let grad_patches = rand_vid(&mut rng, &[64, 2, 1, 1, 3, 3]);
    let inds = grid_inds(1, 8, 8);
    let inds2 = {
        // Duplicate each neighbor so accumulation order matters.
        let base = inds.as_i32_slice().unwrap();
        let mut v = Vec::new();
        for q in 0..64 {
            v.extend_from_slice(&base[q * 3..q * 3 + 3]);
            v.extend_from_slice(&base[q * 3..q * 3 + 3]);
        }
        Tensor::from_i32(&v, &[64, 2, 3])
    };

    let mut cpu_gv = Tensor::zeros(&[1, 1, 8, 8], DType::F32);
    cpu_scatter::scatter_backward(&mut cpu_gv, &grad_patches, &inds2, 1, true, true).unwrap();

    let mut gpu_gv = Tensor::zeros(&[1, 1, 8, 8], DType::F32).cuda(DEV).unwrap();
    nls_ops::scatter::backward(
        &mut gpu_gv,
        &grad_patches.cuda(DEV).unwrap(),
        &inds2.cuda(DEV).unwrap(),
        1,
        true,
        true,
    )
    .unwrap();
    assert_close(&cpu_gv, &gpu_gv.cpu().unwrap(), 1e-4);
}

#[test]
fn gather_forward_matches_reference() {
    let mut rng = StdRng::seed_from_u64(9);
    let patches = rand_vid(&mut rng, &[64, 1, 1, 2, 3, 3]);
    let dists = rand_vid(&mut rng, &[64, 1]);
    let inds = grid_inds(1, 8, 8);

    let mut cpu_vid = Tensor::zeros(&[1, 2, 8, 8], DType::F32);
    let mut cpu_wvid = Tensor::zeros(&[1, 2, 8, 8], DType::F32);
    cpu_gather::gather_forward(&mut cpu_vid, &mut cpu_wvid, &patches, &dists, &inds, 0.5, 1)
        .unwrap();

    let mut gpu_vid = Tensor::zeros(&[1, 2, 8, 8], DType::F32).cuda(DEV).unwrap();
    let mut gpu_wvid = Tensor::zeros(&[1, 2, 8, 8], DType::F32).cuda(DEV).unwrap();
    nls_ops::gather::forward(
        &mut gpu_vid,
        &mut gpu_wvid,
        &patches.cuda(DEV).unwrap(),
        &dists.cuda(DEV).unwrap(),
        &inds.cuda(DEV).unwrap(),
        0.5,
        1,
    )
    .unwrap();
    assert_close(&cpu_vid, &gpu_vid.cpu().unwrap(), 1e-4);
    assert_close(&cpu_wvid, &gpu_wvid.cpu().unwrap(), 1e-4);
}

#[test]
fn fold_unfold_match_reference() {
    let mut rng = StdRng::seed_from_u64(10);
    let vid = rand_vid(&mut rng, &[1, 2, 8, 8]);
    let nq = 64;

    let mut cpu_patches = Tensor::zeros(&[nq, 1, 1, 2, 3, 3], DType::F32);
    cpu_fold::fold_backward(&mut cpu_patches, &vid, 0, 1, 1).unwrap();

    let mut gpu_patches = Tensor::zeros(&[nq, 1, 1, 2, 3, 3], DType::F32).cuda(DEV).unwrap();
    nls_ops::unfold::forward(&mut gpu_patches, &vid.cuda(DEV).unwrap(), 0, 1, 1).unwrap();
    assert_close(&cpu_patches, &gpu_patches.cpu().unwrap(), 1e-5);

    let mut cpu_vid = Tensor::zeros(&[1, 2, 8, 8], DType::F32);
    cpu_fold::fold_forward(&mut cpu_vid, &cpu_patches, 0, 1, 1).unwrap();

    let mut gpu_vid = Tensor::zeros(&[1, 2, 8, 8], DType::F32).cuda(DEV).unwrap();
    nls_ops::fold::forward(&mut gpu_vid, &gpu_patches, 0, 1, 1).unwrap();
    assert_close(&cpu_vid, &gpu_vid.cpu().unwrap(), 1e-4);
}

#[test]
fn search_forward_matches_reference() {
    let mut rng = StdRng::seed_from_u64(11);
    let vid = rand_vid(&mut rng, &[2, 3, 8, 8]);
    let flow = Tensor::zeros(&[2, 2, 8, 8], DType::F32);
    let queries = grid_inds(1, 8, 8).reshape(&[64, 3]).unwrap();
    let p = SearchParams {
        k: 4,
        ps: 3,
        pt: 1,
        ws: 5,
        wt: 1,
        chnls: 3,
        dilation: 1,
        stride: 1,
        reflect_bounds: true,
    };

    let mut cpu_d = Tensor::zeros(&[64, 4], DType::F32);
    let mut cpu_i = Tensor::zeros(&[64, 4, 3], DType::I32);
    cpu_search::search_forward(&mut cpu_d, &mut cpu_i, &vid, &queries, &flow, &flow, &p).unwrap();

    let mut gpu_d = Tensor::zeros(&[64, 4], DType::F32).cuda(DEV).unwrap();
    let mut gpu_i = Tensor::zeros(&[64, 4, 3], DType::I32).cuda(DEV).unwrap();
    nls_ops::search::forward(
        &mut gpu_d,
        &mut gpu_i,
        &vid.cuda(DEV).unwrap(),
        &queries.cuda(DEV).unwrap(),
        &flow.cuda(DEV).unwrap(),
        &flow.cuda(DEV).unwrap(),
        &p,
    )
    .unwrap();

    // Distances must agree everywhere; indices may differ on exact ties.
    assert_close(&cpu_d, &gpu_d.cpu().unwrap(), 1e-4);
}

#[test]
fn wpsum_forward_matches_reference() {
    let mut rng = StdRng::seed_from_u64(12);
    let vid = rand_vid(&mut rng, &[1, 2, 8, 8]);
    let dists = rand_vid(&mut rng, &[64, 1]);
    let inds = grid_inds(1, 8, 8);
    let p = WpsumParams {
        h_off: 0,
        w_off: 0,
        dilation: 1,
        adj: 0,
        reflect_bounds: true,
    };

    let mut cpu_wp = Tensor::zeros(&[64, 1, 2, 3, 3], DType::F32);
    cpu_wpsum::wpsum_forward(&mut cpu_wp, &vid, &dists, &inds, &p).unwrap();

    let mut gpu_wp = Tensor::zeros(&[64, 1, 2, 3, 3], DType::F32).cuda(DEV).unwrap();
    nls_ops::wpsum::forward(
        &mut gpu_wp,
        &vid.cuda(DEV).unwrap(),
        &dists.cuda(DEV).unwrap(),
        &inds.cuda(DEV).unwrap(),
        &p,
    )
    .unwrap();
    assert_close(&cpu_wp, &gpu_wp.cpu().unwrap(), 1e-4);
}
