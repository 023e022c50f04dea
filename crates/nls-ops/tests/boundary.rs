//! Placement validation across every dispatch entry point.
//!
//! Each operation must reject CPU-resident tensors before touching any
//! data, naming the first offending argument in declared order.

use nls_core::{DType, Tensor};
use nls_kernels::{SearchParams, WpsumParams, XSearchParams};

fn vid() -> Tensor {
    Tensor::zeros(&[1, 1, 4, 4], DType::F32)
}

fn patches() -> Tensor {
    Tensor::zeros(&[1, 1, 1, 1, 3, 3], DType::F32)
}

fn inds() -> Tensor {
    Tensor::zeros(&[1, 1, 3], DType::I32)
}

fn dists() -> Tensor {
    Tensor::zeros(&[1, 1], DType::F32)
}

fn search_params() -> SearchParams {
    SearchParams {
        k: 1,
        ps: 3,
        pt: 1,
        ws: 3,
        wt: 0,
        chnls: 1,
        dilation: 1,
        stride: 1,
        reflect_bounds: true,
    }
}

#[test]
fn gather_reports_first_argument() {
    let mut v = vid();
    let mut wv = vid();
    let err = nls_ops::gather::forward(&mut v, &mut wv, &patches(), &dists(), &inds(), 0.0, 1)
        .unwrap_err();
    assert_eq!(err.to_string(), "vid must be a CUDA tensor");

    let err = nls_ops::gather::backward(&vid(), &mut patches(), &dists(), &inds()).unwrap_err();
    assert_eq!(err.to_string(), "grad_vid must be a CUDA tensor");
}

#[test]
fn gather_leaves_outputs_untouched() {
    let mut v = vid();
    let mut wv = vid();
    let _ = nls_ops::gather::forward(&mut v, &mut wv, &patches(), &dists(), &inds(), 0.0, 1);
    assert!(v.as_f32_slice().unwrap().iter().all(|&x| x == 0.0));
    assert!(wv.as_f32_slice().unwrap().iter().all(|&x| x == 0.0));
}

#[test]
fn scatter_reports_first_argument() {
    let err = nls_ops::scatter::forward(&mut patches(), &vid(), &inds(), 1, true).unwrap_err();
    assert_eq!(err.to_string(), "patches must be a CUDA tensor");

    let err =
        nls_ops::scatter::backward(&mut vid(), &patches(), &inds(), 1, true, false).unwrap_err();
    assert_eq!(err.to_string(), "grad_vid must be a CUDA tensor");
}

#[test]
fn search_reports_first_argument() {
    let flow = Tensor::zeros(&[1, 2, 4, 4], DType::F32);
    let q = Tensor::zeros(&[1, 3], DType::I32);
    let err = nls_ops::search::forward(
        &mut dists(),
        &mut inds(),
        &vid(),
        &q,
        &flow,
        &flow,
        &search_params(),
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "nlDists must be a CUDA tensor");

    let err = nls_ops::search::backward(&mut vid(), &vid(), &q, &dists(), &inds(), &search_params())
        .unwrap_err();
    assert_eq!(err.to_string(), "grad_vid must be a CUDA tensor");
}

#[test]
fn fold_family_reports_first_argument() {
    let err = nls_ops::fold::forward(&mut vid(), &patches(), 0, 1, 1).unwrap_err();
    assert_eq!(err.to_string(), "vid must be a CUDA tensor");

    let err = nls_ops::fold::backward(&mut patches(), &vid(), 0, 1, 1).unwrap_err();
    assert_eq!(err.to_string(), "grad_patches must be a CUDA tensor");

    let err = nls_ops::unfold::forward(&mut patches(), &vid(), 0, 1, 1).unwrap_err();
    assert_eq!(err.to_string(), "patches must be a CUDA tensor");

    let err = nls_ops::unfold::backward(&mut vid(), &patches(), 0, 1, 1).unwrap_err();
    assert_eq!(err.to_string(), "grad_vid must be a CUDA tensor");

    let err =
        nls_ops::iunfold::forward(&mut patches(), &vid(), (0, 0, 4, 4), 0, 1, 1, 0).unwrap_err();
    assert_eq!(err.to_string(), "patches must be a CUDA tensor");

    let err =
        nls_ops::iunfold::backward(&mut vid(), &patches(), (0, 0, 4, 4), 0, 1, 1, 0).unwrap_err();
    assert_eq!(err.to_string(), "grad_vid must be a CUDA tensor");
}

#[test]
fn xsearch_reports_first_argument() {
    let flow = Tensor::zeros(&[1, 2, 4, 4], DType::F32);
    let q = Tensor::zeros(&[1, 3], DType::I32);
    let p = XSearchParams {
        k: 1,
        ps: 3,
        pt: 1,
        ws: 3,
        wt: 0,
        chnls: 1,
        dilation: 1,
        stride1: 1,
        use_k: true,
        reflect_bounds: true,
    };
    let err = nls_ops::xsearch::forward(
        &mut dists(),
        &mut inds(),
        &vid(),
        &vid(),
        &q,
        &flow,
        &flow,
        &p,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "nlDists must be a CUDA tensor");

    let err = nls_ops::xsearch::backward(
        &mut vid(),
        &mut vid(),
        &vid(),
        &vid(),
        &q,
        &dists(),
        &inds(),
        &p,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "grad_vid0 must be a CUDA tensor");
}

#[test]
fn wpsum_reports_first_argument() {
    let p = WpsumParams {
        h_off: 0,
        w_off: 0,
        dilation: 1,
        adj: 0,
        reflect_bounds: true,
    };
    let mut wpatches = Tensor::zeros(&[1, 1, 1, 3, 3], DType::F32);
    let err = nls_ops::wpsum::forward(&mut wpatches, &vid(), &dists(), &inds(), &p).unwrap_err();
    assert_eq!(err.to_string(), "wpatches must be a CUDA tensor");

    let err = nls_ops::wpsum::backward(
        &mut vid(),
        &mut dists(),
        &vid(),
        &dists(),
        &inds(),
        &wpatches,
        &p,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "grad_vid must be a CUDA tensor");
}
