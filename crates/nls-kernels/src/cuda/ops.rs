//! CUDA launch functions for the nls operation families.
//!
//! Each function loads the relevant PTX module (compiled from embedded .cu
//! source at first use), pushes the integer dims as a small device buffer,
//! launches the kernel in place over the callers' GPU buffers, and blocks
//! until the launch completes. Output tensors must be zero- or
//! caller-initialized; kernels either overwrite or accumulate as the CPU
//! reference kernels do.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice, LaunchAsync};

use nls_core::Tensor;

use super::context::CudaError;
use super::launch::{get_or_load_func, grid_1d, grid_2d};
use crate::{SearchParams, WpsumParams, XSearchParams};

const GATHER_CU: &str = include_str!("kernels/gather.cu");
const SCATTER_CU: &str = include_str!("kernels/scatter.cu");
const FOLD_CU: &str = include_str!("kernels/fold.cu");
const IUNFOLD_CU: &str = include_str!("kernels/iunfold.cu");
const SEARCH_CU: &str = include_str!("kernels/search.cu");
const XSEARCH_CU: &str = include_str!("kernels/xsearch.cu");
const WPSUM_CU: &str = include_str!("kernels/wpsum.cu");

const BLOCK_SIZE: usize = 256;

/// Device handle, device index, and raw buffer of a CUDA tensor.
fn gpu_parts<'a>(
    t: &'a Tensor,
    arg: &str,
) -> Result<(Arc<CudaDevice>, usize, &'a CudaSlice<u8>), CudaError> {
    let storage = t.storage_ref();
    let dev = storage
        .cuda_device()
        .ok_or_else(|| CudaError::MemoryError(format!("{arg}: not a CUDA tensor")))?;
    let idx = t.device().cuda_index().unwrap_or(0);
    let buf = storage
        .as_cuda_slice()
        .ok_or_else(|| CudaError::MemoryError(format!("{arg}: not a CUDA tensor")))?;
    Ok((dev, idx, buf))
}

fn upload_dims(dev: &Arc<CudaDevice>, dims: &[i32]) -> Result<CudaSlice<i32>, CudaError> {
    dev.htod_copy(dims.to_vec())
        .map_err(|e| CudaError::MemoryError(e.to_string()))
}

fn sync(dev: &Arc<CudaDevice>) -> Result<(), CudaError> {
    dev.synchronize()
        .map_err(|e| CudaError::LaunchError(e.to_string()))
}

fn launch_err(e: cudarc::driver::DriverError) -> CudaError {
    CudaError::LaunchError(e.to_string())
}

fn d6(t: &Tensor) -> [usize; 6] {
    let d = t.shape().dims();
    [d[0], d[1], d[2], d[3], d[4], d[5]]
}

fn d4(t: &Tensor) -> [usize; 4] {
    let d = t.shape().dims();
    [d[0], d[1], d[2], d[3]]
}

pub fn scatter_forward(
    patches: &Tensor,
    vid: &Tensor,
    nl_inds: &Tensor,
    dilation: usize,
    reflect_bounds: bool,
) -> Result<(), CudaError> {
    let (dev, idx, p_buf) = gpu_parts(patches, "patches")?;
    let (_, _, v_buf) = gpu_parts(vid, "vid")?;
    let (_, _, i_buf) = gpu_parts(nl_inds, "nlInds")?;
    let [nq, k, pt, c, ps, _] = d6(patches);
    let [t, _, h, w] = d4(vid);

    let dims = upload_dims(
        &dev,
        &[
            nq as i32,
            k as i32,
            pt as i32,
            c as i32,
            ps as i32,
            t as i32,
            h as i32,
            w as i32,
            dilation as i32,
            reflect_bounds as i32,
        ],
    )?;
    let n = nq * k * pt * c * ps * ps;
    let f = get_or_load_func(&dev, idx, "scatter", "scatter_forward", SCATTER_CU)?;
    unsafe {
        f.launch(grid_1d(n, BLOCK_SIZE), (p_buf, v_buf, i_buf, &dims, n as u32))
            .map_err(launch_err)?;
    }
    sync(&dev)
}

pub fn scatter_backward(
    grad_vid: &Tensor,
    grad_patches: &Tensor,
    nl_inds: &Tensor,
    dilation: usize,
    reflect_bounds: bool,
    exact: bool,
) -> Result<(), CudaError> {
    let (dev, idx, gv_buf) = gpu_parts(grad_vid, "grad_vid")?;
    let (_, _, gp_buf) = gpu_parts(grad_patches, "grad_patches")?;
    let (_, _, i_buf) = gpu_parts(nl_inds, "nlInds")?;
    let [nq, k, pt, c, ps, _] = d6(grad_patches);
    let [t, _, h, w] = d4(grad_vid);

    let dims = upload_dims(
        &dev,
        &[
            nq as i32,
            k as i32,
            pt as i32,
            c as i32,
            ps as i32,
            t as i32,
            h as i32,
            w as i32,
            dilation as i32,
            reflect_bounds as i32,
        ],
    )?;
    // The exact variant is gridded over video elements instead of patch
    // elements so each output is owned by exactly one thread.
    let (func, n) = if exact {
        ("scatter_backward_exact", t * c * h * w)
    } else {
        ("scatter_backward", nq * k * pt * c * ps * ps)
    };
    let f = get_or_load_func(&dev, idx, "scatter", func, SCATTER_CU)?;
    unsafe {
        f.launch(grid_1d(n, BLOCK_SIZE), (gv_buf, gp_buf, i_buf, &dims, n as u32))
            .map_err(launch_err)?;
    }
    sync(&dev)
}

pub fn gather_forward(
    vid: &Tensor,
    wvid: &Tensor,
    patches: &Tensor,
    nl_dists: &Tensor,
    nl_inds: &Tensor,
    lam: f32,
    dilation: usize,
) -> Result<(), CudaError> {
    let (dev, idx, v_buf) = gpu_parts(vid, "vid")?;
    let (_, _, wv_buf) = gpu_parts(wvid, "wvid")?;
    let (_, _, p_buf) = gpu_parts(patches, "patches")?;
    let (_, _, d_buf) = gpu_parts(nl_dists, "nlDists")?;
    let (_, _, i_buf) = gpu_parts(nl_inds, "nlInds")?;
    let [nq, k, pt, c, ps, _] = d6(patches);
    let [t, _, h, w] = d4(vid);

    let dims = upload_dims(
        &dev,
        &[
            nq as i32,
            k as i32,
            pt as i32,
            c as i32,
            ps as i32,
            t as i32,
            h as i32,
            w as i32,
            dilation as i32,
        ],
    )?;
    let n = nq * k * pt * c * ps * ps;
    let f = get_or_load_func(&dev, idx, "gather", "gather_forward", GATHER_CU)?;
    unsafe {
        f.launch(
            grid_1d(n, BLOCK_SIZE),
            (v_buf, wv_buf, p_buf, d_buf, i_buf, &dims, lam, n as u32),
        )
        .map_err(launch_err)?;
    }
    sync(&dev)
}

pub fn gather_backward(
    patches: &Tensor,
    grad_vid: &Tensor,
    nl_inds: &Tensor,
) -> Result<(), CudaError> {
    let (dev, idx, p_buf) = gpu_parts(patches, "patches")?;
    let (_, _, gv_buf) = gpu_parts(grad_vid, "grad_vid")?;
    let (_, _, i_buf) = gpu_parts(nl_inds, "nlInds")?;
    let [nq, k, pt, c, ps, _] = d6(patches);
    let [t, _, h, w] = d4(grad_vid);

    let dims = upload_dims(
        &dev,
        &[
            nq as i32,
            k as i32,
            pt as i32,
            c as i32,
            ps as i32,
            t as i32,
            h as i32,
            w as i32,
        ],
    )?;
    let n = nq * k * pt * c * ps * ps;
    let f = get_or_load_func(&dev, idx, "gather", "gather_backward", GATHER_CU)?;
    unsafe {
        f.launch(grid_1d(n, BLOCK_SIZE), (p_buf, gv_buf, i_buf, &dims, n as u32))
            .map_err(launch_err)?;
    }
    sync(&dev)
}

fn fold_family(
    out: &Tensor,
    inp: &Tensor,
    patches_shape: &Tensor,
    vid_shape: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
    func: &str,
) -> Result<(), CudaError> {
    let (dev, idx, out_buf) = gpu_parts(out, "out")?;
    let (_, _, in_buf) = gpu_parts(inp, "in")?;
    let [nq, _, pt, c, ps, _] = d6(patches_shape);
    let [t, _, h, w] = d4(vid_shape);

    let dims = upload_dims(
        &dev,
        &[
            nq as i32,
            pt as i32,
            c as i32,
            ps as i32,
            t as i32,
            h as i32,
            w as i32,
            q_start as i32,
            stride as i32,
            dilation as i32,
        ],
    )?;
    let n = nq * pt * c * ps * ps;
    let f = get_or_load_func(&dev, idx, "fold", func, FOLD_CU)?;
    unsafe {
        f.launch(grid_1d(n, BLOCK_SIZE), (out_buf, in_buf, &dims, n as u32))
            .map_err(launch_err)?;
    }
    sync(&dev)
}

pub fn fold_forward(
    vid: &Tensor,
    patches: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<(), CudaError> {
    fold_family(vid, patches, patches, vid, q_start, stride, dilation, "fold_forward")
}

pub fn fold_backward(
    grad_patches: &Tensor,
    grad_vid: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<(), CudaError> {
    fold_family(
        grad_patches,
        grad_vid,
        grad_patches,
        grad_vid,
        q_start,
        stride,
        dilation,
        "fold_backward",
    )
}

// Unfold is the adjoint pair of fold with the roles swapped, so it reuses
// the fold module.

pub fn unfold_forward(
    patches: &Tensor,
    vid: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<(), CudaError> {
    fold_family(patches, vid, patches, vid, q_start, stride, dilation, "fold_backward")
}

pub fn unfold_backward(
    grad_vid: &Tensor,
    grad_patches: &Tensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> Result<(), CudaError> {
    fold_family(
        grad_vid,
        grad_patches,
        grad_patches,
        grad_vid,
        q_start,
        stride,
        dilation,
        "fold_forward",
    )
}

#[allow(clippy::too_many_arguments)]
fn iunfold_family(
    out: &Tensor,
    inp: &Tensor,
    patches_shape: &Tensor,
    vid_shape: &Tensor,
    coords: (usize, usize, usize, usize),
    q_start: usize,
    stride: usize,
    dilation: usize,
    adj: isize,
    func: &str,
) -> Result<(), CudaError> {
    let (dev, idx, out_buf) = gpu_parts(out, "out")?;
    let (_, _, in_buf) = gpu_parts(inp, "in")?;
    let [nq, _, pt, c, ps, _] = d6(patches_shape);
    let [t, _, h, w] = d4(vid_shape);
    let (top, left, btm, right) = coords;

    let dims = upload_dims(
        &dev,
        &[
            nq as i32,
            pt as i32,
            c as i32,
            ps as i32,
            t as i32,
            h as i32,
            w as i32,
            top as i32,
            left as i32,
            btm as i32,
            right as i32,
            q_start as i32,
            stride as i32,
            dilation as i32,
            adj as i32,
        ],
    )?;
    let n = nq * pt * c * ps * ps;
    let f = get_or_load_func(&dev, idx, "iunfold", func, IUNFOLD_CU)?;
    unsafe {
        f.launch(grid_1d(n, BLOCK_SIZE), (out_buf, in_buf, &dims, n as u32))
            .map_err(launch_err)?;
    }
    sync(&dev)
}

#[allow(clippy::too_many_arguments)]
pub fn iunfold_forward(
    patches: &Tensor,
    vid: &Tensor,
    coords: (usize, usize, usize, usize),
    q_start: usize,
    stride: usize,
    dilation: usize,
    adj: isize,
) -> Result<(), CudaError> {
    iunfold_family(
        patches,
        vid,
        patches,
        vid,
        coords,
        q_start,
        stride,
        dilation,
        adj,
        "iunfold_forward",
    )
}

#[allow(clippy::too_many_arguments)]
pub fn iunfold_backward(
    grad_vid: &Tensor,
    grad_patches: &Tensor,
    coords: (usize, usize, usize, usize),
    q_start: usize,
    stride: usize,
    dilation: usize,
    adj: isize,
) -> Result<(), CudaError> {
    iunfold_family(
        grad_vid,
        grad_patches,
        grad_patches,
        grad_vid,
        coords,
        q_start,
        stride,
        dilation,
        adj,
        "iunfold_backward",
    )
}

fn search_dims(vid: &Tensor, nq: usize, k: usize, p: &SearchParams) -> Vec<i32> {
    let [t, c, h, w] = d4(vid);
    let num_cand = (2 * p.wt + 1) * p.ws * p.ws;
    vec![
        t as i32,
        c as i32,
        h as i32,
        w as i32,
        nq as i32,
        k as i32,
        p.ps as i32,
        p.pt as i32,
        p.ws as i32,
        p.wt as i32,
        p.chnls as i32,
        p.dilation as i32,
        p.stride as i32,
        p.reflect_bounds as i32,
        num_cand as i32,
    ]
}

pub fn search_forward(
    nl_dists: &Tensor,
    nl_inds: &Tensor,
    vid: &Tensor,
    query_inds: &Tensor,
    fflow: &Tensor,
    bflow: &Tensor,
    p: &SearchParams,
) -> Result<(), CudaError> {
    let (dev, idx, d_buf) = gpu_parts(nl_dists, "nlDists")?;
    let (_, _, i_buf) = gpu_parts(nl_inds, "nlInds")?;
    let (_, _, v_buf) = gpu_parts(vid, "vid")?;
    let (_, _, q_buf) = gpu_parts(query_inds, "queryInds")?;
    let (_, _, ff_buf) = gpu_parts(fflow, "fflow")?;
    let (_, _, bf_buf) = gpu_parts(bflow, "bflow")?;
    let nq = query_inds.shape().dims()[0];
    let num_cand = (2 * p.wt + 1) * p.ws * p.ws;

    let dims = upload_dims(&dev, &search_dims(vid, nq, p.k, p))?;
    let cand_d: CudaSlice<f32> = dev
        .alloc_zeros(nq * num_cand)
        .map_err(|e| CudaError::MemoryError(e.to_string()))?;
    let cand_i: CudaSlice<i32> = dev
        .alloc_zeros(nq * num_cand * 3)
        .map_err(|e| CudaError::MemoryError(e.to_string()))?;

    let f = get_or_load_func(&dev, idx, "search", "search_dists", SEARCH_CU)?;
    unsafe {
        f.launch(
            grid_2d(nq, num_cand, 32, 8),
            (&cand_d, &cand_i, v_buf, q_buf, ff_buf, bf_buf, &dims),
        )
        .map_err(launch_err)?;
    }

    let topk_dims = upload_dims(&dev, &[num_cand as i32, p.k as i32])?;
    let f = get_or_load_func(&dev, idx, "search", "search_topk", SEARCH_CU)?;
    unsafe {
        f.launch(
            grid_1d(nq, BLOCK_SIZE),
            (d_buf, i_buf, &cand_d, &cand_i, &topk_dims, nq as u32),
        )
        .map_err(launch_err)?;
    }
    sync(&dev)
}

pub fn search_backward(
    grad_vid: &Tensor,
    vid: &Tensor,
    query_inds: &Tensor,
    grad_dists: &Tensor,
    nl_inds: &Tensor,
    p: &SearchParams,
) -> Result<(), CudaError> {
    let (dev, idx, gv_buf) = gpu_parts(grad_vid, "grad_vid")?;
    let (_, _, v_buf) = gpu_parts(vid, "vid")?;
    let (_, _, q_buf) = gpu_parts(query_inds, "queryInds")?;
    let (_, _, gd_buf) = gpu_parts(grad_dists, "grad_dists")?;
    let (_, _, i_buf) = gpu_parts(nl_inds, "nlInds")?;
    let nq = query_inds.shape().dims()[0];
    let k = nl_inds.shape().dims()[1];

    let dims = upload_dims(&dev, &search_dims(vid, nq, k, p))?;
    let n = nq * k;
    let f = get_or_load_func(&dev, idx, "search", "search_backward", SEARCH_CU)?;
    unsafe {
        f.launch(
            grid_1d(n, BLOCK_SIZE),
            (gv_buf, v_buf, q_buf, gd_buf, i_buf, &dims, n as u32),
        )
        .map_err(launch_err)?;
    }
    sync(&dev)
}

fn xsearch_dims(vid: &Tensor, nq: usize, k: usize, p: &XSearchParams) -> Vec<i32> {
    let [t, c, h, w] = d4(vid);
    let num_cand = (2 * p.wt + 1) * p.ws * p.ws;
    vec![
        t as i32,
        c as i32,
        h as i32,
        w as i32,
        nq as i32,
        k as i32,
        p.ps as i32,
        p.pt as i32,
        p.ws as i32,
        p.wt as i32,
        p.chnls as i32,
        p.dilation as i32,
        p.stride1 as i32,
        p.reflect_bounds as i32,
        num_cand as i32,
    ]
}

#[allow(clippy::too_many_arguments)]
pub fn xsearch_forward(
    nl_dists: &Tensor,
    nl_inds: &Tensor,
    vid0: &Tensor,
    vid1: &Tensor,
    query_inds: &Tensor,
    fflow: &Tensor,
    bflow: &Tensor,
    p: &XSearchParams,
) -> Result<(), CudaError> {
    let (dev, idx, d_buf) = gpu_parts(nl_dists, "nlDists")?;
    let (_, _, i_buf) = gpu_parts(nl_inds, "nlInds")?;
    let (_, _, v0_buf) = gpu_parts(vid0, "vid0")?;
    let (_, _, v1_buf) = gpu_parts(vid1, "vid1")?;
    let (_, _, q_buf) = gpu_parts(query_inds, "queryInds")?;
    let (_, _, ff_buf) = gpu_parts(fflow, "fflow")?;
    let (_, _, bf_buf) = gpu_parts(bflow, "bflow")?;
    let nq = query_inds.shape().dims()[0];
    let num_cand = (2 * p.wt + 1) * p.ws * p.ws;

    let dims = upload_dims(&dev, &xsearch_dims(vid1, nq, p.out_k(), p))?;
    let f = get_or_load_func(&dev, idx, "xsearch", "xsearch_dists", XSEARCH_CU)?;

    if !p.use_k {
        // Full-window output: the dists kernel writes the final layout.
        unsafe {
            f.launch(
                grid_2d(nq, num_cand, 32, 8),
                (d_buf, i_buf, v0_buf, v1_buf, q_buf, ff_buf, bf_buf, &dims),
            )
            .map_err(launch_err)?;
        }
        return sync(&dev);
    }

    let cand_d: CudaSlice<f32> = dev
        .alloc_zeros(nq * num_cand)
        .map_err(|e| CudaError::MemoryError(e.to_string()))?;
    let cand_i: CudaSlice<i32> = dev
        .alloc_zeros(nq * num_cand * 3)
        .map_err(|e| CudaError::MemoryError(e.to_string()))?;
    unsafe {
        f.launch(
            grid_2d(nq, num_cand, 32, 8),
            (&cand_d, &cand_i, v0_buf, v1_buf, q_buf, ff_buf, bf_buf, &dims),
        )
        .map_err(launch_err)?;
    }

    let topk_dims = upload_dims(&dev, &[num_cand as i32, p.k as i32])?;
    let f = get_or_load_func(&dev, idx, "search", "search_topk", SEARCH_CU)?;
    unsafe {
        f.launch(
            grid_1d(nq, BLOCK_SIZE),
            (d_buf, i_buf, &cand_d, &cand_i, &topk_dims, nq as u32),
        )
        .map_err(launch_err)?;
    }
    sync(&dev)
}

#[allow(clippy::too_many_arguments)]
pub fn xsearch_backward(
    grad_vid0: &Tensor,
    grad_vid1: &Tensor,
    vid0: &Tensor,
    vid1: &Tensor,
    query_inds: &Tensor,
    grad_dists: &Tensor,
    nl_inds: &Tensor,
    p: &XSearchParams,
) -> Result<(), CudaError> {
    let (dev, idx, g0_buf) = gpu_parts(grad_vid0, "grad_vid0")?;
    let (_, _, g1_buf) = gpu_parts(grad_vid1, "grad_vid1")?;
    let (_, _, v0_buf) = gpu_parts(vid0, "vid0")?;
    let (_, _, v1_buf) = gpu_parts(vid1, "vid1")?;
    let (_, _, q_buf) = gpu_parts(query_inds, "queryInds")?;
    let (_, _, gd_buf) = gpu_parts(grad_dists, "grad_dists")?;
    let (_, _, i_buf) = gpu_parts(nl_inds, "nlInds")?;
    let nq = query_inds.shape().dims()[0];
    let k = nl_inds.shape().dims()[1];

    let dims = upload_dims(&dev, &xsearch_dims(vid1, nq, k, p))?;
    let n = nq * k;
    let f = get_or_load_func(&dev, idx, "xsearch", "xsearch_backward", XSEARCH_CU)?;
    unsafe {
        f.launch(
            grid_1d(n, BLOCK_SIZE),
            (g0_buf, g1_buf, v0_buf, v1_buf, q_buf, gd_buf, i_buf, &dims, n as u32),
        )
        .map_err(launch_err)?;
    }
    sync(&dev)
}

fn wpsum_dims(wpatches: &Tensor, vid: &Tensor, k: usize, p: &WpsumParams) -> Vec<i32> {
    let d = wpatches.shape().dims();
    let [t, _, h, w] = d4(vid);
    vec![
        d[0] as i32,
        k as i32,
        d[1] as i32,
        d[2] as i32,
        d[3] as i32,
        t as i32,
        h as i32,
        w as i32,
        p.h_off as i32,
        p.w_off as i32,
        p.dilation as i32,
        p.adj as i32,
        p.reflect_bounds as i32,
    ]
}

pub fn wpsum_forward(
    wpatches: &Tensor,
    vid: &Tensor,
    dists: &Tensor,
    inds: &Tensor,
    p: &WpsumParams,
) -> Result<(), CudaError> {
    let (dev, idx, wp_buf) = gpu_parts(wpatches, "wpatches")?;
    let (_, _, v_buf) = gpu_parts(vid, "vid")?;
    let (_, _, d_buf) = gpu_parts(dists, "nlDists")?;
    let (_, _, i_buf) = gpu_parts(inds, "nlInds")?;
    let d = wpatches.shape().dims();
    let k = inds.shape().dims()[1];

    let dims = upload_dims(&dev, &wpsum_dims(wpatches, vid, k, p))?;
    let n = d[0] * d[1] * d[2] * d[3] * d[4];
    let f = get_or_load_func(&dev, idx, "wpsum", "wpsum_forward", WPSUM_CU)?;
    unsafe {
        f.launch(
            grid_1d(n, BLOCK_SIZE),
            (wp_buf, v_buf, d_buf, i_buf, &dims, n as u32),
        )
        .map_err(launch_err)?;
    }
    sync(&dev)
}

pub fn wpsum_backward(
    grad_vid: &Tensor,
    grad_dists: &Tensor,
    vid: &Tensor,
    dists: &Tensor,
    inds: &Tensor,
    grad_wpatches: &Tensor,
    p: &WpsumParams,
) -> Result<(), CudaError> {
    let (dev, idx, gv_buf) = gpu_parts(grad_vid, "grad_vid")?;
    let (_, _, gd_buf) = gpu_parts(grad_dists, "grad_dists")?;
    let (_, _, v_buf) = gpu_parts(vid, "vid")?;
    let (_, _, d_buf) = gpu_parts(dists, "nlDists")?;
    let (_, _, i_buf) = gpu_parts(inds, "nlInds")?;
    let (_, _, gw_buf) = gpu_parts(grad_wpatches, "grad_wpatches")?;
    let d = grad_wpatches.shape().dims();
    let k = inds.shape().dims()[1];

    let dims = upload_dims(&dev, &wpsum_dims(grad_wpatches, vid, k, p))?;
    let n = d[0] * k * d[1] * d[2] * d[3] * d[4];
    let f = get_or_load_func(&dev, idx, "wpsum", "wpsum_backward", WPSUM_CU)?;
    unsafe {
        f.launch(
            grid_1d(n, BLOCK_SIZE),
            (gv_buf, gd_buf, v_buf, d_buf, i_buf, gw_buf, &dims, n as u32),
        )
        .map_err(launch_err)?;
    }
    sync(&dev)
}
