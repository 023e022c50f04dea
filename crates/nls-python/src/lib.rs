//! # nls-python
//!
//! PyO3 bindings for nls → `import nls` in Python.
//!
//! Provides:
//! - `nls.Tensor`, wrapping `nls_core::Tensor` with NumPy interop
//! - one function per registered operation (`nls.scatter_forward`, ...)
//! - `nls.ops()`, the registered operation names

use numpy::{PyArray1, PyArrayDyn, PyArrayMethods, PyReadonlyArrayDyn, PyUntypedArrayMethods};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use nls_kernels::{SearchParams, WpsumParams, XSearchParams};

fn py_err(e: nls_core::NlsError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

// ============================================================================
// Tensor wrapper
// ============================================================================

#[pyclass(name = "Tensor")]
#[derive(Clone)]
struct PyTensor {
    inner: nls_core::Tensor,
}

#[pymethods]
impl PyTensor {
    /// Create a tensor from a float32 NumPy array.
    #[new]
    fn new(data: PyReadonlyArrayDyn<'_, f32>) -> PyResult<Self> {
        let slice = data
            .as_slice()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let shape: Vec<usize> = data.shape().to_vec();
        Ok(Self {
            inner: nls_core::Tensor::from_f32(slice, &shape),
        })
    }

    /// Create a tensor from an int32 NumPy array.
    #[staticmethod]
    fn from_i32(data: PyReadonlyArrayDyn<'_, i32>) -> PyResult<Self> {
        let slice = data
            .as_slice()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let shape: Vec<usize> = data.shape().to_vec();
        Ok(Self {
            inner: nls_core::Tensor::from_i32(slice, &shape),
        })
    }

    /// Create a float32 tensor of zeros.
    #[staticmethod]
    fn zeros(shape: Vec<usize>) -> Self {
        Self {
            inner: nls_core::Tensor::zeros(&shape, nls_core::DType::F32),
        }
    }

    /// Create an int32 tensor of zeros.
    #[staticmethod]
    fn izeros(shape: Vec<usize>) -> Self {
        Self {
            inner: nls_core::Tensor::zeros(&shape, nls_core::DType::I32),
        }
    }

    /// Shape as a list.
    #[getter]
    fn shape(&self) -> Vec<usize> {
        self.inner.shape().dims().to_vec()
    }

    /// Number of dimensions.
    #[getter]
    fn ndim(&self) -> usize {
        self.inner.ndim()
    }

    /// Total number of elements.
    #[getter]
    fn numel(&self) -> usize {
        self.inner.numel()
    }

    /// Data type as string.
    #[getter]
    fn dtype(&self) -> String {
        format!("{}", self.inner.dtype())
    }

    /// Device as string ("cpu" or "cuda:N").
    #[getter]
    fn device(&self) -> String {
        format!("{}", self.inner.device())
    }

    /// Whether the tensor's layout is contiguous.
    #[getter]
    fn is_contiguous(&self) -> bool {
        self.inner.is_contiguous()
    }

    /// Convert a float32 tensor to a NumPy array.
    fn numpy<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArrayDyn<f32>>> {
        let data = self.inner.contiguous();
        let slice = data
            .as_f32_slice()
            .ok_or_else(|| PyValueError::new_err("cannot convert non-f32 tensor to numpy"))?;
        let shape: Vec<usize> = data.shape().dims().to_vec();
        let flat = PyArray1::from_vec_bound(py, slice.to_vec());
        flat.reshape(shape)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Convert an int32 tensor to a NumPy array.
    fn numpy_i32<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArrayDyn<i32>>> {
        let data = self.inner.contiguous();
        let slice = data
            .as_i32_slice()
            .ok_or_else(|| PyValueError::new_err("cannot convert non-i32 tensor to numpy"))?;
        let shape: Vec<usize> = data.shape().dims().to_vec();
        let flat = PyArray1::from_vec_bound(py, slice.to_vec());
        flat.reshape(shape)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Swap two axes (view, no copy).
    fn transpose(&self, a: usize, b: usize) -> PyResult<PyTensor> {
        let inner = self.inner.transpose(a, b).map_err(py_err)?;
        Ok(PyTensor { inner })
    }

    /// Return a contiguous copy (no-op if already contiguous).
    fn contiguous(&self) -> PyTensor {
        PyTensor {
            inner: self.inner.contiguous(),
        }
    }

    /// Move the tensor to a CUDA device.
    #[cfg(feature = "cuda")]
    #[pyo3(signature = (device_idx=0))]
    fn cuda(&self, device_idx: usize) -> PyResult<PyTensor> {
        let inner = self.inner.cuda(device_idx).map_err(py_err)?;
        Ok(PyTensor { inner })
    }

    /// Move the tensor back to the CPU.
    #[cfg(feature = "cuda")]
    fn cpu(&self) -> PyResult<PyTensor> {
        let inner = self.inner.cpu().map_err(py_err)?;
        Ok(PyTensor { inner })
    }

    fn __repr__(&self) -> String {
        format!("{}", self.inner)
    }
}

// ============================================================================
// Operation bindings
// ============================================================================

#[pyfunction]
#[pyo3(signature = (vid, wvid, patches, nl_dists, nl_inds, lam=0.0, dilation=1))]
#[allow(clippy::too_many_arguments)]
fn gather_forward(
    mut vid: PyRefMut<'_, PyTensor>,
    mut wvid: PyRefMut<'_, PyTensor>,
    patches: &PyTensor,
    nl_dists: &PyTensor,
    nl_inds: &PyTensor,
    lam: f32,
    dilation: usize,
) -> PyResult<()> {
    nls_ops::gather::forward(
        &mut vid.inner,
        &mut wvid.inner,
        &patches.inner,
        &nl_dists.inner,
        &nl_inds.inner,
        lam,
        dilation,
    )
    .map_err(py_err)
}

#[pyfunction]
fn gather_backward(
    grad_vid: &PyTensor,
    mut patches: PyRefMut<'_, PyTensor>,
    nl_dists: &PyTensor,
    nl_inds: &PyTensor,
) -> PyResult<()> {
    nls_ops::gather::backward(
        &grad_vid.inner,
        &mut patches.inner,
        &nl_dists.inner,
        &nl_inds.inner,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (patches, vid, nl_inds, dilation=1, reflect_bounds=true))]
fn scatter_forward(
    mut patches: PyRefMut<'_, PyTensor>,
    vid: &PyTensor,
    nl_inds: &PyTensor,
    dilation: usize,
    reflect_bounds: bool,
) -> PyResult<()> {
    nls_ops::scatter::forward(
        &mut patches.inner,
        &vid.inner,
        &nl_inds.inner,
        dilation,
        reflect_bounds,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (grad_vid, grad_patches, nl_inds, dilation=1, reflect_bounds=true, exact=false))]
fn scatter_backward(
    mut grad_vid: PyRefMut<'_, PyTensor>,
    grad_patches: &PyTensor,
    nl_inds: &PyTensor,
    dilation: usize,
    reflect_bounds: bool,
    exact: bool,
) -> PyResult<()> {
    nls_ops::scatter::backward(
        &mut grad_vid.inner,
        &grad_patches.inner,
        &nl_inds.inner,
        dilation,
        reflect_bounds,
        exact,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (nl_dists, nl_inds, vid, query_inds, fflow, bflow,
                    k, ps, pt=1, ws=7, wt=0, chnls=1, dilation=1, stride=1,
                    reflect_bounds=true))]
#[allow(clippy::too_many_arguments)]
fn search_forward(
    mut nl_dists: PyRefMut<'_, PyTensor>,
    mut nl_inds: PyRefMut<'_, PyTensor>,
    vid: &PyTensor,
    query_inds: &PyTensor,
    fflow: &PyTensor,
    bflow: &PyTensor,
    k: usize,
    ps: usize,
    pt: usize,
    ws: usize,
    wt: usize,
    chnls: usize,
    dilation: usize,
    stride: usize,
    reflect_bounds: bool,
) -> PyResult<()> {
    let params = SearchParams {
        k,
        ps,
        pt,
        ws,
        wt,
        chnls,
        dilation,
        stride,
        reflect_bounds,
    };
    nls_ops::search::forward(
        &mut nl_dists.inner,
        &mut nl_inds.inner,
        &vid.inner,
        &query_inds.inner,
        &fflow.inner,
        &bflow.inner,
        &params,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (grad_vid, vid, query_inds, grad_dists, nl_inds,
                    k, ps, pt=1, ws=7, wt=0, chnls=1, dilation=1, stride=1,
                    reflect_bounds=true))]
#[allow(clippy::too_many_arguments)]
fn search_backward(
    mut grad_vid: PyRefMut<'_, PyTensor>,
    vid: &PyTensor,
    query_inds: &PyTensor,
    grad_dists: &PyTensor,
    nl_inds: &PyTensor,
    k: usize,
    ps: usize,
    pt: usize,
    ws: usize,
    wt: usize,
    chnls: usize,
    dilation: usize,
    stride: usize,
    reflect_bounds: bool,
) -> PyResult<()> {
    let params = SearchParams {
        k,
        ps,
        pt,
        ws,
        wt,
        chnls,
        dilation,
        stride,
        reflect_bounds,
    };
    nls_ops::search::backward(
        &mut grad_vid.inner,
        &vid.inner,
        &query_inds.inner,
        &grad_dists.inner,
        &nl_inds.inner,
        &params,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (vid, patches, q_start=0, stride=1, dilation=1))]
fn fold_forward(
    mut vid: PyRefMut<'_, PyTensor>,
    patches: &PyTensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> PyResult<()> {
    nls_ops::fold::forward(&mut vid.inner, &patches.inner, q_start, stride, dilation)
        .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (grad_patches, grad_vid, q_start=0, stride=1, dilation=1))]
fn fold_backward(
    mut grad_patches: PyRefMut<'_, PyTensor>,
    grad_vid: &PyTensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> PyResult<()> {
    nls_ops::fold::backward(
        &mut grad_patches.inner,
        &grad_vid.inner,
        q_start,
        stride,
        dilation,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (patches, vid, q_start=0, stride=1, dilation=1))]
fn unfold_forward(
    mut patches: PyRefMut<'_, PyTensor>,
    vid: &PyTensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> PyResult<()> {
    nls_ops::unfold::forward(&mut patches.inner, &vid.inner, q_start, stride, dilation)
        .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (grad_vid, grad_patches, q_start=0, stride=1, dilation=1))]
fn unfold_backward(
    mut grad_vid: PyRefMut<'_, PyTensor>,
    grad_patches: &PyTensor,
    q_start: usize,
    stride: usize,
    dilation: usize,
) -> PyResult<()> {
    nls_ops::unfold::backward(
        &mut grad_vid.inner,
        &grad_patches.inner,
        q_start,
        stride,
        dilation,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (patches, vid, top, left, btm, right, q_start=0, stride=1, dilation=1, adj=0))]
#[allow(clippy::too_many_arguments)]
fn iunfold_forward(
    mut patches: PyRefMut<'_, PyTensor>,
    vid: &PyTensor,
    top: usize,
    left: usize,
    btm: usize,
    right: usize,
    q_start: usize,
    stride: usize,
    dilation: usize,
    adj: isize,
) -> PyResult<()> {
    nls_ops::iunfold::forward(
        &mut patches.inner,
        &vid.inner,
        (top, left, btm, right),
        q_start,
        stride,
        dilation,
        adj,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (grad_vid, grad_patches, top, left, btm, right, q_start=0, stride=1, dilation=1, adj=0))]
#[allow(clippy::too_many_arguments)]
fn iunfold_backward(
    mut grad_vid: PyRefMut<'_, PyTensor>,
    grad_patches: &PyTensor,
    top: usize,
    left: usize,
    btm: usize,
    right: usize,
    q_start: usize,
    stride: usize,
    dilation: usize,
    adj: isize,
) -> PyResult<()> {
    nls_ops::iunfold::backward(
        &mut grad_vid.inner,
        &grad_patches.inner,
        (top, left, btm, right),
        q_start,
        stride,
        dilation,
        adj,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (nl_dists, nl_inds, vid0, vid1, query_inds, fflow, bflow,
                    k, ps, pt=1, ws=7, wt=0, chnls=1, dilation=1, stride1=1,
                    use_k=true, reflect_bounds=true))]
#[allow(clippy::too_many_arguments)]
fn xsearch_forward(
    mut nl_dists: PyRefMut<'_, PyTensor>,
    mut nl_inds: PyRefMut<'_, PyTensor>,
    vid0: &PyTensor,
    vid1: &PyTensor,
    query_inds: &PyTensor,
    fflow: &PyTensor,
    bflow: &PyTensor,
    k: usize,
    ps: usize,
    pt: usize,
    ws: usize,
    wt: usize,
    chnls: usize,
    dilation: usize,
    stride1: usize,
    use_k: bool,
    reflect_bounds: bool,
) -> PyResult<()> {
    let params = XSearchParams {
        k,
        ps,
        pt,
        ws,
        wt,
        chnls,
        dilation,
        stride1,
        use_k,
        reflect_bounds,
    };
    nls_ops::xsearch::forward(
        &mut nl_dists.inner,
        &mut nl_inds.inner,
        &vid0.inner,
        &vid1.inner,
        &query_inds.inner,
        &fflow.inner,
        &bflow.inner,
        &params,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (grad_vid0, grad_vid1, vid0, vid1, query_inds, grad_dists, nl_inds,
                    k, ps, pt=1, ws=7, wt=0, chnls=1, dilation=1, stride1=1,
                    use_k=true, reflect_bounds=true))]
#[allow(clippy::too_many_arguments)]
fn xsearch_backward(
    mut grad_vid0: PyRefMut<'_, PyTensor>,
    mut grad_vid1: PyRefMut<'_, PyTensor>,
    vid0: &PyTensor,
    vid1: &PyTensor,
    query_inds: &PyTensor,
    grad_dists: &PyTensor,
    nl_inds: &PyTensor,
    k: usize,
    ps: usize,
    pt: usize,
    ws: usize,
    wt: usize,
    chnls: usize,
    dilation: usize,
    stride1: usize,
    use_k: bool,
    reflect_bounds: bool,
) -> PyResult<()> {
    let params = XSearchParams {
        k,
        ps,
        pt,
        ws,
        wt,
        chnls,
        dilation,
        stride1,
        use_k,
        reflect_bounds,
    };
    nls_ops::xsearch::backward(
        &mut grad_vid0.inner,
        &mut grad_vid1.inner,
        &vid0.inner,
        &vid1.inner,
        &query_inds.inner,
        &grad_dists.inner,
        &nl_inds.inner,
        &params,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (wpatches, vid, nl_dists, nl_inds, h_off=0, w_off=0, dilation=1, adj=0,
                    reflect_bounds=true))]
#[allow(clippy::too_many_arguments)]
fn wpsum_forward(
    mut wpatches: PyRefMut<'_, PyTensor>,
    vid: &PyTensor,
    nl_dists: &PyTensor,
    nl_inds: &PyTensor,
    h_off: isize,
    w_off: isize,
    dilation: usize,
    adj: isize,
    reflect_bounds: bool,
) -> PyResult<()> {
    let params = WpsumParams {
        h_off,
        w_off,
        dilation,
        adj,
        reflect_bounds,
    };
    nls_ops::wpsum::forward(
        &mut wpatches.inner,
        &vid.inner,
        &nl_dists.inner,
        &nl_inds.inner,
        &params,
    )
    .map_err(py_err)
}

#[pyfunction]
#[pyo3(signature = (grad_vid, grad_dists, vid, nl_dists, nl_inds, grad_wpatches,
                    h_off=0, w_off=0, dilation=1, adj=0, reflect_bounds=true))]
#[allow(clippy::too_many_arguments)]
fn wpsum_backward(
    mut grad_vid: PyRefMut<'_, PyTensor>,
    mut grad_dists: PyRefMut<'_, PyTensor>,
    vid: &PyTensor,
    nl_dists: &PyTensor,
    nl_inds: &PyTensor,
    grad_wpatches: &PyTensor,
    h_off: isize,
    w_off: isize,
    dilation: usize,
    adj: isize,
    reflect_bounds: bool,
) -> PyResult<()> {
    let params = WpsumParams {
        h_off,
        w_off,
        dilation,
        adj,
        reflect_bounds,
    };
    nls_ops::wpsum::backward(
        &mut grad_vid.inner,
        &mut grad_dists.inner,
        &vid.inner,
        &nl_dists.inner,
        &nl_inds.inner,
        &grad_wpatches.inner,
        &params,
    )
    .map_err(py_err)
}

/// Names of every registered operation.
#[pyfunction]
fn ops() -> Vec<&'static str> {
    nls_ops::OPS.iter().map(|op| op.name).collect()
}

/// Whether a CUDA device is available to this build.
#[pyfunction]
fn cuda_available() -> bool {
    #[cfg(feature = "cuda")]
    {
        nls_kernels::cuda::is_cuda_available()
    }
    #[cfg(not(feature = "cuda"))]
    {
        false
    }
}

// ============================================================================
// Module entry point
// ============================================================================

#[pymodule]
fn nls(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTensor>()?;
    m.add_function(wrap_pyfunction!(gather_forward, m)?)?;
    m.add_function(wrap_pyfunction!(gather_backward, m)?)?;
    m.add_function(wrap_pyfunction!(scatter_forward, m)?)?;
    m.add_function(wrap_pyfunction!(scatter_backward, m)?)?;
    m.add_function(wrap_pyfunction!(search_forward, m)?)?;
    m.add_function(wrap_pyfunction!(search_backward, m)?)?;
    m.add_function(wrap_pyfunction!(fold_forward, m)?)?;
    m.add_function(wrap_pyfunction!(fold_backward, m)?)?;
    m.add_function(wrap_pyfunction!(unfold_forward, m)?)?;
    m.add_function(wrap_pyfunction!(unfold_backward, m)?)?;
    m.add_function(wrap_pyfunction!(iunfold_forward, m)?)?;
    m.add_function(wrap_pyfunction!(iunfold_backward, m)?)?;
    m.add_function(wrap_pyfunction!(xsearch_forward, m)?)?;
    m.add_function(wrap_pyfunction!(xsearch_backward, m)?)?;
    m.add_function(wrap_pyfunction!(wpsum_forward, m)?)?;
    m.add_function(wrap_pyfunction!(wpsum_backward, m)?)?;
    m.add_function(wrap_pyfunction!(ops, m)?)?;
    m.add_function(wrap_pyfunction!(cuda_available, m)?)?;
    Ok(())
}
