//! # nls-kernels
//!
//! Kernels for the nls non-local search operation families:
//! gather, scatter, search, fold, unfold, iunfold, xsearch, wpsum.
//!
//! Each family has two implementations with identical semantics:
//! - `cpu_*` modules: plain-Rust reference kernels over CPU tensors. These
//!   are the ground truth for the test suite and are usable directly when no
//!   GPU is present.
//! - `cuda` module (behind the `cuda` feature): kernels compiled from
//!   embedded CUDA source at runtime via NVRTC, cached per device, and
//!   launched through a shared launcher.
//!
//! Patch coordinates use the center convention: patch pixel `(pk, pi, pj)`
//! of a patch anchored at `(t, h, w)` touches video pixel
//! `(t + pk, h + dilation*(pi - ps/2) + adj, w + dilation*(pj - ps/2) + adj)`.

pub mod cpu_gather;
pub mod cpu_scatter;
pub mod cpu_fold;
pub mod cpu_unfold;
pub mod cpu_iunfold;
pub mod cpu_search;
pub mod cpu_xsearch;
pub mod cpu_wpsum;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use cpu_search::SearchParams;
pub use cpu_wpsum::WpsumParams;
pub use cpu_xsearch::XSearchParams;

use nls_core::{DType, NlsError, Result, Tensor};

/// Reflect an out-of-range coordinate at the frame edge, then clamp.
pub(crate) fn reflect(mut i: isize, len: isize) -> isize {
    if i < 0 {
        i = -i;
    }
    if i >= len {
        i = 2 * (len - 1) - i;
    }
    i.clamp(0, len - 1)
}

pub(crate) fn f32s<'a>(t: &'a Tensor, arg: &str) -> Result<&'a [f32]> {
    if t.dtype() != DType::F32 {
        return Err(NlsError::DTypeMismatch {
            expected: DType::F32,
            got: t.dtype(),
        });
    }
    t.as_f32_slice()
        .ok_or_else(|| NlsError::StorageError(format!("{arg}: expected a contiguous CPU tensor")))
}

pub(crate) fn f32s_mut<'a>(t: &'a mut Tensor, arg: &str) -> Result<&'a mut [f32]> {
    if t.dtype() != DType::F32 {
        return Err(NlsError::DTypeMismatch {
            expected: DType::F32,
            got: t.dtype(),
        });
    }
    t.as_f32_slice_mut()
        .ok_or_else(|| NlsError::StorageError(format!("{arg}: expected a contiguous CPU tensor")))
}

pub(crate) fn i32s<'a>(t: &'a Tensor, arg: &str) -> Result<&'a [i32]> {
    if t.dtype() != DType::I32 {
        return Err(NlsError::DTypeMismatch {
            expected: DType::I32,
            got: t.dtype(),
        });
    }
    t.as_i32_slice()
        .ok_or_else(|| NlsError::StorageError(format!("{arg}: expected a contiguous CPU tensor")))
}

pub(crate) fn i32s_mut<'a>(t: &'a mut Tensor, arg: &str) -> Result<&'a mut [i32]> {
    if t.dtype() != DType::I32 {
        return Err(NlsError::DTypeMismatch {
            expected: DType::I32,
            got: t.dtype(),
        });
    }
    t.as_i32_slice_mut()
        .ok_or_else(|| NlsError::StorageError(format!("{arg}: expected a contiguous CPU tensor")))
}

pub(crate) fn expect_ndim(t: &Tensor, ndim: usize, arg: &str) -> Result<()> {
    if t.ndim() != ndim {
        return Err(NlsError::StorageError(format!(
            "{arg}: expected a {ndim}-D tensor, got {}-D",
            t.ndim()
        )));
    }
    Ok(())
}

/// `[T, C, H, W]` video dims.
pub(crate) fn vid_dims(t: &Tensor, arg: &str) -> Result<(usize, usize, usize, usize)> {
    expect_ndim(t, 4, arg)?;
    let d = t.shape().dims();
    Ok((d[0], d[1], d[2], d[3]))
}

/// `[NQ, K, PT, C, PS, PS]` patch dims; the two trailing dims must match.
pub(crate) fn patch_dims(
    t: &Tensor,
    arg: &str,
) -> Result<(usize, usize, usize, usize, usize)> {
    expect_ndim(t, 6, arg)?;
    let d = t.shape().dims();
    if d[4] != d[5] {
        return Err(NlsError::ShapeMismatch {
            expected: vec![d[4], d[4]],
            got: vec![d[4], d[5]],
        });
    }
    Ok((d[0], d[1], d[2], d[3], d[4]))
}

/// `[NQ, K, 3]` neighbor index dims.
pub(crate) fn inds_dims(t: &Tensor, arg: &str) -> Result<(usize, usize)> {
    expect_ndim(t, 3, arg)?;
    let d = t.shape().dims();
    if d[2] != 3 {
        return Err(NlsError::ShapeMismatch {
            expected: vec![d[0], d[1], 3],
            got: d.to_vec(),
        });
    }
    Ok((d[0], d[1]))
}

#[cfg(test)]
mod tests {
    use super::reflect;

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 8), 1);
        assert_eq!(reflect(0, 8), 0);
        assert_eq!(reflect(7, 8), 7);
        assert_eq!(reflect(8, 8), 6);
        assert_eq!(reflect(9, 8), 5);
    }
}
