//! Boundary precondition checks for the dispatch layer.
//!
//! Every operation entry point runs these over its tensor arguments in
//! declared order before any kernel executes. A failure names the offending
//! argument and the violated condition, and has no side effects.

use crate::{NlsError, Result, Tensor};

/// The tensor must reside on a CUDA device.
pub fn check_cuda(t: &Tensor, arg: &str) -> Result<()> {
    if !t.is_cuda() {
        return Err(NlsError::NotCuda { arg: arg.into() });
    }
    Ok(())
}

/// The tensor must be contiguous (row-major, no offset).
pub fn check_contiguous(t: &Tensor, arg: &str) -> Result<()> {
    if !t.is_contiguous() {
        return Err(NlsError::NotContiguous { arg: arg.into() });
    }
    Ok(())
}

/// Combined device + layout check, device first.
pub fn check_input(t: &Tensor, arg: &str) -> Result<()> {
    check_cuda(t, arg)?;
    check_contiguous(t, arg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;

    #[test]
    fn test_cpu_tensor_fails_device_check() {
        let t = Tensor::from_f32(&[1.0, 2.0], &[2]);
        let err = check_cuda(&t, "vid").unwrap_err();
        assert_eq!(err.to_string(), "vid must be a CUDA tensor");
    }

    #[test]
    fn test_noncontiguous_view_fails_layout_check() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let v = t.transpose(0, 1).unwrap();
        assert!(check_contiguous(&t, "patches").is_ok());
        let err = check_contiguous(&v, "patches").unwrap_err();
        assert_eq!(err.to_string(), "patches must be contiguous");
    }

    #[test]
    fn test_check_input_reports_device_before_layout() {
        // CPU and non-contiguous: the device condition is reported.
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let v = t.transpose(0, 1).unwrap();
        let err = check_input(&v, "wvid").unwrap_err();
        assert_eq!(err.to_string(), "wvid must be a CUDA tensor");
    }
}
