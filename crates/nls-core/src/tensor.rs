use std::fmt;

use crate::shape::Dims;
use crate::{DType, Device, NlsError, Result, Shape, Storage};

/// A dense multi-dimensional array over shared, strided storage.
///
/// Views (reshape, transpose, narrow) alias the same storage with different
/// strides/offset; `is_contiguous` reports whether the view is laid out
/// row-major with no gaps, which the dispatch layer requires of every
/// operand.
///
/// # Examples
///
/// ```
/// use nls_core::Tensor;
///
/// let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
/// assert!(t.is_contiguous());
/// let v = t.transpose(0, 1).unwrap();
/// assert!(!v.is_contiguous());
/// assert_eq!(v.contiguous().as_f32_slice().unwrap(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
    strides: Dims,
    offset: usize,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a tensor from f32 data with the given shape.
    pub fn from_f32(data: &[f32], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(
            s.numel(),
            data.len(),
            "shape {:?} requires {} elements, got {}",
            shape,
            s.numel(),
            data.len()
        );
        let strides = s.contiguous_strides();
        Self {
            storage: Storage::from_f32(data),
            shape: s,
            strides,
            offset: 0,
        }
    }

    /// Create a tensor from i32 data with the given shape.
    pub fn from_i32(data: &[i32], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(s.numel(), data.len());
        let strides = s.contiguous_strides();
        Self {
            storage: Storage::from_i32(data),
            shape: s,
            strides,
            offset: 0,
        }
    }

    /// Create a zeroed tensor with the given shape and dtype.
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let s = Shape::new(shape);
        let strides = s.contiguous_strides();
        Self {
            storage: Storage::zeros(dtype, s.numel()),
            shape: s,
            strides,
            offset: 0,
        }
    }

    /// Create a zeroed tensor with the shape and dtype of another.
    pub fn zeros_like(other: &Tensor) -> Self {
        Self::zeros(other.shape().dims(), other.dtype())
    }

    /// Wrap existing storage as a contiguous tensor of the given shape.
    pub fn from_storage(storage: Storage, shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        debug_assert_eq!(s.numel(), storage.numel());
        let strides = s.contiguous_strides();
        Self {
            storage,
            shape: s,
            strides,
            offset: 0,
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn device(&self) -> Device {
        self.storage.device()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Underlying storage (for kernel dispatch).
    pub fn storage_ref(&self) -> &Storage {
        &self.storage
    }

    /// Whether this tensor is on CPU.
    pub fn is_cpu(&self) -> bool {
        self.storage.is_cpu()
    }

    /// Whether this tensor is on a CUDA device.
    pub fn is_cuda(&self) -> bool {
        self.storage.is_cuda()
    }

    /// Whether this tensor is contiguous in memory (row-major, no offset).
    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides() && self.offset == 0
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// The underlying f32 data (contiguous CPU tensors only).
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_f32_slice()
    }

    /// Mutable f32 data (contiguous CPU tensors, copy-on-write).
    pub fn as_f32_slice_mut(&mut self) -> Option<&mut [f32]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_f32_slice_mut()
    }

    /// The underlying i32 data (contiguous CPU tensors only).
    pub fn as_i32_slice(&self) -> Option<&[i32]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_i32_slice()
    }

    /// Mutable i32 data (contiguous CPU tensors, copy-on-write).
    pub fn as_i32_slice_mut(&mut self) -> Option<&mut [i32]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_i32_slice_mut()
    }

    /// Get a single f32 element by logical flat index, honoring strides.
    pub fn get_f32(&self, flat_index: usize) -> Option<f32> {
        let slice = self.storage.as_f32_slice()?;
        let physical = self.flat_to_physical(flat_index)?;
        slice.get(physical).copied()
    }

    /// Convert a logical flat index to a physical storage index.
    fn flat_to_physical(&self, flat_index: usize) -> Option<usize> {
        if flat_index >= self.numel() {
            return None;
        }
        let mut remaining = flat_index;
        let mut physical = self.offset;
        for (i, &cs) in self.shape.contiguous_strides().iter().enumerate() {
            let idx = remaining / cs;
            remaining %= cs;
            physical += idx * self.strides[i];
        }
        Some(physical)
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Reshape (zero-copy; contiguous tensors only).
    pub fn reshape(&self, new_shape: &[usize]) -> Result<Tensor> {
        let s = Shape::new(new_shape);
        if s.numel() != self.numel() {
            return Err(NlsError::InvalidReshape {
                numel: self.numel(),
                shape: new_shape.to_vec(),
            });
        }
        if !self.is_contiguous() {
            return Err(NlsError::StorageError(
                "cannot reshape a non-contiguous tensor (call .contiguous() first)".into(),
            ));
        }
        let strides = s.contiguous_strides();
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: s,
            strides,
            offset: self.offset,
        })
    }

    /// Swap two axes (zero-copy view; usually non-contiguous).
    pub fn transpose(&self, a: usize, b: usize) -> Result<Tensor> {
        let shape = self
            .shape
            .swapped(a, b)
            .ok_or_else(|| NlsError::ShapeMismatch {
                expected: vec![self.ndim()],
                got: vec![a.max(b) + 1],
            })?;
        let mut strides = self.strides.clone();
        strides.swap(a, b);
        Ok(Tensor {
            storage: self.storage.clone(),
            shape,
            strides,
            offset: self.offset,
        })
    }

    /// Narrow one axis to `[start, start + len)` (zero-copy view).
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Tensor> {
        let dim = self.shape.dim(axis).ok_or_else(|| NlsError::ShapeMismatch {
            expected: vec![self.ndim()],
            got: vec![axis + 1],
        })?;
        if start + len > dim {
            return Err(NlsError::ShapeMismatch {
                expected: vec![dim],
                got: vec![start + len],
            });
        }
        let mut dims: Vec<usize> = self.shape.dims().to_vec();
        dims[axis] = len;
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: Shape::new(&dims),
            strides: self.strides.clone(),
            offset: self.offset + start * self.strides[axis],
        })
    }

    /// Return a contiguous copy if this view isn't already contiguous.
    pub fn contiguous(&self) -> Tensor {
        if self.is_contiguous() {
            return self.clone();
        }
        match self.dtype() {
            DType::F32 => {
                let numel = self.numel();
                let mut data = vec![0.0f32; numel];
                for (i, slot) in data.iter_mut().enumerate() {
                    *slot = self
                        .get_f32(i)
                        .expect("contiguous: index out of bounds during copy");
                }
                Tensor::from_f32(&data, self.shape.dims())
            }
            DType::I32 => {
                let src = self
                    .storage
                    .as_i32_slice()
                    .expect("contiguous: CPU i32 storage");
                let numel = self.numel();
                let mut data = vec![0i32; numel];
                for (i, slot) in data.iter_mut().enumerate() {
                    let physical = self
                        .flat_to_physical(i)
                        .expect("contiguous: index out of bounds during copy");
                    *slot = src[physical];
                }
                Tensor::from_i32(&data, self.shape.dims())
            }
            _ => self.clone(),
        }
    }

    // =========================================================================
    // Device transfer
    // =========================================================================

    /// Move tensor to the specified device. No-op if already there.
    #[cfg(feature = "cuda")]
    pub fn to(&self, device: Device) -> Result<Tensor> {
        match device {
            Device::Cpu => {
                if self.is_cpu() {
                    return Ok(self.clone());
                }
                Ok(Tensor {
                    storage: self.storage.to_cpu()?,
                    shape: self.shape.clone(),
                    strides: self.strides.clone(),
                    offset: self.offset,
                })
            }
            Device::Cuda(idx) => {
                if self.device() == Device::Cuda(idx) {
                    return Ok(self.clone());
                }
                // GPU kernels assume row-major layouts; pack before upload.
                let cont = self.contiguous();
                Ok(Tensor {
                    storage: cont.storage.to_cuda(idx)?,
                    shape: cont.shape.clone(),
                    strides: cont.strides.clone(),
                    offset: 0,
                })
            }
        }
    }

    /// Move tensor to a CUDA device.
    #[cfg(feature = "cuda")]
    pub fn cuda(&self, device_idx: usize) -> Result<Tensor> {
        self.to(Device::Cuda(device_idx))
    }

    /// Move tensor to CPU.
    #[cfg(feature = "cuda")]
    pub fn cpu(&self) -> Result<Tensor> {
        self.to(Device::Cpu)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, dtype={}, device={}, contiguous={})",
            self.shape,
            self.dtype(),
            self.device(),
            self.is_contiguous(),
        )
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(data) = self.as_f32_slice() {
            if self.numel() <= 20 {
                write!(f, "tensor({:?}, shape={})", data, self.shape)
            } else {
                write!(
                    f,
                    "tensor([{:.4}, {:.4}, ..., {:.4}], shape={})",
                    data[0],
                    data[1],
                    data[self.numel() - 1],
                    self.shape
                )
            }
        } else {
            write!(f, "tensor(shape={}, dtype={})", self.shape, self.dtype())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f32_contiguous() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        assert_eq!(t.shape().dims(), &[2, 2]);
        assert_eq!(t.numel(), 4);
        assert!(t.is_contiguous());
        assert_eq!(t.as_f32_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_transpose_view() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let v = t.transpose(0, 1).unwrap();
        assert_eq!(v.shape().dims(), &[3, 2]);
        assert!(!v.is_contiguous());
        assert!(v.as_f32_slice().is_none());
        assert_eq!(v.get_f32(0), Some(1.0));
        assert_eq!(v.get_f32(1), Some(4.0));
        let c = v.contiguous();
        assert_eq!(c.as_f32_slice().unwrap(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_narrow_offset() {
        let t = Tensor::from_f32(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0], &[3, 2]);
        let v = t.narrow(0, 1, 2).unwrap();
        assert_eq!(v.shape().dims(), &[2, 2]);
        assert!(!v.is_contiguous());
        assert_eq!(v.get_f32(0), Some(2.0));
        assert_eq!(v.contiguous().as_f32_slice().unwrap(), &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_reshape_rejects_views() {
        let t = Tensor::from_f32(&[1.0; 6], &[2, 3]);
        assert!(t.reshape(&[3, 2]).is_ok());
        assert!(t.reshape(&[4]).is_err());
        let v = t.transpose(0, 1).unwrap();
        assert!(v.reshape(&[6]).is_err());
    }

    #[test]
    fn test_i32_tensor() {
        let t = Tensor::from_i32(&[0, 1, -1, 2, 3, -1], &[2, 3]);
        assert_eq!(t.dtype(), DType::I32);
        assert_eq!(t.as_i32_slice().unwrap()[2], -1);
    }

    #[test]
    fn test_zeros_like() {
        let t = Tensor::from_i32(&[1, 2], &[2]);
        let z = Tensor::zeros_like(&t);
        assert_eq!(z.dtype(), DType::I32);
        assert_eq!(z.as_i32_slice().unwrap(), &[0, 0]);
    }
}
