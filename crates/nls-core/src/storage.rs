use std::sync::Arc;

use crate::{DType, Device, NlsError, Result};

#[cfg(feature = "cuda")]
use cudarc::driver::{CudaDevice, CudaSlice, DeviceSlice};

/// Backing storage for tensor data.
#[derive(Debug, Clone)]
pub enum StorageData {
    /// CPU heap-allocated bytes.
    Cpu(Vec<u8>),
    /// CUDA GPU storage with device handle and raw byte buffer.
    #[cfg(feature = "cuda")]
    Cuda {
        device: Arc<CudaDevice>,
        buffer: Arc<CudaSlice<u8>>,
        device_idx: usize,
    },
}

/// Shared, reference-counted tensor storage.
///
/// Storage is `Arc`-shared so multiple tensors can alias the same underlying
/// data (views from reshape/transpose/narrow). Mutable access on CPU is
/// copy-on-write: writers that share data get a private copy first.
#[derive(Debug, Clone)]
pub struct Storage {
    data: Arc<StorageData>,
    dtype: DType,
    device: Device,
    /// Number of logical elements (not bytes).
    numel: usize,
}

impl Storage {
    /// Allocate zeroed CPU storage for `numel` elements of the given dtype.
    pub fn zeros(dtype: DType, numel: usize) -> Self {
        let nbytes = dtype.storage_bytes(numel);
        Self {
            data: Arc::new(StorageData::Cpu(vec![0u8; nbytes])),
            dtype,
            device: Device::Cpu,
            numel,
        }
    }

    /// Create storage from a slice of f32 values.
    pub fn from_f32(data: &[f32]) -> Self {
        Self {
            data: Arc::new(StorageData::Cpu(bytemuck::cast_slice(data).to_vec())),
            dtype: DType::F32,
            device: Device::Cpu,
            numel: data.len(),
        }
    }

    /// Create storage from a slice of f64 values.
    pub fn from_f64(data: &[f64]) -> Self {
        Self {
            data: Arc::new(StorageData::Cpu(bytemuck::cast_slice(data).to_vec())),
            dtype: DType::F64,
            device: Device::Cpu,
            numel: data.len(),
        }
    }

    /// Create storage from a slice of i32 values.
    pub fn from_i32(data: &[i32]) -> Self {
        Self {
            data: Arc::new(StorageData::Cpu(bytemuck::cast_slice(data).to_vec())),
            dtype: DType::I32,
            device: Device::Cpu,
            numel: data.len(),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Size in bytes.
    pub fn nbytes(&self) -> usize {
        match self.data.as_ref() {
            StorageData::Cpu(v) => v.len(),
            #[cfg(feature = "cuda")]
            StorageData::Cuda { buffer, .. } => buffer.len(),
        }
    }

    /// Whether this storage is on CPU.
    pub fn is_cpu(&self) -> bool {
        self.device.is_cpu()
    }

    /// Whether this storage is on a CUDA device.
    pub fn is_cuda(&self) -> bool {
        self.device.is_cuda()
    }

    /// Read-only raw bytes. `None` for GPU storage.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.data.as_ref() {
            StorageData::Cpu(v) => Some(v),
            #[cfg(feature = "cuda")]
            StorageData::Cuda { .. } => None,
        }
    }

    /// Mutable raw bytes (copy-on-write). `None` for GPU storage.
    pub fn as_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match Arc::make_mut(&mut self.data) {
            StorageData::Cpu(v) => Some(v),
            #[cfg(feature = "cuda")]
            StorageData::Cuda { .. } => None,
        }
    }

    /// Interpret CPU storage as a slice of f32 values.
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        if self.dtype != DType::F32 {
            return None;
        }
        self.as_bytes().map(bytemuck::cast_slice)
    }

    /// Interpret CPU storage as a mutable slice of f32 values (copy-on-write).
    pub fn as_f32_slice_mut(&mut self) -> Option<&mut [f32]> {
        if self.dtype != DType::F32 {
            return None;
        }
        self.as_bytes_mut().map(bytemuck::cast_slice_mut)
    }

    /// Interpret CPU storage as a slice of i32 values.
    pub fn as_i32_slice(&self) -> Option<&[i32]> {
        if self.dtype != DType::I32 {
            return None;
        }
        self.as_bytes().map(bytemuck::cast_slice)
    }

    /// Interpret CPU storage as a mutable slice of i32 values (copy-on-write).
    pub fn as_i32_slice_mut(&mut self) -> Option<&mut [i32]> {
        if self.dtype != DType::I32 {
            return None;
        }
        self.as_bytes_mut().map(bytemuck::cast_slice_mut)
    }

    /// Interpret CPU storage as a slice of f64 values.
    pub fn as_f64_slice(&self) -> Option<&[f64]> {
        if self.dtype != DType::F64 {
            return None;
        }
        self.as_bytes().map(bytemuck::cast_slice)
    }

    /// Whether this storage is uniquely owned (no aliasing views).
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.data) == 1
    }

    /// Wrap an existing GPU buffer.
    #[cfg(feature = "cuda")]
    pub fn from_cuda(
        device: Arc<CudaDevice>,
        buffer: CudaSlice<u8>,
        device_idx: usize,
        dtype: DType,
        numel: usize,
    ) -> Self {
        Self {
            data: Arc::new(StorageData::Cuda {
                device,
                buffer: Arc::new(buffer),
                device_idx,
            }),
            dtype,
            device: Device::Cuda(device_idx),
            numel,
        }
    }

    /// The CUDA device handle backing this storage, if any.
    #[cfg(feature = "cuda")]
    pub fn cuda_device(&self) -> Option<Arc<CudaDevice>> {
        match self.data.as_ref() {
            StorageData::Cuda { device, .. } => Some(Arc::clone(device)),
            _ => None,
        }
    }

    /// The raw GPU byte buffer backing this storage, if any.
    #[cfg(feature = "cuda")]
    pub fn as_cuda_slice(&self) -> Option<&CudaSlice<u8>> {
        match self.data.as_ref() {
            StorageData::Cuda { buffer, .. } => Some(buffer.as_ref()),
            _ => None,
        }
    }

    /// Copy this storage to the given CUDA device (H2D). No-op if already there.
    #[cfg(feature = "cuda")]
    pub fn to_cuda(&self, device_idx: usize) -> Result<Self> {
        if let Device::Cuda(idx) = self.device {
            if idx == device_idx {
                return Ok(self.clone());
            }
        }
        let host_bytes = self
            .as_bytes()
            .ok_or_else(|| NlsError::StorageError("cross-GPU transfer unsupported".into()))?;
        let cuda_dev = CudaDevice::new(device_idx)
            .map_err(|e| NlsError::CudaError(format!("device {device_idx} init: {e}")))?;
        let gpu_buf = cuda_dev
            .htod_copy(host_bytes.to_vec())
            .map_err(|e| NlsError::CudaError(format!("H2D copy: {e}")))?;
        Ok(Self::from_cuda(
            cuda_dev,
            gpu_buf,
            device_idx,
            self.dtype,
            self.numel,
        ))
    }

    /// Copy GPU storage back to CPU (D2H). No-op if already on CPU.
    #[cfg(feature = "cuda")]
    pub fn to_cpu(&self) -> Result<Self> {
        match self.data.as_ref() {
            StorageData::Cpu(_) => Ok(self.clone()),
            StorageData::Cuda { device, buffer, .. } => {
                let host: Vec<u8> = device
                    .dtoh_sync_copy(buffer.as_ref())
                    .map_err(|e| NlsError::CudaError(format!("D2H copy: {e}")))?;
                Ok(Self {
                    data: Arc::new(StorageData::Cpu(host)),
                    dtype: self.dtype,
                    device: Device::Cpu,
                    numel: self.numel,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_and_casts() {
        let s = Storage::zeros(DType::F32, 6);
        assert_eq!(s.numel(), 6);
        assert_eq!(s.nbytes(), 24);
        assert_eq!(s.as_f32_slice().unwrap(), &[0.0; 6]);
        assert!(s.as_i32_slice().is_none());
    }

    #[test]
    fn test_from_i32() {
        let s = Storage::from_i32(&[1, -1, 3]);
        assert_eq!(s.dtype(), DType::I32);
        assert_eq!(s.as_i32_slice().unwrap(), &[1, -1, 3]);
    }

    #[test]
    fn test_copy_on_write() {
        let mut a = Storage::from_f32(&[1.0, 2.0]);
        let b = a.clone();
        assert!(!a.is_unique());
        a.as_f32_slice_mut().unwrap()[0] = 9.0;
        assert_eq!(a.as_f32_slice().unwrap(), &[9.0, 2.0]);
        assert_eq!(b.as_f32_slice().unwrap(), &[1.0, 2.0]);
    }
}
