use smallvec::SmallVec;
use std::fmt;

/// Stack-allocated dimension storage.
///
/// Patch tensors are 6-D (`[NQ, K, PT, C, PS, PS]`), so six inline slots
/// cover every shape in this library without heap allocation.
pub type Dims = SmallVec<[usize; 6]>;

/// Tensor shape.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Dims,
}

impl Shape {
    /// Create a new shape from dimensions.
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        if self.dims.is_empty() {
            1
        } else {
            self.dims.iter().product()
        }
    }

    /// Get dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Get size of a specific dimension.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Compute strides for a contiguous row-major layout.
    pub fn contiguous_strides(&self) -> Dims {
        let ndim = self.dims.len();
        if ndim == 0 {
            return SmallVec::new();
        }
        let mut strides = SmallVec::from_elem(0usize, ndim);
        strides[ndim - 1] = 1;
        for i in (0..ndim - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Shape with two axes swapped.
    pub fn swapped(&self, a: usize, b: usize) -> Option<Shape> {
        if a >= self.ndim() || b >= self.ndim() {
            return None;
        }
        let mut dims = self.dims.clone();
        dims.swap(a, b);
        Some(Shape { dims })
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel_and_rank() {
        let s = Shape::new(&[3, 2, 8, 8]);
        assert_eq!(s.ndim(), 4);
        assert_eq!(s.numel(), 384);
        assert_eq!(s.dim(1), Some(2));
        assert_eq!(s.dim(4), None);
    }

    #[test]
    fn test_contiguous_strides() {
        let s = Shape::new(&[2, 3, 4]);
        assert_eq!(s.contiguous_strides().as_slice(), &[12, 4, 1]);
        let patches = Shape::new(&[5, 2, 1, 3, 7, 7]);
        assert_eq!(
            patches.contiguous_strides().as_slice(),
            &[294, 147, 147, 49, 7, 1]
        );
    }

    #[test]
    fn test_swapped() {
        let s = Shape::new(&[2, 3, 4]);
        assert_eq!(s.swapped(1, 2).unwrap().dims(), &[2, 4, 3]);
        assert!(s.swapped(1, 3).is_none());
    }
}
