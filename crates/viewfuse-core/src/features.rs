use crate::error::CoreError;

/// A dense row-major feature matrix of shape `[rows, cols]`.
///
/// Rows index entities (3D points, view entries, atomic observations,
/// pixels), columns index feature channels. This is the common currency
/// between the pooling, fusion and convolution operators.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Features {
    /// Create a feature matrix from a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShape`] if `data.len() != rows * cols`.
    ///
    /// # Example
    ///
    /// ```
    /// use viewfuse_core::Features;
    ///
    /// let x = Features::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    /// assert_eq!(x.rows(), 2);
    /// assert_eq!(x.row(1), &[4.0, 5.0, 6.0]);
    /// ```
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, CoreError> {
        if data.len() != rows * cols {
            return Err(CoreError::InvalidShape {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Create a zero-filled feature matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the matrix holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// The underlying flat row-major buffer.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access to the underlying flat buffer.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// One row as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// One row as a mutable slice.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Gather rows by index into a new matrix, `out.row(i) = self.row(idx[i])`.
    ///
    /// Indices may repeat; the output has `idx.len()` rows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfBounds`] if any index exceeds the row count.
    pub fn gather(&self, idx: &[usize]) -> Result<Self, CoreError> {
        let mut data = Vec::with_capacity(idx.len() * self.cols);
        for &i in idx {
            if i >= self.rows {
                return Err(CoreError::IndexOutOfBounds {
                    index: i,
                    size: self.rows,
                });
            }
            data.extend_from_slice(self.row(i));
        }
        Ok(Self {
            data,
            rows: idx.len(),
            cols: self.cols,
        })
    }

    /// Stack matrices vertically, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ColsMismatch`] if the column counts differ.
    /// An empty part list yields an empty `[0, 0]` matrix.
    pub fn vcat(parts: &[&Features]) -> Result<Self, CoreError> {
        let Some(first) = parts.first() else {
            return Ok(Self::zeros(0, 0));
        };
        let cols = first.cols;
        let rows = parts.iter().map(|p| p.rows).sum();
        let mut data = Vec::with_capacity(rows * cols);
        for p in parts {
            if p.cols != cols {
                return Err(CoreError::ColsMismatch {
                    expected: cols,
                    actual: p.cols,
                });
            }
            data.extend_from_slice(&p.data);
        }
        Ok(Self { data, rows, cols })
    }

    /// Concatenate two matrices along the column axis, row by row.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LengthMismatch`] if the row counts differ.
    pub fn hcat(&self, other: &Features) -> Result<Self, CoreError> {
        if self.rows != other.rows {
            return Err(CoreError::LengthMismatch {
                left: self.rows,
                right: other.rows,
            });
        }
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for i in 0..self.rows {
            data.extend_from_slice(self.row(i));
            data.extend_from_slice(other.row(i));
        }
        Ok(Self {
            data,
            rows: self.rows,
            cols,
        })
    }

    /// Apply a function element-wise, returning a new matrix.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self {
            data: self.data.iter().map(|&x| f(x)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Element-wise sum of two matrices of identical shape.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LengthMismatch`] on row mismatch and
    /// [`CoreError::ColsMismatch`] on column mismatch.
    pub fn add(&self, other: &Features) -> Result<Self, CoreError> {
        if self.rows != other.rows {
            return Err(CoreError::LengthMismatch {
                left: self.rows,
                right: other.rows,
            });
        }
        if self.cols != other.cols {
            return Err(CoreError::ColsMismatch {
                expected: self.cols,
                actual: other.cols,
            });
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a + b)
            .collect();
        Ok(Self {
            data,
            rows: self.rows,
            cols: self.cols,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_shape_check() {
        let err = Features::from_vec(2, 2, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidShape {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_gather_repeats_and_bounds() {
        let x = Features::from_vec(3, 2, vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1]).unwrap();
        let g = x.gather(&[2, 0, 0]).unwrap();
        assert_eq!(g.rows(), 3);
        assert_eq!(g.row(0), &[2.0, 2.1]);
        assert_eq!(g.row(1), &[0.0, 0.1]);
        assert_eq!(g.row(2), &[0.0, 0.1]);

        let err = x.gather(&[3]).unwrap_err();
        assert_eq!(err, CoreError::IndexOutOfBounds { index: 3, size: 3 });
    }

    #[test]
    fn test_vcat_and_hcat() {
        let a = Features::from_vec(1, 2, vec![1.0, 2.0]).unwrap();
        let b = Features::from_vec(2, 2, vec![3.0, 4.0, 5.0, 6.0]).unwrap();
        let v = Features::vcat(&[&a, &b]).unwrap();
        assert_eq!(v.rows(), 3);
        assert_eq!(v.row(2), &[5.0, 6.0]);

        let c = Features::from_vec(1, 1, vec![9.0]).unwrap();
        let h = a.hcat(&c).unwrap();
        assert_eq!(h.cols(), 3);
        assert_eq!(h.row(0), &[1.0, 2.0, 9.0]);
    }

    #[test]
    fn test_add_shape_mismatch() {
        let a = Features::zeros(2, 2);
        let b = Features::zeros(2, 3);
        assert!(a.add(&b).is_err());
    }
}
