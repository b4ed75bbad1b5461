use crate::error::CoreError;

/// A per-point visibility mask: `true` where at least one modality
/// observation covers the point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenMask {
    seen: Vec<bool>,
}

impl SeenMask {
    /// An all-unseen mask of the given length.
    pub fn unseen(len: usize) -> Self {
        Self {
            seen: vec![false; len],
        }
    }

    /// Build a mask from a boolean vector.
    pub fn from_vec(seen: Vec<bool>) -> Self {
        Self { seen }
    }

    /// Number of points covered by the mask.
    #[inline]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the mask covers no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// The mask values, one per point.
    #[inline]
    pub fn as_slice(&self) -> &[bool] {
        &self.seen
    }

    /// Number of seen points.
    pub fn count_seen(&self) -> usize {
        self.seen.iter().filter(|&&s| s).count()
    }

    /// Logical OR with another mask of the same length.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LengthMismatch`] if the lengths differ.
    pub fn or(&self, other: &SeenMask) -> Result<SeenMask, CoreError> {
        if self.len() != other.len() {
            return Err(CoreError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(SeenMask {
            seen: self
                .seen
                .iter()
                .zip(other.seen.iter())
                .map(|(a, b)| a | b)
                .collect(),
        })
    }

    /// Gather by point selection: `out[i] = self[idx[i]]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfBounds`] on an invalid index.
    pub fn pick(&self, idx: &[usize]) -> Result<SeenMask, CoreError> {
        let mut seen = Vec::with_capacity(idx.len());
        for &i in idx {
            let &s = self
                .seen
                .get(i)
                .ok_or(CoreError::IndexOutOfBounds {
                    index: i,
                    size: self.len(),
                })?;
            seen.push(s);
        }
        Ok(SeenMask { seen })
    }

    /// Scatter-OR into a smaller point set: output point `idx[j]` is seen
    /// iff at least one of its source points `j` was seen.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LengthMismatch`] if `idx.len() != len`.
    pub fn merge(&self, idx: &[usize]) -> Result<SeenMask, CoreError> {
        if idx.len() != self.len() {
            return Err(CoreError::LengthMismatch {
                left: idx.len(),
                right: self.len(),
            });
        }
        let num_out = idx.iter().map(|&g| g + 1).max().unwrap_or(0);
        let mut seen = vec![false; num_out];
        for (j, &g) in idx.iter().enumerate() {
            seen[g] |= self.seen[j];
        }
        Ok(SeenMask { seen })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_commutes() {
        let a = SeenMask::from_vec(vec![true, false, false, true]);
        let b = SeenMask::from_vec(vec![false, false, true, true]);
        let ab = a.or(&b).unwrap();
        let ba = b.or(&a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.as_slice(), &[true, false, true, true]);
    }

    #[test]
    fn test_pick() {
        let m = SeenMask::from_vec(vec![true, false, true, false, true]);
        let p = m.pick(&[0, 2, 4]).unwrap();
        assert_eq!(p.as_slice(), &[true, true, true]);
        assert!(m.pick(&[5]).is_err());
    }

    #[test]
    fn test_merge_scatter_or() {
        // halving resolution: [0,1,2,3] -> [0,0,1,1]
        let m = SeenMask::from_vec(vec![true, false, true, true]);
        let merged = m.merge(&[0, 0, 1, 1]).unwrap();
        assert_eq!(merged.as_slice(), &[true, true]);
    }

    #[test]
    fn test_count_seen() {
        let m = SeenMask::from_vec(vec![true, false, true]);
        assert_eq!(m.count_seen(), 2);
        assert_eq!(SeenMask::unseen(3).count_seen(), 0);
    }
}
