use crate::error::CoreError;

/// A compressed-run index: a pointer array partitioning a flat element
/// array into contiguous per-group runs.
///
/// `pointers` has length `num_groups + 1`, starts at 0, is monotonically
/// non-decreasing, and ends at the number of indexed elements. Group `i`
/// owns elements `pointers[i]..pointers[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrIndex {
    pointers: Vec<usize>,
}

impl CsrIndex {
    /// Build an index from a raw pointer array, validating the CSR invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPointerStart`] if the array is empty or
    /// does not start at 0, and [`CoreError::NonMonotonicPointers`] if it
    /// decreases anywhere.
    ///
    /// # Example
    ///
    /// ```
    /// use viewfuse_core::CsrIndex;
    ///
    /// let csr = CsrIndex::from_pointers(vec![0, 2, 2, 3]).unwrap();
    /// assert_eq!(csr.num_groups(), 3);
    /// assert_eq!(csr.range(0), 0..2);
    /// assert_eq!(csr.range(1), 2..2);
    /// ```
    pub fn from_pointers(pointers: Vec<usize>) -> Result<Self, CoreError> {
        if pointers.first() != Some(&0) {
            return Err(CoreError::InvalidPointerStart);
        }
        for i in 1..pointers.len() {
            if pointers[i] < pointers[i - 1] {
                return Err(CoreError::NonMonotonicPointers { position: i });
            }
        }
        Ok(Self { pointers })
    }

    /// Build an index from per-group run lengths.
    pub fn from_counts(counts: &[usize]) -> Self {
        let mut pointers = Vec::with_capacity(counts.len() + 1);
        let mut total = 0;
        pointers.push(0);
        for &c in counts {
            total += c;
            pointers.push(total);
        }
        Self { pointers }
    }

    /// Build an index from sorted per-element group ids.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsortedGroupIds`] if the ids are not
    /// non-decreasing and [`CoreError::GroupIdOutOfBounds`] if an id
    /// exceeds `num_groups`.
    pub fn from_group_ids(ids: &[usize], num_groups: usize) -> Result<Self, CoreError> {
        let mut counts = vec![0usize; num_groups];
        for (pos, &id) in ids.iter().enumerate() {
            if id >= num_groups {
                return Err(CoreError::GroupIdOutOfBounds {
                    id,
                    groups: num_groups,
                });
            }
            if pos > 0 && id < ids[pos - 1] {
                return Err(CoreError::UnsortedGroupIds { position: pos });
            }
            counts[id] += 1;
        }
        Ok(Self::from_counts(&counts))
    }

    /// Number of groups partitioned by this index.
    #[inline]
    pub fn num_groups(&self) -> usize {
        self.pointers.len() - 1
    }

    /// Total number of indexed elements.
    #[inline]
    pub fn num_elements(&self) -> usize {
        *self.pointers.last().unwrap_or(&0)
    }

    /// The raw pointer array.
    #[inline]
    pub fn pointers(&self) -> &[usize] {
        &self.pointers
    }

    /// The element range owned by group `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= num_groups`.
    #[inline]
    pub fn range(&self, i: usize) -> std::ops::Range<usize> {
        self.pointers[i]..self.pointers[i + 1]
    }

    /// Run length of group `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= num_groups`.
    #[inline]
    pub fn count(&self, i: usize) -> usize {
        self.pointers[i + 1] - self.pointers[i]
    }

    /// Per-group run lengths.
    pub fn counts(&self) -> Vec<usize> {
        self.pointers.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Expand to one group id per element, in element order.
    pub fn group_ids(&self) -> Vec<usize> {
        let mut ids = Vec::with_capacity(self.num_elements());
        for g in 0..self.num_groups() {
            ids.extend(std::iter::repeat(g).take(self.count(g)));
        }
        ids
    }

    /// Validate this index against an element array length.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PointerElementMismatch`] if the last pointer
    /// does not equal `elements`.
    pub fn check_elements(&self, elements: usize) -> Result<(), CoreError> {
        if self.num_elements() != elements {
            return Err(CoreError::PointerElementMismatch {
                pointer_total: self.num_elements(),
                elements,
            });
        }
        Ok(())
    }

    /// Concatenate indices group-wise with offset-adjusted pointers.
    ///
    /// The result partitions the concatenation of the parts' element
    /// arrays: groups of the first part come first, with later parts'
    /// pointers shifted by the preceding element totals. This is the
    /// batch-collation operation.
    pub fn concat(parts: &[&CsrIndex]) -> Self {
        let mut pointers = vec![0usize];
        let mut offset = 0;
        for p in parts {
            pointers.extend(p.pointers[1..].iter().map(|&x| x + offset));
            offset += p.num_elements();
        }
        Self { pointers }
    }

    /// Re-index by group selection: output group `i` is input group `idx[i]`.
    ///
    /// Returns the new index together with the element gather order, i.e.
    /// the positions in the input element array that make up the output
    /// element array. Indices may repeat (an input group may be selected
    /// more than once).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfBounds`] if any selected group does
    /// not exist.
    pub fn pick(&self, idx: &[usize]) -> Result<(Self, Vec<usize>), CoreError> {
        let mut counts = Vec::with_capacity(idx.len());
        let mut order = Vec::new();
        for &g in idx {
            if g >= self.num_groups() {
                return Err(CoreError::IndexOutOfBounds {
                    index: g,
                    size: self.num_groups(),
                });
            }
            counts.push(self.count(g));
            order.extend(self.range(g));
        }
        Ok((Self::from_counts(&counts), order))
    }

    /// Re-index by group aggregation: input group `j` flows into output
    /// group `idx[j]`; the output has `max(idx) + 1` groups.
    ///
    /// Within an output group, input runs are concatenated in ascending
    /// input order, so the operation is stable and conserves the element
    /// count. Returns the new index and the element gather order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LengthMismatch`] if `idx.len() != num_groups`.
    pub fn merge(&self, idx: &[usize]) -> Result<(Self, Vec<usize>), CoreError> {
        if idx.len() != self.num_groups() {
            return Err(CoreError::LengthMismatch {
                left: idx.len(),
                right: self.num_groups(),
            });
        }
        let num_out = idx.iter().map(|&g| g + 1).max().unwrap_or(0);
        let mut counts = vec![0usize; num_out];
        for (j, &g) in idx.iter().enumerate() {
            counts[g] += self.count(j);
        }
        // stable sort by target group keeps ascending source order
        // within each output group
        let mut order = Vec::with_capacity(self.num_elements());
        for &j in &stable_argsort(idx) {
            order.extend(self.range(j));
        }
        Ok((Self::from_counts(&counts), order))
    }
}

/// Indices that sort `keys` ascending, preserving the relative order of
/// equal keys.
pub fn stable_argsort(keys: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by_key(|&i| keys[i]);
    order
}
