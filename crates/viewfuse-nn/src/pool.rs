use viewfuse_core::{CsrIndex, Features};

use crate::error::NnError;

/// Pool feature rows into one row per CSR group.
///
/// `values` holds one row per element; `index` partitions elements into
/// groups. `context` optionally carries one row per group (the 3D point
/// features the group belongs to), `proj` one row per element (projection
/// features of the observation). Conditioned operators use them for
/// scoring; unconditioned operators ignore them. Empty groups pool to a
/// zero row.
pub trait GroupPool {
    /// Aggregate `values` group-wise into a `[num_groups, cols]` matrix.
    fn pool(
        &self,
        values: &Features,
        context: Option<&Features>,
        proj: Option<&Features>,
        index: &CsrIndex,
    ) -> Result<Features, NnError>;
}

fn check_inputs(
    values: &Features,
    context: Option<&Features>,
    proj: Option<&Features>,
    index: &CsrIndex,
) -> Result<(), NnError> {
    index.check_elements(values.rows()).map_err(NnError::Core)?;
    if let Some(ctx) = context {
        if ctx.rows() != index.num_groups() {
            return Err(NnError::ContextRows {
                expected: index.num_groups(),
                actual: ctx.rows(),
            });
        }
    }
    if let Some(p) = proj {
        if p.rows() != values.rows() {
            return Err(NnError::ProjectionRows {
                expected: values.rows(),
                actual: p.rows(),
            });
        }
    }
    Ok(())
}

/// Element-wise maximum over each group.
#[derive(Debug, Clone, Default)]
pub struct MaxPool;

impl GroupPool for MaxPool {
    fn pool(
        &self,
        values: &Features,
        context: Option<&Features>,
        proj: Option<&Features>,
        index: &CsrIndex,
    ) -> Result<Features, NnError> {
        check_inputs(values, context, proj, index)?;
        let mut out = Features::zeros(index.num_groups(), values.cols());
        for g in 0..index.num_groups() {
            let mut rows = index.range(g);
            if let Some(first) = rows.next() {
                out.row_mut(g).copy_from_slice(values.row(first));
                for r in rows {
                    for (o, v) in out.row_mut(g).iter_mut().zip(values.row(r).iter()) {
                        if *v > *o {
                            *o = *v;
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Arithmetic mean over each group.
#[derive(Debug, Clone, Default)]
pub struct MeanPool;

impl GroupPool for MeanPool {
    fn pool(
        &self,
        values: &Features,
        context: Option<&Features>,
        proj: Option<&Features>,
        index: &CsrIndex,
    ) -> Result<Features, NnError> {
        check_inputs(values, context, proj, index)?;
        let mut out = Features::zeros(index.num_groups(), values.cols());
        for g in 0..index.num_groups() {
            let range = index.range(g);
            let n = range.len();
            if n == 0 {
                continue;
            }
            for r in range {
                for (o, v) in out.row_mut(g).iter_mut().zip(values.row(r).iter()) {
                    *o += *v;
                }
            }
            let inv = 1.0 / n as f32;
            for o in out.row_mut(g) {
                *o *= inv;
            }
        }
        Ok(out)
    }
}

/// Attention-weighted pooling conditioned on point context and projection
/// features.
///
/// Each element is scored as
/// `value . w_value + context[group] . w_context + proj . w_proj + bias`,
/// scores are softmax-normalized within each group, and the group output
/// is the score-weighted sum of its value rows. The context and
/// projection terms are optional at construction; configuring one makes
/// the corresponding input mandatory at pool time.
#[derive(Debug, Clone)]
pub struct AttentivePool {
    w_value: Vec<f32>,
    w_context: Option<Vec<f32>>,
    w_proj: Option<Vec<f32>>,
    bias: f32,
}

impl AttentivePool {
    /// Create an attentive pooling operator.
    pub fn new(
        w_value: Vec<f32>,
        w_context: Option<Vec<f32>>,
        w_proj: Option<Vec<f32>>,
        bias: f32,
    ) -> Self {
        Self {
            w_value,
            w_context,
            w_proj,
            bias,
        }
    }

    fn score(
        &self,
        values: &Features,
        context: Option<&Features>,
        proj: Option<&Features>,
        group: usize,
        row: usize,
    ) -> Result<f32, NnError> {
        if self.w_value.len() != values.cols() {
            return Err(NnError::WeightShape {
                expected: values.cols(),
                actual: self.w_value.len(),
            });
        }
        let mut s = self.bias + dot(values.row(row), &self.w_value);
        if let Some(w) = &self.w_context {
            let ctx = context.ok_or(NnError::MissingContext)?;
            if w.len() != ctx.cols() {
                return Err(NnError::WeightShape {
                    expected: ctx.cols(),
                    actual: w.len(),
                });
            }
            s += dot(ctx.row(group), w);
        }
        if let Some(w) = &self.w_proj {
            let p = proj.ok_or(NnError::MissingProjection)?;
            if w.len() != p.cols() {
                return Err(NnError::WeightShape {
                    expected: p.cols(),
                    actual: w.len(),
                });
            }
            s += dot(p.row(row), w);
        }
        Ok(s)
    }
}

impl GroupPool for AttentivePool {
    fn pool(
        &self,
        values: &Features,
        context: Option<&Features>,
        proj: Option<&Features>,
        index: &CsrIndex,
    ) -> Result<Features, NnError> {
        check_inputs(values, context, proj, index)?;
        let mut out = Features::zeros(index.num_groups(), values.cols());
        let mut scores = Vec::new();
        for g in 0..index.num_groups() {
            let range = index.range(g);
            if range.is_empty() {
                continue;
            }
            scores.clear();
            for r in range.clone() {
                scores.push(self.score(values, context, proj, g, r)?);
            }
            // softmax within the run, shifted for stability
            let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let mut total = 0.0;
            for s in scores.iter_mut() {
                *s = (*s - max).exp();
                total += *s;
            }
            for (k, r) in range.enumerate() {
                let w = scores[k] / total;
                for (o, v) in out.row_mut(g).iter_mut().zip(values.row(r).iter()) {
                    *o += w * v;
                }
            }
        }
        Ok(out)
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn values_3x2() -> Features {
        Features::from_vec(3, 2, vec![1.0, 4.0, 3.0, 2.0, 5.0, 6.0]).unwrap()
    }

    #[test]
    fn test_max_pool_with_empty_run() {
        // observations at points [0, 0, 2] over 10 points
        let mut counts = vec![0usize; 10];
        counts[0] = 2;
        counts[2] = 1;
        let index = CsrIndex::from_counts(&counts);
        assert_eq!(index.pointers()[..4], [0, 2, 2, 3]);

        let out = MaxPool.pool(&values_3x2(), None, None, &index).unwrap();
        assert_eq!(out.rows(), 10);
        assert_eq!(out.row(0), &[3.0, 4.0]);
        // point 1 has no contributing observation
        assert_eq!(out.row(1), &[0.0, 0.0]);
        assert_eq!(out.row(2), &[5.0, 6.0]);
    }

    #[test]
    fn test_mean_pool() {
        let index = CsrIndex::from_counts(&[2, 1]);
        let out = MeanPool.pool(&values_3x2(), None, None, &index).unwrap();
        assert_eq!(out.row(0), &[2.0, 3.0]);
        assert_eq!(out.row(1), &[5.0, 6.0]);
    }

    #[test]
    fn test_pool_rejects_bad_pointer_total() {
        let index = CsrIndex::from_counts(&[1, 1]);
        let err = MeanPool.pool(&values_3x2(), None, None, &index).unwrap_err();
        assert!(matches!(err, NnError::Core(_)));
    }

    #[test]
    fn test_attentive_pool_uniform_weights_match_mean() {
        let index = CsrIndex::from_counts(&[2, 1]);
        // zero scores -> softmax uniform -> mean
        let pool = AttentivePool::new(vec![0.0, 0.0], None, None, 0.0);
        let out = pool.pool(&values_3x2(), None, None, &index).unwrap();
        assert_relative_eq!(out.row(0)[0], 2.0);
        assert_relative_eq!(out.row(0)[1], 3.0);
    }

    #[test]
    fn test_attentive_pool_favors_high_score() {
        let index = CsrIndex::from_counts(&[2]);
        let values = Features::from_vec(2, 1, vec![0.0, 1.0]).unwrap();
        // strong positive weight on the value itself
        let pool = AttentivePool::new(vec![50.0], None, None, 0.0);
        let out = pool.pool(&values, None, None, &index).unwrap();
        assert_relative_eq!(out.row(0)[0], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_attentive_pool_requires_configured_inputs() {
        let index = CsrIndex::from_counts(&[2, 1]);
        let pool = AttentivePool::new(vec![0.0, 0.0], None, Some(vec![1.0]), 0.0);
        let err = pool.pool(&values_3x2(), None, None, &index).unwrap_err();
        assert_eq!(err, NnError::MissingProjection);

        let pool = AttentivePool::new(vec![0.0, 0.0], Some(vec![1.0]), None, 0.0);
        let err = pool.pool(&values_3x2(), None, None, &index).unwrap_err();
        assert_eq!(err, NnError::MissingContext);
    }

    #[test]
    fn test_context_row_count_checked() {
        let index = CsrIndex::from_counts(&[2, 1]);
        let ctx = Features::zeros(3, 1);
        let err = MeanPool
            .pool(&values_3x2(), Some(&ctx), None, &index)
            .unwrap_err();
        assert_eq!(
            err,
            NnError::ContextRows {
                expected: 2,
                actual: 3
            }
        );
    }
}
