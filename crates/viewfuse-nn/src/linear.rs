use viewfuse_core::Features;

use crate::error::NnError;

/// Linear layer over flat buffers, implemented with `matrixmultiply::sgemm`.
///
/// Computes `dst = src * weight^T + bias` for row-major operands.
///
/// # Arguments
///
/// * `src` - Input buffer of shape `[M, D]`
/// * `weight` - Weight buffer of shape `[N, D]` (row-major)
/// * `bias` - Bias buffer of shape `[N]`
/// * `dst` - Output buffer of shape `[M, N]`
/// * `rows` - Number of input rows `M`
/// * `input_dim` - Input dimension `D`
/// * `output_dim` - Output dimension `N`
///
/// # Example
///
/// ```
/// use viewfuse_nn::linear::linear_forward;
///
/// let src = [1.0, 2.0, 3.0];
/// let weight = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
/// let bias = [0.1, 0.2];
/// let mut dst = [0.0, 0.0];
///
/// linear_forward(&src, &weight, &bias, &mut dst, 1, 3, 2);
///
/// assert!((dst[0] - 1.5).abs() < 1e-5);
/// assert!((dst[1] - 3.4).abs() < 1e-5);
/// ```
pub fn linear_forward(
    src: &[f32],
    weight: &[f32],
    bias: &[f32],
    dst: &mut [f32],
    rows: usize,
    input_dim: usize,
    output_dim: usize,
) {
    assert_eq!(src.len(), rows * input_dim, "input size mismatch");
    assert_eq!(dst.len(), rows * output_dim, "output size mismatch");
    assert_eq!(weight.len(), output_dim * input_dim, "weight size mismatch");
    assert_eq!(bias.len(), output_dim, "bias size mismatch");

    for output_row in dst.chunks_exact_mut(output_dim) {
        output_row.copy_from_slice(bias);
    }

    // beta = 1.0 so the GEMM accumulates onto the bias-initialized output
    unsafe {
        matrixmultiply::sgemm(
            /* m */ rows,
            /* k */ input_dim,
            /* n */ output_dim,
            /* alpha */ 1.0,
            /* a */ src.as_ptr(),
            /* rsa */ input_dim as isize,
            /* csa */ 1,
            /* b */ weight.as_ptr(),
            /* rsb */ 1,
            /* csb */ input_dim as isize,
            /* beta */ 1.0,
            /* c */ dst.as_mut_ptr(),
            /* rsc */ output_dim as isize,
            /* csc */ 1,
        );
    }
}

/// A linear layer holding its weight `[N, D]` and bias `[N]`.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Vec<f32>,
    bias: Vec<f32>,
    input_dim: usize,
    output_dim: usize,
}

impl Linear {
    /// Create a linear layer from a row-major `[output_dim, input_dim]`
    /// weight buffer and an `[output_dim]` bias.
    ///
    /// # Errors
    ///
    /// Returns [`NnError::WeightShape`] if the buffer lengths do not
    /// match the declared dimensions.
    pub fn new(
        weight: Vec<f32>,
        bias: Vec<f32>,
        input_dim: usize,
        output_dim: usize,
    ) -> Result<Self, NnError> {
        if weight.len() != output_dim * input_dim {
            return Err(NnError::WeightShape {
                expected: output_dim * input_dim,
                actual: weight.len(),
            });
        }
        if bias.len() != output_dim {
            return Err(NnError::WeightShape {
                expected: output_dim,
                actual: bias.len(),
            });
        }
        Ok(Self {
            weight,
            bias,
            input_dim,
            output_dim,
        })
    }

    /// An identity layer for the given dimension.
    pub fn identity(dim: usize) -> Self {
        let mut weight = vec![0.0; dim * dim];
        for i in 0..dim {
            weight[i * dim + i] = 1.0;
        }
        Self {
            weight,
            bias: vec![0.0; dim],
            input_dim: dim,
            output_dim: dim,
        }
    }

    /// Input dimension `D`.
    #[inline]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Output dimension `N`.
    #[inline]
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Apply the layer to a `[M, D]` feature matrix.
    ///
    /// # Errors
    ///
    /// Returns [`NnError::WeightShape`] if the matrix column count does
    /// not match the layer's input dimension.
    pub fn forward(&self, x: &Features) -> Result<Features, NnError> {
        if x.cols() != self.input_dim {
            return Err(NnError::WeightShape {
                expected: self.input_dim,
                actual: x.cols(),
            });
        }
        let mut out = Features::zeros(x.rows(), self.output_dim);
        linear_forward(
            x.as_slice(),
            &self.weight,
            &self.bias,
            out.as_mut_slice(),
            x.rows(),
            self.input_dim,
            self.output_dim,
        );
        Ok(out)
    }
}
