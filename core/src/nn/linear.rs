use crate::nn::init::trunc_normal;
use crate::nn::module::{join_name, Module};
use crate::nn::parameter::{ParamView, ParamViewMut, Parameter};
use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};

use num_traits::Float;
use rand::Rng;
use rayon::prelude::*;

/// Linear Layer: `y = xWᵀ + b`
///
/// - **Weight** `W`: `[out_features, in_features]`.
/// - **Bias** `b`: `[out_features]`, optional.
///
/// The layer acts on the innermost axis, so it accepts any input of shape
/// `[..., in_features]` and returns `[..., out_features]`; leading axes are
/// flattened into rows for a single matrix multiplication.
///
/// # Examples
/// ```rust
/// use vit_rs::nn::Linear;
/// use vit_rs::tensor::Tensor;
/// // 10 inputs, 5 outputs
/// let layer = Linear::<f32>::new(
///     Tensor::zeros([5, 10]),   // Weights: [out, in]
///     Some(Tensor::zeros([5])), // Bias: [out]
/// );
/// let y = layer.forward(&Tensor::<f32, 3>::ones([2, 4, 10])).unwrap();
/// assert_eq!(y.shape(), &[2, 4, 5]);
/// ```
#[derive(Debug, Clone)]
pub struct Linear<T: TensorElem> {
    pub weight: Parameter<T, 2>,
    pub bias: Option<Parameter<T, 1>>,
}

impl<T: TensorElem> Linear<T> {
    /// Creates a trainable Linear layer from existing tensors.
    pub fn new(weight: Tensor<T, 2, Cpu>, bias: Option<Tensor<T, 1, Cpu>>) -> Self {
        Self {
            weight: Parameter::new(weight),
            bias: bias.map(Parameter::new),
        }
    }

    /// Creates a Linear layer whose weight and bias are excluded from gradient
    /// tracking, e.g. weights read from a pretrained checkpoint.
    pub fn frozen(weight: Tensor<T, 2, Cpu>, bias: Option<Tensor<T, 1, Cpu>>) -> Self {
        Self {
            weight: Parameter::frozen(weight),
            bias: bias.map(Parameter::frozen),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    /// Performs the forward pass over the innermost axis of `x`.
    ///
    /// # Errors
    ///
    /// `TensorError::ShapeMismatch` if the innermost axis is not `in_features`
    /// or the bias length is not `out_features`.
    pub fn forward<const RANK: usize>(
        &self,
        x: &Tensor<T, RANK, Cpu>,
    ) -> Result<Tensor<T, RANK, Cpu>> {
        const { assert!(RANK >= 1, "Linear requires rank >= 1") };

        let in_features = self.in_features();
        let out_features = self.out_features();
        let shape = *x.shape();
        if shape[RANK - 1] != in_features {
            return Err(TensorError::ShapeMismatch {
                expected: vec![in_features],
                got: vec![shape[RANK - 1]],
            });
        }

        let rows = x.size() / in_features.max(1);
        let flat: Tensor<T, 2, Cpu> = x.clone().reshape([rows, in_features])?;
        let mut out = flat.matmul_nt(self.weight.value())?;

        if let Some(bias) = &self.bias {
            Self::add_bias(&mut out, bias.value())?;
        }

        let mut out_shape = shape;
        out_shape[RANK - 1] = out_features;
        out.reshape(out_shape)
    }

    /// Adds `bias` to every row of a 2D tensor in place.
    fn add_bias(x: &mut Tensor<T, 2, Cpu>, bias: &Tensor<T, 1, Cpu>) -> Result<()> {
        let [_, cols] = *x.shape();
        let [b_cols] = *bias.shape();

        if cols != b_cols {
            return Err(TensorError::ShapeMismatch {
                expected: vec![cols],
                got: vec![b_cols],
            });
        }
        if cols == 0 {
            return Ok(());
        }

        let bias_data = bias.data();
        x.data_mut().par_chunks_mut(cols).for_each(|row| {
            for (r, b) in row.iter_mut().zip(bias_data.iter()) {
                *r += *b;
            }
        });
        Ok(())
    }
}

impl<T: TensorElem + Float> Linear<T> {
    /// Creates a trainable layer with a truncated-normal weight of standard
    /// deviation `std` and a zero bias.
    pub fn init<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        std: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let weight = trunc_normal([out_features, in_features], std, rng)?;
        Ok(Self::new(weight, Some(Tensor::zeros([out_features]))))
    }
}

impl<T: TensorElem> Module<T> for Linear<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(ParamView<'_, T>)) {
        f(self.weight.view(join_name(prefix, "weight")));
        if let Some(bias) = &self.bias {
            f(bias.view(join_name(prefix, "bias")));
        }
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(ParamViewMut<'_, T>)) {
        f(self.weight.view_mut(join_name(prefix, "weight")));
        if let Some(bias) = &mut self.bias {
            f(bias.view_mut(join_name(prefix, "bias")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_new() {
        let layer = Linear::new(Tensor::<f32, 2>::zeros([5, 10]), Some(Tensor::zeros([5])));
        assert!(layer.bias.is_some());
        assert!(layer.weight.requires_grad());
        assert_eq!(layer.in_features(), 10);
        assert_eq!(layer.out_features(), 5);
    }

    #[test]
    fn test_linear_frozen() {
        let layer = Linear::frozen(Tensor::<f32, 2>::zeros([2, 3]), Some(Tensor::zeros([2])));
        assert!(!layer.weight.requires_grad());
        assert!(!layer.bias.as_ref().unwrap().requires_grad());
        // Frozen parameters are still visited.
        assert_eq!(layer.num_parameters(), 8);
    }

    #[test]
    fn test_linear_forward_rank2() {
        let input = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        let weight = Tensor::<f32, 2>::new(
            vec![
                1.0, 0.0, 0.0, // 1st neuron
                0.0, 1.0, 0.0, // 2nd neuron
                0.0, 0.0, 1.0, // 3rd neuron
                1.0, 1.0, 1.0, // 4th neuron
            ],
            [4, 3],
        )
        .unwrap();
        let bias = Tensor::<f32, 1>::new(vec![0.1, 0.2, 0.3, 0.4], [4]).unwrap();

        let layer = Linear::new(weight, Some(bias));
        let output = layer.forward(&input).unwrap();

        assert_eq!(output.shape(), &[2, 4]);
        let expected = [1.1, 2.2, 3.3, 6.4, 4.1, 5.2, 6.3, 15.4];
        for (got, exp) in output.data().iter().zip(expected.iter()) {
            assert!((got - exp).abs() < 1e-5);
        }
    }

    #[test]
    fn test_linear_forward_rank3() {
        // [Batch=1, Seq=2, In=3]
        let input = Tensor::<f32, 3>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [1, 2, 3]).unwrap();
        let weight = Tensor::<f32, 2>::new(vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0], [2, 3]).unwrap();

        let layer = Linear::new(weight, None);
        let output = layer.forward(&input).unwrap();

        assert_eq!(output.shape(), &[1, 2, 2]);
        assert_eq!(output.data(), &[6.0, 12.0, 15.0, 30.0]);
    }

    #[test]
    fn test_linear_shape_mismatch() {
        let layer = Linear::new(Tensor::<f32, 2>::zeros([5, 10]), Some(Tensor::zeros([4])));
        let res = layer.forward(&Tensor::<f32, 2>::zeros([2, 10]));
        assert!(matches!(res, Err(TensorError::ShapeMismatch { .. })));

        let layer = Linear::new(Tensor::<f32, 2>::zeros([5, 10]), None);
        let res = layer.forward(&Tensor::<f32, 3>::zeros([1, 2, 9]));
        assert!(matches!(res, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_linear_init() {
        let mut rng = StdRng::seed_from_u64(11);
        let layer = Linear::<f32>::init(8, 4, 0.02, &mut rng).unwrap();
        assert_eq!(layer.weight.shape(), &[4, 8]);
        assert!(layer.bias.as_ref().unwrap().value().data().iter().all(|&b| b == 0.0));
        assert!(layer.weight.value().data().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_linear_named_parameters() {
        let layer = Linear::new(Tensor::<f32, 2>::zeros([2, 3]), Some(Tensor::zeros([2])));
        let mut names: Vec<String> = Vec::new();
        layer.visit_parameters("w1", &mut |p| names.push(p.name));
        assert_eq!(names, vec!["w1.weight".to_string(), "w1.bias".to_string()]);
    }
}
