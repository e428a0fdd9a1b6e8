//! Vision Transformer encoder block.
//!
//! One pre-norm Transformer encoder layer as used by ViT:
//!
//! ```text
//! x = x + drop_path(self_attention(norm1(x)))
//! x = x + drop_path(mlp(norm2(x)))
//! ```
//!
//! Activations are `[batch, seq, model_dim]`. Inside attention the heads are
//! folded into the batch axis (`[batch * n_heads, seq, head_dim]`, batch-major)
//! so scores and weighted sums are single batched matmuls.
//!
//! # Example
//!
//! ```rust
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use vit_rs::models::vit::{ViTBlock, ViTBlockConfig};
//! use vit_rs::nn::Module;
//! use vit_rs::tensor::Tensor;
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let config = ViTBlockConfig::new(32, 8, 128, 4, 0.1, 0.1);
//! let mut block = ViTBlock::<f32>::new(config, &mut rng).unwrap();
//! block.eval();
//!
//! let x = Tensor::<f32, 3>::ones([2, 5, 32]);
//! let y = block.forward_tensor(&x, &mut rng).unwrap();
//! assert_eq!(y.shape(), &[2, 5, 32]);
//! ```

mod config;
mod error;
mod weights;

pub use config::ViTBlockConfig;
pub use error::{Result, ViTError};
pub use weights::{
    read_f32_file, split_fused_qkv, write_f32_file, CheckpointFile, CHECKPOINT_HEAD_DIM,
    CHECKPOINT_MLP_DIM, CHECKPOINT_MODEL_DIM, CHECKPOINT_N_HEADS,
};

use crate::nn::{
    drop_path, dropout, join_name, Activation, LayerNorm, Linear, Module, ParamView, ParamViewMut,
};
use crate::tensor::{Cpu, Tensor, TensorElem};

use num_traits::Float;
use rand::Rng;
use std::fmt;
use tracing::debug;

/// A Vision Transformer encoder block.
///
/// Owns six projections (`w1`, `w2` for the MLP; `wq`, `wk`, `wv`, `wf` for
/// attention) and two layer norms. The sub-modules are fixed at construction;
/// only their parameter values change afterwards.
#[derive(Debug, Clone)]
pub struct ViTBlock<T: TensorElem> {
    w1: Linear<T>,
    w2: Linear<T>,
    wq: Linear<T>,
    wk: Linear<T>,
    wv: Linear<T>,
    wf: Linear<T>,
    norm1: LayerNorm<T>,
    norm2: LayerNorm<T>,
    config: ViTBlockConfig,
    training: bool,
}

impl<T: TensorElem + Float> ViTBlock<T> {
    /// Builds a randomly initialized block in training mode.
    ///
    /// Projection weights are drawn from a truncated normal with
    /// `config.init_std`; biases start at zero, norm scales at one.
    pub fn new<R: Rng + ?Sized>(config: ViTBlockConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        debug!(?config, "initializing ViT block");

        let c = config.model_dim;
        let a = config.attention_dim();
        let m = config.mlp_dim;
        let std = config.init_std;
        let eps = T::from_f64(config.layer_norm_eps).ok_or_else(|| {
            ViTError::InvalidConfig(format!(
                "layer_norm_eps {} is not representable",
                config.layer_norm_eps
            ))
        })?;

        Ok(Self::from_parts(
            Linear::init(c, m, std, rng)?,
            Linear::init(m, c, std, rng)?,
            Linear::init(c, a, std, rng)?,
            Linear::init(c, a, std, rng)?,
            Linear::init(c, a, std, rng)?,
            Linear::init(a, c, std, rng)?,
            LayerNorm::new(c, eps),
            LayerNorm::new(c, eps),
            config,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        w1: Linear<T>,
        w2: Linear<T>,
        wq: Linear<T>,
        wk: Linear<T>,
        wv: Linear<T>,
        wf: Linear<T>,
        norm1: LayerNorm<T>,
        norm2: LayerNorm<T>,
        config: ViTBlockConfig,
    ) -> Self {
        Self {
            w1,
            w2,
            wq,
            wk,
            wv,
            wf,
            norm1,
            norm2,
            config,
            training: true,
        }
    }

    /// Runs the block on exactly one `[batch, seq, model_dim]` input.
    ///
    /// # Errors
    ///
    /// `ViTError::InputArity` unless `inputs` holds exactly one tensor, and a
    /// tensor shape error if its feature axis is not `model_dim`.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        inputs: &[Tensor<T, 3, Cpu>],
        rng: &mut R,
    ) -> Result<Vec<Tensor<T, 3, Cpu>>> {
        let [x] = inputs else {
            return Err(ViTError::InputArity { got: inputs.len() });
        };
        Ok(vec![self.forward_tensor(x, rng)?])
    }

    /// Single-tensor form of [`ViTBlock::forward`].
    pub fn forward_tensor<R: Rng + ?Sized>(
        &self,
        x: &Tensor<T, 3, Cpu>,
        rng: &mut R,
    ) -> Result<Tensor<T, 3, Cpu>> {
        let p = self.config.p_layerdrop;
        let scaling = self.config.drop_path_scaling;

        let h = self.norm1.forward(x)?;
        let h = self.self_attention(&h, rng)?;
        let h = drop_path(&h, p, scaling, self.training, rng)?;
        let out = (x + &h)?;

        let h = self.norm2.forward(&out)?;
        let h = self.mlp(&h, rng)?;
        let h = drop_path(&h, p, scaling, self.training, rng)?;
        Ok((&out + &h)?)
    }

    /// Dropout probability for the current mode.
    fn dropout_p(&self) -> f64 {
        if self.training {
            self.config.p_dropout
        } else {
            0.0
        }
    }

    /// Multi-head scaled dot-product self-attention.
    fn self_attention<R: Rng + ?Sized>(
        &self,
        x: &Tensor<T, 3, Cpu>,
        rng: &mut R,
    ) -> Result<Tensor<T, 3, Cpu>> {
        let [b, s, _] = *x.shape();
        let p = self.dropout_p();

        let q = self.split_heads(self.wq.forward(x)?)?;
        let k = self.split_heads(self.wk.forward(x)?)?;
        let v = self.split_heads(self.wv.forward(x)?)?;

        let head_dim = self.config.head_dim as f64;
        let scaling = T::from_f64(1.0 / head_dim.sqrt()).unwrap_or_else(T::one);
        let q = q.scale(scaling);

        // [B*H, S, S]: query axis, then key axis.
        let mut scores = q.matmul_nt(&k)?;
        Activation::softmax_inplace(&mut scores);
        let attn = if self.config.attention_dropout {
            dropout(&scores, p, rng)?
        } else {
            scores
        };

        let out = attn.matmul(&v)?;
        let out = self.merge_heads(out, b, s)?;
        let out = self.wf.forward(&out)?;
        Ok(dropout(&out, p, rng)?)
    }

    /// `[B, S, H*D] -> [B*H, S, D]`, head `h` of batch `b` at index `b*H + h`.
    fn split_heads(&self, x: Tensor<T, 3, Cpu>) -> Result<Tensor<T, 3, Cpu>> {
        let [b, s, _] = *x.shape();
        let (h, d) = (self.config.n_heads, self.config.head_dim);
        let x = x.reshape([b, s, h, d])?.transpose_axes(1, 2)?;
        Ok(x.reshape([b * h, s, d])?)
    }

    /// Inverse of [`Self::split_heads`].
    fn merge_heads(&self, x: Tensor<T, 3, Cpu>, b: usize, s: usize) -> Result<Tensor<T, 3, Cpu>> {
        let (h, d) = (self.config.n_heads, self.config.head_dim);
        let x = x.reshape([b, h, s, d])?.transpose_axes(1, 2)?;
        Ok(x.reshape([b, s, h * d])?)
    }

    /// Feed-forward sub-block: expand, GELU, contract.
    fn mlp<R: Rng + ?Sized>(&self, x: &Tensor<T, 3, Cpu>, rng: &mut R) -> Result<Tensor<T, 3, Cpu>> {
        let p = self.dropout_p();
        let h = Activation::gelu(&self.w1.forward(x)?);
        let h = dropout(&h, p, rng)?;
        let h = self.w2.forward(&h)?;
        Ok(dropout(&h, p, rng)?)
    }
}

impl<T: TensorElem> ViTBlock<T> {
    pub fn config(&self) -> &ViTBlockConfig {
        &self.config
    }

    pub fn w1(&self) -> &Linear<T> {
        &self.w1
    }

    pub fn w2(&self) -> &Linear<T> {
        &self.w2
    }

    pub fn wq(&self) -> &Linear<T> {
        &self.wq
    }

    pub fn wk(&self) -> &Linear<T> {
        &self.wk
    }

    pub fn wv(&self) -> &Linear<T> {
        &self.wv
    }

    pub fn wf(&self) -> &Linear<T> {
        &self.wf
    }

    pub fn norm1(&self) -> &LayerNorm<T> {
        &self.norm1
    }

    pub fn norm2(&self) -> &LayerNorm<T> {
        &self.norm2
    }
}

impl<T: TensorElem> Module<T> for ViTBlock<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(ParamView<'_, T>)) {
        self.w1.visit_parameters(&join_name(prefix, "w1"), f);
        self.w2.visit_parameters(&join_name(prefix, "w2"), f);
        self.wq.visit_parameters(&join_name(prefix, "wq"), f);
        self.wk.visit_parameters(&join_name(prefix, "wk"), f);
        self.wv.visit_parameters(&join_name(prefix, "wv"), f);
        self.wf.visit_parameters(&join_name(prefix, "wf"), f);
        self.norm1.visit_parameters(&join_name(prefix, "norm1"), f);
        self.norm2.visit_parameters(&join_name(prefix, "norm2"), f);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(ParamViewMut<'_, T>)) {
        self.w1.visit_parameters_mut(&join_name(prefix, "w1"), f);
        self.w2.visit_parameters_mut(&join_name(prefix, "w2"), f);
        self.wq.visit_parameters_mut(&join_name(prefix, "wq"), f);
        self.wk.visit_parameters_mut(&join_name(prefix, "wk"), f);
        self.wv.visit_parameters_mut(&join_name(prefix, "wv"), f);
        self.wf.visit_parameters_mut(&join_name(prefix, "wf"), f);
        self.norm1.visit_parameters_mut(&join_name(prefix, "norm1"), f);
        self.norm2.visit_parameters_mut(&join_name(prefix, "norm2"), f);
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

impl<T: TensorElem> fmt::Display for ViTBlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ViTBlock (n_heads: {}), (p_dropout: {}), (p_layerdrop: {})",
            self.config.n_heads, self.config.p_dropout, self.config.p_layerdrop
        )
    }
}
