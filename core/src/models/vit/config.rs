use super::error::{Result, ViTError};
use crate::nn::DropPathScaling;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hyper-parameters of one encoder block.
///
/// `model_dim` is the residual-stream width, `head_dim * n_heads` the width
/// of the attention projections and `mlp_dim` the hidden width of the
/// feed-forward sub-block.
///
/// ```rust
/// use vit_rs::models::vit::ViTBlockConfig;
///
/// let config = ViTBlockConfig::from_json_str(
///     r#"{"model_dim": 64, "head_dim": 16, "n_heads": 4, "mlp_dim": 256,
///         "p_dropout": 0.1, "p_layerdrop": 0.1}"#,
/// )
/// .unwrap();
/// assert_eq!(config.layer_norm_eps, 1e-6);
/// assert!(!config.attention_dropout);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViTBlockConfig {
    pub model_dim: usize,
    pub head_dim: usize,
    pub n_heads: usize,
    pub mlp_dim: usize,
    pub p_dropout: f64,
    pub p_layerdrop: f64,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    /// Apply dropout to the attention weights after the softmax.
    #[serde(default)]
    pub attention_dropout: bool,
    #[serde(default)]
    pub drop_path_scaling: DropPathScaling,
    #[serde(default = "default_init_std")]
    pub init_std: f64,
}

fn default_layer_norm_eps() -> f64 {
    1e-6
}

fn default_init_std() -> f64 {
    0.02
}

impl ViTBlockConfig {
    pub fn new(
        model_dim: usize,
        head_dim: usize,
        mlp_dim: usize,
        n_heads: usize,
        p_dropout: f64,
        p_layerdrop: f64,
    ) -> Self {
        Self {
            model_dim,
            head_dim,
            n_heads,
            mlp_dim,
            p_dropout,
            p_layerdrop,
            layer_norm_eps: default_layer_norm_eps(),
            attention_dropout: false,
            drop_path_scaling: DropPathScaling::default(),
            init_std: default_init_std(),
        }
    }

    /// ViT-Base, the architecture stored in raw checkpoints. Probabilities are 0.
    pub fn vit_base() -> Self {
        Self::new(768, 64, 3072, 12, 0.0, 0.0)
    }

    /// Width of the concatenated attention heads.
    pub fn attention_dim(&self) -> usize {
        self.head_dim * self.n_heads
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("model_dim", self.model_dim),
            ("head_dim", self.head_dim),
            ("n_heads", self.n_heads),
            ("mlp_dim", self.mlp_dim),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(ViTError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }

        let probabilities = [("p_dropout", self.p_dropout), ("p_layerdrop", self.p_layerdrop)];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(ViTError::InvalidConfig(format!(
                    "{} must be in [0, 1], got {}",
                    name, p
                )));
            }
        }

        if self.layer_norm_eps.is_nan() || self.layer_norm_eps <= 0.0 {
            return Err(ViTError::InvalidConfig(format!(
                "layer_norm_eps must be > 0, got {}",
                self.layer_norm_eps
            )));
        }
        if !self.init_std.is_finite() || self.init_std <= 0.0 {
            return Err(ViTError::InvalidConfig(format!(
                "init_std must be > 0, got {}",
                self.init_std
            )));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ViTError::FileAccess {
            file: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}
