//! Raw `.bin` checkpoints of a single ViT-Base encoder block.
//!
//! A checkpoint is twelve header-less files of little-endian `f32` values that
//! share a common path prefix, e.g. `blocks.0` + `.attn.qkv.weight.bin`.
//! Weights are stored row-major as `[out, in]`. The attention projections are
//! stored fused: one `[3 * 768, 768]` matrix whose row blocks are q, k and v.

use super::config::ViTBlockConfig;
use super::error::{Result, ViTError};
use super::ViTBlock;
use crate::nn::{LayerNorm, Linear, Module, Parameter};
use crate::tensor::{Cpu, Tensor, TensorElem, TensorError};

use num_traits::Float;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CHECKPOINT_MODEL_DIM: usize = 768;
pub const CHECKPOINT_N_HEADS: usize = 12;
pub const CHECKPOINT_HEAD_DIM: usize = 64;
pub const CHECKPOINT_MLP_DIM: usize = 3072;

const QKV_DIM: usize = 3 * CHECKPOINT_N_HEADS * CHECKPOINT_HEAD_DIM;

/// One of the twelve files that make up a raw block checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFile {
    Fc1Weight,
    Fc1Bias,
    Fc2Weight,
    Fc2Bias,
    QkvWeight,
    QkvBias,
    ProjWeight,
    ProjBias,
    Norm1Weight,
    Norm1Bias,
    Norm2Weight,
    Norm2Bias,
}

impl CheckpointFile {
    pub const ALL: [CheckpointFile; 12] = [
        CheckpointFile::Fc1Weight,
        CheckpointFile::Fc1Bias,
        CheckpointFile::Fc2Weight,
        CheckpointFile::Fc2Bias,
        CheckpointFile::QkvWeight,
        CheckpointFile::QkvBias,
        CheckpointFile::ProjWeight,
        CheckpointFile::ProjBias,
        CheckpointFile::Norm1Weight,
        CheckpointFile::Norm1Bias,
        CheckpointFile::Norm2Weight,
        CheckpointFile::Norm2Bias,
    ];

    pub const fn suffix(self) -> &'static str {
        match self {
            CheckpointFile::Fc1Weight => ".mlp.fc1.weight.bin",
            CheckpointFile::Fc1Bias => ".mlp.fc1.bias.bin",
            CheckpointFile::Fc2Weight => ".mlp.fc2.weight.bin",
            CheckpointFile::Fc2Bias => ".mlp.fc2.bias.bin",
            CheckpointFile::QkvWeight => ".attn.qkv.weight.bin",
            CheckpointFile::QkvBias => ".attn.qkv.bias.bin",
            CheckpointFile::ProjWeight => ".attn.proj.weight.bin",
            CheckpointFile::ProjBias => ".attn.proj.bias.bin",
            CheckpointFile::Norm1Weight => ".norm1.weight.bin",
            CheckpointFile::Norm1Bias => ".norm1.bias.bin",
            CheckpointFile::Norm2Weight => ".norm2.weight.bin",
            CheckpointFile::Norm2Bias => ".norm2.bias.bin",
        }
    }

    /// Number of `f32` values the file must contain.
    pub const fn expected_len(self) -> usize {
        match self {
            CheckpointFile::Fc1Weight | CheckpointFile::Fc2Weight => {
                CHECKPOINT_MLP_DIM * CHECKPOINT_MODEL_DIM
            }
            CheckpointFile::Fc1Bias => CHECKPOINT_MLP_DIM,
            CheckpointFile::QkvWeight => QKV_DIM * CHECKPOINT_MODEL_DIM,
            CheckpointFile::QkvBias => QKV_DIM,
            CheckpointFile::ProjWeight => CHECKPOINT_MODEL_DIM * CHECKPOINT_MODEL_DIM,
            CheckpointFile::Fc2Bias
            | CheckpointFile::ProjBias
            | CheckpointFile::Norm1Weight
            | CheckpointFile::Norm1Bias
            | CheckpointFile::Norm2Weight
            | CheckpointFile::Norm2Bias => CHECKPOINT_MODEL_DIM,
        }
    }

    /// `prefix` with this file's suffix appended.
    pub fn path(self, prefix: &Path) -> PathBuf {
        let mut path = OsString::from(prefix.as_os_str());
        path.push(self.suffix());
        PathBuf::from(path)
    }
}

/// Reads a header-less file of little-endian `f32` values.
pub fn read_f32_file<P: AsRef<Path>>(path: P) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let file = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| ViTError::FileAccess {
        file: file.clone(),
        source,
    })?;

    if bytes.len() % 4 != 0 {
        return Err(ViTError::Malformed {
            file,
            bytes: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Writes `data` as a header-less file of little-endian `f32` values.
pub fn write_f32_file<P: AsRef<Path>>(path: P, data: &[f32]) -> Result<()> {
    let path = path.as_ref();
    let mut bytes = Vec::with_capacity(data.len() * 4);
    for v in data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    std::fs::write(path, bytes).map_err(|source| ViTError::FileAccess {
        file: path.display().to_string(),
        source,
    })
}

/// Splits a fused q/k/v array into its three contiguous blocks, in that order.
///
/// For a weight the blocks are row blocks of `[3 * out, in]`; for a bias they
/// are segments of `[3 * out]`.
pub fn split_fused_qkv<V: Copy>(fused: &[V]) -> std::result::Result<[Vec<V>; 3], TensorError> {
    if fused.len() % 3 != 0 {
        return Err(TensorError::Unsupported(format!(
            "fused q/k/v length {} is not a multiple of 3",
            fused.len()
        )));
    }
    let block = fused.len() / 3;
    Ok([
        fused[..block].to_vec(),
        fused[block..2 * block].to_vec(),
        fused[2 * block..].to_vec(),
    ])
}

fn read_checkpoint_file(prefix: &Path, file: CheckpointFile) -> Result<Vec<f32>> {
    let path = file.path(prefix);
    let data = read_f32_file(&path)?;
    if data.len() != file.expected_len() {
        return Err(ViTError::ShapeMismatch {
            file: path.display().to_string(),
            expected: file.expected_len(),
            got: data.len(),
        });
    }
    debug!(path = %path.display(), elements = data.len(), "read checkpoint file");
    Ok(data)
}

fn to_tensor<T: TensorElem, const RANK: usize>(
    data: &[f32],
    shape: [usize; RANK],
) -> std::result::Result<Tensor<T, RANK, Cpu>, TensorError> {
    let data = data
        .iter()
        .map(|&v| {
            T::from_f32(v)
                .ok_or_else(|| TensorError::Unsupported(format!("cannot represent {} as element", v)))
        })
        .collect::<std::result::Result<Vec<T>, _>>()?;
    Tensor::new(data, shape)
}

fn to_f32<T: TensorElem>(data: &[T]) -> Vec<f32> {
    data.iter().map(|v| v.to_f32().unwrap_or(f32::NAN)).collect()
}

fn frozen_linear<T: TensorElem>(
    weight: &[f32],
    bias: &[f32],
    out_features: usize,
    in_features: usize,
) -> std::result::Result<Linear<T>, TensorError> {
    Ok(Linear::frozen(
        to_tensor(weight, [out_features, in_features])?,
        Some(to_tensor(bias, [out_features])?),
    ))
}

fn frozen_layer_norm<T: TensorElem + Float>(
    weight: &[f32],
    bias: &[f32],
    eps: T,
) -> std::result::Result<LayerNorm<T>, TensorError> {
    LayerNorm::from_params(
        Parameter::frozen(to_tensor(weight, [weight.len()])?),
        Parameter::frozen(to_tensor(bias, [bias.len()])?),
        eps,
    )
}

fn check_architecture(config: &ViTBlockConfig) -> Result<()> {
    if config.model_dim != CHECKPOINT_MODEL_DIM
        || config.head_dim != CHECKPOINT_HEAD_DIM
        || config.n_heads != CHECKPOINT_N_HEADS
        || config.mlp_dim != CHECKPOINT_MLP_DIM
    {
        return Err(ViTError::ArchitectureMismatch {
            model_dim: config.model_dim,
            head_dim: config.head_dim,
            n_heads: config.n_heads,
            mlp_dim: config.mlp_dim,
        });
    }
    Ok(())
}

impl<T: TensorElem + Float> ViTBlock<T> {
    /// Loads a ViT-Base block from the twelve raw files sharing `prefix`,
    /// with dropout and drop-path disabled.
    pub fn from_checkpoint<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        Self::from_checkpoint_with_config(prefix, ViTBlockConfig::vit_base())
    }

    /// Loads a block with a caller-provided configuration.
    ///
    /// The configuration's dimensions must match the checkpoint architecture;
    /// its probabilities and other settings are used as given. All files are
    /// read and validated before any layer is built, and every loaded
    /// parameter is frozen.
    pub fn from_checkpoint_with_config<P: AsRef<Path>>(
        prefix: P,
        config: ViTBlockConfig,
    ) -> Result<Self> {
        config.validate()?;
        check_architecture(&config)?;
        let prefix = prefix.as_ref();

        let read = |file| read_checkpoint_file(prefix, file);
        let fc1_w = read(CheckpointFile::Fc1Weight)?;
        let fc1_b = read(CheckpointFile::Fc1Bias)?;
        let fc2_w = read(CheckpointFile::Fc2Weight)?;
        let fc2_b = read(CheckpointFile::Fc2Bias)?;
        let qkv_w = read(CheckpointFile::QkvWeight)?;
        let qkv_b = read(CheckpointFile::QkvBias)?;
        let proj_w = read(CheckpointFile::ProjWeight)?;
        let proj_b = read(CheckpointFile::ProjBias)?;
        let n1_w = read(CheckpointFile::Norm1Weight)?;
        let n1_b = read(CheckpointFile::Norm1Bias)?;
        let n2_w = read(CheckpointFile::Norm2Weight)?;
        let n2_b = read(CheckpointFile::Norm2Bias)?;

        let (c, a, m) = (CHECKPOINT_MODEL_DIM, config.attention_dim(), CHECKPOINT_MLP_DIM);
        let [q_w, k_w, v_w] = split_fused_qkv(&qkv_w)?;
        let [q_b, k_b, v_b] = split_fused_qkv(&qkv_b)?;
        let eps = T::from_f64(config.layer_norm_eps).ok_or_else(|| {
            ViTError::InvalidConfig(format!(
                "layer_norm_eps {} is not representable",
                config.layer_norm_eps
            ))
        })?;

        let block = Self::from_parts(
            frozen_linear(&fc1_w, &fc1_b, m, c)?,
            frozen_linear(&fc2_w, &fc2_b, c, m)?,
            frozen_linear(&q_w, &q_b, a, c)?,
            frozen_linear(&k_w, &k_b, a, c)?,
            frozen_linear(&v_w, &v_b, a, c)?,
            frozen_linear(&proj_w, &proj_b, c, a)?,
            frozen_layer_norm(&n1_w, &n1_b, eps)?,
            frozen_layer_norm(&n2_w, &n2_b, eps)?,
            config,
        );

        info!(
            prefix = %prefix.display(),
            parameters = block.num_parameters(),
            "loaded ViT block checkpoint"
        );
        Ok(block)
    }

    /// Writes the block as twelve raw files sharing `prefix`, re-fusing the
    /// q/k/v projections. Only the checkpoint architecture can be saved.
    pub fn save_raw<P: AsRef<Path>>(&self, prefix: P) -> Result<()> {
        check_architecture(&self.config)?;
        let prefix = prefix.as_ref();

        let weight = |l: &Linear<T>| to_f32(l.weight.value().data());
        let bias = |l: &Linear<T>| match &l.bias {
            Some(b) => to_f32(b.value().data()),
            None => vec![0.0; l.out_features()],
        };

        let mut qkv_w = weight(&self.wq);
        qkv_w.extend(weight(&self.wk));
        qkv_w.extend(weight(&self.wv));
        let mut qkv_b = bias(&self.wq);
        qkv_b.extend(bias(&self.wk));
        qkv_b.extend(bias(&self.wv));

        for file in CheckpointFile::ALL {
            let data = match file {
                CheckpointFile::Fc1Weight => weight(&self.w1),
                CheckpointFile::Fc1Bias => bias(&self.w1),
                CheckpointFile::Fc2Weight => weight(&self.w2),
                CheckpointFile::Fc2Bias => bias(&self.w2),
                CheckpointFile::QkvWeight => qkv_w.clone(),
                CheckpointFile::QkvBias => qkv_b.clone(),
                CheckpointFile::ProjWeight => weight(&self.wf),
                CheckpointFile::ProjBias => bias(&self.wf),
                CheckpointFile::Norm1Weight => to_f32(self.norm1.weight.value().data()),
                CheckpointFile::Norm1Bias => to_f32(self.norm1.bias.value().data()),
                CheckpointFile::Norm2Weight => to_f32(self.norm2.weight.value().data()),
                CheckpointFile::Norm2Bias => to_f32(self.norm2.bias.value().data()),
            };
            write_f32_file(file.path(prefix), &data)?;
        }

        info!(prefix = %prefix.display(), "saved ViT block checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_lengths() {
        assert_eq!(CheckpointFile::QkvWeight.expected_len(), 2304 * 768);
        assert_eq!(CheckpointFile::QkvBias.expected_len(), 2304);
        assert_eq!(CheckpointFile::Fc1Weight.expected_len(), 3072 * 768);
        assert_eq!(CheckpointFile::Fc1Bias.expected_len(), 3072);
        assert_eq!(CheckpointFile::Norm2Bias.expected_len(), 768);

        let total: usize = CheckpointFile::ALL.iter().map(|f| f.expected_len()).sum();
        // ViT-Base block parameter count.
        assert_eq!(total, 7_087_872);
    }

    #[test]
    fn test_path_appends_suffix() {
        let path = CheckpointFile::Norm1Bias.path(Path::new("/tmp/blocks.3"));
        assert_eq!(path, PathBuf::from("/tmp/blocks.3.norm1.bias.bin"));
    }

    #[test]
    fn test_split_fused_qkv() {
        // Three row blocks of a [6, 2] weight.
        let fused: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let [q, k, v] = split_fused_qkv(&fused).unwrap();
        assert_eq!(q, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(k, vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(v, vec![8.0, 9.0, 10.0, 11.0]);

        match split_fused_qkv(&[1.0f32, 2.0]) {
            Err(TensorError::Unsupported(msg)) => assert!(msg.contains("length 2")),
            other => panic!("expected Unsupported, got {:?}", other),
        }
    }

    #[test]
    fn test_f32_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.bin");
        let data = [1.5f32, -2.25, 0.0, f32::MAX];
        write_f32_file(&path, &data).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &1.5f32.to_le_bytes());
        assert_eq!(read_f32_file(&path).unwrap(), data.to_vec());
    }

    #[test]
    fn test_read_malformed_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, [0u8; 7]).unwrap();
        match read_f32_file(&path) {
            Err(ViTError::Malformed { file, bytes }) => {
                assert!(file.ends_with("bad.bin"));
                assert_eq!(bytes, 7);
            }
            other => panic!("expected Malformed, got {:?}", other),
        }

        let missing = dir.path().join("missing.bin");
        assert!(matches!(read_f32_file(&missing), Err(ViTError::FileAccess { .. })));
    }

    #[test]
    fn test_architecture_mismatch_before_reading() {
        // The prefix does not exist; the configuration check fails first.
        let config = ViTBlockConfig::new(32, 8, 64, 4, 0.0, 0.0);
        let res = ViTBlock::<f32>::from_checkpoint_with_config("/nonexistent/block", config);
        assert!(matches!(res, Err(ViTError::ArchitectureMismatch { .. })));
    }

    #[test]
    fn test_save_raw_requires_architecture() {
        let mut rng = rand::rng();
        let config = ViTBlockConfig::new(8, 2, 16, 4, 0.0, 0.0);
        let block = ViTBlock::<f32>::new(config, &mut rng).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let res = block.save_raw(dir.path().join("block"));
        assert!(matches!(res, Err(ViTError::ArchitectureMismatch { .. })));
    }
}
