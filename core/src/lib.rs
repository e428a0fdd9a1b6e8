//! # vit-rs
//!
//! `vit-rs` is a pure Rust, CPU-only implementation of the Vision Transformer
//! encoder block, together with the small tensor runtime and layer toolkit it
//! is built from.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: Core N-dimensional tensor implementation.
//! - [`nn`]: Layers and building blocks (Linear, LayerNorm, GELU, dropout, drop-path).
//! - [`models`]: The ViT encoder block and its raw checkpoint format.
//! - [`checkpoint`]: State dicts and `safetensors` persistence.
//!
//! ## Example
//!
//! ```rust
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use vit_rs::models::vit::{ViTBlock, ViTBlockConfig};
//! use vit_rs::tensor::Tensor;
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let block = ViTBlock::<f32>::new(ViTBlockConfig::new(16, 4, 64, 4, 0.1, 0.1), &mut rng).unwrap();
//! let x = Tensor::<f32, 3>::ones([1, 3, 16]);
//! let y = block.forward(&[x], &mut rng).unwrap();
//! assert_eq!(y[0].shape(), &[1, 3, 16]);
//! ```

pub mod checkpoint;
pub mod models;
pub mod nn;
pub mod tensor;

pub use models::vit::{ViTBlock, ViTBlockConfig, ViTError};
pub use tensor::{Cpu, Device, Storage, Tensor, TensorElem, TensorError};
