//! Pre-built Model Architectures.
//!
//! - **ViT**: the Vision Transformer encoder block. See [`vit`].

pub mod vit;

pub use vit::{ViTBlock, ViTBlockConfig, ViTError};
