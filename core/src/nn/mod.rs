//! Neural network building blocks.
//!
//! Every layer owns its parameters as [`Parameter`]s and exposes them through
//! the [`Module`] visitor, so a composite model can be counted, frozen or
//! serialized without knowing its layers' concrete types.

pub mod activation;
pub mod dropout;
pub mod init;
pub mod linear;
pub mod module;
pub mod norm;
pub mod parameter;

pub use activation::{gelu, Activation};
pub use dropout::{drop_path, dropout, DropPathScaling};
pub use init::trunc_normal;
pub use linear::Linear;
pub use module::{join_name, Module};
pub use norm::LayerNorm;
pub use parameter::{ParamView, ParamViewMut, Parameter};
