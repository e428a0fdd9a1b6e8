use crate::nn::parameter::{ParamView, ParamViewMut};
use crate::tensor::TensorElem;
use std::fmt::Debug;

/// A Module trait for Neural Network layers.
///
/// Every layer exposes its parameters through a visitor so that optimizers,
/// parameter counting and state-dict persistence work the same way for a
/// single `Linear` and for a whole transformer block. Composite modules visit
/// their children with a dotted prefix (`"wq"` then `"wq.weight"`).
///
/// `Send + Sync` lets a model be shared across threads for read-only inference.
pub trait Module<T: TensorElem>: Debug + Send + Sync {
    /// Calls `f` once per parameter, in a fixed order.
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(ParamView<'_, T>));

    /// Calls `f` once per parameter with mutable access to its data.
    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(ParamViewMut<'_, T>));

    /// Switches between training and evaluation behavior.
    ///
    /// Layers without mode-dependent behavior ignore this.
    fn set_training(&mut self, _training: bool) {}

    fn is_training(&self) -> bool {
        false
    }

    fn train(&mut self) {
        self.set_training(true);
    }

    fn eval(&mut self) {
        self.set_training(false);
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        let mut count = 0;
        self.visit_parameters("", &mut |p| count += p.data.len());
        count
    }

    /// Names and shapes of all parameters, in visiting order.
    fn named_parameters(&self) -> Vec<(String, Vec<usize>)> {
        let mut out = Vec::new();
        self.visit_parameters("", &mut |p| out.push((p.name, p.shape.to_vec())));
        out
    }
}

/// Joins a parent prefix and a child name with a dot.
pub fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
