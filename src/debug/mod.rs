//! Diagnostics for the autodiff engine and trained weights.

pub mod gradient_check;
pub mod numerical_check;

pub use gradient_check::{check_gradients, GradientReport};
pub use numerical_check::{check_array, check_tensors, NumericalIssue};
