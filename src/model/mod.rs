mod classifier;
pub mod densenet;
mod weights;

pub use classifier::{Backbone, Classifier, select_device};
pub use densenet::{DenseNet, DenseNetConfig};
pub use weights::ensure_weights;

pub(crate) use classifier::check_input;
