pub mod classifier;
pub mod pipeline;

pub use classifier::command::CommandClassifier;
pub use classifier::traits::{Classifier, ClassifierError};
pub use pipeline::{select_first, DetectionPipeline};
