pub mod ml_model;
pub mod inference;

pub use ml_model::{DriverClassifier, ModelConfig, NormalizedTensor, NUM_CLASSES, CLASS_NAMES, INPUT_CHANNELS, class_label};
pub use inference::{InferenceEngine, InferenceError, InputShape, Prediction, ScoreModel, encode_weights, predict_single_image};
