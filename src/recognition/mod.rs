pub mod network;
pub mod preprocessing;
pub mod recognizer;
pub mod topology;
pub mod weights;

pub use preprocessing::{CanonicalFormat, CanonicalImageConverter};
pub use recognizer::RecognizerHandle;
