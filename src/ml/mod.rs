//! Deploy-safe inference: the artifact network and the image preprocessing
//! that feeds it. Neither depends on the training stack.

pub mod dense;
pub mod preprocess;

pub use dense::{Activation, DenseNetwork, Layer};
pub use preprocess::{payload_to_tensor, IMAGE_SIDE, INPUT_DIM};

/// Number of digit classes the classifier emits.
pub const NUM_CLASSES: usize = 10;
