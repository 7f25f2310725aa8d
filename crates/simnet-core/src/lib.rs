pub mod tensor;
pub mod shape;
pub mod dtype;
pub mod error;
pub mod float_serde;

pub use tensor::{Tensor, TensorRepr};
pub use shape::Shape;
pub use dtype::Float;
pub use error::{TensorError, TensorResult};
