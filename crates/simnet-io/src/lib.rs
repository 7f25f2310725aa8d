pub mod bundle;
pub mod config_io;
pub mod error;

pub use bundle::{load_bundle, save_bundle, NamedTensor, TensorBundle};
pub use config_io::{load_config, save_config};
pub use error::{IoError, IoResult};
