pub mod config;
pub mod descriptor;
pub mod ecosystem;
pub mod error;
pub mod logging;
pub mod memory_size;

pub use config::*;
pub use descriptor::{split_args, ProcessDescriptor, MAX_INSTANCES};
pub use ecosystem::{load, ConfigFormat, Ecosystem};
pub use error::*;
pub use memory_size::{MemorySize, MemorySizeError};

// ログマクロから参照する
#[doc(hidden)]
pub use paste;
