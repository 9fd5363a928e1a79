mod domain;
mod error;
mod registry;

pub use domain::*;
pub use error::SwitchError;
pub use registry::{ConfigHandle, ControlConfig, SwitchRegistry};
