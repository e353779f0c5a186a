//! Java detection and reference-analyzer invocation.

pub mod detect;
pub mod error;
pub mod invoke;

pub use detect::{detect_java, JavaInfo};
pub use error::TracerError;
pub use invoke::{Launcher, Protocol, TraceOutput, TracerCommand, R8_MAIN_CLASS};
