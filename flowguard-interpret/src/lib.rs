#![forbid(unsafe_code)]

mod error;
mod value;
mod vm;

pub use error::RuntimeError;
pub use value::{number_to_string, Value};
pub use vm::{ExecOutcome, Interpreter};
