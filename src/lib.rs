//! A stack-based virtual machine for a ZAM-style labelled bytecode dialect.
//!
//! [`program::Program::load`] turns the textual format into a [`program::Program`];
//! [`vm::run`] executes one from its first instruction until `STOP` or an
//! uncaught `RAISE`.

pub mod error;
pub mod program;
pub mod stack;
pub mod value;
pub mod vm;

use error::{LoadError, VmError};
use value::Value;

/// Errors a single `run_source` call can fail with: either the loader or the
/// interpreter, surfaced through one type for callers that don't need to
/// distinguish load-time from run-time failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Load(LoadError),
    Run(VmError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Load(e) => write!(f, "{}", e),
            Error::Run(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

/// Load and run a program from its textual bytecode source in one call.
pub fn run_source(source: &str) -> Result<Value, Error> {
    let program = program::Program::load(source).map_err(Error::Load)?;
    vm::run(&program).map_err(Error::Run)
}
