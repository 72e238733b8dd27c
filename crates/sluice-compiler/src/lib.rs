mod compiler;
mod error;

pub use compiler::{Compiler, StandardCompiler};
pub use error::CompileError;
