//! Compiler driver: the per-compilation context and the phase pipeline

pub mod compiler;
pub mod context;

pub use compiler::{Compiler, CompilerOptions, DriverError, DriverResult};
pub use context::{CompilationContext, Phase};
