//! vexjit - embeddable JIT for numeric and SIMD-vector UDFs.
//!
//! A host process supplies source text describing typed functions; vexjit
//! parses, type-checks, lowers to LLVM IR, links against a registry of
//! native extern helpers, and produces callable machine code whose
//! lifetime is tied to a compile session.
//!
//! # Usage
//!
//! ```ignore
//! use vexjit::{inkwell, JitCompiler, Options};
//!
//! let llvm = inkwell::context::Context::create();
//! let mut compiler = JitCompiler::new(&llvm, Options::default());
//! compiler.compile_source("int id(int x){ return x; }", false)?;
//! let addr = compiler.get_function_pointer("id")?;
//! let id: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(addr) };
//! assert_eq!(id(42), 42);
//! ```
//!
//! # Architecture
//!
//! - [`jit`] - compile sessions, extern linkage, IR emission
//! - [`ast`] - UDF source parsing and validation
//! - [`registry`] - process-wide native function catalog
//! - [`simd`] - execution-time vector runtime
//! - [`memory`] / [`context`] - arenas and the per-invocation context

pub mod ast;
pub mod builtin;
pub mod context;
pub mod error;
pub mod jit;
pub mod memory;
pub mod registry;
pub mod simd;
pub mod types;

pub use context::Context;
pub use error::{CompileError, CompileResult, RegistryError, RuntimeError};
pub use jit::{JitCompiler, JitFunctionStat, Options};
pub use memory::{Arena, ThreadCachedArena};
pub use registry::{register_function, FunctionDesc, NativeFunc};
pub use types::vector::{Bit, StringView, Vector};
pub use types::{DType, Primitive};

// Re-exported so hosts can create the LLVM context the compiler borrows.
pub use inkwell;
