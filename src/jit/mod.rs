//! Compiler facade: owns compile sessions and exposes the host-visible
//! operations.
//!
//! The host owns the LLVM context and lends it to the compiler; every
//! session object borrows it. `compile_source` takes `&mut self`, which
//! serializes compilation per compiler the way a session mutex would;
//! distinct compilers over distinct contexts are independent and may
//! compile in parallel. Lookup after a successful compile is lock-free.

mod codegen;
mod lower;
mod session;
mod types;
mod value;

use std::time::Instant;

use inkwell::context::Context as LlvmContext;

pub use session::JitFunctionStat;

use crate::ast::{parser, validate};
use crate::builtin::{self, THROW_SIZE_MISMATCH_FUNC};
use crate::error::{CompileError, CompileResult};
use crate::registry;
use crate::types::DType;
use session::{ExternFunction, JitSession};

/// Compiler options.
///
/// `fast_math` is recognized but currently inert pending a safe default
/// selection. `fuse_vector_ops` is forced on.
#[derive(Debug, Clone)]
pub struct Options {
    pub fast_math: bool,
    /// Optimization level 0..=3, default 2.
    pub optimize_level: u32,
    pub fuse_vector_ops: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            fast_math: false,
            optimize_level: 2,
            fuse_vector_ops: true,
        }
    }
}

pub struct JitCompiler<'ctx> {
    llvm: &'ctx LlvmContext,
    opts: Options,
    session: Option<JitSession<'ctx>>,
}

impl<'ctx> JitCompiler<'ctx> {
    /// Create a compiler over a host-owned LLVM context.
    pub fn new(llvm: &'ctx LlvmContext, opts: Options) -> JitCompiler<'ctx> {
        builtin::init_builtin();
        let mut opts = opts;
        opts.fuse_vector_ops = true;
        JitCompiler {
            llvm,
            opts,
            session: None,
        }
    }

    /// Compile a source unit, replacing any previous session.
    ///
    /// Returns the names of the unit's top-level functions. Pointers
    /// looked up from a previous session are invalidated.
    pub fn compile_source(&mut self, source: &str, dump_asm: bool) -> CompileResult<Vec<String>> {
        let parse_start = Instant::now();
        let mut functions = parser::parse_source(source)?;
        let parse_cost = parse_start.elapsed();

        let validate_start = Instant::now();
        let unit = validate::validate_functions(&mut functions)?;
        let parse_validate_cost = validate_start.elapsed();

        let mut session = JitSession::new(self.llvm, &self.opts, dump_asm)?;
        session.stat.parse_cost = parse_cost;
        session.stat.parse_validate_cost = parse_validate_cost;

        let build_start = Instant::now();
        let mut extern_symbols = unit.extern_symbols;
        extern_symbols.insert(THROW_SIZE_MISMATCH_FUNC.to_string());
        for symbol in &extern_symbols {
            let desc = registry::lookup_function(symbol).ok_or_else(|| {
                CompileError::UnknownFunction {
                    name: symbol.clone(),
                }
            })?;
            let native = desc.func.ok_or_else(|| CompileError::Llvm {
                message: format!("extern {} has no native pointer", symbol),
            })?;
            let fty = types::function_type(self.llvm, &desc)?;
            let func = session.module.add_function(symbol, fty, None);
            types::add_byval_attributes(self.llvm, func, &desc)?;
            session.engine.add_global_mapping(&func, native.addr());
            log::debug!("inject extern func {}", symbol);
            session
                .externs
                .insert(symbol.clone(), ExternFunction { desc, func });
        }

        let names: Vec<String> = functions.iter().map(|f| f.name.clone()).collect();
        for function in &functions {
            codegen::build_function(self.llvm, &mut session, function)?;
        }
        session.stat.ir_build_cost = build_start.elapsed();

        let compile_start = Instant::now();
        if session.print_asm {
            session.module.print_to_stderr();
        }
        if self.opts.optimize_level > 0 {
            let pipeline = format!(
                "default<O{}>,function(instcombine,reassociate,gvn,simplifycfg,\
                 partially-inline-libcalls,mldst-motion,tailcallelim,load-store-vectorizer)",
                self.opts.optimize_level.min(3)
            );
            session
                .module
                .run_passes(
                    &pipeline,
                    &session.machine,
                    inkwell::passes::PassBuilderOptions::create(),
                )
                .map_err(|err| CompileError::Llvm {
                    message: err.to_string(),
                })?;
        }
        session.stat.compile_cost = compile_start.elapsed();

        self.session = Some(session);
        Ok(names)
    }

    /// Address of a compiled function; stable for the session's lifetime.
    pub fn get_function_pointer(&self, name: &str) -> CompileResult<usize> {
        let session = self.session.as_ref().ok_or(CompileError::NoSession)?;
        session
            .engine
            .get_function_address(name)
            .map_err(|_| CompileError::FunctionNotFound {
                name: name.to_string(),
            })
    }

    /// Check a compiled function against an exact expected signature and
    /// return its canonical name. Unknown names surface as an explicit
    /// not-found status.
    pub fn verify_function_signature(
        &self,
        name: &str,
        return_type: &DType,
        arg_types: &[DType],
    ) -> CompileResult<String> {
        let session = self.session.as_ref().ok_or(CompileError::NoSession)?;
        let Some(ctx) = session.compiled.get(name) else {
            return Err(CompileError::FunctionNotFound {
                name: name.to_string(),
            });
        };
        if ctx.desc.compare_signature(return_type, arg_types) {
            Ok(name.to_string())
        } else {
            log::error!("function {} signature mismatch", name);
            Err(CompileError::SignatureMismatch {
                name: name.to_string(),
            })
        }
    }

    /// Costs recorded for the current session.
    pub fn get_stat(&self) -> JitFunctionStat {
        self.session
            .as_ref()
            .map(|s| s.stat.clone())
            .unwrap_or_default()
    }
}
