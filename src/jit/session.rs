//! One compilation unit: module, builder, execution engine, optimization
//! target, compiled and extern function tables, and compile statistics.
//!
//! The session is single-writer; the facade's `&mut self` serializes
//! `compile_source` across threads. Function pointers looked up from the
//! engine stay valid for the session's lifetime and die with it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Once;
use std::time::Duration;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context as LlvmContext;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::Module;
use inkwell::targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetMachine};
use inkwell::values::FunctionValue;
use inkwell::OptimizationLevel;

use crate::error::{CompileError, CompileResult};
use crate::jit::value::TypedValue;
use crate::jit::Options;
use crate::registry::FunctionDesc;

/// Costs observed while compiling one source unit, microsecond grade.
#[derive(Debug, Default, Clone)]
pub struct JitFunctionStat {
    pub parse_cost: Duration,
    pub parse_validate_cost: Duration,
    pub ir_build_cost: Duration,
    pub compile_cost: Duration,
}

impl fmt::Display for JitFunctionStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Jit compile statistics:")?;
        writeln!(f, "  parse: {}us", self.parse_cost.as_micros())?;
        writeln!(f, "  parse validate: {}us", self.parse_validate_cost.as_micros())?;
        writeln!(f, "  ir build: {}us", self.ir_build_cost.as_micros())?;
        writeln!(f, "  compile: {}us", self.compile_cost.as_micros())
    }
}

/// Extern function declared in the module with its native descriptor.
pub(crate) struct ExternFunction<'ctx> {
    pub desc: FunctionDesc,
    pub func: FunctionValue<'ctx>,
}

/// Per-function compile state built up during IR emission.
pub(crate) struct FunctionCompileContext<'ctx> {
    pub desc: FunctionDesc,
    pub func: FunctionValue<'ctx>,
    pub exit_block: BasicBlock<'ctx>,
    /// Stack slot for the return value; `None` for void functions.
    pub return_slot: Option<TypedValue<'ctx>>,
    /// Stringly-keyed named locals; scoping is the walker's concern.
    pub named_values: HashMap<String, TypedValue<'ctx>>,
    /// The context argument value when the function declares one.
    pub context_arg: Option<TypedValue<'ctx>>,
}

pub(crate) struct JitSession<'ctx> {
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub engine: ExecutionEngine<'ctx>,
    pub machine: TargetMachine,
    pub compiled: HashMap<String, FunctionCompileContext<'ctx>>,
    pub externs: HashMap<String, ExternFunction<'ctx>>,
    pub label_cursor: u32,
    pub print_asm: bool,
    pub stat: JitFunctionStat,
}

static NATIVE_TARGET_INIT: Once = Once::new();

/// Initialize the native target, asm printer and asm parser once per
/// process. Failure here is fatal.
fn initialize_native_target() {
    NATIVE_TARGET_INIT.call_once(|| {
        Target::initialize_native(&InitializationConfig::default())
            .expect("native target initialization");
    });
}

fn codegen_opt_level(optimize_level: u32) -> OptimizationLevel {
    match optimize_level {
        0 => OptimizationLevel::None,
        1 => OptimizationLevel::Less,
        3 => OptimizationLevel::Aggressive,
        _ => OptimizationLevel::Default,
    }
}

fn host_target_machine() -> CompileResult<TargetMachine> {
    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple).map_err(|err| CompileError::Llvm {
        message: err.to_string(),
    })?;
    let cpu = TargetMachine::get_host_cpu_name();
    let features = TargetMachine::get_host_cpu_features();
    target
        .create_target_machine(
            &triple,
            &cpu.to_string_lossy(),
            &features.to_string_lossy(),
            OptimizationLevel::Default,
            RelocMode::Default,
            CodeModel::JITDefault,
        )
        .ok_or_else(|| CompileError::Llvm {
            message: format!("no target machine for {}", triple.as_str().to_string_lossy()),
        })
}

impl<'ctx> JitSession<'ctx> {
    pub fn new(llvm: &'ctx LlvmContext, opts: &Options, print_asm: bool) -> CompileResult<JitSession<'ctx>> {
        initialize_native_target();
        let module = llvm.create_module("vexjit");
        let builder = llvm.create_builder();
        let engine = module
            .create_jit_execution_engine(codegen_opt_level(opts.optimize_level))
            .map_err(|err| CompileError::Llvm {
                message: err.to_string(),
            })?;
        let machine = host_target_machine()?;
        Ok(JitSession {
            module,
            builder,
            engine,
            machine,
            compiled: HashMap::new(),
            externs: HashMap::new(),
            label_cursor: 0,
            print_asm,
            stat: JitFunctionStat::default(),
        })
    }
}
