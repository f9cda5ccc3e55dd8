//! Per-function IR emission: function scaffolding, named locals, and call
//! emission with byval materialization and context injection.

use std::collections::HashMap;

use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::builder::Builder;
use inkwell::context::Context as LlvmContext;
use inkwell::module::Module;
use inkwell::types::AnyType;
use inkwell::values::{BasicMetadataValueEnum, OperandBundle};

use crate::ast;
use crate::error::{CompileError, CompileResult};
use crate::jit::session::{ExternFunction, FunctionCompileContext, JitSession};
use crate::jit::types::{function_type, llvm_type};
use crate::jit::value::TypedValue;
use crate::types::DType;

/// Build, verify and record IR for one function of the unit.
pub(crate) fn build_function<'ctx>(
    llvm: &'ctx LlvmContext,
    session: &mut JitSession<'ctx>,
    function: &ast::Function,
) -> CompileResult<()> {
    let fcc = {
        let JitSession {
            ref module,
            ref builder,
            ref compiled,
            ref externs,
            ref mut label_cursor,
            ..
        } = *session;
        let mut cg = FunctionCodegen::new(llvm, module, builder, compiled, externs, label_cursor, function)?;
        cg.lower_block(&function.body)?;
        cg.finish()?
    };
    session.compiled.insert(function.name.clone(), fcc);
    Ok(())
}

/// Emission surface handed to the statement walker for one function.
pub(crate) struct FunctionCodegen<'a, 'ctx> {
    pub llvm: &'ctx LlvmContext,
    pub module: &'a Module<'ctx>,
    pub builder: &'a Builder<'ctx>,
    pub compiled: &'a HashMap<String, FunctionCompileContext<'ctx>>,
    pub externs: &'a HashMap<String, ExternFunction<'ctx>>,
    label_cursor: &'a mut u32,
    pub fcc: FunctionCompileContext<'ctx>,
}

impl<'a, 'ctx> FunctionCodegen<'a, 'ctx> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        llvm: &'ctx LlvmContext,
        module: &'a Module<'ctx>,
        builder: &'a Builder<'ctx>,
        compiled: &'a HashMap<String, FunctionCompileContext<'ctx>>,
        externs: &'a HashMap<String, ExternFunction<'ctx>>,
        label_cursor: &'a mut u32,
        function: &ast::Function,
    ) -> CompileResult<FunctionCodegen<'a, 'ctx>> {
        let desc = function.to_desc()?;
        let fty = function_type(llvm, &desc)?;
        let func = module.add_function(&function.name, fty, None);
        log::debug!("create func:{}", function.name);

        let entry = llvm.append_basic_block(func, "entry");
        let exit_block = llvm.append_basic_block(func, "exit");
        builder.position_at_end(entry);

        let fcc = FunctionCompileContext {
            desc,
            func,
            exit_block,
            return_slot: None,
            named_values: HashMap::new(),
            context_arg: None,
        };
        let mut cg = FunctionCodegen {
            llvm,
            module,
            builder,
            compiled,
            externs,
            label_cursor,
            fcc,
        };
        cg.init_return_slot(function)?;
        cg.bind_params(function)?;
        Ok(cg)
    }

    fn init_return_slot(&mut self, function: &ast::Function) -> CompileResult<()> {
        if function.return_type.is_void() {
            return Ok(());
        }
        let ty = llvm_type(self.llvm, &function.return_type)?;
        let slot = self.builder.build_alloca(ty, "ret")?;
        self.fcc.return_slot = Some(TypedValue::slot(function.return_type.clone(), slot, ty));
        Ok(())
    }

    /// Bind each formal to a named local. Context arguments bind directly;
    /// everything else gets a stack slot. A parameter the mapper declared
    /// byval arrives as a pointer: the native value is loaded through it
    /// and the declaration gains the byval attribute.
    fn bind_params(&mut self, function: &ast::Function) -> CompileResult<()> {
        for (i, param) in function.params.iter().enumerate() {
            let arg = self
                .fcc
                .func
                .get_nth_param(i as u32)
                .ok_or_else(|| CompileError::Type {
                    message: format!("missing parameter {} of {}", i, function.name),
                })?;
            arg.set_name(&param.name);

            if param.dtype.is_context_ptr() {
                let value = TypedValue::direct(DType::ContextPtr, arg);
                self.fcc.context_arg = Some(value.clone());
                self.fcc.named_values.insert(param.name.clone(), value);
                continue;
            }

            let native_ty = llvm_type(self.llvm, &param.dtype)?;
            let slot = self.builder.build_alloca(native_ty, &param.name)?;
            if self.fcc.desc.pass_arg_by_value(i) {
                let loaded =
                    self.builder
                        .build_load(native_ty, arg.into_pointer_value(), "byval_arg")?;
                self.builder.build_store(slot, loaded)?;
                let byval = self.llvm.create_type_attribute(
                    Attribute::get_named_enum_kind_id("byval"),
                    native_ty.as_any_type_enum(),
                );
                self.fcc
                    .func
                    .add_attribute(AttributeLoc::Param(i as u32), byval);
            } else {
                self.builder.build_store(slot, arg)?;
            }
            self.fcc.named_values.insert(
                param.name.clone(),
                TypedValue::slot(param.dtype.clone(), slot, native_ty),
            );
        }
        Ok(())
    }

    /// Close the function: fall through to the exit block, emit the return,
    /// and run the verifier.
    fn finish(self) -> CompileResult<FunctionCompileContext<'ctx>> {
        if self
            .builder
            .get_insert_block()
            .and_then(|block| block.get_terminator())
            .is_none()
        {
            self.builder.build_unconditional_branch(self.fcc.exit_block)?;
        }
        self.builder.position_at_end(self.fcc.exit_block);
        match &self.fcc.return_slot {
            Some(slot) => {
                let value = slot.load(self.builder)?;
                self.builder.build_return(Some(&value))?;
            }
            None => {
                self.builder.build_return(None)?;
            }
        }

        if !self.fcc.func.verify(true) {
            log::error!("verify failed for function {}", self.fcc.desc.name);
            self.module.print_to_stderr();
            return Err(CompileError::Verify {
                name: self.fcc.desc.name.clone(),
            });
        }
        Ok(self.fcc)
    }

    pub(crate) fn next_label(&mut self) -> u32 {
        let id = *self.label_cursor;
        *self.label_cursor += 1;
        id
    }

    pub(crate) fn get_named_value(&self, name: &str) -> Option<TypedValue<'ctx>> {
        self.fcc.named_values.get(name).cloned()
    }

    pub(crate) fn define_named_value(&mut self, name: &str, value: TypedValue<'ctx>) {
        self.fcc.named_values.insert(name.to_string(), value);
    }

    /// Emit a call to a compiled or extern function.
    ///
    /// Resolution checks the current function, then the session's compiled
    /// table, then the extern table. When the callee declares a context
    /// argument and the caller passed one fewer value, the current
    /// function's context is injected at the declared index. Arguments are
    /// cast to the declared types; byval arguments are materialized as
    /// pointers and listed in a "byval" operand bundle.
    pub(crate) fn call_function(
        &mut self,
        name: &str,
        args: Vec<TypedValue<'ctx>>,
    ) -> CompileResult<TypedValue<'ctx>> {
        let (desc, callee) = if self.fcc.desc.name == name {
            (self.fcc.desc.clone(), self.fcc.func)
        } else if let Some(compiled) = self.compiled.get(name) {
            (compiled.desc.clone(), compiled.func)
        } else if let Some(ext) = self.externs.get(name) {
            (ext.desc.clone(), ext.func)
        } else {
            return Err(CompileError::UnknownFunction {
                name: name.to_string(),
            });
        };

        let mut args = args;
        if let Some(idx) = desc.context_arg_idx {
            if args.len() + 1 == desc.arg_types.len() {
                if let Some(context_arg) = self.fcc.context_arg.clone() {
                    args.insert(idx, context_arg);
                }
            }
        }
        if args.len() != desc.arg_types.len() {
            return Err(CompileError::ArityMismatch {
                name: name.to_string(),
                expected: desc.arg_types.len(),
                given: args.len(),
            });
        }

        let mut arg_vals: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
        let mut byval_args: Vec<BasicMetadataValueEnum> = Vec::new();
        for (i, arg) in args.into_iter().enumerate() {
            let expected = &desc.arg_types[i];
            let arg = match arg.cast_to(expected, self.llvm, self.builder)? {
                Some(value) => value,
                None => {
                    return Err(CompileError::CastNotFeasible {
                        function: name.to_string(),
                        index: i,
                        from: arg.dtype.clone(),
                        to: expected.clone(),
                    })
                }
            };
            if desc.pass_arg_by_value(i) {
                let ptr = match arg.pointer() {
                    Some(ptr) => ptr,
                    None => {
                        let ty = llvm_type(self.llvm, &arg.dtype)?;
                        let tmp = self.builder.build_alloca(ty, "byval_tmp")?;
                        let value = arg.load(self.builder)?;
                        self.builder.build_store(tmp, value)?;
                        tmp
                    }
                };
                byval_args.push(ptr.into());
                arg_vals.push(ptr.into());
            } else {
                arg_vals.push(arg.load(self.builder)?.into());
            }
        }

        let call = if byval_args.is_empty() {
            self.builder.build_call(callee, &arg_vals, "call")?
        } else {
            let bundle = OperandBundle::create("byval", &byval_args);
            self.builder
                .build_direct_call_with_operand_bundles(callee, &arg_vals, &[bundle], "call")?
        };

        match call.try_as_basic_value().left() {
            None => Ok(TypedValue::void()),
            Some(value) => {
                // Pointer returns to integer or float come back as plain
                // pointers; the value acts as a slot of the pointee type.
                if let Some(pointee) = desc.return_type.ptr_to() {
                    if pointee.is_integer() || pointee.is_float() {
                        let ty = llvm_type(self.llvm, pointee)?;
                        return Ok(TypedValue::slot(
                            pointee.clone(),
                            value.into_pointer_value(),
                            ty,
                        ));
                    }
                }
                Ok(TypedValue::direct(desc.return_type.clone(), value))
            }
        }
    }
}
