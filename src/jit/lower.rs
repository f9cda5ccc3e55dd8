//! Statement and expression lowering through the emission surface.
//!
//! Expressions arrive annotated by validation: every node carries its
//! dtype and every call its resolved symbol. Key-value vector ops get a
//! length check emitted ahead of the call; a mismatch calls the reserved
//! size-mismatch extern and the block ends unreachable.

use inkwell::values::{BasicValueEnum, IntValue};
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::validate::{is_key_value_symbol, CONSTANT_NAMES, CONSTANT_VALUES};
use crate::ast::{BinOp, Expr, ExprKind, Stmt, UnaryOp};
use crate::builtin::THROW_SIZE_MISMATCH_FUNC;
use crate::error::{CompileError, CompileResult};
use crate::jit::codegen::FunctionCodegen;
use crate::jit::types::llvm_type;
use crate::jit::value::TypedValue;
use crate::types::DType;

impl<'a, 'ctx> FunctionCodegen<'a, 'ctx> {
    pub(crate) fn lower_block(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Return(expr) => {
                if let Some(expr) = expr {
                    let value = self.lower_expr(expr)?;
                    let target = self.fcc.desc.return_type.clone();
                    let value = self.cast_or_err(value, &target, "return")?;
                    let slot = self.fcc.return_slot.clone().ok_or_else(|| CompileError::Type {
                        message: "return with value in void function".to_string(),
                    })?;
                    let loaded = value.load(self.builder)?;
                    self.builder
                        .build_store(slot.pointer().expect("return slot"), loaded)?;
                }
                self.builder.build_unconditional_branch(self.fcc.exit_block)?;
                self.start_dead_block();
                Ok(())
            }
            Stmt::VarDecl { dtype, name, init } => {
                let value = self.lower_expr(init)?;
                let value = self.cast_or_err(value, dtype, name)?;
                let ty = llvm_type(self.llvm, dtype)?;
                let slot = self.builder.build_alloca(ty, name)?;
                let loaded = value.load(self.builder)?;
                self.builder.build_store(slot, loaded)?;
                self.define_named_value(name, TypedValue::slot(dtype.clone(), slot, ty));
                Ok(())
            }
            Stmt::Assign { name, value } => {
                let target = self.get_named_value(name).ok_or_else(|| CompileError::Type {
                    message: format!("unknown variable '{}'", name),
                })?;
                let ptr = target.pointer().ok_or_else(|| CompileError::Type {
                    message: format!("'{}' is not assignable", name),
                })?;
                let value = self.lower_expr(value)?;
                let value = self.cast_or_err(value, &target.dtype, name)?;
                let loaded = value.load(self.builder)?;
                self.builder.build_store(ptr, loaded)?;
                Ok(())
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let id = self.next_label();
                let func = self.fcc.func;
                let then_block = self.llvm.append_basic_block(func, &format!("if_then_{}", id));
                let end_block = self.llvm.append_basic_block(func, &format!("if_end_{}", id));
                let else_block = if else_body.is_some() {
                    self.llvm.append_basic_block(func, &format!("if_else_{}", id))
                } else {
                    end_block
                };

                let cond_value = self.lower_cond(cond)?;
                self.builder
                    .build_conditional_branch(cond_value, then_block, else_block)?;

                self.builder.position_at_end(then_block);
                self.lower_block(then_body)?;
                self.branch_if_open(end_block)?;

                if let Some(else_body) = else_body {
                    self.builder.position_at_end(else_block);
                    self.lower_block(else_body)?;
                    self.branch_if_open(end_block)?;
                }

                self.builder.position_at_end(end_block);
                Ok(())
            }
            Stmt::While { cond, body } => {
                let id = self.next_label();
                let func = self.fcc.func;
                let cond_block = self.llvm.append_basic_block(func, &format!("while_cond_{}", id));
                let body_block = self.llvm.append_basic_block(func, &format!("while_body_{}", id));
                let end_block = self.llvm.append_basic_block(func, &format!("while_end_{}", id));

                self.builder.build_unconditional_branch(cond_block)?;
                self.builder.position_at_end(cond_block);
                let cond_value = self.lower_cond(cond)?;
                self.builder
                    .build_conditional_branch(cond_value, body_block, end_block)?;

                self.builder.position_at_end(body_block);
                self.lower_block(body)?;
                self.branch_if_open(cond_block)?;

                self.builder.position_at_end(end_block);
                Ok(())
            }
            Stmt::Expr(expr) => self.lower_expr(expr).map(|_| ()),
        }
    }

    fn lower_cond(&mut self, cond: &Expr) -> CompileResult<IntValue<'ctx>> {
        let value = self.lower_expr(cond)?;
        Ok(value.load(self.builder)?.into_int_value())
    }

    /// Branch to `target` unless the current block already terminated.
    fn branch_if_open(&mut self, target: inkwell::basic_block::BasicBlock<'ctx>) -> CompileResult<()> {
        if self
            .builder
            .get_insert_block()
            .and_then(|block| block.get_terminator())
            .is_none()
        {
            self.builder.build_unconditional_branch(target)?;
        }
        Ok(())
    }

    /// Statements after a return lower into a block the verifier accepts
    /// but nothing branches to.
    fn start_dead_block(&mut self) {
        let id = self.next_label();
        let dead = self
            .llvm
            .append_basic_block(self.fcc.func, &format!("dead_{}", id));
        self.builder.position_at_end(dead);
    }

    fn cast_or_err(
        &self,
        value: TypedValue<'ctx>,
        target: &DType,
        what: &str,
    ) -> CompileResult<TypedValue<'ctx>> {
        match value.cast_to(target, self.llvm, self.builder)? {
            Some(cast) => Ok(cast),
            None => Err(CompileError::Type {
                message: format!("can not cast {} to {} for {}", value.dtype, target, what),
            }),
        }
    }

    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> CompileResult<TypedValue<'ctx>> {
        let dtype = expr.dtype.clone().ok_or_else(|| CompileError::Type {
            message: "expression was not validated".to_string(),
        })?;
        match &expr.kind {
            ExprKind::IntLiteral(v) => {
                let ty = llvm_type(self.llvm, &dtype)?.into_int_type();
                Ok(TypedValue::direct(dtype, ty.const_int(*v as u64, true).into()))
            }
            ExprKind::FloatLiteral(v) => {
                Ok(TypedValue::direct(dtype, self.llvm.f64_type().const_float(*v).into()))
            }
            ExprKind::BoolLiteral(b) => Ok(TypedValue::direct(
                dtype,
                self.llvm.bool_type().const_int(*b as u64, false).into(),
            )),
            ExprKind::Ident(name) => {
                if let Some(value) = self.get_named_value(name) {
                    return Ok(value);
                }
                let idx = CONSTANT_NAMES
                    .iter()
                    .position(|n| *n == name.as_str())
                    .ok_or_else(|| CompileError::Type {
                        message: format!("unknown identifier '{}'", name),
                    })?;
                Ok(TypedValue::direct(
                    DType::F64,
                    self.llvm.f64_type().const_float(CONSTANT_VALUES[idx]).into(),
                ))
            }
            ExprKind::Unary { op, operand } => {
                let inner = self.lower_expr(operand)?;
                let loaded = inner.load(self.builder)?;
                let result: BasicValueEnum = match op {
                    UnaryOp::Neg if inner.dtype.is_float() => self
                        .builder
                        .build_float_neg(loaded.into_float_value(), "fneg")?
                        .into(),
                    UnaryOp::Neg => self
                        .builder
                        .build_int_neg(loaded.into_int_value(), "neg")?
                        .into(),
                    UnaryOp::Not => self
                        .builder
                        .build_not(loaded.into_int_value(), "not")?
                        .into(),
                };
                Ok(TypedValue::direct(dtype, result))
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, dtype),
            ExprKind::Call {
                name,
                args,
                resolved,
            } => {
                let symbol = resolved.clone().ok_or_else(|| CompileError::UnknownFunction {
                    name: name.clone(),
                })?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.lower_expr(arg)?);
                }
                if is_key_value_symbol(&symbol) && values.len() >= 2 {
                    let key = values[0].clone();
                    let value = values[1].clone();
                    self.emit_size_check(&key, &value)?;
                }
                self.call_function(&symbol, values)
            }
            ExprKind::MemberCall {
                recv,
                member,
                args,
                resolved,
            } => {
                let symbol = resolved.clone().ok_or_else(|| CompileError::UnknownFunction {
                    name: member.clone(),
                })?;
                let mut values = Vec::with_capacity(args.len() + 1);
                values.push(self.lower_expr(recv)?);
                for arg in args {
                    values.push(self.lower_expr(arg)?);
                }
                self.call_function(&symbol, values)
            }
            ExprKind::Index {
                recv,
                index,
                resolved,
            } => {
                let symbol = resolved.clone().ok_or_else(|| CompileError::Type {
                    message: "unresolved index expression".to_string(),
                })?;
                let recv = self.lower_expr(recv)?;
                let index = self.lower_expr(index)?;
                self.call_function(&symbol, vec![recv, index])
            }
        }
    }

    fn lower_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        dtype: DType,
    ) -> CompileResult<TypedValue<'ctx>> {
        let l = self.lower_expr(lhs)?;
        let r = self.lower_expr(rhs)?;

        if op.is_logical() {
            let lv = l.load(self.builder)?.into_int_value();
            let rv = r.load(self.builder)?.into_int_value();
            let result = match op {
                BinOp::And => self.builder.build_and(lv, rv, "and")?,
                _ => self.builder.build_or(lv, rv, "or")?,
            };
            return Ok(TypedValue::direct(DType::Bit, result.into()));
        }

        // Promote both operands to their common numeric type.
        let common = if l.dtype == r.dtype {
            l.dtype.clone()
        } else if l.dtype.can_cast_to(&r.dtype) {
            r.dtype.clone()
        } else if r.dtype.can_cast_to(&l.dtype) {
            l.dtype.clone()
        } else {
            return Err(CompileError::Type {
                message: format!("no common type for {} and {}", l.dtype, r.dtype),
            });
        };
        let l = self.cast_or_err(l, &common, "binary op")?;
        let r = self.cast_or_err(r, &common, "binary op")?;
        let lv = l.load(self.builder)?;
        let rv = r.load(self.builder)?;

        if op.is_comparison() {
            let result = if common.is_float() {
                let pred = match op {
                    BinOp::Eq => FloatPredicate::OEQ,
                    BinOp::Ne => FloatPredicate::ONE,
                    BinOp::Lt => FloatPredicate::OLT,
                    BinOp::Le => FloatPredicate::OLE,
                    BinOp::Gt => FloatPredicate::OGT,
                    _ => FloatPredicate::OGE,
                };
                self.builder.build_float_compare(
                    pred,
                    lv.into_float_value(),
                    rv.into_float_value(),
                    "fcmp",
                )?
            } else {
                let signed = common.is_signed_integer();
                let pred = match op {
                    BinOp::Eq => IntPredicate::EQ,
                    BinOp::Ne => IntPredicate::NE,
                    BinOp::Lt if signed => IntPredicate::SLT,
                    BinOp::Lt => IntPredicate::ULT,
                    BinOp::Le if signed => IntPredicate::SLE,
                    BinOp::Le => IntPredicate::ULE,
                    BinOp::Gt if signed => IntPredicate::SGT,
                    BinOp::Gt => IntPredicate::UGT,
                    BinOp::Ge if signed => IntPredicate::SGE,
                    _ => IntPredicate::UGE,
                };
                self.builder
                    .build_int_compare(pred, lv.into_int_value(), rv.into_int_value(), "icmp")?
            };
            return Ok(TypedValue::direct(DType::Bit, result.into()));
        }

        let result: BasicValueEnum = if common.is_float() {
            let a = lv.into_float_value();
            let b = rv.into_float_value();
            match op {
                BinOp::Add => self.builder.build_float_add(a, b, "fadd")?.into(),
                BinOp::Sub => self.builder.build_float_sub(a, b, "fsub")?.into(),
                BinOp::Mul => self.builder.build_float_mul(a, b, "fmul")?.into(),
                BinOp::Div => self.builder.build_float_div(a, b, "fdiv")?.into(),
                _ => self.builder.build_float_rem(a, b, "frem")?.into(),
            }
        } else {
            let a = lv.into_int_value();
            let b = rv.into_int_value();
            let signed = common.is_signed_integer();
            match op {
                BinOp::Add => self.builder.build_int_add(a, b, "add")?.into(),
                BinOp::Sub => self.builder.build_int_sub(a, b, "sub")?.into(),
                BinOp::Mul => self.builder.build_int_mul(a, b, "mul")?.into(),
                BinOp::Div if signed => self.builder.build_int_signed_div(a, b, "sdiv")?.into(),
                BinOp::Div => self.builder.build_int_unsigned_div(a, b, "udiv")?.into(),
                BinOp::Rem if signed => self.builder.build_int_signed_rem(a, b, "srem")?.into(),
                _ => self.builder.build_int_unsigned_rem(a, b, "urem")?.into(),
            }
        };
        Ok(TypedValue::direct(dtype, result))
    }

    /// Masked length of a vector view value.
    fn vector_size(&mut self, vector: &TypedValue<'ctx>) -> CompileResult<IntValue<'ctx>> {
        let loaded = vector.load(self.builder)?.into_struct_value();
        let raw = self
            .builder
            .build_extract_value(loaded, 1, "size_and_flags")?
            .into_int_value();
        let mask = self.llvm.i64_type().const_int(!(1u64 << 63), false);
        Ok(self.builder.build_and(raw, mask, "size")?)
    }

    /// Runtime length check for parallel key/value buffers. On mismatch
    /// generated code calls the reserved size-mismatch extern.
    fn emit_size_check(
        &mut self,
        key: &TypedValue<'ctx>,
        value: &TypedValue<'ctx>,
    ) -> CompileResult<()> {
        let key_size = self.vector_size(key)?;
        let value_size = self.vector_size(value)?;
        let mismatch =
            self.builder
                .build_int_compare(IntPredicate::NE, key_size, value_size, "size_ne")?;

        let id = self.next_label();
        let func = self.fcc.func;
        let fail_block = self
            .llvm
            .append_basic_block(func, &format!("size_mismatch_{}", id));
        let ok_block = self.llvm.append_basic_block(func, &format!("size_ok_{}", id));
        self.builder
            .build_conditional_branch(mismatch, fail_block, ok_block)?;

        self.builder.position_at_end(fail_block);
        let i32_ty = self.llvm.i32_type();
        let current = self
            .builder
            .build_int_truncate(value_size, i32_ty, "current")?;
        let expected = self
            .builder
            .build_int_truncate(key_size, i32_ty, "expected")?;
        self.call_function(
            THROW_SIZE_MISMATCH_FUNC,
            vec![
                TypedValue::direct(DType::I32, current.into()),
                TypedValue::direct(DType::I32, expected.into()),
            ],
        )?;
        self.builder.build_unreachable()?;

        self.builder.position_at_end(ok_block);
        Ok(())
    }
}
