//! Concrete value descriptor flowing through IR emission.
//!
//! A value is its domain type plus one of three native representations: a
//! loaded SSA value, a stack slot holding it, or nothing for void call
//! results. Behavior switches on dtype predicates; there is no dispatch
//! hierarchy.

use inkwell::builder::Builder;
use inkwell::context::Context as LlvmContext;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, PointerValue};

use crate::error::{CompileError, CompileResult};
use crate::types::DType;

#[derive(Debug, Clone)]
pub(crate) enum ValueRepr<'ctx> {
    /// Result of a void call.
    Void,
    /// SSA value.
    Direct(BasicValueEnum<'ctx>),
    /// Stack slot; loads happen on use.
    Slot {
        ptr: PointerValue<'ctx>,
        ty: BasicTypeEnum<'ctx>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct TypedValue<'ctx> {
    pub dtype: DType,
    pub repr: ValueRepr<'ctx>,
}

impl<'ctx> TypedValue<'ctx> {
    pub fn void() -> TypedValue<'ctx> {
        TypedValue {
            dtype: DType::Void,
            repr: ValueRepr::Void,
        }
    }

    pub fn direct(dtype: DType, value: BasicValueEnum<'ctx>) -> TypedValue<'ctx> {
        TypedValue {
            dtype,
            repr: ValueRepr::Direct(value),
        }
    }

    pub fn slot(dtype: DType, ptr: PointerValue<'ctx>, ty: BasicTypeEnum<'ctx>) -> TypedValue<'ctx> {
        TypedValue {
            dtype,
            repr: ValueRepr::Slot { ptr, ty },
        }
    }

    /// The value as SSA, loading from the slot when needed.
    pub fn load(&self, builder: &Builder<'ctx>) -> CompileResult<BasicValueEnum<'ctx>> {
        match &self.repr {
            ValueRepr::Void => Err(CompileError::Type {
                message: "void value has no representation".to_string(),
            }),
            ValueRepr::Direct(value) => Ok(*value),
            ValueRepr::Slot { ptr, ty } => Ok(builder.build_load(*ty, *ptr, "load")?),
        }
    }

    /// Pointer form when the value already lives in a slot.
    pub fn pointer(&self) -> Option<PointerValue<'ctx>> {
        match &self.repr {
            ValueRepr::Slot { ptr, .. } => Some(*ptr),
            _ => None,
        }
    }

    fn numeric_width(dtype: &DType) -> u32 {
        dtype.int_width().unwrap_or(1)
    }

    /// Emit an implicit cast to `target`, or `None` when the dtype pair is
    /// not cast-feasible.
    pub fn cast_to(
        &self,
        target: &DType,
        llvm: &'ctx LlvmContext,
        builder: &Builder<'ctx>,
    ) -> CompileResult<Option<TypedValue<'ctx>>> {
        if &self.dtype == target {
            return Ok(Some(self.clone()));
        }
        if !self.dtype.can_cast_to(target) {
            return Ok(None);
        }
        let value = self.load(builder)?;
        let src_int = self.dtype.is_integer() || self.dtype.is_bit();
        let result: BasicValueEnum = if src_int && (target.is_integer() || target.is_bit()) {
            let src_width = Self::numeric_width(&self.dtype);
            let dst_width = Self::numeric_width(target);
            let int_value = value.into_int_value();
            if src_width == dst_width {
                // Same width, sign reinterpretation only.
                int_value.into()
            } else {
                let dst_ty = crate::jit::types::llvm_type(llvm, target)?.into_int_type();
                if self.dtype.is_signed_integer() {
                    builder.build_int_s_extend(int_value, dst_ty, "sext")?.into()
                } else {
                    builder.build_int_z_extend(int_value, dst_ty, "zext")?.into()
                }
            }
        } else if src_int && target.is_float() {
            let dst_ty = crate::jit::types::llvm_type(llvm, target)?.into_float_type();
            let int_value = value.into_int_value();
            if self.dtype.is_signed_integer() {
                builder
                    .build_signed_int_to_float(int_value, dst_ty, "sitofp")?
                    .into()
            } else {
                builder
                    .build_unsigned_int_to_float(int_value, dst_ty, "uitofp")?
                    .into()
            }
        } else if self.dtype.is_float() && target.is_float() {
            let float_value = value.into_float_value();
            match target {
                DType::F64 => builder
                    .build_float_ext(float_value, llvm.f64_type(), "fpext")?
                    .into(),
                _ => builder
                    .build_float_trunc(float_value, llvm.f32_type(), "fptrunc")?
                    .into(),
            }
        } else {
            return Ok(None);
        };
        Ok(Some(TypedValue::direct(target.clone(), result)))
    }
}
