//! Mapping from domain types to LLVM types, including the byval pointer
//! substitution the calling-convention mapper requests.

use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::context::Context as LlvmContext;
use inkwell::types::{AnyType, BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, StructType};
use inkwell::values::FunctionValue;
use inkwell::AddressSpace;

use crate::error::{CompileError, CompileResult};
use crate::registry::FunctionDesc;
use crate::types::DType;

/// `{pointer, length}` representation shared by vectors, spans and string
/// views.
pub(crate) fn view_type(llvm: &LlvmContext) -> StructType<'_> {
    let ptr = llvm.ptr_type(AddressSpace::default());
    llvm.struct_type(&[ptr.into(), llvm.i64_type().into()], false)
}

/// Native value type of a dtype; void has none.
pub(crate) fn llvm_type<'ctx>(
    llvm: &'ctx LlvmContext,
    dtype: &DType,
) -> CompileResult<BasicTypeEnum<'ctx>> {
    let ty: BasicTypeEnum = match dtype {
        DType::Void => {
            return Err(CompileError::Type {
                message: "void has no value representation".to_string(),
            })
        }
        DType::Bit => llvm.bool_type().into(),
        DType::U8 | DType::I8 => llvm.i8_type().into(),
        DType::U16 | DType::I16 => llvm.i16_type().into(),
        DType::U32 | DType::I32 => llvm.i32_type().into(),
        DType::U64 | DType::I64 => llvm.i64_type().into(),
        DType::F32 => llvm.f32_type().into(),
        DType::F64 => llvm.f64_type().into(),
        DType::StringView | DType::Span(_) | DType::SimdVector(_) => view_type(llvm).into(),
        DType::Ptr(_) | DType::ContextPtr => llvm.ptr_type(AddressSpace::default()).into(),
    };
    Ok(ty)
}

/// Function type at the mapped calling convention: arguments the mapper
/// classifies byval are declared as pointers.
pub(crate) fn function_type<'ctx>(
    llvm: &'ctx LlvmContext,
    desc: &FunctionDesc,
) -> CompileResult<FunctionType<'ctx>> {
    let mut params: Vec<BasicMetadataTypeEnum> = Vec::with_capacity(desc.arg_types.len());
    for (i, arg) in desc.arg_types.iter().enumerate() {
        let ty = if desc.pass_arg_by_value(i) {
            llvm.ptr_type(AddressSpace::default()).into()
        } else {
            llvm_type(llvm, arg)?
        };
        params.push(ty.into());
    }
    if desc.return_type.is_void() {
        Ok(llvm.void_type().fn_type(&params, false))
    } else {
        Ok(llvm_type(llvm, &desc.return_type)?.fn_type(&params, false))
    }
}

/// Annotate every byval parameter of an extern declaration with
/// `byval(<elem>) align 8 noundef`.
pub(crate) fn add_byval_attributes<'ctx>(
    llvm: &'ctx LlvmContext,
    func: FunctionValue<'ctx>,
    desc: &FunctionDesc,
) -> CompileResult<()> {
    for (i, arg) in desc.arg_types.iter().enumerate() {
        if !desc.pass_arg_by_value(i) {
            continue;
        }
        let elem = llvm_type(llvm, arg)?;
        let byval = llvm.create_type_attribute(
            Attribute::get_named_enum_kind_id("byval"),
            elem.as_any_type_enum(),
        );
        let align = llvm.create_enum_attribute(Attribute::get_named_enum_kind_id("align"), 8);
        let noundef = llvm.create_enum_attribute(Attribute::get_named_enum_kind_id("noundef"), 0);
        let loc = AttributeLoc::Param(i as u32);
        func.add_attribute(loc, byval);
        func.add_attribute(loc, align);
        func.add_attribute(loc, noundef);
    }
    Ok(())
}
