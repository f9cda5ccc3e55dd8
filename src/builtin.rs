//! Builtin extern surface callable from generated code.
//!
//! Every export here is a concrete `extern "C"`/`extern "C-unwind"`
//! function with its own linkable symbol name, generated by macro families
//! and registered into the process-wide function registry by
//! [`init_builtin`]. Helpers that can raise runtime failures use
//! `"C-unwind"` so the failure unwinds through generated code back to the
//! host.

use std::os::raw::c_void;
use std::sync::Once;

use crate::context::Context;
use crate::error::{raise, RegistryError, RuntimeError};
use crate::registry::{register_function, NativeFunc};
use crate::simd::{bits, sort};
use crate::types::vector::{Bit, Vector};
use crate::types::{DType, Primitive};

/// Reserved extern used by generated code to signal runtime vector-size
/// mismatches.
pub const THROW_SIZE_MISMATCH_FUNC: &str = "throw_size_mismatch_exception";

extern "C-unwind" fn throw_size_mismatch_exception(current: i32, expected: i32) {
    raise(RuntimeError::SizeMismatch {
        current: current as usize,
        expected: expected as usize,
    });
}

extern "C-unwind" fn simd_vector_bits_not(ctx: *mut Context, src: Vector<Bit>) -> Vector<Bit> {
    let ctx = unsafe { &mut *ctx };
    let dst = ctx.new_bit_vector(src.size());
    bits::simd_vector_bits_not(src, dst);
    dst
}

macro_rules! bit_binary_externs {
    ($($name:ident => $op:path;)*) => {
        $(
            extern "C-unwind" fn $name(
                ctx: *mut Context,
                left: Vector<Bit>,
                right: Vector<Bit>,
            ) -> Vector<Bit> {
                let ctx = unsafe { &mut *ctx };
                let dst = ctx.new_bit_vector(left.size());
                $op(left, right, dst);
                dst
            }
        )*
    };
}

bit_binary_externs! {
    simd_vector_bits_and => bits::simd_vector_bits_and;
    simd_vector_bits_or => bits::simd_vector_bits_or;
    simd_vector_bits_xor => bits::simd_vector_bits_xor;
}

extern "C" fn simd_vector_bits_count_true(src: Vector<Bit>) -> usize {
    bits::simd_vector_bits_count_true(src)
}

fn register_bit_externs() -> Result<(), RegistryError> {
    let bitvec = DType::SimdVector(Primitive::Bit);
    register_function(
        "simd_vector_bits_not",
        NativeFunc::new(simd_vector_bits_not as *const c_void),
        bitvec.clone(),
        vec![DType::ContextPtr, bitvec.clone()],
    )?;
    for (name, ptr) in [
        ("simd_vector_bits_and", simd_vector_bits_and as *const c_void),
        ("simd_vector_bits_or", simd_vector_bits_or as *const c_void),
        ("simd_vector_bits_xor", simd_vector_bits_xor as *const c_void),
    ] {
        register_function(
            name,
            NativeFunc::new(ptr),
            bitvec.clone(),
            vec![DType::ContextPtr, bitvec.clone(), bitvec.clone()],
        )?;
    }
    register_function(
        "simd_vector_bits_count_true",
        NativeFunc::new(simd_vector_bits_count_true as *const c_void),
        DType::U64,
        vec![bitvec],
    )?;
    Ok(())
}

macro_rules! sort_externs {
    ($($t:ty, $prim:ident, $sort:ident, $select:ident, $topk:ident, $argsort:ident, $argselect:ident;)*) => {
        $(
            extern "C-unwind" fn $sort(ctx: *mut Context, data: Vector<$t>, descending: bool) {
                let ctx = unsafe { &*ctx };
                sort::simd_vector_sort(ctx, data, descending);
            }

            extern "C-unwind" fn $select(
                ctx: *mut Context,
                data: Vector<$t>,
                k: usize,
                descending: bool,
            ) {
                let ctx = unsafe { &*ctx };
                sort::simd_vector_select(ctx, data, k, descending);
            }

            extern "C-unwind" fn $topk(
                ctx: *mut Context,
                data: Vector<$t>,
                k: usize,
                descending: bool,
            ) {
                let ctx = unsafe { &*ctx };
                sort::simd_vector_topk(ctx, data, k, descending);
            }

            extern "C-unwind" fn $argsort(
                ctx: *mut Context,
                data: Vector<$t>,
                descending: bool,
            ) -> Vector<u64> {
                let ctx = unsafe { &mut *ctx };
                sort::simd_vector_argsort(ctx, data, descending)
            }

            extern "C-unwind" fn $argselect(
                ctx: *mut Context,
                data: Vector<$t>,
                k: usize,
                descending: bool,
            ) -> Vector<u64> {
                let ctx = unsafe { &mut *ctx };
                sort::simd_vector_argselect(ctx, data, k, descending)
            }
        )*

        fn register_sort_externs() -> Result<(), RegistryError> {
            $(
                let vec = DType::SimdVector(Primitive::$prim);
                let idx_vec = DType::SimdVector(Primitive::U64);
                register_function(
                    stringify!($sort),
                    NativeFunc::new($sort as *const c_void),
                    DType::Void,
                    vec![DType::ContextPtr, vec.clone(), DType::Bit],
                )?;
                register_function(
                    stringify!($select),
                    NativeFunc::new($select as *const c_void),
                    DType::Void,
                    vec![DType::ContextPtr, vec.clone(), DType::U64, DType::Bit],
                )?;
                register_function(
                    stringify!($topk),
                    NativeFunc::new($topk as *const c_void),
                    DType::Void,
                    vec![DType::ContextPtr, vec.clone(), DType::U64, DType::Bit],
                )?;
                register_function(
                    stringify!($argsort),
                    NativeFunc::new($argsort as *const c_void),
                    idx_vec.clone(),
                    vec![DType::ContextPtr, vec.clone(), DType::Bit],
                )?;
                register_function(
                    stringify!($argselect),
                    NativeFunc::new($argselect as *const c_void),
                    idx_vec,
                    vec![DType::ContextPtr, vec, DType::U64, DType::Bit],
                )?;
            )*
            Ok(())
        }
    };
}

sort_externs! {
    f32, F32, simd_vector_sort_f32, simd_vector_select_f32, simd_vector_topk_f32, simd_vector_argsort_f32, simd_vector_argselect_f32;
    f64, F64, simd_vector_sort_f64, simd_vector_select_f64, simd_vector_topk_f64, simd_vector_argsort_f64, simd_vector_argselect_f64;
    u64, U64, simd_vector_sort_u64, simd_vector_select_u64, simd_vector_topk_u64, simd_vector_argsort_u64, simd_vector_argselect_u64;
    i64, I64, simd_vector_sort_i64, simd_vector_select_i64, simd_vector_topk_i64, simd_vector_argsort_i64, simd_vector_argselect_i64;
    u32, U32, simd_vector_sort_u32, simd_vector_select_u32, simd_vector_topk_u32, simd_vector_argsort_u32, simd_vector_argselect_u32;
    i32, I32, simd_vector_sort_i32, simd_vector_select_i32, simd_vector_topk_i32, simd_vector_argsort_i32, simd_vector_argselect_i32;
    u16, U16, simd_vector_sort_u16, simd_vector_select_u16, simd_vector_topk_u16, simd_vector_argsort_u16, simd_vector_argselect_u16;
    i16, I16, simd_vector_sort_i16, simd_vector_select_i16, simd_vector_topk_i16, simd_vector_argsort_i16, simd_vector_argselect_i16;
}

macro_rules! key_value_externs {
    ($($k:ty, $v:ty, $kprim:ident, $vprim:ident, $sort:ident, $topk:ident, $select:ident;)*) => {
        $(
            extern "C-unwind" fn $sort(
                ctx: *mut Context,
                key: Vector<$k>,
                value: Vector<$v>,
                descending: bool,
            ) {
                let ctx = unsafe { &*ctx };
                sort::simd_vector_sort_key_value(ctx, key, value, descending);
            }

            extern "C-unwind" fn $topk(
                ctx: *mut Context,
                key: Vector<$k>,
                value: Vector<$v>,
                k: usize,
                descending: bool,
            ) {
                let ctx = unsafe { &*ctx };
                sort::simd_vector_topk_key_value(ctx, key, value, k, descending);
            }

            extern "C-unwind" fn $select(
                ctx: *mut Context,
                key: Vector<$k>,
                value: Vector<$v>,
                k: usize,
                descending: bool,
            ) {
                let ctx = unsafe { &*ctx };
                sort::simd_vector_select_key_value(ctx, key, value, k, descending);
            }
        )*

        fn register_key_value_externs() -> Result<(), RegistryError> {
            $(
                let key = DType::SimdVector(Primitive::$kprim);
                let value = DType::SimdVector(Primitive::$vprim);
                register_function(
                    stringify!($sort),
                    NativeFunc::new($sort as *const c_void),
                    DType::Void,
                    vec![DType::ContextPtr, key.clone(), value.clone(), DType::Bit],
                )?;
                register_function(
                    stringify!($topk),
                    NativeFunc::new($topk as *const c_void),
                    DType::Void,
                    vec![DType::ContextPtr, key.clone(), value.clone(), DType::U64, DType::Bit],
                )?;
                register_function(
                    stringify!($select),
                    NativeFunc::new($select as *const c_void),
                    DType::Void,
                    vec![DType::ContextPtr, key, value, DType::U64, DType::Bit],
                )?;
            )*
            Ok(())
        }
    };
}

key_value_externs! {
    u32, u32, U32, U32, simd_vector_sort_key_value_u32_u32, simd_vector_topk_key_value_u32_u32, simd_vector_select_key_value_u32_u32;
    u32, i32, U32, I32, simd_vector_sort_key_value_u32_i32, simd_vector_topk_key_value_u32_i32, simd_vector_select_key_value_u32_i32;
    u32, u64, U32, U64, simd_vector_sort_key_value_u32_u64, simd_vector_topk_key_value_u32_u64, simd_vector_select_key_value_u32_u64;
    u32, i64, U32, I64, simd_vector_sort_key_value_u32_i64, simd_vector_topk_key_value_u32_i64, simd_vector_select_key_value_u32_i64;
    u32, f32, U32, F32, simd_vector_sort_key_value_u32_f32, simd_vector_topk_key_value_u32_f32, simd_vector_select_key_value_u32_f32;
    u32, f64, U32, F64, simd_vector_sort_key_value_u32_f64, simd_vector_topk_key_value_u32_f64, simd_vector_select_key_value_u32_f64;
    i32, u32, I32, U32, simd_vector_sort_key_value_i32_u32, simd_vector_topk_key_value_i32_u32, simd_vector_select_key_value_i32_u32;
    i32, i32, I32, I32, simd_vector_sort_key_value_i32_i32, simd_vector_topk_key_value_i32_i32, simd_vector_select_key_value_i32_i32;
    i32, u64, I32, U64, simd_vector_sort_key_value_i32_u64, simd_vector_topk_key_value_i32_u64, simd_vector_select_key_value_i32_u64;
    i32, i64, I32, I64, simd_vector_sort_key_value_i32_i64, simd_vector_topk_key_value_i32_i64, simd_vector_select_key_value_i32_i64;
    i32, f32, I32, F32, simd_vector_sort_key_value_i32_f32, simd_vector_topk_key_value_i32_f32, simd_vector_select_key_value_i32_f32;
    i32, f64, I32, F64, simd_vector_sort_key_value_i32_f64, simd_vector_topk_key_value_i32_f64, simd_vector_select_key_value_i32_f64;
    u64, u32, U64, U32, simd_vector_sort_key_value_u64_u32, simd_vector_topk_key_value_u64_u32, simd_vector_select_key_value_u64_u32;
    u64, i32, U64, I32, simd_vector_sort_key_value_u64_i32, simd_vector_topk_key_value_u64_i32, simd_vector_select_key_value_u64_i32;
    u64, u64, U64, U64, simd_vector_sort_key_value_u64_u64, simd_vector_topk_key_value_u64_u64, simd_vector_select_key_value_u64_u64;
    u64, i64, U64, I64, simd_vector_sort_key_value_u64_i64, simd_vector_topk_key_value_u64_i64, simd_vector_select_key_value_u64_i64;
    u64, f32, U64, F32, simd_vector_sort_key_value_u64_f32, simd_vector_topk_key_value_u64_f32, simd_vector_select_key_value_u64_f32;
    u64, f64, U64, F64, simd_vector_sort_key_value_u64_f64, simd_vector_topk_key_value_u64_f64, simd_vector_select_key_value_u64_f64;
    i64, u32, I64, U32, simd_vector_sort_key_value_i64_u32, simd_vector_topk_key_value_i64_u32, simd_vector_select_key_value_i64_u32;
    i64, i32, I64, I32, simd_vector_sort_key_value_i64_i32, simd_vector_topk_key_value_i64_i32, simd_vector_select_key_value_i64_i32;
    i64, u64, I64, U64, simd_vector_sort_key_value_i64_u64, simd_vector_topk_key_value_i64_u64, simd_vector_select_key_value_i64_u64;
    i64, i64, I64, I64, simd_vector_sort_key_value_i64_i64, simd_vector_topk_key_value_i64_i64, simd_vector_select_key_value_i64_i64;
    i64, f32, I64, F32, simd_vector_sort_key_value_i64_f32, simd_vector_topk_key_value_i64_f32, simd_vector_select_key_value_i64_f32;
    i64, f64, I64, F64, simd_vector_sort_key_value_i64_f64, simd_vector_topk_key_value_i64_f64, simd_vector_select_key_value_i64_f64;
    f32, u32, F32, U32, simd_vector_sort_key_value_f32_u32, simd_vector_topk_key_value_f32_u32, simd_vector_select_key_value_f32_u32;
    f32, i32, F32, I32, simd_vector_sort_key_value_f32_i32, simd_vector_topk_key_value_f32_i32, simd_vector_select_key_value_f32_i32;
    f32, u64, F32, U64, simd_vector_sort_key_value_f32_u64, simd_vector_topk_key_value_f32_u64, simd_vector_select_key_value_f32_u64;
    f32, i64, F32, I64, simd_vector_sort_key_value_f32_i64, simd_vector_topk_key_value_f32_i64, simd_vector_select_key_value_f32_i64;
    f32, f32, F32, F32, simd_vector_sort_key_value_f32_f32, simd_vector_topk_key_value_f32_f32, simd_vector_select_key_value_f32_f32;
    f32, f64, F32, F64, simd_vector_sort_key_value_f32_f64, simd_vector_topk_key_value_f32_f64, simd_vector_select_key_value_f32_f64;
    f64, u32, F64, U32, simd_vector_sort_key_value_f64_u32, simd_vector_topk_key_value_f64_u32, simd_vector_select_key_value_f64_u32;
    f64, i32, F64, I32, simd_vector_sort_key_value_f64_i32, simd_vector_topk_key_value_f64_i32, simd_vector_select_key_value_f64_i32;
    f64, u64, F64, U64, simd_vector_sort_key_value_f64_u64, simd_vector_topk_key_value_f64_u64, simd_vector_select_key_value_f64_u64;
    f64, i64, F64, I64, simd_vector_sort_key_value_f64_i64, simd_vector_topk_key_value_f64_i64, simd_vector_select_key_value_f64_i64;
    f64, f32, F64, F32, simd_vector_sort_key_value_f64_f32, simd_vector_topk_key_value_f64_f32, simd_vector_select_key_value_f64_f32;
    f64, f64, F64, F64, simd_vector_sort_key_value_f64_f64, simd_vector_topk_key_value_f64_f64, simd_vector_select_key_value_f64_f64;
}

macro_rules! member_externs {
    ($($t:ty, $prim:ident, $get:ident, $size:ident, $subvector:ident;)*) => {
        $(
            extern "C" fn $get(v: Vector<$t>, i: usize) -> $t {
                v.get(i)
            }

            extern "C" fn $size(v: Vector<$t>) -> usize {
                v.size()
            }

            extern "C" fn $subvector(v: Vector<$t>, pos: u32, len: u32) -> Vector<$t> {
                v.subvector(pos, len)
            }
        )*

        fn register_member_externs() -> Result<(), RegistryError> {
            $(
                let vec = DType::SimdVector(Primitive::$prim);
                register_function(
                    stringify!($get),
                    NativeFunc::new($get as *const c_void),
                    Primitive::$prim.dtype(),
                    vec![vec.clone(), DType::U64],
                )?;
                register_function(
                    stringify!($size),
                    NativeFunc::new($size as *const c_void),
                    DType::U64,
                    vec![vec.clone()],
                )?;
                register_function(
                    stringify!($subvector),
                    NativeFunc::new($subvector as *const c_void),
                    vec.clone(),
                    vec![vec, DType::U32, DType::U32],
                )?;
            )*
            Ok(())
        }
    };
}

member_externs! {
    f32, F32, simd_vector_f32_get, simd_vector_f32_size, simd_vector_f32_subvector;
    f64, F64, simd_vector_f64_get, simd_vector_f64_size, simd_vector_f64_subvector;
    u64, U64, simd_vector_u64_get, simd_vector_u64_size, simd_vector_u64_subvector;
    i64, I64, simd_vector_i64_get, simd_vector_i64_size, simd_vector_i64_subvector;
    u32, U32, simd_vector_u32_get, simd_vector_u32_size, simd_vector_u32_subvector;
    i32, I32, simd_vector_i32_get, simd_vector_i32_size, simd_vector_i32_subvector;
    u16, U16, simd_vector_u16_get, simd_vector_u16_size, simd_vector_u16_subvector;
    i16, I16, simd_vector_i16_get, simd_vector_i16_size, simd_vector_i16_subvector;
}

fn register_all() -> Result<(), RegistryError> {
    register_function(
        THROW_SIZE_MISMATCH_FUNC,
        NativeFunc::new(throw_size_mismatch_exception as *const c_void),
        DType::Void,
        vec![DType::I32, DType::I32],
    )?;
    register_bit_externs()?;
    register_sort_externs()?;
    register_key_value_externs()?;
    register_member_externs()?;
    Ok(())
}

static INIT: Once = Once::new();

/// Register the builtin extern surface. Idempotent; called from compiler
/// construction.
pub fn init_builtin() {
    INIT.call_once(|| {
        if let Err(err) = register_all() {
            log::error!("builtin registration failed: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::lookup_function;

    #[test]
    fn test_builtins_registered() {
        init_builtin();
        init_builtin(); // idempotent

        let throw = lookup_function(THROW_SIZE_MISMATCH_FUNC).unwrap();
        assert_eq!(throw.arg_types, vec![DType::I32, DType::I32]);

        let sort = lookup_function("simd_vector_sort_f32").unwrap();
        assert_eq!(sort.context_arg_idx, Some(0));
        assert_eq!(sort.return_type, DType::Void);

        let kv = lookup_function("simd_vector_topk_key_value_u32_u32").unwrap();
        assert_eq!(kv.arg_types.len(), 5);

        let get = lookup_function("simd_vector_f32_get").unwrap();
        assert_eq!(get.return_type, DType::F32);

        assert!(lookup_function("simd_vector_bits_xor").is_some());
        assert!(lookup_function("simd_vector_bits_count_true").is_some());
    }
}
