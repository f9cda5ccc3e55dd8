//! Process-wide catalog of native functions callable from generated code,
//! and the calling-convention mapper consulted when declaring them.
//!
//! Registration happens once at process start, before any compile;
//! duplicate names are rejected and the first registration stays
//! effective.

use std::collections::HashMap;
use std::os::raw::c_void;
use std::sync::{Mutex, OnceLock};

use crate::error::RegistryError;
use crate::types::DType;

/// Raw native function pointer, shareable across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFunc(*const c_void);

unsafe impl Send for NativeFunc {}
unsafe impl Sync for NativeFunc {}

impl NativeFunc {
    pub fn new(ptr: *const c_void) -> NativeFunc {
        NativeFunc(ptr)
    }

    pub fn addr(&self) -> usize {
        self.0 as usize
    }
}

/// Signature and linkage info for one callable function.
///
/// `func` is `None` for functions compiled inside a session; registry
/// entries always carry a pointer. `context_arg_idx` is the unique index
/// whose argument type is the context handle.
#[derive(Debug, Clone)]
pub struct FunctionDesc {
    pub name: String,
    pub return_type: DType,
    pub arg_types: Vec<DType>,
    pub func: Option<NativeFunc>,
    pub context_arg_idx: Option<usize>,
}

/// Integer argument registers available under the target convention.
const TOTAL_PARAM_REGISTERS: u32 = 6;

impl FunctionDesc {
    pub fn new(
        name: impl Into<String>,
        return_type: DType,
        arg_types: Vec<DType>,
        func: Option<NativeFunc>,
    ) -> Result<FunctionDesc, RegistryError> {
        let name = name.into();
        let mut context_arg_idx = None;
        for (i, dtype) in arg_types.iter().enumerate() {
            if dtype.is_context_ptr() {
                match context_arg_idx {
                    None => context_arg_idx = Some(i),
                    Some(first) => {
                        return Err(RegistryError::DuplicateContextArg {
                            name,
                            first,
                            second: i,
                        })
                    }
                }
            }
        }
        Ok(FunctionDesc {
            name,
            return_type,
            arg_types,
            func,
            context_arg_idx,
        })
    }

    /// Integer registers an argument of `dtype` consumes; floats travel in
    /// vector registers and consume none.
    fn register_demand(dtype: &DType) -> u32 {
        if dtype.is_ptr() || dtype.is_integer() || dtype.is_bit() {
            1
        } else if dtype.is_span() || dtype.is_string_view() || dtype.is_simd_vector() {
            2
        } else {
            0
        }
    }

    /// Whether argument `argno` must be passed as a pointer to a properly
    /// aligned copy (byval) under the target convention.
    ///
    /// True iff the argument is a two-register class and the cumulative
    /// demand of arguments `0..=argno` exhausts the six integer argument
    /// registers.
    pub fn pass_arg_by_value(&self, argno: usize) -> bool {
        if argno >= self.arg_types.len() {
            return false;
        }
        let used: u32 = self.arg_types[..=argno].iter().map(Self::register_demand).sum();
        let two_register_class = self.arg_types[argno].is_span()
            || self.arg_types[argno].is_string_view()
            || self.arg_types[argno].is_simd_vector();
        two_register_class && used > TOTAL_PARAM_REGISTERS
    }

    /// Whether `ts` may be passed to this function after implicit casts.
    pub fn validate_args(&self, ts: &[DType]) -> bool {
        ts.len() == self.arg_types.len()
            && ts.iter().zip(&self.arg_types).all(|(given, want)| given.can_cast_to(want))
    }

    /// Exact signature comparison, no casts.
    pub fn compare_signature(&self, rtype: &DType, args: &[DType]) -> bool {
        self.return_type == *rtype && self.arg_types.as_slice() == args
    }
}

type FuncRegMap = HashMap<String, FunctionDesc>;

static REGISTRY: OnceLock<Mutex<FuncRegMap>> = OnceLock::new();

fn registry() -> &'static Mutex<FuncRegMap> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a native function under `name`.
///
/// Insertion is idempotent by name: a second registration with the same
/// name is rejected and the first stays effective.
pub fn register_function(
    name: impl Into<String>,
    func: NativeFunc,
    return_type: DType,
    arg_types: Vec<DType>,
) -> Result<(), RegistryError> {
    let desc = FunctionDesc::new(name, return_type, arg_types, Some(func))?;
    let mut regs = registry().lock().unwrap();
    if regs.contains_key(&desc.name) {
        log::error!("duplicate func name: {}", desc.name);
        return Err(RegistryError::DuplicateName { name: desc.name });
    }
    regs.insert(desc.name.clone(), desc);
    Ok(())
}

/// Look up a registered function by exact name.
pub fn lookup_function(name: &str) -> Option<FunctionDesc> {
    registry().lock().unwrap().get(name).cloned()
}

/// Symbol name of a member function on `dtype`.
pub fn member_func_name(dtype: &DType, member: &str) -> String {
    format!("{}_{}", dtype.type_string(), member)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    fn dummy() -> NativeFunc {
        NativeFunc::new(tests_target as *const c_void)
    }

    extern "C" fn tests_target() {}

    #[test]
    fn test_duplicate_registration_rejected() {
        let name = "registry_test_dup";
        assert!(register_function(name, dummy(), DType::I32, vec![DType::I32]).is_ok());
        let again = register_function(name, dummy(), DType::I64, vec![]);
        assert_eq!(
            again,
            Err(RegistryError::DuplicateName {
                name: name.to_string()
            })
        );
        // First registration stays effective.
        let desc = lookup_function(name).unwrap();
        assert_eq!(desc.return_type, DType::I32);
        assert_eq!(desc.arg_types, vec![DType::I32]);
    }

    #[test]
    fn test_duplicate_context_arg_rejected() {
        let err = FunctionDesc::new(
            "two_ctx",
            DType::Void,
            vec![DType::ContextPtr, DType::I32, DType::ContextPtr],
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateContextArg {
                name: "two_ctx".to_string(),
                first: 0,
                second: 2,
            }
        );
    }

    #[test]
    fn test_context_arg_idx() {
        let desc = FunctionDesc::new(
            "with_ctx",
            DType::F32,
            vec![DType::ContextPtr, DType::SimdVector(Primitive::F32)],
            None,
        )
        .unwrap();
        assert_eq!(desc.context_arg_idx, Some(0));
    }

    #[test]
    fn test_pass_by_value_register_budget() {
        // Five ints then a vector: 5 + 2 = 7 > 6, so the vector is byval.
        let desc = FunctionDesc::new(
            "five_ints_vec",
            DType::F32,
            vec![
                DType::I32,
                DType::I32,
                DType::I32,
                DType::I32,
                DType::I32,
                DType::SimdVector(Primitive::F32),
            ],
            None,
        )
        .unwrap();
        for i in 0..5 {
            assert!(!desc.pass_arg_by_value(i));
        }
        assert!(desc.pass_arg_by_value(5));
        assert!(!desc.pass_arg_by_value(6));

        // Three vectors fit exactly in six registers.
        let v = DType::SimdVector(Primitive::F32);
        let desc = FunctionDesc::new(
            "three_vecs",
            DType::Void,
            vec![v.clone(), v.clone(), v.clone(), v.clone()],
            None,
        )
        .unwrap();
        assert!(!desc.pass_arg_by_value(0));
        assert!(!desc.pass_arg_by_value(1));
        assert!(!desc.pass_arg_by_value(2));
        assert!(desc.pass_arg_by_value(3));
    }

    #[test]
    fn test_one_register_classes_never_byval() {
        // Integers past the budget spill to the stack but are never byval.
        let desc = FunctionDesc::new(
            "many_ints",
            DType::Void,
            vec![DType::I64; 9],
            None,
        )
        .unwrap();
        for i in 0..9 {
            assert!(!desc.pass_arg_by_value(i));
        }
    }

    #[test]
    fn test_floats_consume_no_integer_registers() {
        // Floats ride in vector registers, so the trailing vector still
        // fits the integer budget.
        let desc = FunctionDesc::new(
            "floats_then_vec",
            DType::Void,
            vec![
                DType::F64,
                DType::F64,
                DType::F64,
                DType::F64,
                DType::F64,
                DType::SimdVector(Primitive::F64),
            ],
            None,
        )
        .unwrap();
        assert!(!desc.pass_arg_by_value(5));
    }

    #[test]
    fn test_member_func_name() {
        assert_eq!(
            member_func_name(&DType::SimdVector(Primitive::F32), "get"),
            "simd_vector_f32_get"
        );
    }
}
