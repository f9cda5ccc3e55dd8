//! Post-parse validation: type inference and call resolution.
//!
//! Walks every function, infers a DType for each expression, resolves
//! every call to a concrete symbol, and collects the set of extern symbols
//! the compile session must inject into the linker. Calls resolve against
//! the unit's own functions first, then the registry by exact name, then
//! the monomorphized implicit names derived from vector argument element
//! types.

use std::collections::{BTreeSet, HashMap};

use crate::ast::{BinOp, Expr, ExprKind, Function, Stmt, UnaryOp};
use crate::error::{CompileError, CompileResult};
use crate::registry::{self, FunctionDesc};
use crate::types::DType;

/// Named floating-point constants usable as bare identifiers.
pub const CONSTANT_NAMES: [&str; 2] = ["pi", "e"];
pub const CONSTANT_VALUES: [f64; 2] = [std::f64::consts::PI, std::f64::consts::E];

/// Resolution results for one compilation unit.
#[derive(Debug, Default)]
pub struct ValidatedUnit {
    /// Extern symbols referenced by the unit, in deterministic order.
    pub extern_symbols: BTreeSet<String>,
}

struct Validator<'u> {
    /// Signatures of the unit's own functions.
    unit_funcs: &'u HashMap<String, (DType, Vec<DType>)>,
    /// Locals and params of the function being validated.
    env: HashMap<String, DType>,
    return_type: DType,
    function: String,
    extern_symbols: BTreeSet<String>,
}

/// Validate a unit in place, annotating expression types and resolved call
/// symbols.
pub fn validate_functions(functions: &mut [Function]) -> CompileResult<ValidatedUnit> {
    let mut unit_funcs = HashMap::new();
    for f in functions.iter() {
        unit_funcs.insert(
            f.name.clone(),
            (
                f.return_type.clone(),
                f.params.iter().map(|p| p.dtype.clone()).collect(),
            ),
        );
    }

    let mut extern_symbols = BTreeSet::new();
    for f in functions.iter_mut() {
        let mut validator = Validator {
            unit_funcs: &unit_funcs,
            env: f
                .params
                .iter()
                .map(|p| (p.name.clone(), p.dtype.clone()))
                .collect(),
            return_type: f.return_type.clone(),
            function: f.name.clone(),
            extern_symbols: BTreeSet::new(),
        };
        validator.check_block(&mut f.body)?;
        extern_symbols.extend(validator.extern_symbols);
    }
    Ok(ValidatedUnit { extern_symbols })
}

impl<'u> Validator<'u> {
    fn type_error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Type {
            message: format!("func {}: {}", self.function, message.into()),
        }
    }

    fn check_block(&mut self, stmts: &mut [Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Return(expr) => {
                match expr {
                    None => {
                        if !self.return_type.is_void() {
                            return Err(self.type_error("missing return value"));
                        }
                    }
                    Some(expr) => {
                        let dtype = self.infer_expr(expr)?;
                        if self.return_type.is_void() {
                            return Err(self.type_error("returning a value from a void function"));
                        }
                        if !dtype.can_cast_to(&self.return_type) {
                            return Err(self.type_error(format!(
                                "can not return {} as {}",
                                dtype, self.return_type
                            )));
                        }
                    }
                }
                Ok(())
            }
            Stmt::VarDecl { dtype, name, init } => {
                let init_dtype = self.infer_expr(init)?;
                if !init_dtype.can_cast_to(dtype) {
                    return Err(self.type_error(format!(
                        "can not initialize {} {} from {}",
                        dtype, name, init_dtype
                    )));
                }
                self.env.insert(name.clone(), dtype.clone());
                Ok(())
            }
            Stmt::Assign { name, value } => {
                let Some(target) = self.env.get(name).cloned() else {
                    return Err(self.type_error(format!("unknown variable '{}'", name)));
                };
                if target.is_context_ptr() {
                    return Err(self.type_error("can not assign to the context argument"));
                }
                let dtype = self.infer_expr(value)?;
                if !dtype.can_cast_to(&target) {
                    return Err(self.type_error(format!(
                        "can not assign {} to {} {}",
                        dtype, target, name
                    )));
                }
                Ok(())
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.check_cond(cond)?;
                self.check_block(then_body)?;
                if let Some(else_body) = else_body {
                    self.check_block(else_body)?;
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                self.check_cond(cond)?;
                self.check_block(body)
            }
            Stmt::Expr(expr) => self.infer_expr(expr).map(|_| ()),
        }
    }

    fn check_cond(&mut self, cond: &mut Expr) -> CompileResult<()> {
        let dtype = self.infer_expr(cond)?;
        if !dtype.is_bit() {
            return Err(self.type_error(format!("condition must be bit, got {}", dtype)));
        }
        Ok(())
    }

    fn binary_result(&self, op: BinOp, lhs: &DType, rhs: &DType) -> CompileResult<DType> {
        if op.is_logical() {
            if lhs.is_bit() && rhs.is_bit() {
                return Ok(DType::Bit);
            }
            return Err(self.type_error(format!("logical op on {} and {}", lhs, rhs)));
        }
        if !lhs.is_numeric() || !rhs.is_numeric() {
            return Err(self.type_error(format!("arithmetic on {} and {}", lhs, rhs)));
        }
        let common = if lhs == rhs {
            lhs.clone()
        } else if lhs.can_cast_to(rhs) {
            rhs.clone()
        } else if rhs.can_cast_to(lhs) {
            lhs.clone()
        } else {
            return Err(self.type_error(format!("no common type for {} and {}", lhs, rhs)));
        };
        if op.is_comparison() {
            Ok(DType::Bit)
        } else {
            Ok(common)
        }
    }

    /// Candidate symbols for a call, in resolution order: exact registry
    /// name, then monomorphized names derived from the vector arguments.
    fn call_candidates(name: &str, arg_types: &[DType]) -> Vec<String> {
        let mut candidates = vec![name.to_string()];
        let vector_elems: Vec<_> = arg_types.iter().filter_map(|t| t.elem()).collect();
        if vector_elems.len() >= 2 {
            candidates.push(format!(
                "simd_vector_{}_{}_{}",
                name,
                vector_elems[0].type_string(),
                vector_elems[1].type_string()
            ));
        }
        if let Some(first) = vector_elems.first() {
            candidates.push(format!("simd_vector_{}_{}", name, first.type_string()));
            candidates.push(format!("simd_vector_{}", name));
            candidates.push(format!("{}_{}", name, first.type_string()));
        }
        candidates
    }

    fn resolve_call(&mut self, name: &str, arg_types: &[DType]) -> CompileResult<(String, DType)> {
        if let Some((ret, _args)) = self.unit_funcs.get(name) {
            return Ok((name.to_string(), ret.clone()));
        }
        for candidate in Self::call_candidates(name, arg_types) {
            if let Some(desc) = registry::lookup_function(&candidate) {
                self.extern_symbols.insert(candidate.clone());
                return Ok((candidate, desc.return_type));
            }
        }
        Err(CompileError::UnknownFunction {
            name: name.to_string(),
        })
    }

    fn member_symbol(&mut self, recv: &DType, member: &str) -> CompileResult<FunctionDesc> {
        let symbol = registry::member_func_name(recv, member);
        let Some(desc) = registry::lookup_function(&symbol) else {
            return Err(CompileError::UnknownFunction { name: symbol });
        };
        self.extern_symbols.insert(symbol);
        Ok(desc)
    }

    fn infer_expr(&mut self, expr: &mut Expr) -> CompileResult<DType> {
        let dtype = match &mut expr.kind {
            ExprKind::IntLiteral(v) => {
                if i32::try_from(*v).is_ok() {
                    DType::I32
                } else {
                    DType::I64
                }
            }
            ExprKind::FloatLiteral(_) => DType::F64,
            ExprKind::BoolLiteral(_) => DType::Bit,
            ExprKind::Ident(name) => match self.env.get(name.as_str()) {
                Some(dtype) => dtype.clone(),
                None if CONSTANT_NAMES.contains(&name.as_str()) => DType::F64,
                None => {
                    return Err(self.type_error(format!("unknown identifier '{}'", name)));
                }
            },
            ExprKind::Unary { op, operand } => {
                let inner = self.infer_expr(operand)?;
                match op {
                    UnaryOp::Neg if inner.is_numeric() => inner,
                    UnaryOp::Not if inner.is_bit() => inner,
                    _ => {
                        return Err(self.type_error(format!("unary op on {}", inner)));
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let l = self.infer_expr(lhs)?;
                let r = self.infer_expr(rhs)?;
                self.binary_result(op, &l, &r)?
            }
            ExprKind::Call {
                name,
                args,
                resolved,
            } => {
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args.iter_mut() {
                    arg_types.push(self.infer_expr(arg)?);
                }
                let name = name.clone();
                let (symbol, ret) = self.resolve_call(&name, &arg_types)?;
                *resolved = Some(symbol);
                ret
            }
            ExprKind::MemberCall {
                recv,
                member,
                args,
                resolved,
            } => {
                let recv_dtype = self.infer_expr(recv)?;
                for arg in args.iter_mut() {
                    self.infer_expr(arg)?;
                }
                let member = member.clone();
                let desc = self.member_symbol(&recv_dtype, &member)?;
                *resolved = Some(desc.name.clone());
                desc.return_type
            }
            ExprKind::Index {
                recv,
                index,
                resolved,
            } => {
                let recv_dtype = self.infer_expr(recv)?;
                let idx_dtype = self.infer_expr(index)?;
                let Some(elem) = recv_dtype.elem() else {
                    return Err(self.type_error(format!("can not index {}", recv_dtype)));
                };
                if !idx_dtype.can_cast_to(&DType::U64) {
                    return Err(self.type_error(format!("index must be integer, got {}", idx_dtype)));
                }
                let desc = self.member_symbol(&recv_dtype, "get")?;
                *resolved = Some(desc.name.clone());
                elem.dtype()
            }
        };
        expr.dtype = Some(dtype.clone());
        Ok(dtype)
    }
}

/// Whether a resolved symbol is a key-value sort-family export, which
/// requires the generated-code length check on its two vector arguments.
pub fn is_key_value_symbol(symbol: &str) -> bool {
    symbol.starts_with("simd_vector_") && symbol.contains("_key_value_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse_source;
    use crate::builtin::init_builtin;

    #[test]
    fn test_resolves_implicit_sort_symbol() {
        init_builtin();
        let mut funcs =
            parse_source("void s(Context ctx, simd_vector<f32> v){ sort(v, false); }").unwrap();
        let unit = validate_functions(&mut funcs).unwrap();
        assert!(unit.extern_symbols.contains("simd_vector_sort_f32"));
    }

    #[test]
    fn test_resolves_key_value_symbol() {
        init_builtin();
        let src = "void t(Context ctx, simd_vector<u32> k, simd_vector<u32> v){ topk_key_value(k, v, 2, true); }";
        let mut funcs = parse_source(src).unwrap();
        let unit = validate_functions(&mut funcs).unwrap();
        assert!(unit
            .extern_symbols
            .contains("simd_vector_topk_key_value_u32_u32"));
        assert!(is_key_value_symbol("simd_vector_topk_key_value_u32_u32"));
        assert!(!is_key_value_symbol("simd_vector_sort_f32"));
    }

    #[test]
    fn test_index_resolves_member_get() {
        init_builtin();
        let mut funcs = parse_source("float g(simd_vector<f32> v){ return v[0]; }").unwrap();
        let unit = validate_functions(&mut funcs).unwrap();
        assert!(unit.extern_symbols.contains("simd_vector_f32_get"));
    }

    #[test]
    fn test_unknown_call_is_an_error() {
        init_builtin();
        let mut funcs = parse_source("int f(int x){ return missing(x); }").unwrap();
        let err = validate_functions(&mut funcs).unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction { .. }));
    }

    #[test]
    fn test_condition_must_be_bit() {
        init_builtin();
        let mut funcs = parse_source("int f(int x){ if (x) { return 1; } return 0; }").unwrap();
        assert!(validate_functions(&mut funcs).is_err());
    }

    #[test]
    fn test_named_constants() {
        init_builtin();
        let mut funcs = parse_source("double f(){ return pi * e; }").unwrap();
        assert!(validate_functions(&mut funcs).is_ok());
    }

    #[test]
    fn test_unit_function_calls_resolve() {
        init_builtin();
        let src = "int inc(int x){ return x + 1; } int twice(int x){ return inc(inc(x)); }";
        let mut funcs = parse_source(src).unwrap();
        let unit = validate_functions(&mut funcs).unwrap();
        assert!(!unit.extern_symbols.contains("inc"));
    }
}
