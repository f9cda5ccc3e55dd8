//! End-to-end compile-and-invoke tests for the compiler facade.

use std::mem::transmute;
use std::os::raw::c_void;

use vexjit::inkwell::context::Context as LlvmContext;
use vexjit::{
    register_function, CompileError, Context, DType, JitCompiler, NativeFunc, Options, Primitive,
    Vector,
};

fn new_compiler(llvm: &LlvmContext) -> JitCompiler<'_> {
    let _ = env_logger::builder().is_test(true).try_init();
    JitCompiler::new(llvm, Options::default())
}

#[test]
fn test_identity_udf() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let names = compiler
        .compile_source("int id(int x){ return x; }", false)
        .unwrap();
    assert_eq!(names, vec!["id".to_string()]);

    let addr = compiler.get_function_pointer("id").unwrap();
    let id: extern "C" fn(i32) -> i32 = unsafe { transmute(addr) };
    assert_eq!(id(42), 42);
    assert_eq!(id(-7), -7);
}

#[test]
fn test_arithmetic_and_control_flow() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let src = r#"
        int fib(int n){
            int a = 0;
            int b = 1;
            int i = 0;
            while (i < n) {
                int t = a + b;
                a = b;
                b = t;
                i = i + 1;
            }
            return a;
        }

        int clamp01(int x){
            if (x < 0) {
                return 0;
            } else {
                if (x > 1) {
                    return 1;
                }
            }
            return x;
        }
    "#;
    let names = compiler.compile_source(src, false).unwrap();
    assert_eq!(names, vec!["fib".to_string(), "clamp01".to_string()]);

    let fib: extern "C" fn(i32) -> i32 =
        unsafe { transmute(compiler.get_function_pointer("fib").unwrap()) };
    assert_eq!(fib(0), 0);
    assert_eq!(fib(1), 1);
    assert_eq!(fib(10), 55);

    let clamp: extern "C" fn(i32) -> i32 =
        unsafe { transmute(compiler.get_function_pointer("clamp01").unwrap()) };
    assert_eq!(clamp(-5), 0);
    assert_eq!(clamp(0), 0);
    assert_eq!(clamp(1), 1);
    assert_eq!(clamp(9), 1);
}

#[test]
fn test_udf_calls_udf() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let src = "int inc(int x){ return x + 1; } int twice(int x){ return inc(inc(x)); }";
    compiler.compile_source(src, false).unwrap();
    let twice: extern "C" fn(i32) -> i32 =
        unsafe { transmute(compiler.get_function_pointer("twice").unwrap()) };
    assert_eq!(twice(40), 42);
}

#[test]
fn test_named_constants() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    compiler
        .compile_source("double tau(){ return 2.0 * pi; }", false)
        .unwrap();
    let tau: extern "C" fn() -> f64 =
        unsafe { transmute(compiler.get_function_pointer("tau").unwrap()) };
    assert!((tau() - std::f64::consts::TAU).abs() < 1e-12);
}

#[test]
fn test_mixed_class_arguments_force_byval() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    // Five integer args exhaust five registers; the two-register vector
    // pushes the cumulative demand to seven, so the vector goes byval.
    let src = "float pick(int a, int b, int c, int d, int e, simd_vector<f32> v){ return v[0]; }";
    compiler.compile_source(src, false).unwrap();

    let pick: extern "C" fn(i32, i32, i32, i32, i32, Vector<f32>) -> f32 =
        unsafe { transmute(compiler.get_function_pointer("pick").unwrap()) };
    let data = [1.0f32, 2.0, 3.0, 4.0];
    let got = pick(1, 2, 3, 4, 5, Vector::from_slice(&data));
    assert_eq!(got, 1.0);
}

extern "C" fn sum_f32(_ctx: *mut Context, v: Vector<f32>) -> f32 {
    unsafe { v.as_slice() }.iter().sum()
}

fn ensure_sum_registered() {
    let _ = register_function(
        "sum_f32",
        NativeFunc::new(sum_f32 as *const c_void),
        DType::F32,
        vec![DType::ContextPtr, DType::SimdVector(Primitive::F32)],
    );
}

#[test]
fn test_extern_call_with_context_injection() {
    ensure_sum_registered();
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    // `sum(v)` resolves to the registered sum_f32 and the compiler inserts
    // the current function's context at the declared index.
    let src = "float g(Context ctx, simd_vector<f32> v){ return sum(v); }";
    compiler.compile_source(src, false).unwrap();

    let g: extern "C" fn(*mut Context, Vector<f32>) -> f32 =
        unsafe { transmute(compiler.get_function_pointer("g").unwrap()) };
    let mut ctx = Context::new();
    let data = [1.0f32, 2.0, 3.0, 4.0];
    let got = g(&mut ctx, Vector::from_slice(&data));
    assert_eq!(got, 10.0);
}

#[test]
fn test_member_call_size() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    compiler
        .compile_source("u64 len(simd_vector<f32> v){ return v.size(); }", false)
        .unwrap();
    let len: extern "C" fn(Vector<f32>) -> u64 =
        unsafe { transmute(compiler.get_function_pointer("len").unwrap()) };
    let data = [1.0f32, 2.0, 3.0];
    assert_eq!(len(Vector::from_slice(&data)), 3);
}

#[test]
fn test_verify_function_signature() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    compiler
        .compile_source("int id(int x){ return x; }", false)
        .unwrap();

    let name = compiler
        .verify_function_signature("id", &DType::I32, &[DType::I32])
        .unwrap();
    assert_eq!(name, "id");

    let err = compiler
        .verify_function_signature("id", &DType::I64, &[DType::I32])
        .unwrap_err();
    assert!(matches!(err, CompileError::SignatureMismatch { .. }));

    let err = compiler
        .verify_function_signature("nope", &DType::I32, &[DType::I32])
        .unwrap_err();
    assert!(matches!(err, CompileError::FunctionNotFound { .. }));
}

#[test]
fn test_get_stat_reports_costs() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    compiler
        .compile_source("int id(int x){ return x; }", false)
        .unwrap();
    let stat = compiler.get_stat();
    assert!(stat.ir_build_cost.as_nanos() > 0);
    let rendered = format!("{}", stat);
    assert!(rendered.contains("parse"));
}

#[test]
fn test_parse_error_surfaces() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let err = compiler.compile_source("int id(int x){", false).unwrap_err();
    assert!(matches!(err, CompileError::Parse { .. }));
}

#[test]
fn test_unknown_callee_is_an_error() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let err = compiler
        .compile_source("int f(int x){ return missing(x); }", false)
        .unwrap_err();
    assert!(matches!(err, CompileError::UnknownFunction { .. }));
}

#[test]
fn test_cast_not_feasible_is_an_error() {
    ensure_sum_registered();
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    // f64 vectors do not cast to f32 vectors.
    let err = compiler
        .compile_source(
            "float h(Context ctx, simd_vector<f64> v){ return sum_f32(v); }",
            false,
        )
        .unwrap_err();
    match err {
        CompileError::CastNotFeasible { index, .. } => assert_eq!(index, 1),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_recompile_replaces_session() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    compiler
        .compile_source("int one(){ return 1; }", false)
        .unwrap();
    compiler
        .compile_source("int two(){ return 2; }", false)
        .unwrap();

    assert!(compiler.get_function_pointer("one").is_err());
    let two: extern "C" fn() -> i32 =
        unsafe { transmute(compiler.get_function_pointer("two").unwrap()) };
    assert_eq!(two(), 2);
}

#[test]
fn test_optimize_level_zero_compiles() {
    let llvm = LlvmContext::create();
    let _ = env_logger::builder().is_test(true).try_init();
    let mut compiler = JitCompiler::new(
        &llvm,
        Options {
            optimize_level: 0,
            ..Options::default()
        },
    );
    compiler
        .compile_source("int three(){ return 1 + 2; }", false)
        .unwrap();
    let three: extern "C" fn() -> i32 =
        unsafe { transmute(compiler.get_function_pointer("three").unwrap()) };
    assert_eq!(three(), 3);
}
