//! End-to-end tests of the SIMD vector runtime driven from compiled UDFs.

use std::mem::transmute;
use std::panic::AssertUnwindSafe;

use vexjit::inkwell::context::Context as LlvmContext;
use vexjit::{Bit, Context, JitCompiler, Options, RuntimeError, Vector};

fn new_compiler(llvm: &LlvmContext) -> JitCompiler<'_> {
    let _ = env_logger::builder().is_test(true).try_init();
    JitCompiler::new(llvm, Options::default())
}

#[test]
fn test_bitwise_xor_udf() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let src = "u64 f(Context ctx, simd_vector<bit> a, simd_vector<bit> b){ return bits_count_true(bits_xor(a, b)); }";
    compiler.compile_source(src, false).unwrap();

    let f: extern "C" fn(*mut Context, Vector<Bit>, Vector<Bit>) -> u64 =
        unsafe { transmute(compiler.get_function_pointer("f").unwrap()) };

    // Alternating, complementary patterns over 100 bits.
    let a = [0xAAAA_AAAA_AAAA_AAAAu64; 2];
    let b = [0x5555_5555_5555_5555u64; 2];
    let mut ctx = Context::new();
    let got = f(
        &mut ctx,
        Vector::from_words(&a, 100),
        Vector::from_words(&b, 100),
    );
    assert_eq!(got, 100);
}

#[test]
fn test_sort_udf_in_place() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let src = "void s(Context ctx, simd_vector<f32> v){ sort(v, false); }";
    compiler.compile_source(src, false).unwrap();

    let s: extern "C-unwind" fn(*mut Context, Vector<f32>) =
        unsafe { transmute(compiler.get_function_pointer("s").unwrap()) };
    let mut ctx = Context::new();
    let mut data = vec![3.0f32, 1.0, 2.0];
    s(&mut ctx, Vector::from_mut_slice(&mut data));
    assert_eq!(data, vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_readonly_sort_rejection() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let src = "void s(Context ctx, simd_vector<f32> v){ sort(v, false); }";
    compiler.compile_source(src, false).unwrap();

    let s: extern "C-unwind" fn(*mut Context, Vector<f32>) =
        unsafe { transmute(compiler.get_function_pointer("s").unwrap()) };
    let mut ctx = Context::new();
    let data = vec![3.0f32, 1.0, 2.0];
    let view = Vector::from_slice(&data);
    let err = std::panic::catch_unwind(AssertUnwindSafe(|| s(&mut ctx, view))).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::Readonly(_))
    ));
    // The original vector is unchanged.
    assert_eq!(data, vec![3.0, 1.0, 2.0]);
}

#[test]
fn test_topk_key_value_udf() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let src = "void t(Context ctx, simd_vector<u32> k, simd_vector<u32> v){ topk_key_value(k, v, 2, true); }";
    compiler.compile_source(src, false).unwrap();

    let t: extern "C-unwind" fn(*mut Context, Vector<u32>, Vector<u32>) =
        unsafe { transmute(compiler.get_function_pointer("t").unwrap()) };
    let mut ctx = Context::new();
    let mut keys = vec![5u32, 1, 4, 2, 3];
    let mut values = vec![b'a' as u32, b'b' as u32, b'c' as u32, b'd' as u32, b'e' as u32];
    t(
        &mut ctx,
        Vector::from_mut_slice(&mut keys),
        Vector::from_mut_slice(&mut values),
    );
    assert_eq!(&keys[..2], &[5, 4]);
    assert_eq!(&values[..2], &[b'a' as u32, b'c' as u32]);
}

#[test]
fn test_key_value_size_mismatch_raises() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let src = "void t(Context ctx, simd_vector<u32> k, simd_vector<u32> v){ topk_key_value(k, v, 2, true); }";
    compiler.compile_source(src, false).unwrap();

    let t: extern "C-unwind" fn(*mut Context, Vector<u32>, Vector<u32>) =
        unsafe { transmute(compiler.get_function_pointer("t").unwrap()) };
    let mut ctx = Context::new();
    let mut keys = vec![5u32, 1, 4, 2, 3];
    let mut values = vec![1u32, 2, 3, 4];
    let kv = Vector::from_mut_slice(&mut keys);
    let vv = Vector::from_mut_slice(&mut values);
    let err = std::panic::catch_unwind(AssertUnwindSafe(|| t(&mut ctx, kv, vv))).unwrap_err();
    assert_eq!(
        err.downcast_ref::<RuntimeError>(),
        Some(&RuntimeError::SizeMismatch {
            current: 4,
            expected: 5
        })
    );
}

#[test]
fn test_argsort_udf_returns_context_owned_indices() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let src = "simd_vector<u64> a(Context ctx, simd_vector<f32> v){ return argsort(v, false); }";
    compiler.compile_source(src, false).unwrap();

    let a: extern "C-unwind" fn(*mut Context, Vector<f32>) -> Vector<u64> =
        unsafe { transmute(compiler.get_function_pointer("a").unwrap()) };
    let mut ctx = Context::new();
    let data = vec![0.5f32, -1.0, 2.0, 0.0];
    let idx = a(&mut ctx, Vector::from_slice(&data));
    assert_eq!(idx.size(), 4);

    let permuted: Vec<f32> = (0..idx.size()).map(|i| data[idx.get(i) as usize]).collect();
    let mut sorted = data.clone();
    sorted.sort_unstable_by(|x, y| x.partial_cmp(y).unwrap());
    assert_eq!(permuted, sorted);
}

#[test]
fn test_topk_udf_matches_sort_prefix() {
    let llvm = LlvmContext::create();
    let mut compiler = new_compiler(&llvm);
    let src = r#"
        void top(Context ctx, simd_vector<i64> v){ topk(v, 3, false); }
        void full(Context ctx, simd_vector<i64> v){ sort(v, false); }
    "#;
    compiler.compile_source(src, false).unwrap();

    let top: extern "C-unwind" fn(*mut Context, Vector<i64>) =
        unsafe { transmute(compiler.get_function_pointer("top").unwrap()) };
    let full: extern "C-unwind" fn(*mut Context, Vector<i64>) =
        unsafe { transmute(compiler.get_function_pointer("full").unwrap()) };

    let mut ctx = Context::new();
    let mut a = vec![9i64, 4, 7, 1, 8, 3];
    let mut b = a.clone();
    top(&mut ctx, Vector::from_mut_slice(&mut a));
    full(&mut ctx, Vector::from_mut_slice(&mut b));
    assert_eq!(&a[..3], &b[..3]);
}
