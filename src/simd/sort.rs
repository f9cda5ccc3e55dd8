//! Sort, select, top-k and argsort over vector views, with key-value
//! variants that carry a value buffer along by parallel permutation.
//!
//! Every in-place variant refuses readonly inputs with the readonly
//! failure. Float orderings read `Context::has_nan` to decide between the
//! fast partial comparison and the NaN-aware total order. Length equality
//! between key and value buffers is checked by generated code before the
//! call, not here.

use std::cmp::Ordering;

use crate::context::Context;
use crate::error::{raise, RuntimeError};
use crate::types::vector::Vector;

/// Element kinds the sort family is instantiated for.
pub trait SortKey: Copy {
    /// Ascending comparison; `nan_aware` selects the total order for
    /// floats and is ignored for integers.
    fn compare(a: &Self, b: &Self, nan_aware: bool) -> Ordering;
}

macro_rules! impl_int_sort_key {
    ($($t:ty),*) => {
        $(impl SortKey for $t {
            #[inline]
            fn compare(a: &Self, b: &Self, _nan_aware: bool) -> Ordering {
                a.cmp(b)
            }
        })*
    };
}

impl_int_sort_key!(u16, i16, u32, i32, u64, i64);

macro_rules! impl_float_sort_key {
    ($($t:ty),*) => {
        $(impl SortKey for $t {
            #[inline]
            fn compare(a: &Self, b: &Self, nan_aware: bool) -> Ordering {
                if nan_aware {
                    a.total_cmp(b)
                } else {
                    a.partial_cmp(b).unwrap_or(Ordering::Equal)
                }
            }
        })*
    };
}

impl_float_sort_key!(f32, f64);

#[inline]
fn ordering<T: SortKey>(nan_aware: bool, descending: bool) -> impl Fn(&T, &T) -> Ordering {
    move |a, b| {
        let ord = T::compare(a, b, nan_aware);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

fn writable_slice<'a, T>(data: &Vector<T>, op: &str) -> &'a mut [T] {
    if data.is_readonly() {
        raise(RuntimeError::Readonly(format!(
            "can NOT {} on readonly vector",
            op
        )));
    }
    unsafe { std::mem::transmute(data.as_mut_slice()) }
}

/// In-place full sort.
pub fn simd_vector_sort<T: SortKey>(ctx: &Context, data: Vector<T>, descending: bool) {
    let slice = writable_slice(&data, "sort");
    slice.sort_unstable_by(ordering(ctx.has_nan(), descending));
}

/// Partition so the first `k` elements are the `k` smallest (or largest),
/// in unspecified order.
pub fn simd_vector_select<T: SortKey>(ctx: &Context, data: Vector<T>, k: usize, descending: bool) {
    let slice = writable_slice(&data, "select");
    if k == 0 || k >= slice.len() {
        return;
    }
    slice.select_nth_unstable_by(k - 1, ordering(ctx.has_nan(), descending));
}

/// Partial sort: the first `k` positions hold the sorted top-k.
pub fn simd_vector_topk<T: SortKey>(ctx: &Context, data: Vector<T>, k: usize, descending: bool) {
    let slice = writable_slice(&data, "topk");
    if slice.is_empty() || k == 0 {
        return;
    }
    let cmp = ordering::<T>(ctx.has_nan(), descending);
    let k = k.min(slice.len());
    if k < slice.len() {
        slice.select_nth_unstable_by(k - 1, &cmp);
    }
    slice[..k].sort_unstable_by(cmp);
}

/// Indices that would sort `data`; the index buffer is owned by `ctx`.
pub fn simd_vector_argsort<T: SortKey>(
    ctx: &mut Context,
    data: Vector<T>,
    descending: bool,
) -> Vector<u64> {
    let slice = unsafe { data.as_slice() };
    let cmp = ordering::<T>(ctx.has_nan(), descending);
    let mut idxs: Vec<u64> = (0..slice.len() as u64).collect();
    idxs.sort_unstable_by(|&a, &b| cmp(&slice[a as usize], &slice[b as usize]));
    ctx.own_vec(idxs)
}

/// Unstable top-k by index: the first `k` returned indices point at the
/// `k` smallest elements, in unspecified order.
///
/// The descending case degrades to a full [`simd_vector_argsort`]; callers
/// observe fully sorted indices there.
pub fn simd_vector_argselect<T: SortKey>(
    ctx: &mut Context,
    data: Vector<T>,
    k: usize,
    descending: bool,
) -> Vector<u64> {
    if descending {
        return simd_vector_argsort(ctx, data, descending);
    }
    let slice = unsafe { data.as_slice() };
    let nan_aware = ctx.has_nan();
    let mut idxs: Vec<u64> = (0..slice.len() as u64).collect();
    if k > 0 && k < idxs.len() {
        idxs.select_nth_unstable_by(k - 1, |&a, &b| {
            T::compare(&slice[a as usize], &slice[b as usize], nan_aware)
        });
    }
    ctx.own_vec(idxs)
}

fn writable_pair<'a, K, V>(
    key: &Vector<K>,
    value: &Vector<V>,
    op: &str,
) -> (&'a mut [K], &'a mut [V]) {
    if key.is_readonly() || value.is_readonly() {
        raise(RuntimeError::Readonly(format!(
            "can NOT {} on readonly vector, key vector readonly:{}, value vector readonly:{}",
            op,
            key.is_readonly(),
            value.is_readonly()
        )));
    }
    unsafe {
        (
            std::mem::transmute(key.as_mut_slice()),
            std::mem::transmute(value.as_mut_slice()),
        )
    }
}

fn apply_pairs<K: Copy, V: Copy>(keys: &mut [K], values: &mut [V], pairs: Vec<(K, V)>) {
    for (i, (k, v)) in pairs.into_iter().enumerate() {
        keys[i] = k;
        values[i] = v;
    }
}

/// Sort the key buffer and carry the value buffer along.
pub fn simd_vector_sort_key_value<K: SortKey, V: Copy>(
    ctx: &Context,
    key: Vector<K>,
    value: Vector<V>,
    descending: bool,
) {
    let (keys, values) = writable_pair(&key, &value, "sort_key_value");
    let cmp = ordering::<K>(ctx.has_nan(), descending);
    let mut pairs: Vec<(K, V)> = keys.iter().copied().zip(values.iter().copied()).collect();
    pairs.sort_unstable_by(|a, b| cmp(&a.0, &b.0));
    apply_pairs(keys, values, pairs);
}

/// Partial key-value sort: the first `k` pairs hold the sorted top-k keys.
pub fn simd_vector_topk_key_value<K: SortKey, V: Copy>(
    ctx: &Context,
    key: Vector<K>,
    value: Vector<V>,
    k: usize,
    descending: bool,
) {
    let (keys, values) = writable_pair(&key, &value, "topk_key_value");
    if keys.is_empty() || k == 0 {
        return;
    }
    let cmp = ordering::<K>(ctx.has_nan(), descending);
    let mut pairs: Vec<(K, V)> = keys.iter().copied().zip(values.iter().copied()).collect();
    let k = k.min(pairs.len());
    if k < pairs.len() {
        pairs.select_nth_unstable_by(k - 1, |a, b| cmp(&a.0, &b.0));
    }
    pairs[..k].sort_unstable_by(|a, b| cmp(&a.0, &b.0));
    apply_pairs(keys, values, pairs);
}

/// Key-value partition: the first `k` pairs carry the `k` smallest (or
/// largest) keys, in unspecified order.
pub fn simd_vector_select_key_value<K: SortKey, V: Copy>(
    ctx: &Context,
    key: Vector<K>,
    value: Vector<V>,
    k: usize,
    descending: bool,
) {
    let (keys, values) = writable_pair(&key, &value, "select_key_value");
    if k == 0 || k >= keys.len() {
        return;
    }
    let cmp = ordering::<K>(ctx.has_nan(), descending);
    let mut pairs: Vec<(K, V)> = keys.iter().copied().zip(values.iter().copied()).collect();
    pairs.select_nth_unstable_by(k - 1, |a, b| cmp(&a.0, &b.0));
    apply_pairs(keys, values, pairs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_ascending_descending() {
        let ctx = Context::new();
        let mut data = vec![3.0f32, 1.0, 2.0];
        simd_vector_sort(&ctx, Vector::from_mut_slice(&mut data), false);
        assert_eq!(data, vec![1.0, 2.0, 3.0]);
        simd_vector_sort(&ctx, Vector::from_mut_slice(&mut data), true);
        assert_eq!(data, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_sort_nan_aware() {
        let mut ctx = Context::new();
        ctx.set_has_nan(true);
        let mut data = vec![2.0f64, f64::NAN, 1.0];
        simd_vector_sort(&ctx, Vector::from_mut_slice(&mut data), false);
        assert_eq!(data[0], 1.0);
        assert_eq!(data[1], 2.0);
        assert!(data[2].is_nan());
    }

    #[test]
    fn test_readonly_sort_rejected_and_unchanged() {
        let ctx = Context::new();
        let data = vec![3.0f32, 1.0, 2.0];
        let view = Vector::from_slice(&data);
        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            simd_vector_sort(&ctx, view, false)
        }))
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Readonly(_))
        ));
        assert_eq!(data, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_topk_matches_sort_prefix() {
        let ctx = Context::new();
        let mut a = vec![9u32, 4, 7, 1, 8, 3];
        let mut b = a.clone();
        simd_vector_topk(&ctx, Vector::from_mut_slice(&mut a), 3, false);
        simd_vector_sort(&ctx, Vector::from_mut_slice(&mut b), false);
        assert_eq!(&a[..3], &b[..3]);
    }

    #[test]
    fn test_select_partitions() {
        let ctx = Context::new();
        let mut data = vec![5i64, 2, 9, 1, 7, 3];
        simd_vector_select(&ctx, Vector::from_mut_slice(&mut data), 3, false);
        let mut head: Vec<i64> = data[..3].to_vec();
        head.sort_unstable();
        assert_eq!(head, vec![1, 2, 3]);
    }

    #[test]
    fn test_argsort_permutation_matches_sort() {
        let mut ctx = Context::new();
        let data = vec![0.5f64, -1.0, 2.0, 0.0];
        let idx = simd_vector_argsort(&mut ctx, Vector::from_slice(&data), false);
        let permuted: Vec<f64> = (0..idx.size()).map(|i| data[idx.get(i) as usize]).collect();
        let mut sorted = data.clone();
        sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(permuted, sorted);
    }

    #[test]
    fn test_argselect_descending_degrades_to_argsort() {
        let mut ctx = Context::new();
        let data = vec![4u64, 1, 3, 2];
        let idx = simd_vector_argselect(&mut ctx, Vector::from_slice(&data), 2, true);
        let got: Vec<u64> = (0..idx.size()).map(|i| idx.get(i)).collect();
        assert_eq!(got, vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_argselect_ascending_first_k() {
        let mut ctx = Context::new();
        let data = vec![4u64, 1, 3, 2];
        let idx = simd_vector_argselect(&mut ctx, Vector::from_slice(&data), 2, false);
        let mut first: Vec<u64> = (0..2).map(|i| data[idx.get(i) as usize]).collect();
        first.sort_unstable();
        assert_eq!(first, vec![1, 2]);
    }

    #[test]
    fn test_sort_key_value_carries_values() {
        let ctx = Context::new();
        let mut keys = vec![5u32, 1, 4, 2, 3];
        let mut values = vec![50u32, 10, 40, 20, 30];
        simd_vector_sort_key_value(
            &ctx,
            Vector::from_mut_slice(&mut keys),
            Vector::from_mut_slice(&mut values),
            false,
        );
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);
        assert_eq!(values, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_topk_key_value_descending() {
        let ctx = Context::new();
        let mut keys = vec![5u32, 1, 4, 2, 3];
        let mut values = vec![0u32, 1, 2, 3, 4];
        simd_vector_topk_key_value(
            &ctx,
            Vector::from_mut_slice(&mut keys),
            Vector::from_mut_slice(&mut values),
            2,
            true,
        );
        assert_eq!(&keys[..2], &[5, 4]);
        assert_eq!(&values[..2], &[0, 2]);
    }

    #[test]
    fn test_readonly_key_value_rejected() {
        let ctx = Context::new();
        let keys = vec![2u64, 1];
        let mut values = vec![1i64, 2];
        let kv = Vector::from_slice(&keys);
        let vv = Vector::from_mut_slice(&mut values);
        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            simd_vector_sort_key_value(&ctx, kv, vv, false)
        }))
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Readonly(_))
        ));
    }
}
