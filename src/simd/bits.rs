//! Bitwise operations over packed bit vectors.
//!
//! All operations work word-wise on the 64-bit backing words. `dst` must
//! be non-readonly and sized for the input; sizing is the caller's
//! contract, only the readonly condition is signaled from here.

use crate::error::{raise, RuntimeError};
use crate::types::vector::{bit_word_count, Bit, Vector};

fn check_writable(dst: Vector<Bit>, op: &str) {
    if dst.is_readonly() {
        raise(RuntimeError::Readonly(format!(
            "can NOT {} into readonly bit vector",
            op
        )));
    }
}

pub fn simd_vector_bits_not(src: Vector<Bit>, dst: Vector<Bit>) {
    check_writable(dst, "not");
    debug_assert_eq!(src.size(), dst.size());
    unsafe {
        let s = src.words();
        let d = dst.words_mut();
        for i in 0..s.len() {
            d[i] = !s[i];
        }
    }
}

pub fn simd_vector_bits_and(left: Vector<Bit>, right: Vector<Bit>, dst: Vector<Bit>) {
    check_writable(dst, "and");
    debug_assert_eq!(left.size(), right.size());
    unsafe {
        let l = left.words();
        let r = right.words();
        let d = dst.words_mut();
        for i in 0..l.len() {
            d[i] = l[i] & r[i];
        }
    }
}

pub fn simd_vector_bits_or(left: Vector<Bit>, right: Vector<Bit>, dst: Vector<Bit>) {
    check_writable(dst, "or");
    debug_assert_eq!(left.size(), right.size());
    unsafe {
        let l = left.words();
        let r = right.words();
        let d = dst.words_mut();
        for i in 0..l.len() {
            d[i] = l[i] | r[i];
        }
    }
}

pub fn simd_vector_bits_xor(left: Vector<Bit>, right: Vector<Bit>, dst: Vector<Bit>) {
    check_writable(dst, "xor");
    debug_assert_eq!(left.size(), right.size());
    unsafe {
        let l = left.words();
        let r = right.words();
        let d = dst.words_mut();
        for i in 0..l.len() {
            d[i] = l[i] ^ r[i];
        }
    }
}

/// Count of set bits; the tail of the last word is masked off so bits past
/// the element count never leak into the result.
pub fn simd_vector_bits_count_true(src: Vector<Bit>) -> usize {
    let bits = src.size();
    let words = bit_word_count(bits);
    if words == 0 {
        return 0;
    }
    let mut total = 0usize;
    unsafe {
        let s = src.words();
        for (i, word) in s.iter().enumerate().take(words) {
            let word = if i + 1 == words && bits % 64 != 0 {
                word & ((1u64 << (bits % 64)) - 1)
            } else {
                *word
            };
            total += word.count_ones() as usize;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xor_of_alternating_patterns() {
        let a = [0xAAAA_AAAA_AAAA_AAAAu64; 2];
        let b = [0x5555_5555_5555_5555u64; 2];
        let mut out = [0u64; 2];
        let dst = Vector::from_mut_words(&mut out, 100);
        simd_vector_bits_xor(
            Vector::from_words(&a, 100),
            Vector::from_words(&b, 100),
            dst,
        );
        assert_eq!(simd_vector_bits_count_true(dst), 100);
    }

    #[test]
    fn test_not_masks_tail_in_count() {
        let src = [0u64];
        let mut out = [0u64];
        let dst = Vector::from_mut_words(&mut out, 10);
        simd_vector_bits_not(Vector::from_words(&src, 10), dst);
        // The whole word flipped, but only 10 bits are in view.
        assert_eq!(simd_vector_bits_count_true(dst), 10);
    }

    #[test]
    fn test_and_or() {
        let a = [0b1100u64];
        let b = [0b1010u64];
        let mut o1 = [0u64];
        let mut o2 = [0u64];
        let d1 = Vector::from_mut_words(&mut o1, 4);
        let d2 = Vector::from_mut_words(&mut o2, 4);
        simd_vector_bits_and(Vector::from_words(&a, 4), Vector::from_words(&b, 4), d1);
        simd_vector_bits_or(Vector::from_words(&a, 4), Vector::from_words(&b, 4), d2);
        assert_eq!(simd_vector_bits_count_true(d1), 1);
        assert_eq!(simd_vector_bits_count_true(d2), 3);
    }

    #[test]
    fn test_readonly_dst_raises() {
        let a = [0u64];
        let b = [0u64];
        let dst_words = [0u64];
        let dst = Vector::from_words(&dst_words, 4);
        let err = std::panic::catch_unwind(|| {
            simd_vector_bits_and(Vector::from_words(&a, 4), Vector::from_words(&b, 4), dst)
        })
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Readonly(_))
        ));
    }
}
