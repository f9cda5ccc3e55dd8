//! Per-invocation runtime context.
//!
//! A `Context` spans one logical call into compiled code. It owns the
//! transient allocations made by runtime helpers (arena bytes for
//! trivially destructible results, boxed heap objects for everything
//! else) and carries host-configured flags such as NaN presence, which
//! the sort family reads to pick its comparison order.

use std::any::Any;
use std::ptr::NonNull;

use crate::memory::ThreadCachedArena;
use crate::types::vector::{bit_word_count, Bit, Vector};

pub struct Context {
    arena: ThreadCachedArena,
    owned: Vec<Box<dyn Any>>,
    has_nan: bool,
}

impl Context {
    pub fn new() -> Context {
        Context {
            arena: ThreadCachedArena::new(),
            owned: Vec::new(),
            has_nan: false,
        }
    }

    /// Host configuration: whether float inputs may contain NaN.
    pub fn set_has_nan(&mut self, has_nan: bool) {
        self.has_nan = has_nan;
    }

    pub fn has_nan(&self) -> bool {
        self.has_nan
    }

    /// Allocate transient bytes that live until [`Context::reset`].
    pub fn allocate(&self, n: usize) -> NonNull<u8> {
        self.arena.allocate(n)
    }

    /// Keep a non-trivially-destructible object alive for the invocation.
    pub fn own<T: 'static>(&mut self, obj: T) {
        self.owned.push(Box::new(obj));
    }

    /// Hand a heap buffer to the context and return a writable view of it.
    ///
    /// The buffer does not move when ownership transfers, so the view stays
    /// valid until [`Context::reset`].
    pub fn own_vec<T: Copy + 'static>(&mut self, data: Vec<T>) -> Vector<T> {
        let view = unsafe { Vector::from_raw_parts(data.as_ptr(), data.len(), false) };
        self.own(data);
        view
    }

    /// Zeroed writable bit vector of `bits` elements in arena storage.
    pub fn new_bit_vector(&self, bits: usize) -> Vector<Bit> {
        let words = bit_word_count(bits);
        let ptr = self.allocate(words * 8).cast::<u64>();
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, words);
            Vector::from_raw_parts(ptr.as_ptr() as *const Bit, bits, false)
        }
    }

    /// Drop owned objects and release arena memory, invalidating every
    /// pointer produced during the invocation.
    pub fn reset(&mut self) {
        self.owned.clear();
        self.arena.reset();
    }

    pub fn memory_usage(&self) -> usize {
        self.arena.memory_usage()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_owns_vec() {
        let mut ctx = Context::new();
        let v = ctx.own_vec(vec![1u64, 2, 3]);
        assert_eq!(v.size(), 3);
        assert_eq!(v.get(2), 3);
        assert!(!v.is_readonly());
    }

    #[test]
    fn test_context_reset_clears_arena() {
        let mut ctx = Context::new();
        ctx.allocate(256);
        assert!(ctx.memory_usage() >= 256);
        ctx.reset();
        assert_eq!(ctx.memory_usage(), 0);
    }

    #[test]
    fn test_bit_vector_allocation() {
        let ctx = Context::new();
        let bits = ctx.new_bit_vector(100);
        assert_eq!(bits.size(), 100);
        assert!(!bits.is_readonly());
        assert!(!bits.get_bit(0));
        assert!(!bits.get_bit(99));
    }

    #[test]
    fn test_has_nan_flag() {
        let mut ctx = Context::new();
        assert!(!ctx.has_nan());
        ctx.set_has_nan(true);
        assert!(ctx.has_nan());
    }
}
