//! Bump-allocated arenas backing transient runtime allocations.
//!
//! [`Arena`] wraps a `bumpalo::Bump`: allocation is a pointer bump, memory
//! is released only by [`Arena::reset`] or drop, and `deallocate` does not
//! exist. [`ThreadCachedArena`] layers one lazily created `Arena` per
//! consumer thread on top, so hot-path allocation from generated code never
//! contends on a lock while reset and usage reporting still see every
//! thread's arena.

use std::alloc::Layout;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bumpalo::Bump;

/// Alignment of every raw allocation; large enough for any primitive.
const ARENA_ALIGN: usize = 16;

/// Append-only bump allocator.
pub struct Arena {
    bump: Mutex<Bump>,
}

impl Arena {
    pub fn new() -> Arena {
        Arena {
            bump: Mutex::new(Bump::new()),
        }
    }

    /// Allocate `n` bytes aligned for any primitive.
    ///
    /// Never returns null: the arena grows on demand and the process aborts
    /// on out-of-memory. The returned pointer stays valid until
    /// [`Arena::reset`] or drop.
    pub fn allocate(&self, n: usize) -> NonNull<u8> {
        let layout = Layout::from_size_align(n.max(1), ARENA_ALIGN).expect("arena layout");
        self.bump.lock().unwrap().alloc_layout(layout)
    }

    /// Construct a value in arena storage.
    ///
    /// The `Copy` bound enforces at compile time that only trivially
    /// destructible objects live in the arena; nothing runs a destructor
    /// for them.
    pub fn alloc_value<T: Copy>(&self, value: T) -> NonNull<T> {
        let ptr = self.allocate(std::mem::size_of::<T>()).cast::<T>();
        unsafe { ptr.as_ptr().write(value) };
        ptr
    }

    /// Release all memory. Every pointer handed out before this call is
    /// invalidated.
    pub fn reset(&self) {
        self.bump.lock().unwrap().reset();
    }

    pub fn memory_usage(&self) -> usize {
        self.bump.lock().unwrap().allocated_bytes()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Arena::new()
    }
}

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Per-thread slot mapping ThreadCachedArena instance id to its arena.
    static THREAD_SLOTS: RefCell<HashMap<u64, Weak<Arena>>> = RefCell::new(HashMap::new());
}

/// One `Arena` per consumer thread, with central bookkeeping.
///
/// The first `allocate` on a thread creates that thread's arena and
/// appends it to the owner list under the mutex; subsequent allocations on
/// the thread go straight to the cached arena. `reset` and `memory_usage`
/// traverse the owner list under the mutex.
pub struct ThreadCachedArena {
    id: u64,
    all_arenas: Mutex<Vec<Arc<Arena>>>,
}

impl ThreadCachedArena {
    pub fn new() -> ThreadCachedArena {
        ThreadCachedArena {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            all_arenas: Mutex::new(Vec::new()),
        }
    }

    fn thread_arena(&self) -> Arc<Arena> {
        THREAD_SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            if let Some(weak) = slots.get(&self.id) {
                if let Some(arena) = weak.upgrade() {
                    return arena;
                }
            }
            let arena = Arc::new(Arena::new());
            self.all_arenas.lock().unwrap().push(arena.clone());
            slots.insert(self.id, Arc::downgrade(&arena));
            arena
        })
    }

    /// Allocate from the calling thread's arena; takes the list mutex only
    /// on the thread's first allocation.
    pub fn allocate(&self, n: usize) -> NonNull<u8> {
        self.thread_arena().allocate(n)
    }

    pub fn alloc_value<T: Copy>(&self, value: T) -> NonNull<T> {
        self.thread_arena().alloc_value(value)
    }

    /// Reset every thread's arena.
    pub fn reset(&self) {
        let arenas = self.all_arenas.lock().unwrap();
        for arena in arenas.iter() {
            arena.reset();
        }
    }

    /// Total bytes allocated across every thread's arena.
    pub fn memory_usage(&self) -> usize {
        let arenas = self.all_arenas.lock().unwrap();
        arenas.iter().map(|a| a.memory_usage()).sum()
    }
}

impl Default for ThreadCachedArena {
    fn default() -> Self {
        ThreadCachedArena::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_allocate_and_reset() {
        let arena = Arena::new();
        let p = arena.allocate(64);
        assert_eq!(p.as_ptr() as usize % ARENA_ALIGN, 0);
        assert!(arena.memory_usage() >= 64);

        arena.reset();
        assert_eq!(arena.memory_usage(), 0);
    }

    #[test]
    fn test_arena_alloc_value() {
        let arena = Arena::new();
        let p = arena.alloc_value(42u64);
        assert_eq!(unsafe { *p.as_ptr() }, 42);
    }

    #[test]
    fn test_thread_cached_arena_multi_thread() {
        let arena = Arc::new(ThreadCachedArena::new());
        arena.allocate(128);

        let other = arena.clone();
        std::thread::spawn(move || {
            other.allocate(256);
        })
        .join()
        .unwrap();

        assert!(arena.memory_usage() >= 128 + 256);

        arena.reset();
        assert_eq!(arena.memory_usage(), 0);
    }

    #[test]
    fn test_thread_cached_arena_instances_are_independent() {
        let a = ThreadCachedArena::new();
        let b = ThreadCachedArena::new();
        a.allocate(32);
        assert_eq!(b.memory_usage(), 0);
        assert!(a.memory_usage() >= 32);
    }
}
