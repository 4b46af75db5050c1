//! The allocation-strategy contract behind [`Indirect`][crate::Indirect].
//!
//! A strategy supplies raw storage for one payload, optional hooks run when a
//! payload is placed into or torn down from that storage, and a fixed
//! [`Propagation`] policy that decides whether the strategy instance follows
//! the payload across assignment and swap.
//!
//! Two strategy instances that compare equal must be able to release each
//! other's storage. The wrapper relies on that to hand storage from one
//! wrapper to another without copying the payload.
use core::{
    alloc::Layout,
    ptr::{self, NonNull},
};

use crate::error::AllocError;

/// How a strategy instance behaves when the wrapper holding it is assigned
/// to or swapped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Propagation {
    /// Copy-assignment replaces the target's strategy with a copy of the
    /// source's.
    pub on_copy_assignment: bool,
    /// Move-assignment replaces the target's strategy with a copy of the
    /// source's.
    pub on_move_assignment: bool,
    /// Swapping two wrappers also swaps their strategies.
    pub on_swap: bool,
    /// Every instance of the strategy type is interchangeable, so equality
    /// checks can be skipped.
    pub always_equal: bool,
}

impl Propagation {
    /// Strategies stay put and must be compared at runtime.
    pub const NONE: Propagation = Propagation {
        on_copy_assignment: false,
        on_move_assignment: false,
        on_swap: false,
        always_equal: false,
    };

    /// Stateless strategies: nothing to carry over, everything is equal.
    pub const ALWAYS_EQUAL: Propagation = Propagation {
        always_equal: true,
        ..Propagation::NONE
    };

    /// Strategies follow the payload everywhere.
    pub const ALL: Propagation = Propagation {
        on_copy_assignment: true,
        on_move_assignment: true,
        on_swap: true,
        always_equal: false,
    };
}

/// Source of storage for the payload of an [`Indirect`][crate::Indirect].
///
/// # Safety
///
/// `allocate` must return storage that is valid for reads and writes of
/// `layout` and stays valid until it is passed back to `release` on this
/// instance or on any instance that compares equal to it (per
/// [`is_equal`][Strategy::is_equal]).
///
/// A `clone()` must compare equal to its original: wrappers hand storage to
/// a clone of the strategy that allocated it, e.g. in
/// [`Indirect::take`][crate::Indirect::take]. The result of
/// [`select_on_copy`][Strategy::select_on_copy] need not compare equal, and
/// is only ever used for storage it allocates itself.
///
/// If `PROPAGATION.always_equal` is set, every pair of instances must satisfy
/// the rule above.
pub unsafe trait Strategy: Clone + PartialEq {
    /// Policy consulted by assignment and swap.
    const PROPAGATION: Propagation = Propagation::NONE;

    /// Reserve storage for one value of `layout`. Never constructs anything.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Return storage previously obtained from `allocate`.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on an equal instance with the same
    /// `layout`, and must not hold a live value.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);

    /// Place `value` into freshly allocated storage.
    ///
    /// # Safety
    ///
    /// `slot` must be allocated by this strategy for a `T` and not hold a live
    /// value.
    unsafe fn construct<T>(&self, slot: NonNull<T>, value: T) {
        unsafe { slot.as_ptr().write(value) }
    }

    /// Tear down the value in `slot`, leaving the storage allocated.
    ///
    /// # Safety
    ///
    /// `slot` must hold a live `T` placed by `construct`.
    unsafe fn destroy<T>(&self, slot: NonNull<T>) {
        unsafe { ptr::drop_in_place(slot.as_ptr()) }
    }

    /// Strategy used for a copy of a wrapper when the caller does not pick
    /// one.
    fn select_on_copy(&self) -> Self {
        self.clone()
    }

    /// Whether storage allocated by `self` may be released by `other`.
    #[inline]
    fn is_equal(&self, other: &Self) -> bool {
        Self::PROPAGATION.always_equal || self == other
    }
}

/// The global heap, as used by `alloc::boxed::Box`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Global;

unsafe impl Strategy for Global {
    const PROPAGATION: Propagation = Propagation::ALWAYS_EQUAL;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }
        // Safety: layout has a nonzero size
        NonNull::new(unsafe { alloc::alloc::alloc(layout) }).ok_or(AllocError)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
        }
    }
}

/// Well-aligned, non-null pointer standing in for zero-sized storage.
pub(crate) fn dangling(layout: Layout) -> NonNull<u8> {
    // Safety: alignments are never zero
    unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_roundtrip() {
        let layout = Layout::new::<[u64; 4]>();
        let p = Global.allocate(layout).unwrap();
        assert_eq!(p.as_ptr() as usize % layout.align(), 0);
        unsafe {
            p.cast::<[u64; 4]>().as_ptr().write([1, 2, 3, 4]);
            assert_eq!(*p.cast::<[u64; 4]>().as_ptr(), [1, 2, 3, 4]);
            Global.release(p, layout);
        }
    }

    #[test]
    fn test_global_zero_sized() {
        let layout = Layout::new::<()>();
        let p = Global.allocate(layout).unwrap();
        unsafe { Global.release(p, layout) };

        let layout = Layout::from_size_align(0, 64).unwrap();
        let p = Global.allocate(layout).unwrap();
        assert_eq!(p.as_ptr() as usize % 64, 0);
        unsafe { Global.release(p, layout) };
    }

    #[test]
    fn test_always_equal_skips_comparison() {
        #[derive(Clone)]
        struct Stateless;
        impl PartialEq for Stateless {
            fn eq(&self, _: &Self) -> bool {
                false
            }
        }
        unsafe impl Strategy for Stateless {
            const PROPAGATION: Propagation = Propagation::ALWAYS_EQUAL;
            fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
                Global.allocate(layout)
            }
            unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
                unsafe { Global.release(ptr, layout) }
            }
        }
        assert!(Stateless.is_equal(&Stateless));
        assert!(Global.is_equal(&Global));
    }

    #[test]
    fn test_propagation_presets() {
        assert_eq!(Propagation::default(), Propagation::NONE);
        assert!(Propagation::ALWAYS_EQUAL.always_equal);
        assert!(!Propagation::ALWAYS_EQUAL.on_swap);
        assert!(Propagation::ALL.on_copy_assignment);
        assert!(Propagation::ALL.on_move_assignment);
        assert!(Propagation::ALL.on_swap);
    }
}
