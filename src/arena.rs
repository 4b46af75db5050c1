//! `Arena` allocates payload storage from a [`bumpalo::Bump`].
//!
//! Releasing storage is a no-op: the arena reclaims everything at once when
//! it is reset or dropped. Payload destructors still run when a wrapper lets
//! go of its payload, so resources owned by the payload are not leaked.
//!
//! Two `Arena`s are equal when they borrow the same `Bump`, which lets
//! wrappers in the same arena hand storage to each other without copying.
//!
//! ```
//! use bumpalo::Bump;
//! use indirect::{arena::Arena, Indirect};
//!
//! let bump = Bump::new();
//! let mut a = Indirect::new_in(vec![1, 2, 3], Arena::new(&bump));
//! let mut b = Indirect::new_in(vec![], Arena::new(&bump));
//! Indirect::move_from(&mut b, &mut a);
//! assert_eq!(*b, [1, 2, 3]);
//! assert!(Indirect::is_valueless(&a));
//! ```
use core::{alloc::Layout, fmt, ptr::NonNull};

use bumpalo::Bump;

use crate::{error::AllocError, strategy::Strategy};

/// Strategy that borrows a bump arena.
#[derive(Clone, Copy)]
pub struct Arena<'a> {
    bump: &'a Bump,
}

impl<'a> Arena<'a> {
    pub fn new(bump: &'a Bump) -> Self {
        Arena { bump }
    }

    /// The arena storage comes from.
    pub fn bump(&self) -> &'a Bump {
        self.bump
    }
}

impl PartialEq for Arena<'_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.bump, other.bump)
    }
}

impl Eq for Arena<'_> {}

impl fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Arena").field(&(self.bump as *const Bump)).finish()
    }
}

unsafe impl Strategy for Arena<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.bump.try_alloc_layout(layout).map_err(|_| AllocError)
    }

    unsafe fn release(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Indirect;
    use std::{cell::Cell, rc::Rc};

    struct DropCounter(Rc<Cell<usize>>);
    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_payload_lives_in_arena() {
        let bump = Bump::new();
        let before = bump.allocated_bytes();
        let x = Indirect::new_in([7u64; 16], Arena::new(&bump));
        assert!(bump.allocated_bytes() > before);
        assert_eq!(x[3], 7);
    }

    #[test]
    fn test_destructors_run() {
        let bump = Bump::new();
        let n = Rc::new(Cell::new(0));
        {
            let _x = Indirect::new_in(DropCounter(n.clone()), Arena::new(&bump));
            assert_eq!(n.get(), 0);
        }
        assert_eq!(n.get(), 1);
    }

    #[test]
    fn test_same_arena_transfers() {
        let bump = Bump::new();
        let mut a = Indirect::new_in(String::from("shared"), Arena::new(&bump));
        let p = Indirect::as_ptr(&a);
        let b = Indirect::take_in(&mut a, Arena::new(&bump));
        assert_eq!(Indirect::as_ptr(&b), p);
        assert!(Indirect::is_valueless(&a));
    }

    #[test]
    fn test_other_arena_relocates() {
        let one = Bump::new();
        let two = Bump::new();
        let mut a = Indirect::new_in(String::from("moving"), Arena::new(&one));
        let b = Indirect::take_in(&mut a, Arena::new(&two));
        assert_eq!(*b, "moving");
        assert!(Indirect::is_valueless(&a));
        assert_eq!(*Indirect::strategy(&b), Arena::new(&two));
    }

    #[test]
    #[should_panic(expected = "strategies differ")]
    fn test_swap_across_arenas_panics() {
        let one = Bump::new();
        let two = Bump::new();
        let mut a = Indirect::new_in(1, Arena::new(&one));
        let mut b = Indirect::new_in(2, Arena::new(&two));
        Indirect::swap(&mut a, &mut b);
    }
}
