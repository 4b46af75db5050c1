//! `Counting` is an instrumented [`Strategy`] that records every allocation,
//! release, construction and destruction it performs.
//!
//! Clones of a `Counting` share their counters, so the numbers stay
//! observable after the strategy has been moved into a wrapper. Each instance
//! carries an id; two instances are equal (and may release each other's
//! storage) exactly when their ids match.
//!
//! The propagation policy is picked with const parameters:
//!
//! ```
//! use indirect::{counting::Counting, Indirect};
//!
//! // propagate on copy-assignment, not on move-assignment or swap
//! type Copying = Counting<true, false, false>;
//!
//! let a = Indirect::new_in(1, Copying::new(1));
//! let mut b = Indirect::new_in(2, Copying::new(2));
//! b.clone_from(&a);
//! assert_eq!(Indirect::strategy(&b).id(), 1);
//! ```
//!
//! ## See also
//!
//! [`Global`][crate::Global] is the stateless strategy used by default.
use alloc::sync::Arc;
use core::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{
        AtomicUsize,
        Ordering::{Relaxed, SeqCst},
    },
};

use crate::{
    error::AllocError,
    strategy::{Global, Propagation, Strategy},
};

#[derive(Debug)]
struct Counters {
    allocations: AtomicUsize,
    releases: AtomicUsize,
    constructs: AtomicUsize,
    destroys: AtomicUsize,
    // successful allocations still permitted
    budget: AtomicUsize,
}

/// Instrumented strategy backed by the global heap.
#[derive(Clone, Debug)]
pub struct Counting<const COPY: bool = false, const MOVE: bool = false, const SWAP: bool = false> {
    id: u32,
    counters: Arc<Counters>,
}

impl<const COPY: bool, const MOVE: bool, const SWAP: bool> Counting<COPY, MOVE, SWAP> {
    /// A strategy with fresh counters and an unlimited allocation budget.
    pub fn new(id: u32) -> Self {
        Counting {
            id,
            counters: Arc::new(Counters {
                allocations: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                constructs: AtomicUsize::new(0),
                destroys: AtomicUsize::new(0),
                budget: AtomicUsize::new(usize::MAX),
            }),
        }
    }

    /// A strategy that shares this one's counters but has a different id, so
    /// it compares unequal.
    pub fn with_id(&self, id: u32) -> Self {
        Counting {
            id,
            counters: self.counters.clone(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Allow `n` more successful allocations; later ones fail with
    /// [`AllocError`].
    pub fn set_allocation_budget(&self, n: usize) {
        self.counters.budget.store(n, SeqCst);
    }

    /// Number of successful allocations.
    pub fn allocations(&self) -> usize {
        self.counters.allocations.load(SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.load(SeqCst)
    }

    pub fn constructs(&self) -> usize {
        self.counters.constructs.load(SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.counters.destroys.load(SeqCst)
    }

    /// Allocations not yet matched by a release.
    ///
    /// The two counters are read separately, so the result is only exact
    /// while no other thread is allocating or releasing.
    pub fn outstanding(&self) -> usize {
        self.allocations().saturating_sub(self.releases())
    }

    fn take_budget(&self) -> bool {
        self.counters
            .budget
            .fetch_update(SeqCst, Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for Counting {
    fn default() -> Self {
        Counting::new(0)
    }
}

impl<const COPY: bool, const MOVE: bool, const SWAP: bool> PartialEq
    for Counting<COPY, MOVE, SWAP>
{
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<const COPY: bool, const MOVE: bool, const SWAP: bool> Eq for Counting<COPY, MOVE, SWAP> {}

unsafe impl<const COPY: bool, const MOVE: bool, const SWAP: bool> Strategy
    for Counting<COPY, MOVE, SWAP>
{
    const PROPAGATION: Propagation = Propagation {
        on_copy_assignment: COPY,
        on_move_assignment: MOVE,
        on_swap: SWAP,
        always_equal: false,
    };

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if !self.take_budget() {
            tracing::debug!(id = self.id, size = layout.size(), "allocation budget exhausted");
            return Err(AllocError);
        }
        let p = Global.allocate(layout)?;
        self.counters.allocations.fetch_add(1, SeqCst);
        Ok(p)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        self.counters.releases.fetch_add(1, SeqCst);
        unsafe { Global.release(ptr, layout) }
    }

    unsafe fn construct<T>(&self, slot: NonNull<T>, value: T) {
        self.counters.constructs.fetch_add(1, SeqCst);
        unsafe { slot.as_ptr().write(value) }
    }

    unsafe fn destroy<T>(&self, slot: NonNull<T>) {
        self.counters.destroys.fetch_add(1, SeqCst);
        unsafe { core::ptr::drop_in_place(slot.as_ptr()) }
    }
}
