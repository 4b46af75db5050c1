//! `Indirect<T, S>` owns one heap-allocated `T` and gives it value semantics:
//! cloning the wrapper clones the payload, and moving the payload out with
//! [`Indirect::take`] leaves the source *valueless* rather than dangling.
//!
//! Storage comes from a [`Strategy`]. Whether an operation can hand storage
//! over in O(1) or has to rebuild the payload depends on whether the two
//! strategies involved compare equal, and whether a strategy follows its
//! payload across assignment and swap is decided by the strategy's
//! [`Propagation`][crate::Propagation] policy.
//!
//! Because a wrapper can be valueless, most accessors are fallible in spirit.
//! The `Deref` impls panic on a valueless wrapper; [`Indirect::get`] and
//! [`Indirect::get_mut`] return `Option`s instead.
//!
//! ## See also
//!
//! [`Counting`][crate::counting::Counting] in this crate is a strategy that
//! records what each operation allocates, which is handy for checking the
//! paths described on each method.
use alloc::alloc::handle_alloc_error;
use core::{
    alloc::Layout,
    borrow,
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
};

use scopeguard::{defer, guard, ScopeGuard};

use crate::{
    error::{AllocError, Error},
    raw,
    strategy::{Global, Strategy},
};

/// A heap-owning box with value semantics. See the [module docs][self].
pub struct Indirect<T, S: Strategy = Global> {
    ptr: Option<NonNull<T>>,
    strategy: S,
    phantom: PhantomData<T>,
}

// Safety: the payload is exclusively owned, as with `Box`.
unsafe impl<T: Send, S: Strategy + Send> Send for Indirect<T, S> {}
unsafe impl<T: Sync, S: Strategy + Sync> Sync for Indirect<T, S> {}

impl<T, S: Strategy + Default> Indirect<T, S> {
    /// Allocates storage with a default strategy and moves `value` into it.
    ///
    /// ```
    /// use indirect::Indirect;
    /// let x: Indirect<i32> = Indirect::new(5);
    /// assert_eq!(*x, 5);
    /// ```
    pub fn new(value: T) -> Self {
        Indirect::new_in(value, S::default())
    }

    pub fn try_new(value: T) -> Result<Self, AllocError> {
        Indirect::try_new_in(value, S::default())
    }

    /// Allocates storage, then builds the payload in it by calling `init`.
    ///
    /// Storage is reserved before `init` runs; if `init` panics the storage
    /// is released again.
    pub fn new_with<F: FnOnce() -> T>(init: F) -> Self {
        Indirect::new_with_in(init, S::default())
    }
}

impl<T, S: Strategy> Indirect<T, S> {
    fn from_parts(ptr: Option<NonNull<T>>, strategy: S) -> Self {
        Indirect {
            ptr,
            strategy,
            phantom: PhantomData,
        }
    }

    /// Like [`new`][Indirect::new], with storage from `strategy`.
    pub fn new_in(value: T, strategy: S) -> Self {
        Indirect::try_new_in(value, strategy).unwrap_or_else(|_| alloc_failed::<T>())
    }

    pub fn try_new_in(value: T, strategy: S) -> Result<Self, AllocError> {
        let ptr = raw::allocate_and_write(&strategy, value)?;
        Ok(Indirect::from_parts(Some(ptr), strategy))
    }

    /// Like [`new_with`][Indirect::new_with], with storage from `strategy`.
    pub fn new_with_in<F: FnOnce() -> T>(init: F, strategy: S) -> Self {
        match raw::allocate_with(&strategy, init) {
            Ok(ptr) => Indirect::from_parts(Some(ptr), strategy),
            Err(_) => alloc_failed::<T>(),
        }
    }

    /// Allocates storage, then builds the payload with a fallible `init`.
    ///
    /// If `init` fails the storage is released and its error is returned as
    /// [`Error::Construct`].
    ///
    /// ```
    /// use indirect::{Error, Global, Indirect};
    ///
    /// let ok = Indirect::try_new_with_in(|| "42".parse::<u8>(), Global);
    /// assert_eq!(*ok.unwrap(), 42);
    ///
    /// let bad = Indirect::try_new_with_in(|| "420".parse::<u8>(), Global);
    /// assert!(matches!(bad, Err(Error::Construct(_))));
    /// ```
    pub fn try_new_with_in<E, F>(init: F, strategy: S) -> Result<Self, Error<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let ptr = raw::allocate_and_construct(&strategy, init)?;
        Ok(Indirect::from_parts(Some(ptr), strategy))
    }

    /// A default payload, with storage from `strategy`.
    pub fn default_in(strategy: S) -> Self
    where
        T: Default,
    {
        Indirect::new_with_in(T::default, strategy)
    }

    /// Collects `iter` into a payload, with storage from `strategy`.
    pub fn from_iter_in<A, I>(iter: I, strategy: S) -> Self
    where
        I: IntoIterator<Item = A>,
        T: FromIterator<A>,
    {
        Indirect::new_with_in(|| iter.into_iter().collect(), strategy)
    }

    /// Fallible version of `clone()`.
    ///
    /// The copy gets the strategy chosen by
    /// [`select_on_copy`][Strategy::select_on_copy]. Copying a valueless
    /// wrapper gives a valueless wrapper and allocates nothing.
    pub fn try_clone(this: &Self) -> Result<Self, AllocError>
    where
        T: Clone,
    {
        Indirect::try_clone_in(this, this.strategy.select_on_copy())
    }

    /// Copy of `this` with storage from `strategy`, used verbatim.
    pub fn clone_in(this: &Self, strategy: S) -> Self
    where
        T: Clone,
    {
        Indirect::try_clone_in(this, strategy).unwrap_or_else(|_| alloc_failed::<T>())
    }

    pub fn try_clone_in(this: &Self, strategy: S) -> Result<Self, AllocError>
    where
        T: Clone,
    {
        let ptr = match Indirect::get(this) {
            None => None,
            Some(value) => Some(raw::allocate_with(&strategy, || value.clone())?),
        };
        Ok(Indirect::from_parts(ptr, strategy))
    }

    /// Moves the payload out into a new wrapper, leaving `this` valueless.
    ///
    /// The storage itself changes hands, so nothing is allocated. The new
    /// wrapper gets a clone of `this`'s strategy.
    ///
    /// ```
    /// use indirect::Indirect;
    /// let mut a: Indirect<String> = Indirect::new("hello".into());
    /// let b = Indirect::take(&mut a);
    /// assert!(Indirect::is_valueless(&a));
    /// assert_eq!(*b, "hello");
    /// ```
    pub fn take(this: &mut Self) -> Self {
        Indirect::from_parts(this.ptr.take(), this.strategy.clone())
    }

    /// Moves the payload out into a new wrapper that uses `strategy`.
    ///
    /// If `strategy` equals `this`'s, the storage changes hands as in
    /// [`take`][Indirect::take]. Otherwise new storage is allocated from
    /// `strategy` and the payload is moved across.
    pub fn take_in(this: &mut Self, strategy: S) -> Self {
        Indirect::try_take_in(this, strategy).unwrap_or_else(|_| alloc_failed::<T>())
    }

    /// Fallible version of [`take_in`][Indirect::take_in]. On error `this` is
    /// left as it was; on success it is valueless.
    pub fn try_take_in(this: &mut Self, strategy: S) -> Result<Self, AllocError> {
        if strategy.is_equal(&this.strategy) {
            return Ok(Indirect::from_parts(this.ptr.take(), strategy));
        }
        let ptr = Indirect::relocate(this, &strategy)?;
        Ok(Indirect::from_parts(ptr, strategy))
    }

    /// Moves the payload of `this` into storage from `to`.
    ///
    /// If allocation fails `this` is untouched. Past that point `this` ends up
    /// valueless and its old storage released, even if the construct hook
    /// unwinds.
    fn relocate(this: &mut Self, to: &S) -> Result<Option<NonNull<T>>, AllocError> {
        let Some(old) = this.ptr else {
            return Ok(None);
        };
        tracing::trace!(size = mem::size_of::<T>(), "relocating payload to an unequal strategy");
        let fresh = guard(raw::allocate::<T, S>(to)?, |slot| unsafe {
            raw::release(to, slot)
        });
        this.ptr = None;
        let from = &this.strategy;
        defer! {
            unsafe { raw::release(from, old) }
        }
        // Safety: `old` held a live payload and has been detached from `this`
        let value = unsafe { old.as_ptr().read() };
        unsafe { to.construct(*fresh, value) };
        Ok(Some(ScopeGuard::into_inner(fresh)))
    }

    /// Makes `this` hold `fresh`, switching to `carried` as the strategy if
    /// given, and tears down the previous payload with the strategy that
    /// allocated it.
    fn install(this: &mut Self, fresh: Option<NonNull<T>>, carried: Option<S>) {
        let old = mem::replace(&mut this.ptr, fresh);
        let retired = carried.map(|s| mem::replace(&mut this.strategy, s));
        if let Some(old) = old {
            let strategy = retired.as_ref().unwrap_or(&this.strategy);
            unsafe { raw::destroy_and_release(strategy, old) }
        }
    }

    /// Destroys the payload, if any. `this` is valueless afterwards, even if
    /// the payload's destructor panics.
    fn reset(this: &mut Self) {
        if let Some(old) = this.ptr.take() {
            unsafe { raw::destroy_and_release(&this.strategy, old) }
        }
    }

    /// Fallible version of `clone_from()`.
    ///
    /// - A valueless `source` makes `this` valueless.
    /// - With equal strategies and a populated `this`, the payload is updated
    ///   in place with `T::clone_from` and nothing is allocated.
    /// - Otherwise a copy of the source payload is built in new storage
    ///   first, from the source's strategy if the policy propagates on copy
    ///   assignment or from `this`'s otherwise. Only then is the old payload
    ///   dropped.
    ///
    /// The strategy is replaced by a copy of `source`'s exactly when the
    /// policy propagates on copy assignment. If building the copy fails,
    /// `this` is unchanged.
    pub fn try_clone_from(this: &mut Self, source: &Self) -> Result<(), AllocError>
    where
        T: Clone,
    {
        let propagate = S::PROPAGATION.on_copy_assignment;
        let carried = || propagate.then(|| source.strategy.clone());
        let Some(value) = Indirect::get(source) else {
            Indirect::install(this, None, carried());
            return Ok(());
        };
        if this.strategy.is_equal(&source.strategy) {
            if let Some(current) = Indirect::get_mut(this) {
                current.clone_from(value);
                return Ok(());
            }
        }
        tracing::trace!(size = mem::size_of::<T>(), "copy-assigning into new storage");
        // allocate with the instance that will own the storage
        let carried = carried();
        let strategy = carried.as_ref().unwrap_or(&this.strategy);
        let fresh = raw::allocate_with(strategy, || value.clone())?;
        Indirect::install(this, Some(fresh), carried);
        Ok(())
    }

    /// Move-assignment: takes the payload of `source`, leaving it valueless.
    ///
    /// - A valueless `source` makes `this` valueless.
    /// - With equal strategies the storage changes hands and `this`'s old
    ///   payload is dropped. Nothing is allocated.
    /// - Otherwise the payload is moved into new storage from the source's
    ///   strategy if the policy propagates on move assignment, or from
    ///   `this`'s otherwise.
    ///
    /// The strategy is replaced by a copy of `source`'s exactly when the
    /// policy propagates on move assignment, except on the equal-strategy
    /// path where it stays.
    pub fn move_from(this: &mut Self, source: &mut Self) {
        if Indirect::try_move_from(this, source).is_err() {
            alloc_failed::<T>()
        }
    }

    /// Fallible version of [`move_from`][Indirect::move_from]. On error
    /// neither wrapper is modified.
    pub fn try_move_from(this: &mut Self, source: &mut Self) -> Result<(), AllocError> {
        let propagate = S::PROPAGATION.on_move_assignment;
        if source.ptr.is_none() {
            Indirect::install(this, None, propagate.then(|| source.strategy.clone()));
            return Ok(());
        }
        if this.strategy.is_equal(&source.strategy) {
            mem::swap(&mut this.ptr, &mut source.ptr);
            Indirect::reset(source);
            return Ok(());
        }
        let carried = propagate.then(|| source.strategy.clone());
        let fresh = Indirect::relocate(source, carried.as_ref().unwrap_or(&this.strategy))?;
        Indirect::install(this, fresh, carried);
        Ok(())
    }

    /// Assigns a new payload value.
    ///
    /// A valueless wrapper allocates storage for it; otherwise the existing
    /// payload is overwritten in place.
    ///
    /// ```
    /// use indirect::Indirect;
    /// let mut a: Indirect<String> = Indirect::new("one".into());
    /// let _ = Indirect::take(&mut a);
    /// Indirect::set(&mut a, "two");
    /// assert_eq!(*a, "two");
    /// ```
    pub fn set<U: Into<T>>(this: &mut Self, value: U) {
        if Indirect::try_set(this, value).is_err() {
            alloc_failed::<T>()
        }
    }

    pub fn try_set<U: Into<T>>(this: &mut Self, value: U) -> Result<(), AllocError> {
        match Indirect::get_mut(this) {
            Some(current) => *current = value.into(),
            None => this.ptr = Some(raw::allocate_with(&this.strategy, || value.into())?),
        }
        Ok(())
    }

    /// Exchanges the payloads (or valueless states) of two wrappers.
    ///
    /// Strategies are exchanged too if the policy propagates on swap. Nothing
    /// is allocated or constructed.
    ///
    /// # Panics
    ///
    /// If the policy does not propagate on swap and the strategies are not
    /// equal. Exchanging storage between them would release it through the
    /// wrong strategy.
    #[track_caller]
    pub fn swap(this: &mut Self, other: &mut Self) {
        if S::PROPAGATION.on_swap {
            mem::swap(&mut this.strategy, &mut other.strategy);
        } else {
            assert!(
                this.strategy.is_equal(&other.strategy),
                "cannot swap Indirect values whose strategies differ and do not propagate on swap"
            );
        }
        mem::swap(&mut this.ptr, &mut other.ptr);
    }

    /// Returns true if `this` owns no payload, e.g. after [`take`][Indirect::take].
    #[inline]
    pub fn is_valueless(this: &Self) -> bool {
        this.ptr.is_none()
    }

    /// The strategy that owns `this`'s storage. Available even when valueless.
    #[inline]
    pub fn strategy(this: &Self) -> &S {
        &this.strategy
    }

    #[inline]
    pub fn get(this: &Self) -> Option<&T> {
        // Safety: a present handle always points at a live payload we own
        this.ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    #[inline]
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        this.ptr.map(|p| unsafe { &mut *p.as_ptr() })
    }

    /// Raw pointer to the payload, null if valueless.
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        this.ptr.map_or(ptr::null(), |p| p.as_ptr() as *const T)
    }

    #[inline]
    pub fn as_mut_ptr(this: &mut Self) -> *mut T {
        this.ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Moves the payload out and releases its storage.
    ///
    /// # Panics
    ///
    /// If `this` is valueless.
    #[track_caller]
    pub fn into_inner(mut this: Self) -> T {
        match this.ptr.take() {
            Some(slot) => unsafe { raw::read_and_release(&this.strategy, slot) },
            None => valueless(),
        }
    }

    /// Compares the payload with a plain value. A valueless wrapper never
    /// equals anything.
    pub fn eq_value<U: ?Sized>(this: &Self, other: &U) -> bool
    where
        T: PartialEq<U>,
    {
        Indirect::get(this).map_or(false, |v| *v == *other)
    }

    /// Orders the payload against a plain value. A valueless wrapper sorts
    /// before everything.
    pub fn partial_cmp_value<U: ?Sized>(this: &Self, other: &U) -> Option<Ordering>
    where
        T: PartialOrd<U>,
    {
        match Indirect::get(this) {
            Some(v) => v.partial_cmp(other),
            None => Some(Ordering::Less),
        }
    }
}

#[cold]
fn alloc_failed<T>() -> ! {
    handle_alloc_error(Layout::new::<T>())
}

#[cold]
#[track_caller]
fn valueless() -> ! {
    panic!("dereferenced a valueless Indirect")
}

impl<T, S: Strategy> Drop for Indirect<T, S> {
    fn drop(&mut self) {
        Indirect::reset(self);
    }
}

impl<T: Clone, S: Strategy> Clone for Indirect<T, S> {
    fn clone(&self) -> Self {
        Indirect::try_clone(self).unwrap_or_else(|_| alloc_failed::<T>())
    }

    /// Copy-assignment; see [`Indirect::try_clone_from`].
    fn clone_from(&mut self, source: &Self) {
        if Indirect::try_clone_from(self, source).is_err() {
            alloc_failed::<T>()
        }
    }
}

impl<T: Default, S: Strategy + Default> Default for Indirect<T, S> {
    fn default() -> Self {
        Indirect::default_in(S::default())
    }
}

impl<T, S: Strategy + Default> From<T> for Indirect<T, S> {
    fn from(value: T) -> Self {
        Indirect::new(value)
    }
}

impl<A, T: FromIterator<A>, S: Strategy + Default> FromIterator<A> for Indirect<T, S> {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        Indirect::from_iter_in(iter, S::default())
    }
}

impl<T, S: Strategy> Deref for Indirect<T, S> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match Indirect::get(self) {
            Some(v) => v,
            None => valueless(),
        }
    }
}

impl<T, S: Strategy> DerefMut for Indirect<T, S> {
    #[track_caller]
    fn deref_mut(&mut self) -> &mut T {
        match Indirect::get_mut(self) {
            Some(v) => v,
            None => valueless(),
        }
    }
}

impl<T, S: Strategy> AsRef<T> for Indirect<T, S> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T, S: Strategy> AsMut<T> for Indirect<T, S> {
    fn as_mut(&mut self) -> &mut T {
        self
    }
}

impl<T, S: Strategy> borrow::Borrow<T> for Indirect<T, S> {
    fn borrow(&self) -> &T {
        self
    }
}

impl<T, S: Strategy> borrow::BorrowMut<T> for Indirect<T, S> {
    fn borrow_mut(&mut self) -> &mut T {
        self
    }
}

impl<T: PartialEq<U>, U, S: Strategy, S2: Strategy> PartialEq<Indirect<U, S2>> for Indirect<T, S> {
    /// Valueless wrappers are equal to each other and to nothing else.
    #[inline]
    fn eq(&self, other: &Indirect<U, S2>) -> bool {
        match (Indirect::get(self), Indirect::get(other)) {
            (Some(a), Some(b)) => *a == *b,
            (a, b) => a.is_none() == b.is_none(),
        }
    }
}

impl<T: Eq, S: Strategy> Eq for Indirect<T, S> {}

impl<T, U, S, S2> PartialOrd<Indirect<U, S2>> for Indirect<T, S>
where
    T: PartialOrd<U>,
    S: Strategy,
    S2: Strategy,
{
    /// Valueless sorts before any payload.
    fn partial_cmp(&self, other: &Indirect<U, S2>) -> Option<Ordering> {
        match (Indirect::get(self), Indirect::get(other)) {
            (Some(a), Some(b)) => a.partial_cmp(b),
            (a, b) => Some(a.is_some().cmp(&b.is_some())),
        }
    }
}

impl<T: Ord, S: Strategy> Ord for Indirect<T, S> {
    fn cmp(&self, other: &Self) -> Ordering {
        Indirect::get(self).cmp(&Indirect::get(other))
    }
}

impl<T: Hash, S: Strategy> Hash for Indirect<T, S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Indirect::get(self).hash(state)
    }
}

impl<T: fmt::Display, S: Strategy> fmt::Display for Indirect<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Indirect::get(self) {
            Some(v) => fmt::Display::fmt(v, f),
            None => f.write_str("(valueless)"),
        }
    }
}

impl<T: fmt::Debug, S: Strategy> fmt::Debug for Indirect<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Indirect::get(self) {
            Some(v) => fmt::Debug::fmt(v, f),
            None => f.write_str("(valueless)"),
        }
    }
}

impl<T, S: Strategy> fmt::Pointer for Indirect<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&Indirect::as_ptr(self), f)
    }
}


#[cfg(test)]
mod proptests {
    use crate::{counting::Counting, Global, Indirect};
    use proptest::prelude::*;

    fn wrap(v: Option<i32>) -> Indirect<i32> {
        let mut w = Indirect::new(v.unwrap_or_default());
        if v.is_none() {
            drop(Indirect::take(&mut w));
        }
        w
    }

    proptest! {
        /// Building in place gives back exactly the value that was built.
        #[test]
        fn roundtrip(v in proptest::collection::vec(any::<i32>(), 0..32)) {
            let x: Indirect<Vec<i32>> = Indirect::new_with(|| v.clone());
            prop_assert_eq!(&*x, &v);
        }

        /// Taking the payload leaves the source valueless and the value intact.
        #[test]
        fn take_empties_source(v in proptest::collection::vec(any::<u8>(), 0..32)) {
            let mut a = Indirect::new_in(v.clone(), Global);
            let b = Indirect::take(&mut a);
            prop_assert!(Indirect::is_valueless(&a));
            prop_assert_eq!(&*b, &v);
        }

        /// Mutating a copy never shows through to the original.
        #[test]
        fn copies_are_independent(
            v in proptest::collection::vec(any::<i32>(), 1..32),
            x in any::<i32>(),
        ) {
            let a: Indirect<Vec<i32>> = Indirect::new(v.clone());
            let mut c = a.clone();
            c[0] = c[0].wrapping_add(1);
            c.push(x);
            prop_assert_eq!(&*a, &v);
        }

        /// Wrappers order and compare exactly like `Option`.
        #[test]
        fn ordering_matches_option(
            a in proptest::option::of(any::<i32>()),
            b in proptest::option::of(any::<i32>()),
        ) {
            let (wa, wb) = (wrap(a), wrap(b));
            prop_assert_eq!(wa.partial_cmp(&wb), a.partial_cmp(&b));
            prop_assert_eq!(wa.cmp(&wb), a.cmp(&b));
            prop_assert_eq!(wa == wb, a == b);
        }

        /// Assignment between equal strategies never allocates.
        #[test]
        fn equal_strategy_assignment_is_free(x in any::<i64>(), y in any::<i64>()) {
            let s: Counting = Counting::new(1);
            let mut a = Indirect::new_in(x, s.clone());
            let mut b = Indirect::new_in(y, s.clone());
            let c = Indirect::new_in(x, s.clone());
            b.clone_from(&c);
            Indirect::move_from(&mut a, &mut b);
            prop_assert_eq!(s.allocations(), 3);
            prop_assert_eq!(*a, x);
        }
    }
}
