// Storage primitives for `Indirect`. Every path that obtains, fills, empties
// or returns a payload slot goes through here.
use core::{alloc::Layout, convert::Infallible, ptr::NonNull};

use scopeguard::{defer, guard, ScopeGuard};

use crate::{
    error::{AllocError, Error},
    strategy::Strategy,
};

/// Reserve a slot for one `T`. Nothing is constructed.
pub(crate) fn allocate<T, S: Strategy>(strategy: &S) -> Result<NonNull<T>, AllocError> {
    strategy.allocate(Layout::new::<T>()).map(NonNull::cast)
}

/// Give an empty slot back to `strategy`.
///
/// # Safety
/// `slot` came from `allocate::<T>` on an equal strategy and holds no live
/// value.
pub(crate) unsafe fn release<T, S: Strategy>(strategy: &S, slot: NonNull<T>) {
    unsafe { strategy.release(slot.cast(), Layout::new::<T>()) }
}

/// Allocate a slot, then fill it with the value produced by `init`.
///
/// The slot is released before returning if `init` fails, and also if `init`
/// or the strategy's construct hook unwinds.
pub(crate) fn allocate_and_construct<T, S, E, F>(
    strategy: &S,
    init: F,
) -> Result<NonNull<T>, Error<E>>
where
    S: Strategy,
    F: FnOnce() -> Result<T, E>,
{
    let slot = guard(allocate::<T, S>(strategy)?, |slot| unsafe {
        release(strategy, slot)
    });
    let value = init().map_err(Error::Construct)?;
    // Safety: fresh slot from `strategy`
    unsafe { strategy.construct(*slot, value) };
    Ok(ScopeGuard::into_inner(slot))
}

/// [`allocate_and_construct`] with an initializer that cannot fail, other
/// than by unwinding.
pub(crate) fn allocate_with<T, S, F>(strategy: &S, init: F) -> Result<NonNull<T>, AllocError>
where
    S: Strategy,
    F: FnOnce() -> T,
{
    allocate_and_construct(strategy, || Ok::<T, Infallible>(init())).map_err(AllocError::from)
}

/// [`allocate_and_construct`] for a value that is already built.
pub(crate) fn allocate_and_write<T, S: Strategy>(
    strategy: &S,
    value: T,
) -> Result<NonNull<T>, AllocError> {
    allocate_with(strategy, || value)
}

/// Tear down the payload in `slot` and release the storage.
///
/// The storage is released even if the payload's destructor (or the
/// strategy's destroy hook) panics.
///
/// # Safety
/// `slot` holds a live `T` constructed through an equal strategy, and is not
/// used again.
pub(crate) unsafe fn destroy_and_release<T, S: Strategy>(strategy: &S, slot: NonNull<T>) {
    defer! {
        unsafe { release(strategy, slot) }
    }
    unsafe { strategy.destroy(slot) };
}

/// Move the payload out of `slot` and release the storage. The payload's
/// destructor does not run.
///
/// # Safety
/// Same as [`destroy_and_release`].
pub(crate) unsafe fn read_and_release<T, S: Strategy>(strategy: &S, slot: NonNull<T>) -> T {
    let value = unsafe { slot.as_ptr().read() };
    unsafe { release(strategy, slot) };
    value
}
