/*!
This crate provides [`Indirect<T>`], a heap-owning box with *value semantics*,
like the C++ `indirect` vocabulary type.

A `Box<T>` is a pointer that happens to own its target. An `Indirect<T>` is
meant to be used as if it were the `T` itself: cloning the wrapper deep-copies
the payload, comparing two wrappers compares their payloads, and hashing it
hashes the payload.

```rust
    use indirect::Indirect;

    let a: Indirect<Vec<i32>> = Indirect::new(vec![1, 2, 3]);
    let mut b = a.clone();
    b.push(4);

    // `b` is an independent copy
    assert_eq!(*a, [1, 2, 3]);
    assert_eq!(*b, [1, 2, 3, 4]);
    assert!(a < b);
```

# The valueless state

Moving the payload out of a named wrapper with [`Indirect::take`] leaves the
wrapper *valueless*: it owns nothing, but is still a perfectly good value that
can be compared, cloned, assigned to, or dropped.

```
    use indirect::Indirect;

    let mut a: Indirect<String> = Indirect::new("payload".into());
    let b = Indirect::take(&mut a);

    assert!(Indirect::is_valueless(&a));
    assert_eq!(*b, "payload");

    // valueless wrappers are equal to each other, and sort first
    let c: Indirect<String> = Indirect::take(&mut a);
    assert_eq!(a, c);
    assert!(a < b);

    // ... and can be filled again
    Indirect::set(&mut a, "again");
    assert_eq!(*a, "again");
```

Dereferencing a valueless wrapper panics. Use [`Indirect::get`] when a wrapper
may be valueless.

# Recursive payloads

Like `Box`, an `Indirect` can hold a type that contains `Indirect`s of itself:

```
    use indirect::Indirect;

    #[derive(Clone, Debug, PartialEq)]
    struct List {
        head: i32,
        tail: Option<Indirect<List>>,
    }

    let list = List {
        head: 1,
        tail: Some(Indirect::new(List { head: 2, tail: None })),
    };
    let copy = list.clone();
    assert_eq!(list, copy);
```

# Allocation strategies

Every wrapper carries a [`Strategy`] that provides its storage. [`Global`],
the default, uses the global heap. Other strategies can draw from an arena, a
pool, or anything else, and each one declares a [`Propagation`] policy that
decides whether the strategy follows its payload through assignment and swap.

Whenever a payload moves between two wrappers, the strategies involved decide
how:

- if they compare equal, the storage changes hands and nothing is allocated;
- otherwise new storage is taken from the destination's strategy, and the
  payload is cloned or moved into it.

[`counting::Counting`] is an instrumented strategy that makes this visible:

```
    use indirect::{counting::Counting, Indirect};

    let home: Counting = Counting::new(1);
    let away = home.with_id(2); // same counters, unequal strategy

    let mut a = Indirect::new_in(10, home.clone());
    let mut b = Indirect::new_in(20, home.clone());
    let mut c = Indirect::new_in(30, away);
    assert_eq!(home.allocations(), 3);

    // equal strategies: storage handed over
    Indirect::move_from(&mut b, &mut a);
    assert_eq!(home.allocations(), 3);

    // unequal strategies: new storage from `c`'s strategy
    Indirect::move_from(&mut c, &mut b);
    assert_eq!(home.allocations(), 4);
    assert_eq!(*c, 10);
```

With the `bumpalo` feature, [`arena::Arena`] allocates from a
[`bumpalo::Bump`](https://docs.rs/bumpalo).

# Failure

Operations that allocate come in two flavors: the plain one handles
allocation failure the way `Box` does (by calling
[`handle_alloc_error`](alloc::alloc::handle_alloc_error)), and a `try_`
variant returns [`AllocError`] instead. [`Indirect::try_new_with_in`] also
accepts a fallible initializer and reports its error as
[`Error::Construct`].

Whatever fails, and that includes a panicking `clone()` or `drop()` in the
payload, no storage is leaked and [`Indirect::is_valueless`] keeps telling the
truth. Copy-assignment (`clone_from`) and move-assignment
([`Indirect::try_move_from`]) leave both wrappers untouched when building the
new payload fails.

# Differences from `Box`

`Indirect` does not support unsized payloads (`Indirect<dyn Trait>` or
`Indirect<[T]>`); a value-semantic wrapper has to be able to clone and
compare its payload, which needs the concrete type.

Most functions are associated functions (`Indirect::take(&mut x)` rather than
`x.take()`), so that they never shadow methods of the payload reached
through `Deref`.

## Related Crates

- [`rune-alloc`](https://lib.rs/crates/rune-alloc): a `Box` with fallible
  allocation throughout.
- [`bumpalo`](https://lib.rs/crates/bumpalo): the arena behind
  [`arena::Arena`].
*/
#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[cfg(feature = "bumpalo")]
pub mod arena;
pub mod counting;
pub mod error;
pub mod indirect;
mod raw;
pub mod strategy;

pub use self::error::{AllocError, Error};
pub use self::indirect::Indirect;
pub use self::strategy::{Global, Propagation, Strategy};
