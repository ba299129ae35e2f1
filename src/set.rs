//! Type-level property sets.
//!
//! A reference is parameterized over a tuple of property tags, for example
//! `ResourceRef<'_, (HostAccessible, MaxAlignment)>`. Tuples of up to eight
//! tags are supported. Internally a tuple is turned into a type-level list so
//! membership and subset relations can be checked by the trait system:
//! - [`Contains<P, I>`] holds when `P` is one of the set's tags,
//! - [`SubsetOf<S, I>`] holds when every tag of the set occurs in `S`.
//!
//! The `I` parameters are position witnesses. They are inferred and do not
//! have to be written out, with one exception: a tag that occurs more than
//! once in a set has more than one position, so the witness is ambiguous.
//! Name one of the positions to query such a tag. Every position answers the
//! same, since the property table keeps the first occurrence only:
//!
//! ```rust
//! # use core::ptr::NonNull;
//! use resource_ref::{set::{Here, There}, Allocator, HasProperty, Property, ResourceRef};
//! # #[derive(PartialEq)]
//! # struct Heap;
//! # unsafe impl Allocator for Heap {
//! #     fn allocate(&self, _: usize, _: usize) -> resource_ref::Result<NonNull<u8>> { todo!() }
//! #     unsafe fn deallocate(&self, _: NonNull<u8>, _: usize, _: usize) {}
//! # }
//! #[derive(Clone, Copy)]
//! struct Capacity;
//! impl Property for Capacity {
//!     type Value = usize;
//! }
//! impl HasProperty<Capacity> for Heap {
//!     fn get_property(&self, _: Capacity) -> usize {
//!         4096
//!     }
//! }
//!
//! let resource = ResourceRef::<(Capacity, Capacity)>::new(&Heap);
//! assert_eq!(resource.get_property::<Capacity, Here>(Capacity), 4096);
//! assert_eq!(resource.get_property::<Capacity, There<Here>>(Capacity), 4096);
//! ```

use core::{any::TypeId, marker::PhantomData};

use crate::property::Property;

/// The empty type-level list.
#[derive(Debug)]
pub enum Nil {}

/// A type-level list with head `H` and tail `T`.
#[derive(Debug)]
pub struct Cons<H, T>(PhantomData<(H, T)>);

/// Position witness: the tag is the head of the list.
#[derive(Debug)]
pub enum Here {}

/// Position witness: the tag is somewhere in the tail, at position `I`.
#[derive(Debug)]
pub struct There<I>(PhantomData<I>);

/// A tuple of property tags.
pub trait PropertySet: 'static {
    /// The set as a type-level list.
    type List;
    /// The identity of every tag, in order, duplicates included.
    const IDS: &'static [fn() -> TypeId];
    /// Number of tags, duplicates included.
    const LEN: usize = Self::IDS.len();
}

/// `Self` contains `P`, at position `I`.
pub trait ListContains<P, I> {}
impl<P, T> ListContains<P, Here> for Cons<P, T> {}
impl<P, H, T, I> ListContains<P, There<I>> for Cons<H, T> where T: ListContains<P, I> {}

/// Every tag of `Self` occurs in `L`, at the positions listed in `I`.
pub trait ListSubset<L, I> {}
impl<L> ListSubset<L, Nil> for Nil {}
impl<L, H, T, I, Is> ListSubset<L, Cons<I, Is>> for Cons<H, T>
where
    L: ListContains<H, I>,
    T: ListSubset<L, Is>,
{
}

/// The property set contains the tag `P`.
pub trait Contains<P, I>: PropertySet {}
impl<S, P, I> Contains<P, I> for S
where
    S: PropertySet,
    S::List: ListContains<P, I>,
{
}

/// Every tag of the property set occurs in `S`.
pub trait SubsetOf<S, I>: PropertySet {}
impl<Q, S, I> SubsetOf<S, I> for Q
where
    Q: PropertySet,
    S: PropertySet,
    Q::List: ListSubset<S::List, I>,
{
}

macro_rules! list {
    () => { Nil };
    ($head:ident $(, $tail:ident)*) => { Cons<$head, list!($($tail),*)> };
}

macro_rules! impl_property_set {
    ($($tag:ident),*) => {
        impl<$($tag: Property),*> PropertySet for ($($tag,)*) {
            type List = list!($($tag),*);
            const IDS: &'static [fn() -> TypeId] = &[$(TypeId::of::<$tag>),*];
        }
    };
}

impl_property_set!();
impl_property_set!(P0);
impl_property_set!(P0, P1);
impl_property_set!(P0, P1, P2);
impl_property_set!(P0, P1, P2, P3);
impl_property_set!(P0, P1, P2, P3, P4);
impl_property_set!(P0, P1, P2, P3, P4, P5);
impl_property_set!(P0, P1, P2, P3, P4, P5, P6);
impl_property_set!(P0, P1, P2, P3, P4, P5, P6, P7);

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    impl Property for A {
        type Value = u8;
    }
    struct B;
    impl Property for B {
        type Value = u16;
    }
    struct C;
    impl Property for C {
        type Value = ();
        const MARKER: Option<()> = Some(());
    }

    fn contains<S: Contains<P, I>, P, I>() {}
    fn subset<Q: SubsetOf<S, I>, S, I>() {}

    #[test]
    fn lengths() {
        assert_eq!(<() as PropertySet>::LEN, 0);
        assert_eq!(<(A,) as PropertySet>::LEN, 1);
        assert_eq!(<(A, B, C) as PropertySet>::LEN, 3);
        assert_eq!(<(A, A, C) as PropertySet>::LEN, 3);
    }

    #[test]
    fn ids_follow_the_tuple() {
        let ids: Vec<_> = <(B, A, B) as PropertySet>::IDS.iter().map(|id| id()).collect();
        assert_eq!(
            ids,
            [TypeId::of::<B>(), TypeId::of::<A>(), TypeId::of::<B>()]
        );
        assert!(<() as PropertySet>::IDS.is_empty());
    }

    #[test]
    fn membership() {
        contains::<(A, B, C), A, _>();
        contains::<(A, B, C), B, _>();
        contains::<(A, B, C), C, _>();
        contains::<(C, A), A, _>();
    }

    #[test]
    fn subsets() {
        subset::<(), (A, B), _>();
        subset::<(A,), (A, B), _>();
        subset::<(B, A), (A, B), _>();
        subset::<(C, A), (A, B, C), _>();
        subset::<(A, B, C), (C, B, A), _>();
    }
}
