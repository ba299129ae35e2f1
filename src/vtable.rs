//! Dispatch tables.
//!
//! A dispatch table is a set of function pointers that forward the core
//! allocator operations to one concrete type, with the receiver erased to an
//! opaque pointer. There is one table per (type, allocation kind) pair. Tables
//! are constants, so each of them lives at a single `'static` address and is
//! never mutated.

use core::{
    any::{type_name, TypeId},
    fmt::Debug,
    marker::PhantomData,
    mem,
    ptr::NonNull,
};

use crate::{
    allocator::{Allocator, AsyncAllocator},
    error::Result,
    stream::StreamRef,
};

/// Dispatch table for the synchronous operations of an allocator.
pub struct Dispatch {
    pub(crate) id: fn() -> TypeId,
    pub(crate) name: fn() -> &'static str,
    pub(crate) allocate: unsafe fn(NonNull<()>, usize, usize) -> Result<NonNull<u8>>,
    pub(crate) deallocate: unsafe fn(NonNull<()>, NonNull<u8>, usize, usize),
    pub(crate) equal: unsafe fn(NonNull<()>, NonNull<()>) -> bool,
}
impl Dispatch {
    /// Returns the dispatch table for `T`.
    pub const fn of<T: Allocator>() -> &'static Self {
        Bind::<T>::DISPATCH
    }

    /// The identity of the allocator type this table dispatches to, with
    /// lifetimes erased.
    pub fn type_id(&self) -> TypeId {
        (self.id)()
    }

    /// The name of the allocator type this table dispatches to.
    pub fn type_name(&self) -> &'static str {
        (self.name)()
    }
}
impl Debug for Dispatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatch")
            .field("type", &self.type_name())
            .field("allocate", &(self.allocate as *const ()))
            .field("deallocate", &(self.deallocate as *const ()))
            .field("equal", &(self.equal as *const ()))
            .finish()
    }
}

/// Dispatch table for an allocator that also supports stream-ordered
/// operations.
///
/// The synchronous table is embedded, so an asynchronous reference can hand
/// it out as-is when it is converted to a synchronous one.
pub struct AsyncDispatch {
    pub(crate) sync: Dispatch,
    pub(crate) allocate_async:
        unsafe fn(NonNull<()>, usize, usize, StreamRef) -> Result<NonNull<u8>>,
    pub(crate) deallocate_async: unsafe fn(NonNull<()>, NonNull<u8>, usize, usize, StreamRef),
}
impl AsyncDispatch {
    /// Returns the asynchronous dispatch table for `T`.
    pub const fn of<T: AsyncAllocator>() -> &'static Self {
        Bind::<T>::ASYNC_DISPATCH
    }

    /// Returns the synchronous part of this table.
    pub const fn as_sync(&self) -> &Dispatch {
        &self.sync
    }
}
impl Debug for AsyncDispatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncDispatch")
            .field("sync", &self.sync)
            .field("allocate_async", &(self.allocate_async as *const ()))
            .field("deallocate_async", &(self.deallocate_async as *const ()))
            .finish()
    }
}

struct Bind<T>(PhantomData<T>);
impl<T: Allocator> Bind<T> {
    const DISPATCH: &'static Dispatch = &Dispatch {
        id: erased_type_id::<T>,
        name: type_name::<T>,
        allocate: allocate::<T>,
        deallocate: deallocate::<T>,
        equal: equal::<T>,
    };
}
impl<T: AsyncAllocator> Bind<T> {
    const ASYNC_DISPATCH: &'static AsyncDispatch = &AsyncDispatch {
        sync: Dispatch {
            id: erased_type_id::<T>,
            name: type_name::<T>,
            allocate: allocate::<T>,
            deallocate: deallocate::<T>,
            equal: equal::<T>,
        },
        allocate_async: allocate_async::<T>,
        deallocate_async: deallocate_async::<T>,
    };
}

/// `TypeId` of a type that may carry lifetimes.
///
/// Lifetimes do not exist at runtime, so two types that differ only in their
/// lifetimes get the same id.
fn erased_type_id<T: ?Sized>() -> TypeId {
    trait Erased {
        fn erased_id(&self) -> TypeId
        where
            Self: 'static;
    }
    impl<U: ?Sized> Erased for PhantomData<U> {
        fn erased_id(&self) -> TypeId
        where
            Self: 'static,
        {
            TypeId::of::<U>()
        }
    }

    let phantom = PhantomData::<T>;
    let erased: &dyn Erased = &phantom;
    // SAFETY: `Erased::erased_id` never looks at the value, only at `U`, and
    // `TypeId` does not depend on lifetimes.
    let erased = unsafe { mem::transmute::<&dyn Erased, &(dyn Erased + 'static)>(erased) };
    erased.erased_id()
}

// SAFETY (all functions below): `object` (and `other`) must point to a live
// `T`, which is guaranteed by the reference that owns the table.

unsafe fn allocate<T: Allocator>(
    object: NonNull<()>,
    bytes: usize,
    alignment: usize,
) -> Result<NonNull<u8>> {
    unsafe { object.cast::<T>().as_ref() }.allocate(bytes, alignment)
}

unsafe fn deallocate<T: Allocator>(
    object: NonNull<()>,
    ptr: NonNull<u8>,
    bytes: usize,
    alignment: usize,
) {
    unsafe { object.cast::<T>().as_ref().deallocate(ptr, bytes, alignment) }
}

unsafe fn equal<T: Allocator>(object: NonNull<()>, other: NonNull<()>) -> bool {
    unsafe { object.cast::<T>().as_ref() == other.cast::<T>().as_ref() }
}

unsafe fn allocate_async<T: AsyncAllocator>(
    object: NonNull<()>,
    bytes: usize,
    alignment: usize,
    stream: StreamRef,
) -> Result<NonNull<u8>> {
    unsafe { object.cast::<T>().as_ref() }.allocate_async(bytes, alignment, stream)
}

unsafe fn deallocate_async<T: AsyncAllocator>(
    object: NonNull<()>,
    ptr: NonNull<u8>,
    bytes: usize,
    alignment: usize,
    stream: StreamRef,
) {
    unsafe {
        object
            .cast::<T>()
            .as_ref()
            .deallocate_async(ptr, bytes, alignment, stream)
    }
}
