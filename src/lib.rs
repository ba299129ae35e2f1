#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, doc, feature = "std")), no_std)]
#![deny(missing_docs)]

use core::{
    any::TypeId,
    fmt::Debug,
    marker::PhantomData,
    mem::{ManuallyDrop, MaybeUninit},
    ptr::{self, NonNull},
};

#[doc(inline)]
pub use allocator::*;
#[doc(inline)]
pub use error::*;
#[doc(inline)]
pub use property::*;
#[doc(inline)]
pub use set::{Contains, PropertySet, SubsetOf};
#[doc(inline)]
pub use stream::*;
#[doc(inline)]
pub use table::{AsyncTables, Declares, PropertyEntry, PropertyTable, Tables};
#[doc(inline)]
pub use vtable::{AsyncDispatch, Dispatch};

pub mod allocator;
pub mod error;
pub mod property;
pub mod set;
pub mod stream;
pub mod table;
pub mod vtable;

/// A non-owning, type-erased reference to an allocator.
///
/// A `ResourceRef` can be built from a shared reference to any type that
/// implements [`Allocator`] and declares every property in `P` (see
/// [`HasProperty`]). It is two pointers wide: one to the allocator and one to
/// the static tables for the allocator's type. Copying a reference is free,
/// and dropping it does nothing.
///
/// # Usage
/// ```rust
/// # use core::ptr::NonNull;
/// use resource_ref::{Allocator, Error, HasProperty, Property, ResourceRef};
///
/// #[derive(Clone, Copy)]
/// struct Remaining;
/// impl Property for Remaining {
///     type Value = usize;
/// }
///
/// #[derive(PartialEq)]
/// struct Exhausted;
/// unsafe impl Allocator for Exhausted {
///     fn allocate(&self, _: usize, _: usize) -> resource_ref::Result<NonNull<u8>> {
///         Err(Error::OutOfMemory)
///     }
///     unsafe fn deallocate(&self, _: NonNull<u8>, _: usize, _: usize) {}
/// }
/// impl HasProperty<Remaining> for Exhausted {
///     fn get_property(&self, _: Remaining) -> usize {
///         0
///     }
/// }
///
/// let exhausted = Exhausted;
/// let resource = ResourceRef::<(Remaining,)>::new(&exhausted);
/// assert_eq!(resource.allocate(64, 8), Err(Error::OutOfMemory));
/// assert_eq!(resource.get_property(Remaining), 0);
/// ```
///
/// ## Properties
/// Only properties in `P` can be queried. The set is checked when the
/// reference is built, so a reference can never claim a property its
/// allocator does not declare.
///
/// ## Conversions
/// A reference can be [narrowed](ResourceRef::narrow) to any subset of its
/// properties. The narrowed reference points at the same allocator and keeps
/// using the same tables.
///
/// ## Equality
/// Two references are equal if they refer to allocators of the same type that
/// compare equal. References to allocators of different types are never
/// equal; their comparison never calls into either allocator.
///
/// ## Threads
/// A reference is neither [`Send`] nor [`Sync`], since it does not know
/// whether the allocator behind it is. Build one reference per thread from a
/// shared `&T` instead; construction is two pointer copies and never blocks.
///
/// ```rust,compile_fail
/// # use core::ptr::NonNull;
/// # use resource_ref::{Allocator, ResourceRef};
/// # #[derive(PartialEq)]
/// # struct Heap;
/// # unsafe impl Allocator for Heap {
/// #     fn allocate(&self, _: usize, _: usize) -> resource_ref::Result<NonNull<u8>> { todo!() }
/// #     unsafe fn deallocate(&self, _: NonNull<u8>, _: usize, _: usize) {}
/// # }
/// static HEAP: Heap = Heap;
/// let resource = ResourceRef::<()>::new(&HEAP);
/// std::thread::spawn(move || {
///     let _ = resource.allocate(8, 8);
/// });
/// ```
///
/// ## Rejected at compile time
/// Only allocators can be referenced:
/// ```rust,compile_fail
/// # use resource_ref::ResourceRef;
/// #[derive(PartialEq)]
/// struct NotAnAllocator;
/// let _ = ResourceRef::<()>::new(&NotAnAllocator);
/// ```
///
/// Every requested property must be declared:
/// ```rust,compile_fail
/// # use core::ptr::NonNull;
/// # use resource_ref::{Allocator, Property, ResourceRef};
/// # #[derive(PartialEq)]
/// # struct Heap;
/// # unsafe impl Allocator for Heap {
/// #     fn allocate(&self, _: usize, _: usize) -> resource_ref::Result<NonNull<u8>> { todo!() }
/// #     unsafe fn deallocate(&self, _: NonNull<u8>, _: usize, _: usize) {}
/// # }
/// #[derive(Clone, Copy)]
/// struct Capacity;
/// impl Property for Capacity {
///     type Value = usize;
/// }
/// let _ = ResourceRef::<(Capacity,)>::new(&Heap);
/// ```
///
/// Narrowing never widens:
/// ```rust,compile_fail
/// # use core::ptr::NonNull;
/// # use resource_ref::{Allocator, HasProperty, Property, ResourceRef};
/// # #[derive(PartialEq)]
/// # struct Heap;
/// # unsafe impl Allocator for Heap {
/// #     fn allocate(&self, _: usize, _: usize) -> resource_ref::Result<NonNull<u8>> { todo!() }
/// #     unsafe fn deallocate(&self, _: NonNull<u8>, _: usize, _: usize) {}
/// # }
/// # #[derive(Clone, Copy)]
/// # struct Capacity;
/// # impl Property for Capacity {
/// #     type Value = usize;
/// # }
/// # impl HasProperty<Capacity> for Heap {
/// #     fn get_property(&self, _: Capacity) -> usize { 0 }
/// # }
/// let resource = ResourceRef::<()>::new(&Heap);
/// let _: ResourceRef<'_, (Capacity,)> = resource.narrow();
/// ```
///
/// A property outside the set cannot be queried:
/// ```rust,compile_fail
/// # use core::ptr::NonNull;
/// # use resource_ref::{Allocator, HasProperty, Property, ResourceRef};
/// # #[derive(PartialEq)]
/// # struct Heap;
/// # unsafe impl Allocator for Heap {
/// #     fn allocate(&self, _: usize, _: usize) -> resource_ref::Result<NonNull<u8>> { todo!() }
/// #     unsafe fn deallocate(&self, _: NonNull<u8>, _: usize, _: usize) {}
/// # }
/// # #[derive(Clone, Copy)]
/// # struct Capacity;
/// # impl Property for Capacity {
/// #     type Value = usize;
/// # }
/// # impl HasProperty<Capacity> for Heap {
/// #     fn get_property(&self, _: Capacity) -> usize { 0 }
/// # }
/// let resource = ResourceRef::<()>::new(&Heap);
/// resource.get_property(Capacity);
/// ```
pub struct ResourceRef<'a, P: PropertySet = ()> {
    object: NonNull<()>,
    tables: &'static Tables,
    _marker: PhantomData<(&'a (), fn() -> P)>,
}
impl<'a, P: PropertySet> ResourceRef<'a, P> {
    /// Create a reference to `resource`.
    pub fn new<T>(resource: &'a T) -> Self
    where
        T: Allocator + Declares<P>,
    {
        Self {
            object: NonNull::from(resource).cast(),
            tables: Tables::of::<T, P>(),
            _marker: PhantomData,
        }
    }

    /// Allocate `bytes` bytes aligned to `alignment` from the referenced
    /// allocator.
    ///
    /// # Returns
    /// Whatever the referenced allocator returns, unchanged.
    pub fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
        unsafe { (self.tables.dispatch.allocate)(self.object, bytes, alignment) }
    }

    /// Free a block allocated from the referenced allocator.
    ///
    /// # Safety
    /// Follows the contract of [`Allocator::deallocate`] on the referenced
    /// allocator.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        unsafe { (self.tables.dispatch.deallocate)(self.object, ptr, bytes, alignment) }
    }

    /// Allocate `bytes` bytes aligned to [`DEFAULT_ALIGNMENT`].
    pub fn allocate_default(&self, bytes: usize) -> Result<NonNull<u8>> {
        self.allocate(bytes, DEFAULT_ALIGNMENT)
    }

    /// Free a block allocated with [`allocate_default`](Self::allocate_default).
    ///
    /// # Safety
    /// Same as [`deallocate`](Self::deallocate) with an alignment of
    /// [`DEFAULT_ALIGNMENT`].
    pub unsafe fn deallocate_default(&self, ptr: NonNull<u8>, bytes: usize) {
        unsafe { self.deallocate(ptr, bytes, DEFAULT_ALIGNMENT) }
    }

    /// Query `property` on the referenced allocator.
    ///
    /// Marker properties are answered without touching the allocator.
    pub fn get_property<Q, I>(&self, property: Q) -> Q::Value
    where
        Q: Property,
        P: Contains<Q, I>,
    {
        unsafe { query(self.object, self.tables, property) }
    }

    /// Convert to a reference over a subset of this reference's properties.
    pub fn narrow<Q, I>(self) -> ResourceRef<'a, Q>
    where
        Q: SubsetOf<P, I>,
    {
        ResourceRef {
            object: self.object,
            tables: self.tables,
            _marker: PhantomData,
        }
    }

    /// Compare with a reference over the same properties in a different
    /// order.
    ///
    /// Both sets must contain each other and have the same length; anything
    /// else does not compile:
    /// ```rust,compile_fail
    /// # use core::ptr::NonNull;
    /// # use resource_ref::{set::{Cons, Here, Nil}, Allocator, HasProperty, Property, ResourceRef};
    /// # #[derive(PartialEq)]
    /// # struct Heap;
    /// # unsafe impl Allocator for Heap {
    /// #     fn allocate(&self, _: usize, _: usize) -> resource_ref::Result<NonNull<u8>> { todo!() }
    /// #     unsafe fn deallocate(&self, _: NonNull<u8>, _: usize, _: usize) {}
    /// # }
    /// # #[derive(Clone, Copy)]
    /// # struct Capacity;
    /// # impl Property for Capacity {
    /// #     type Value = usize;
    /// # }
    /// # impl HasProperty<Capacity> for Heap {
    /// #     fn get_property(&self, _: Capacity) -> usize { 0 }
    /// # }
    /// let once = ResourceRef::<(Capacity,)>::new(&Heap);
    /// let twice = ResourceRef::<(Capacity, Capacity)>::new(&Heap);
    /// once.eq_ref::<_, Cons<Here, Cons<Here, Nil>>, Cons<Here, Nil>>(&twice);
    /// ```
    pub fn eq_ref<Q, I, J>(&self, other: &ResourceRef<'_, Q>) -> bool
    where
        Q: SubsetOf<P, I>,
        P: SubsetOf<Q, J>,
    {
        const {
            assert!(
                P::LEN == Q::LEN,
                "compared references must have property sets of the same length"
            )
        };
        equal(self.object, self.tables, other.object, other.tables)
    }

    /// The address of the referenced allocator.
    pub fn as_ptr(&self) -> NonNull<()> {
        self.object
    }

    /// The tables this reference dispatches through.
    pub fn tables(&self) -> &'static Tables {
        self.tables
    }

    /// Names of the value-bearing properties in `P`, in the order of their
    /// first request.
    ///
    /// A narrowed reference shares the table of the reference it was narrowed
    /// from; properties outside `P` are left out here.
    pub fn property_names(&self) -> impl Iterator<Item = &'static str> {
        visible::<P>(self.tables).map(PropertyEntry::name)
    }
}
impl<P: PropertySet> Clone for ResourceRef<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<P: PropertySet> Copy for ResourceRef<'_, P> {}
impl<'b, P: PropertySet> PartialEq<ResourceRef<'b, P>> for ResourceRef<'_, P> {
    fn eq(&self, other: &ResourceRef<'b, P>) -> bool {
        equal(self.object, self.tables, other.object, other.tables)
    }
}
impl<P: PropertySet> Debug for ResourceRef<'_, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceRef")
            .field("object", &self.object)
            .field("properties", &Visible::<P>::new(self.tables))
            .finish()
    }
}
impl<'a, P: PropertySet> From<AsyncResourceRef<'a, P>> for ResourceRef<'a, P> {
    fn from(resource: AsyncResourceRef<'a, P>) -> Self {
        resource.as_sync()
    }
}
unsafe impl<P: PropertySet> Allocator for ResourceRef<'_, P> {
    fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
        ResourceRef::allocate(self, bytes, alignment)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        unsafe { ResourceRef::deallocate(self, ptr, bytes, alignment) }
    }
}

/// A non-owning, type-erased reference to an allocator that supports
/// stream-ordered allocation.
///
/// Everything said about [`ResourceRef`] applies. In addition, the stream
/// passed to [`allocate_async`](Self::allocate_async) and
/// [`deallocate_async`](Self::deallocate_async) is handed to the allocator
/// unchanged; the reference adds no ordering of its own.
///
/// An asynchronous reference converts to a synchronous one over the same
/// properties through [`as_sync`](Self::as_sync) or [`From`]. The opposite
/// direction does not exist, since the allocator behind a synchronous
/// reference may not support streams. For the same reason, an allocator
/// that only implements [`Allocator`] cannot be referenced asynchronously:
/// ```rust,compile_fail
/// # use core::ptr::NonNull;
/// # use resource_ref::{Allocator, AsyncResourceRef};
/// #[derive(PartialEq)]
/// struct Heap;
/// unsafe impl Allocator for Heap {
///     fn allocate(&self, _: usize, _: usize) -> resource_ref::Result<NonNull<u8>> {
///         todo!()
///     }
///     unsafe fn deallocate(&self, _: NonNull<u8>, _: usize, _: usize) {}
/// }
/// let _ = AsyncResourceRef::<()>::new(&Heap);
/// ```
pub struct AsyncResourceRef<'a, P: PropertySet = ()> {
    object: NonNull<()>,
    tables: &'static AsyncTables,
    _marker: PhantomData<(&'a (), fn() -> P)>,
}
impl<'a, P: PropertySet> AsyncResourceRef<'a, P> {
    /// Create a reference to `resource`.
    pub fn new<T>(resource: &'a T) -> Self
    where
        T: AsyncAllocator + Declares<P>,
    {
        Self {
            object: NonNull::from(resource).cast(),
            tables: AsyncTables::of::<T, P>(),
            _marker: PhantomData,
        }
    }

    /// Allocate `bytes` bytes aligned to `alignment`, synchronously.
    pub fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
        self.as_sync().allocate(bytes, alignment)
    }

    /// Free a block, synchronously.
    ///
    /// # Safety
    /// Follows the contract of [`Allocator::deallocate`] on the referenced
    /// allocator.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        unsafe { self.as_sync().deallocate(ptr, bytes, alignment) }
    }

    /// Allocate `bytes` bytes aligned to [`DEFAULT_ALIGNMENT`], synchronously.
    pub fn allocate_default(&self, bytes: usize) -> Result<NonNull<u8>> {
        self.allocate(bytes, DEFAULT_ALIGNMENT)
    }

    /// Free a block allocated with [`allocate_default`](Self::allocate_default).
    ///
    /// # Safety
    /// Same as [`deallocate`](Self::deallocate) with an alignment of
    /// [`DEFAULT_ALIGNMENT`].
    pub unsafe fn deallocate_default(&self, ptr: NonNull<u8>, bytes: usize) {
        unsafe { self.deallocate(ptr, bytes, DEFAULT_ALIGNMENT) }
    }

    /// Allocate `bytes` bytes aligned to `alignment`, ordered on `stream`.
    pub fn allocate_async(
        &self,
        bytes: usize,
        alignment: usize,
        stream: StreamRef,
    ) -> Result<NonNull<u8>> {
        unsafe { (self.tables.dispatch.allocate_async)(self.object, bytes, alignment, stream) }
    }

    /// Free a block, ordered on `stream`.
    ///
    /// # Safety
    /// Follows the contract of [`AsyncAllocator::deallocate_async`] on the
    /// referenced allocator.
    pub unsafe fn deallocate_async(
        &self,
        ptr: NonNull<u8>,
        bytes: usize,
        alignment: usize,
        stream: StreamRef,
    ) {
        unsafe {
            (self.tables.dispatch.deallocate_async)(self.object, ptr, bytes, alignment, stream)
        }
    }

    /// Allocate `bytes` bytes aligned to [`DEFAULT_ALIGNMENT`], ordered on
    /// `stream`.
    pub fn allocate_async_default(&self, bytes: usize, stream: StreamRef) -> Result<NonNull<u8>> {
        self.allocate_async(bytes, DEFAULT_ALIGNMENT, stream)
    }

    /// Free a block allocated with
    /// [`allocate_async_default`](Self::allocate_async_default).
    ///
    /// # Safety
    /// Same as [`deallocate_async`](Self::deallocate_async) with an alignment
    /// of [`DEFAULT_ALIGNMENT`].
    pub unsafe fn deallocate_async_default(
        &self,
        ptr: NonNull<u8>,
        bytes: usize,
        stream: StreamRef,
    ) {
        unsafe { self.deallocate_async(ptr, bytes, DEFAULT_ALIGNMENT, stream) }
    }

    /// Query `property` on the referenced allocator.
    pub fn get_property<Q, I>(&self, property: Q) -> Q::Value
    where
        Q: Property,
        P: Contains<Q, I>,
    {
        unsafe { query(self.object, self.tables.as_sync(), property) }
    }

    /// Convert to a reference over a subset of this reference's properties.
    pub fn narrow<Q, I>(self) -> AsyncResourceRef<'a, Q>
    where
        Q: SubsetOf<P, I>,
    {
        AsyncResourceRef {
            object: self.object,
            tables: self.tables,
            _marker: PhantomData,
        }
    }

    /// Convert to a synchronous reference over the same properties.
    pub fn as_sync(&self) -> ResourceRef<'a, P> {
        ResourceRef {
            object: self.object,
            tables: self.tables.as_sync(),
            _marker: PhantomData,
        }
    }

    /// Compare with a reference over the same properties in a different
    /// order. See [`ResourceRef::eq_ref`].
    pub fn eq_ref<Q, I, J>(&self, other: &AsyncResourceRef<'_, Q>) -> bool
    where
        Q: SubsetOf<P, I>,
        P: SubsetOf<Q, J>,
    {
        self.as_sync().eq_ref(&other.as_sync())
    }

    /// The address of the referenced allocator.
    pub fn as_ptr(&self) -> NonNull<()> {
        self.object
    }

    /// The tables this reference dispatches through.
    pub fn tables(&self) -> &'static AsyncTables {
        self.tables
    }

    /// Names of the value-bearing properties in `P`. See
    /// [`ResourceRef::property_names`].
    pub fn property_names(&self) -> impl Iterator<Item = &'static str> {
        visible::<P>(self.tables.as_sync()).map(PropertyEntry::name)
    }
}
impl<P: PropertySet> Clone for AsyncResourceRef<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<P: PropertySet> Copy for AsyncResourceRef<'_, P> {}
impl<'b, P: PropertySet> PartialEq<AsyncResourceRef<'b, P>> for AsyncResourceRef<'_, P> {
    fn eq(&self, other: &AsyncResourceRef<'b, P>) -> bool {
        equal(
            self.object,
            self.tables.as_sync(),
            other.object,
            other.tables.as_sync(),
        )
    }
}
impl<P: PropertySet> Debug for AsyncResourceRef<'_, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncResourceRef")
            .field("object", &self.object)
            .field("properties", &Visible::<P>::new(self.tables.as_sync()))
            .finish()
    }
}
unsafe impl<P: PropertySet> Allocator for AsyncResourceRef<'_, P> {
    fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
        AsyncResourceRef::allocate(self, bytes, alignment)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        unsafe { AsyncResourceRef::deallocate(self, ptr, bytes, alignment) }
    }
}
unsafe impl<P: PropertySet> AsyncAllocator for AsyncResourceRef<'_, P> {
    fn allocate_async(
        &self,
        bytes: usize,
        alignment: usize,
        stream: StreamRef,
    ) -> Result<NonNull<u8>> {
        AsyncResourceRef::allocate_async(self, bytes, alignment, stream)
    }

    unsafe fn deallocate_async(
        &self,
        ptr: NonNull<u8>,
        bytes: usize,
        alignment: usize,
        stream: StreamRef,
    ) {
        unsafe { AsyncResourceRef::deallocate_async(self, ptr, bytes, alignment, stream) }
    }
}

/// # Safety
/// `object` must point to a live allocator of the type `tables` was built
/// for, and `tables` must have been built for a property set containing `Q`.
unsafe fn query<Q: Property>(object: NonNull<()>, tables: &Tables, property: Q) -> Q::Value {
    if let Some(value) = Q::MARKER {
        return value;
    }
    let Some(entry) = tables.find(TypeId::of::<Q>()) else {
        unreachable!("property table is missing a declared property");
    };
    let mut property = ManuallyDrop::new(property);
    let mut out = MaybeUninit::<Q::Value>::uninit();
    unsafe {
        entry.query(
            object,
            NonNull::from(&mut *property).cast(),
            NonNull::from(&mut out).cast(),
        );
        out.assume_init()
    }
}

fn equal(object: NonNull<()>, tables: &Tables, other: NonNull<()>, other_tables: &Tables) -> bool {
    let (this, that) = (tables.dispatch, other_tables.dispatch);
    if !ptr::fn_addr_eq(this.equal, that.equal) {
        return false;
    }
    // The comparator may only see two objects of its own type. Identical
    // functions of distinct types can be merged to one address.
    if this.type_id() != that.type_id() {
        log::debug!(
            "equality functions of {} and {} share an address",
            this.type_name(),
            that.type_name()
        );
        return false;
    }
    unsafe { (this.equal)(object, other) }
}

/// The value-bearing entries of `tables` that are in `P`.
fn visible<P: PropertySet>(tables: &'static Tables) -> impl Iterator<Item = &'static PropertyEntry> {
    tables
        .properties()
        .filter(|entry| P::IDS.iter().any(|id| id() == entry.id()))
}

struct Visible<P> {
    tables: &'static Tables,
    _marker: PhantomData<fn() -> P>,
}
impl<P: PropertySet> Visible<P> {
    fn new(tables: &'static Tables) -> Self {
        Self {
            tables,
            _marker: PhantomData,
        }
    }
}
impl<P: PropertySet> Debug for Visible<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(visible::<P>(self.tables)).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::alloc::{alloc, dealloc, Layout};

    use portable_atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::set::{Here, There};

    /// Counts the bytes it currently has allocated. Compares by identity.
    struct Counting {
        allocated: AtomicUsize,
    }
    impl Counting {
        fn new() -> Self {
            Self {
                allocated: AtomicUsize::new(0),
            }
        }

        fn allocated(&self) -> usize {
            self.allocated.load(Ordering::Relaxed)
        }
    }
    impl PartialEq for Counting {
        fn eq(&self, other: &Self) -> bool {
            ptr::eq(self, other)
        }
    }
    unsafe impl Allocator for Counting {
        fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
            let layout =
                Layout::from_size_align(bytes, alignment).map_err(|_| Error::InvalidAlignment)?;
            if layout.size() == 0 {
                return Err(Error::ZeroSize);
            }
            let ptr = NonNull::new(unsafe { alloc(layout) }).ok_or(Error::OutOfMemory)?;
            self.allocated.fetch_add(bytes, Ordering::Relaxed);
            Ok(ptr)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
            self.allocated.fetch_sub(bytes, Ordering::Relaxed);
            unsafe { dealloc(ptr.as_ptr(), Layout::from_size_align_unchecked(bytes, alignment)) }
        }
    }
    unsafe impl AsyncAllocator for Counting {
        fn allocate_async(
            &self,
            bytes: usize,
            alignment: usize,
            stream: StreamRef,
        ) -> Result<NonNull<u8>> {
            if stream != StreamRef::DEFAULT {
                return Err(Error::Unsupported);
            }
            self.allocate(bytes, alignment)
        }

        unsafe fn deallocate_async(
            &self,
            ptr: NonNull<u8>,
            bytes: usize,
            alignment: usize,
            _stream: StreamRef,
        ) {
            unsafe { self.deallocate(ptr, bytes, alignment) }
        }
    }

    #[derive(Clone, Copy)]
    struct Tag;
    impl Property for Tag {
        type Value = i32;
    }

    #[derive(Clone, Copy)]
    struct Allocated;
    impl Property for Allocated {
        type Value = usize;
    }

    #[derive(Clone, Copy)]
    struct Host;
    impl Property for Host {
        type Value = ();
        const MARKER: Option<()> = Some(());
    }

    impl HasProperty<Tag> for Counting {
        fn get_property(&self, _: Tag) -> i32 {
            42
        }
    }
    impl HasProperty<Allocated> for Counting {
        fn get_property(&self, _: Allocated) -> usize {
            self.allocated()
        }
    }
    impl HasProperty<Host> for Counting {
        fn get_property(&self, _: Host) {}
    }

    /// Same shape as `Counting`'s counter, but a different type.
    #[derive(PartialEq)]
    struct Plain(usize);
    unsafe impl Allocator for Plain {
        fn allocate(&self, _bytes: usize, _alignment: usize) -> Result<NonNull<u8>> {
            Err(Error::Other("plain"))
        }
        unsafe fn deallocate(&self, _ptr: NonNull<u8>, _bytes: usize, _alignment: usize) {}
    }

    #[derive(PartialEq)]
    struct Twin(usize);
    unsafe impl Allocator for Twin {
        fn allocate(&self, _bytes: usize, _alignment: usize) -> Result<NonNull<u8>> {
            Err(Error::Other("twin"))
        }
        unsafe fn deallocate(&self, _ptr: NonNull<u8>, _bytes: usize, _alignment: usize) {}
    }

    /// Logs nothing, but wraps an upstream and forwards its properties.
    struct Wrapper<'a, U> {
        upstream: &'a U,
        calls: AtomicUsize,
    }
    impl<U> PartialEq for Wrapper<'_, U> {
        fn eq(&self, other: &Self) -> bool {
            ptr::eq(self.upstream, other.upstream)
        }
    }
    unsafe impl<U: Allocator> Allocator for Wrapper<'_, U> {
        fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.upstream.allocate(bytes, alignment)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
            self.calls.fetch_add(1, Ordering::Relaxed);
            unsafe { self.upstream.deallocate(ptr, bytes, alignment) }
        }
    }
    impl<U> Upstream for Wrapper<'_, U> {
        type Resource = U;
        fn upstream(&self) -> &U {
            self.upstream
        }
    }
    impl<U> ForwardProperties for Wrapper<'_, U> {}

    #[test]
    fn counting_round_trip() {
        let counting = Counting::new();
        let resource = ResourceRef::<()>::new(&counting);
        let ptr = resource.allocate(64, 8).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 8, 0);
        assert_eq!(counting.allocated(), 64);
        unsafe { resource.deallocate(ptr, 64, 8) };
        assert_eq!(counting.allocated(), 0);

        let other = Counting::new();
        assert_eq!(other.allocated(), counting.allocated());
        assert_ne!(resource, ResourceRef::<()>::new(&other));
    }

    #[test]
    fn forwards_results_unchanged() {
        let counting = Counting::new();
        let resource = ResourceRef::<()>::new(&counting);
        assert_eq!(resource.allocate(64, 3), counting.allocate(64, 3));
        assert_eq!(resource.allocate(0, 8), Err(Error::ZeroSize));
        assert_eq!(
            ResourceRef::<()>::new(&Plain(0)).allocate(8, 8),
            Err(Error::Other("plain"))
        );
    }

    #[test]
    fn default_alignment() {
        let counting = Counting::new();
        let resource = ResourceRef::<()>::new(&counting);
        let ptr = resource.allocate_default(24).unwrap();
        assert_eq!(ptr.as_ptr() as usize % DEFAULT_ALIGNMENT, 0);
        unsafe { resource.deallocate_default(ptr, 24) };
        assert_eq!(counting.allocated(), 0);
    }

    #[test]
    fn equality_is_reflexive_and_symmetric() {
        let counting = Counting::new();
        let a = ResourceRef::<(Tag,)>::new(&counting);
        let b = ResourceRef::<(Tag,)>::new(&counting);
        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);

        let other = Counting::new();
        let c = ResourceRef::<(Tag,)>::new(&other);
        assert_ne!(a, c);
        assert_ne!(c, a);
    }

    #[test]
    fn different_types_are_never_equal() {
        let plain = Plain(7);
        let twin = Twin(7);
        let a = ResourceRef::<()>::new(&plain);
        let b = ResourceRef::<()>::new(&twin);
        assert_ne!(a, b);
        assert_ne!(b, a);
        assert_eq!(a, ResourceRef::<()>::new(&Plain(7)));
    }

    #[test]
    fn property_round_trip() {
        let counting = Counting::new();
        let resource = ResourceRef::<(Tag, Allocated, Host)>::new(&counting);
        assert_eq!(resource.get_property(Tag), get_property(&counting, Tag));
        assert_eq!(resource.get_property(Tag), 42);
        resource.get_property(Host);

        let ptr = resource.allocate(16, 16).unwrap();
        assert_eq!(resource.get_property(Allocated), 16);
        unsafe { resource.deallocate(ptr, 16, 16) };
        assert_eq!(resource.get_property(Allocated), 0);
    }

    #[test]
    fn duplicates_collapse_and_markers_vanish() {
        let counting = Counting::new();
        let resource = ResourceRef::<(Tag, Tag, Host)>::new(&counting);
        let names: Vec<_> = resource.property_names().collect();
        assert_eq!(names, [core::any::type_name::<Tag>()]);
    }

    #[test]
    fn narrowing_keeps_identity() {
        let counting = Counting::new();
        let wide = ResourceRef::<(Allocated, Host, Tag)>::new(&counting);
        let narrow: ResourceRef<'_, (Tag,)> = wide.narrow();
        assert_eq!(narrow.as_ptr(), wide.as_ptr());
        assert_eq!(narrow.get_property(Tag), wide.get_property(Tag));
        assert!(ptr::eq(narrow.tables(), wide.tables()));

        let empty: ResourceRef<'_> = narrow.narrow();
        assert_eq!(empty, ResourceRef::<()>::new(&counting));
    }

    #[test]
    fn narrowed_references_only_show_their_properties() {
        let counting = Counting::new();
        let wide = ResourceRef::<(Tag, Allocated, Host)>::new(&counting);
        let narrow: ResourceRef<'_, (Allocated,)> = wide.narrow();
        let names: Vec<_> = narrow.property_names().collect();
        assert_eq!(names, [core::any::type_name::<Allocated>()]);
        assert_eq!(wide.property_names().count(), 2);

        let debug = std::format!("{narrow:?}");
        assert!(debug.contains("Allocated"));
        assert!(!debug.contains("Tag"));

        let async_wide = AsyncResourceRef::<(Tag, Allocated)>::new(&counting);
        let async_narrow: AsyncResourceRef<'_, (Tag,)> = async_wide.narrow();
        let names: Vec<_> = async_narrow.property_names().collect();
        assert_eq!(names, [core::any::type_name::<Tag>()]);
    }

    #[test]
    fn duplicated_tags_are_queried_by_position() {
        let counting = Counting::new();
        let resource = ResourceRef::<(Tag, Allocated, Tag)>::new(&counting);
        assert_eq!(resource.get_property::<Tag, Here>(Tag), 42);
        assert_eq!(resource.get_property::<Tag, There<There<Here>>>(Tag), 42);
        assert_eq!(resource.get_property(Allocated), 0);
    }

    #[test]
    fn construction_never_blocks() {
        let counting = Counting::new();
        let counting = &counting;
        let answers = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        for _ in 0..1000 {
                            let resource = ResourceRef::<(Tag, Host)>::new(counting);
                            let ptr = resource.allocate(8, 8).unwrap();
                            unsafe { resource.deallocate(ptr, 8, 8) };
                        }
                        ResourceRef::<(Tag, Host)>::new(counting).get_property(Tag)
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .collect::<Vec<_>>()
        });
        assert_eq!(answers, [42; 8]);
        assert_eq!(counting.allocated(), 0);
    }

    #[test]
    fn reordered_sets_compare() {
        let counting = Counting::new();
        let a = ResourceRef::<(Tag, Host)>::new(&counting);
        let b = ResourceRef::<(Host, Tag)>::new(&counting);
        assert!(a.eq_ref(&b));
        assert!(b.eq_ref(&a));

        let other = Counting::new();
        assert!(!a.eq_ref(&ResourceRef::<(Host, Tag)>::new(&other)));
    }

    #[test]
    fn async_passes_stream_through() {
        let counting = Counting::new();
        let resource = AsyncResourceRef::<(Tag,)>::new(&counting);
        let ptr = resource.allocate_async(32, 8, StreamRef::DEFAULT).unwrap();
        assert_eq!(counting.allocated(), 32);
        unsafe { resource.deallocate_async(ptr, 32, 8, StreamRef::DEFAULT) };
        assert_eq!(counting.allocated(), 0);

        assert_eq!(
            resource.allocate_async_default(32, StreamRef::from_raw(3)),
            Err(Error::Unsupported)
        );
        assert_eq!(resource.get_property(Tag), 42);
    }

    #[test]
    fn async_converts_to_sync() {
        let counting = Counting::new();
        let resource = AsyncResourceRef::<(Tag, Host)>::new(&counting);
        let sync: ResourceRef<'_, (Tag, Host)> = resource.into();
        assert_eq!(sync, ResourceRef::<(Tag, Host)>::new(&counting));
        assert_eq!(sync.get_property(Tag), 42);

        let narrowed: AsyncResourceRef<'_, (Host,)> = resource.narrow();
        assert_eq!(narrowed.as_sync(), ResourceRef::<(Host,)>::new(&counting));
        assert_eq!(narrowed, AsyncResourceRef::<(Host,)>::new(&counting));
    }

    #[test]
    fn references_are_allocators() {
        let counting = Counting::new();
        let inner = ResourceRef::<()>::new(&counting);
        let outer = ResourceRef::<()>::new(&inner);
        let ptr = outer.allocate(8, 8).unwrap();
        assert_eq!(counting.allocated(), 8);
        unsafe { outer.deallocate(ptr, 8, 8) };
        assert_eq!(counting.allocated(), 0);

        let async_inner = AsyncResourceRef::<()>::new(&counting);
        let async_outer = AsyncResourceRef::<()>::new(&async_inner);
        let ptr = async_outer
            .allocate_async_default(8, StreamRef::DEFAULT)
            .unwrap();
        unsafe { async_outer.deallocate_async_default(ptr, 8, StreamRef::DEFAULT) };
        assert_eq!(counting.allocated(), 0);
    }

    #[test]
    fn wrappers_forward_properties() {
        let counting = Counting::new();
        let wrapper = Wrapper {
            upstream: &counting,
            calls: AtomicUsize::new(0),
        };
        let resource = ResourceRef::<(Tag, Allocated)>::new(&wrapper);
        let ptr = resource.allocate(48, 8).unwrap();
        assert_eq!(resource.get_property(Allocated), 48);
        assert_eq!(resource.get_property(Tag), 42);
        unsafe { resource.deallocate(ptr, 48, 8) };
        assert_eq!(wrapper.calls.load(Ordering::Relaxed), 2);

        assert_ne!(
            ResourceRef::<()>::new(&wrapper),
            ResourceRef::<()>::new(&counting)
        );
    }

    #[test]
    fn references_are_copies() {
        let counting = Counting::new();
        let a = ResourceRef::<(Tag,)>::new(&counting);
        let b = a;
        assert!([a, b].iter().all(|r| *r == a));
        assert_eq!(
            core::mem::size_of::<ResourceRef<'_, (Tag,)>>(),
            2 * core::mem::size_of::<usize>()
        );
    }

    #[test]
    fn debug_lists_properties() {
        let counting = Counting::new();
        let resource = ResourceRef::<(Tag, Host)>::new(&counting);
        let debug = std::format!("{resource:?}");
        assert!(debug.contains("ResourceRef"));
        assert!(debug.contains("Tag"));
        assert!(!debug.contains("Host"));
    }
}
