//! Property tables.
//!
//! For every allocator type `T` and property set `P` that `T` declares,
//! [`Declares::TABLE`] is a constant with one entry per requested tag. The
//! table is packed when it is evaluated: value-bearing entries come first, in
//! request order, and markers are moved behind them where no lookup ever
//! reaches. A tag requested more than once keeps all of its entries; lookups
//! stop at the first one, and [`Tables::properties`] skips the rest.
//!
//! Nothing here is built at runtime. A reference binds `&'static` tables
//! that were fully evaluated by the compiler.

use core::{
    any::{type_name, TypeId},
    fmt::Debug,
    marker::PhantomData,
    mem,
    ptr::NonNull,
};

use crate::{
    allocator::{Allocator, AsyncAllocator},
    property::{get_property, HasProperty, Property},
    set::PropertySet,
    vtable::{AsyncDispatch, Dispatch},
};

/// One property of one allocator type, with the receiver erased.
#[derive(Clone, Copy)]
pub struct PropertyEntry {
    id: fn() -> TypeId,
    name: fn() -> &'static str,
    marker: bool,
    query: unsafe fn(NonNull<()>, NonNull<()>, NonNull<()>),
}
impl PropertyEntry {
    /// Creates the entry that answers `P` queries on a `T`.
    pub const fn of<T: HasProperty<P>, P: Property>() -> Self {
        Self {
            id: TypeId::of::<P>,
            name: type_name::<P>,
            marker: is_marker::<P>(),
            query: query::<T, P>,
        }
    }

    /// The identity of the property tag.
    pub fn id(&self) -> TypeId {
        (self.id)()
    }

    /// The name of the property tag.
    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    /// Whether the property is a marker.
    pub const fn is_marker(&self) -> bool {
        self.marker
    }

    /// Runs the query, writing a `P::Value` to `out`.
    ///
    /// # Safety
    /// `object` must point to a live instance of the type this entry was
    /// created for, `tag` must point to a `P` that is not used afterwards,
    /// and `out` must be valid for writing a `P::Value`.
    pub(crate) unsafe fn query(&self, object: NonNull<()>, tag: NonNull<()>, out: NonNull<()>) {
        unsafe { (self.query)(object, tag, out) }
    }
}
impl Debug for PropertyEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

const fn is_marker<P: Property>() -> bool {
    let marker = P::MARKER;
    let is_marker = marker.is_some();
    // `P::Value` may have a destructor, which cannot run in a constant.
    mem::forget(marker);
    is_marker
}

unsafe fn query<T: HasProperty<P>, P: Property>(
    object: NonNull<()>,
    tag: NonNull<()>,
    out: NonNull<()>,
) {
    let tag = unsafe { tag.cast::<P>().read() };
    let value = get_property(unsafe { object.cast::<T>().as_ref() }, tag);
    unsafe { out.cast::<P::Value>().write(value) }
}

/// The packed property entries of one allocator type and property set.
///
/// The first [`values`](PropertyTable::values) entries are the value-bearing
/// ones, in request order. Markers follow them.
pub struct PropertyTable<E: ?Sized = [PropertyEntry]> {
    values: usize,
    entries: E,
}
impl<const N: usize> PropertyTable<[PropertyEntry; N]> {
    pub(crate) const fn pack(mut entries: [PropertyEntry; N]) -> Self {
        let mut values = 0;
        let mut i = 0;
        while i < N {
            if !entries[i].marker {
                // Everything in `values..i` is a marker, so value order holds.
                let entry = entries[i];
                entries[i] = entries[values];
                entries[values] = entry;
                values += 1;
            }
            i += 1;
        }
        Self { values, entries }
    }
}
impl PropertyTable {
    /// Every entry, markers and repeated tags included.
    pub fn entries(&self) -> &[PropertyEntry] {
        &self.entries
    }

    /// The value-bearing entries, in request order. A repeated tag appears
    /// once per request.
    pub fn values(&self) -> &[PropertyEntry] {
        &self.entries[..self.values]
    }
}
impl Debug for PropertyTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.values()).finish()
    }
}

/// A type that declares every property in the set `P`.
///
/// Implemented for every type that implements [`HasProperty`] for each tag
/// of the tuple `P`.
pub trait Declares<P: PropertySet> {
    /// One entry per tag of `P`, packed.
    const TABLE: &'static PropertyTable;
}

macro_rules! impl_declares {
    ($($tag:ident),*) => {
        impl<T, $($tag),*> Declares<($($tag,)*)> for T
        where
            $($tag: Property, T: HasProperty<$tag>,)*
        {
            const TABLE: &'static PropertyTable =
                &PropertyTable::pack([$(PropertyEntry::of::<T, $tag>()),*]);
        }
    };
}

impl_declares!();
impl_declares!(P0);
impl_declares!(P0, P1);
impl_declares!(P0, P1, P2);
impl_declares!(P0, P1, P2, P3);
impl_declares!(P0, P1, P2, P3, P4);
impl_declares!(P0, P1, P2, P3, P4, P5);
impl_declares!(P0, P1, P2, P3, P4, P5, P6);
impl_declares!(P0, P1, P2, P3, P4, P5, P6, P7);

/// The dispatch and property tables of a synchronous reference.
pub struct Tables {
    pub(crate) dispatch: &'static Dispatch,
    pub(crate) properties: &'static PropertyTable,
}
impl Tables {
    /// Returns the tables for references to a `T` over the property set `P`.
    pub const fn of<T, P>() -> &'static Self
    where
        T: Allocator + Declares<P>,
        P: PropertySet,
    {
        Bind::<T, P>::TABLES
    }

    /// The dispatch table.
    pub fn dispatch(&self) -> &'static Dispatch {
        self.dispatch
    }

    /// The value-bearing properties, each tag once, in the order of its
    /// first request.
    pub fn properties(&self) -> impl Iterator<Item = &'static PropertyEntry> {
        let values = self.properties.values();
        values
            .iter()
            .enumerate()
            .filter(move |&(i, entry)| !values[..i].iter().any(|seen| seen.id() == entry.id()))
            .map(|(_, entry)| entry)
    }

    /// The packed property table, as declared.
    pub fn table(&self) -> &'static PropertyTable {
        self.properties
    }

    pub(crate) fn find(&self, id: TypeId) -> Option<&'static PropertyEntry> {
        self.properties.values().iter().find(|entry| entry.id() == id)
    }
}
impl Debug for Tables {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tables")
            .field("dispatch", self.dispatch)
            .field("properties", &self.properties)
            .finish()
    }
}

/// The dispatch and property tables of an asynchronous reference.
///
/// The synchronous tables point at the synchronous part of the asynchronous
/// dispatch table.
pub struct AsyncTables {
    pub(crate) tables: Tables,
    pub(crate) dispatch: &'static AsyncDispatch,
}
impl AsyncTables {
    /// Returns the tables for asynchronous references to a `T` over the
    /// property set `P`.
    pub const fn of<T, P>() -> &'static Self
    where
        T: AsyncAllocator + Declares<P>,
        P: PropertySet,
    {
        Bind::<T, P>::ASYNC_TABLES
    }

    /// The synchronous part of these tables.
    pub const fn as_sync(&self) -> &Tables {
        &self.tables
    }

    /// The asynchronous dispatch table.
    pub fn dispatch(&self) -> &'static AsyncDispatch {
        self.dispatch
    }
}
impl Debug for AsyncTables {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncTables")
            .field("dispatch", self.dispatch)
            .field("properties", &self.tables.properties)
            .finish()
    }
}

struct Bind<T, P>(PhantomData<(fn() -> T, P)>);
impl<T: Allocator + Declares<P>, P: PropertySet> Bind<T, P> {
    const TABLES: &'static Tables = &Tables {
        dispatch: Dispatch::of::<T>(),
        properties: <T as Declares<P>>::TABLE,
    };
}
impl<T: AsyncAllocator + Declares<P>, P: PropertySet> Bind<T, P> {
    const ASYNC_TABLES: &'static AsyncTables = &AsyncTables {
        tables: Tables {
            dispatch: AsyncDispatch::of::<T>().as_sync(),
            properties: <T as Declares<P>>::TABLE,
        },
        dispatch: AsyncDispatch::of::<T>(),
    };
}
