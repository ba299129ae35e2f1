//! Properties: optional, statically declared capabilities of an allocator.
//!
//! A property is a tag type implementing [`Property`]. An allocator declares
//! that it has the property by implementing [`HasProperty`] for the tag.
//! There are two kinds of tags:
//! - **markers** carry no data. Their presence alone is the information, so a
//!   reference never stores anything for them. A marker sets
//!   [`Property::MARKER`] to the (usually unit) answer every query returns.
//! - **value-bearing** properties answer queries with a value computed by the
//!   allocator, for example its maximum alignment.
//!
//! ```rust
//! use resource_ref::{HasProperty, Property};
//!
//! #[derive(Clone, Copy)]
//! struct HostAccessible;
//! impl Property for HostAccessible {
//!     type Value = ();
//!     const MARKER: Option<()> = Some(());
//! }
//!
//! #[derive(Clone, Copy)]
//! struct MaxAlignment;
//! impl Property for MaxAlignment {
//!     type Value = usize;
//! }
//!
//! struct Heap;
//! impl HasProperty<HostAccessible> for Heap {
//!     fn get_property(&self, _: HostAccessible) {}
//! }
//! impl HasProperty<MaxAlignment> for Heap {
//!     fn get_property(&self, _: MaxAlignment) -> usize {
//!         4096
//!     }
//! }
//!
//! assert_eq!(resource_ref::get_property(&Heap, MaxAlignment), 4096);
//! ```

/// A property tag.
pub trait Property: 'static {
    /// The type of value a query for this property returns. Markers use `()`.
    type Value;

    /// The statically known answer of a marker property, or `None` if the
    /// property is value-bearing.
    ///
    /// Markers are never stored in a property table. A reference answers
    /// queries for them with this value without calling into the allocator.
    const MARKER: Option<Self::Value> = None;
}

/// Declares that a resource has the property `P`.
pub trait HasProperty<P: Property> {
    /// Query the value of `property` on this resource.
    fn get_property(&self, property: P) -> P::Value;
}

/// Query `property` on `resource`.
///
/// This is the single entry point every property query goes through,
/// whether it comes directly from user code or from a reference's property
/// table.
pub fn get_property<R, P>(resource: &R, property: P) -> P::Value
where
    R: HasProperty<P> + ?Sized,
    P: Property,
{
    resource.get_property(property)
}

/// A resource that wraps another one.
///
/// Implementing this trait on its own only exposes the upstream resource. It
/// lets the wrapper forward single properties through [`forward_property`]
/// while implementing others itself. To forward every property the upstream
/// declares, also implement [`ForwardProperties`].
pub trait Upstream {
    /// The type of the wrapped resource.
    type Resource: ?Sized;

    /// Returns the wrapped resource.
    fn upstream(&self) -> &Self::Resource;
}

/// Opt-in: the wrapper declares every property its upstream declares, and
/// answers queries for them by asking the upstream.
///
/// A wrapper that implements this trait cannot implement [`HasProperty`]
/// itself. Wrappers that need to answer some properties on their own should
/// only implement [`Upstream`] and use [`forward_property`] for the rest.
///
/// ```rust
/// use resource_ref::{ForwardProperties, HasProperty, Property, Upstream};
///
/// #[derive(Clone, Copy)]
/// struct Capacity;
/// impl Property for Capacity {
///     type Value = usize;
/// }
///
/// struct Arena;
/// impl HasProperty<Capacity> for Arena {
///     fn get_property(&self, _: Capacity) -> usize {
///         1 << 20
///     }
/// }
///
/// struct Logging<'a>(&'a Arena);
/// impl Upstream for Logging<'_> {
///     type Resource = Arena;
///     fn upstream(&self) -> &Arena {
///         self.0
///     }
/// }
/// impl ForwardProperties for Logging<'_> {}
///
/// let arena = Arena;
/// assert_eq!(resource_ref::get_property(&Logging(&arena), Capacity), 1 << 20);
/// ```
pub trait ForwardProperties: Upstream {}

impl<W, P> HasProperty<P> for W
where
    W: ForwardProperties,
    W::Resource: HasProperty<P>,
    P: Property,
{
    fn get_property(&self, property: P) -> P::Value {
        forward_property(self, property)
    }
}

/// Answer a query for `property` on `wrapper` by asking its upstream.
pub fn forward_property<W, P>(wrapper: &W, property: P) -> P::Value
where
    W: Upstream + ?Sized,
    W::Resource: HasProperty<P>,
    P: Property,
{
    get_property(wrapper.upstream(), property)
}
