//! Execution stream tokens.

/// An opaque, copyable handle to an execution stream.
///
/// Stream-ordered allocators use the stream to order an allocation or
/// deallocation relative to other work submitted to it. References never
/// look inside a `StreamRef`; they pass it through to the wrapped allocator
/// unchanged.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Default)]
pub struct StreamRef {
    handle: usize,
}
impl StreamRef {
    /// The default stream of the execution context.
    pub const DEFAULT: Self = Self { handle: 0 };

    /// Wraps a raw stream handle.
    pub const fn from_raw(handle: usize) -> Self {
        Self { handle }
    }

    /// Returns the raw stream handle.
    pub const fn as_raw(self) -> usize {
        self.handle
    }
}
