//! Allocation-related traits
//!
//! These are the capability contracts a type has to satisfy before it can be
//! wrapped by a [`ResourceRef`](crate::ResourceRef) or an
//! [`AsyncResourceRef`](crate::AsyncResourceRef). Nothing else is required:
//! the allocator does not have to derive from or embed anything provided by
//! this crate.

use core::ptr::NonNull;

use crate::{error::Result, stream::StreamRef};

/// The alignment used by the `*_default` allocation functions.
///
/// This matches the alignment of `max_align_t` on common 64-bit targets.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// A generic memory allocator.
///
/// # Implementing
/// In order to implement this trait, you must implement both
/// [`allocate`](Allocator::allocate) and [`deallocate`](Allocator::deallocate),
/// as well as [`PartialEq`]. Two allocators must compare equal only if memory
/// allocated by one can be deallocated by the other. Equality does not have
/// to be structural: an allocator that owns distinct state per instance will
/// usually compare by identity.
///
/// Failures are reported through [`Error`](crate::error::Error). Anything
/// returned here reaches the caller of a reference exactly as it was
/// produced.
///
/// # Safety
/// A successful [`allocate`](Allocator::allocate) must return a block of at
/// least `bytes` bytes aligned to `alignment`, which stays valid until it is
/// passed to [`deallocate`](Allocator::deallocate) on this allocator or on
/// one that compares equal to it.
pub unsafe trait Allocator: PartialEq {
    /// Allocate a block of `bytes` bytes aligned to `alignment`.
    fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>>;
    /// Free a block previously returned from [`allocate`](Allocator::allocate).
    ///
    /// # Safety
    /// `ptr` must have been allocated by this allocator (or an equal one) with
    /// the same `bytes` and `alignment`, and must not have been freed yet.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize);
}

/// An allocator that can additionally order its operations on an execution
/// stream.
///
/// # Safety
/// Same as [`Allocator`]. In addition, a block returned from
/// [`allocate_async`](AsyncAllocator::allocate_async) may only be used by work
/// ordered after the allocation on `stream`.
pub unsafe trait AsyncAllocator: Allocator {
    /// Allocate a block of `bytes` bytes aligned to `alignment`, ordered on
    /// `stream`.
    fn allocate_async(
        &self,
        bytes: usize,
        alignment: usize,
        stream: StreamRef,
    ) -> Result<NonNull<u8>>;
    /// Free a block, ordered on `stream`.
    ///
    /// # Safety
    /// Follows the contract of [`Allocator::deallocate`]. Additionally, no
    /// work that is not ordered before the deallocation on `stream` may still
    /// use the block.
    unsafe fn deallocate_async(
        &self,
        ptr: NonNull<u8>,
        bytes: usize,
        alignment: usize,
        stream: StreamRef,
    );
}
