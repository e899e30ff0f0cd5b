use std::alloc::Layout;
use std::fmt::Debug;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use allocator_api2::alloc::{AllocError, Allocator, Global};

/// An owned node living in memory of the allocator `A`.
pub type NodeBox<T, A> = allocator_api2::boxed::Box<T, A>;

/// Where node storage puts its nodes.
///
/// Any [`Allocator`] that can be shared between the tables of a context
/// qualifies. Nodes are allocated with [`NodeBox::new_in`] and released
/// through the same allocator when they are dropped. Two allocators compare
/// equal when memory allocated by one may be released through the other.
pub trait NodeAllocator: Allocator + Clone + PartialEq + Debug + Send + Sync + 'static {}

impl<A: Allocator + Clone + PartialEq + Debug + Send + Sync + 'static> NodeAllocator for A {}

/// Plain heap allocation through the global allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapAllocator;

unsafe impl Allocator for HeapAllocator {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        Global.allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { Global.deallocate(ptr, layout) }
    }
}

/// Heap allocation that keeps track of how many blocks are alive.
///
/// Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct CountingAllocator {
    live: Arc<AtomicUsize>,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes allocated and not yet deallocated.
    pub fn live_nodes(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl PartialEq for CountingAllocator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.live, &other.live)
    }
}

unsafe impl Allocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let block = Global.allocate(layout)?;
        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(block)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        unsafe { Global.deallocate(ptr, layout) }
    }
}
