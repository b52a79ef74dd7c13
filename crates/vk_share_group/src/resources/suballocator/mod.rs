//! Virtual block suballocation
//!
//! A virtual block hands out offset ranges inside a region without touching
//! any memory itself. Each backing buffer in a pool owns one virtual block
//! running one of two algorithms:
//!
//! - **Buddy**: sizes rounded up to a power of two. Fast, at the cost of
//!   internal fragmentation, so it is only used for small requests.
//! - **General**: best-fit over a free-range list. Slower, but only the
//!   alignment padding is wasted.

pub mod buddy;
pub mod general;

use ash::vk;

pub use buddy::BuddyBlock;
pub use general::GeneralBlock;

/// Suballocation algorithm used by a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SuballocationAlgorithm {
    /// Power-of-two block splitting
    Buddy,
    /// Best-fit free list
    General,
}

impl SuballocationAlgorithm {
    /// Position in per-algorithm tables
    pub fn index(self) -> usize {
        match self {
            Self::Buddy => 0,
            Self::General => 1,
        }
    }
}

/// A range handed out by a virtual block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAllocation {
    /// Offset from the start of the block
    pub offset: vk::DeviceSize,
    /// Requested size
    pub size: vk::DeviceSize,
    /// Algorithm-specific bookkeeping
    pub(crate) handle: u32,
}

/// Virtual block running either algorithm
#[derive(Debug)]
pub enum VirtualBlock {
    /// Buddy algorithm block
    Buddy(BuddyBlock),
    /// General algorithm block
    General(GeneralBlock),
}

impl VirtualBlock {
    /// Create a block of `size` bytes
    ///
    /// Buddy blocks require a power-of-two size of at least
    /// [`BuddyBlock::MIN_NODE_SIZE`].
    pub fn new(algorithm: SuballocationAlgorithm, size: vk::DeviceSize) -> Self {
        match algorithm {
            SuballocationAlgorithm::Buddy => Self::Buddy(BuddyBlock::new(size)),
            SuballocationAlgorithm::General => Self::General(GeneralBlock::new(size)),
        }
    }

    /// Algorithm this block runs
    pub fn algorithm(&self) -> SuballocationAlgorithm {
        match self {
            Self::Buddy(_) => SuballocationAlgorithm::Buddy,
            Self::General(_) => SuballocationAlgorithm::General,
        }
    }

    /// Carve out `size` bytes at `alignment`, or `None` if nothing fits
    pub fn allocate(&mut self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> Option<VirtualAllocation> {
        match self {
            Self::Buddy(block) => block.allocate(size, alignment),
            Self::General(block) => block.allocate(size, alignment),
        }
    }

    /// Return a range produced by [`VirtualBlock::allocate`] on this block
    pub fn free(&mut self, allocation: &VirtualAllocation) {
        match self {
            Self::Buddy(block) => block.free(allocation),
            Self::General(block) => block.free(allocation),
        }
    }

    /// Total block size
    pub fn size(&self) -> vk::DeviceSize {
        match self {
            Self::Buddy(block) => block.size(),
            Self::General(block) => block.size(),
        }
    }

    /// Bytes not covered by any live allocation
    pub fn free_size(&self) -> vk::DeviceSize {
        match self {
            Self::Buddy(block) => block.free_size(),
            Self::General(block) => block.free_size(),
        }
    }

    /// Number of live allocations
    pub fn allocation_count(&self) -> usize {
        match self {
            Self::Buddy(block) => block.allocation_count(),
            Self::General(block) => block.allocation_count(),
        }
    }

    /// Whether no allocation is live
    pub fn is_empty(&self) -> bool {
        self.allocation_count() == 0
    }
}

pub(crate) fn align_up(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
