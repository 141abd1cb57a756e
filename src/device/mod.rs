//! Device context seam
//!
//! The allocators in this crate sit on top of a narrow slice of a GPU API:
//! memory-class enumeration, raw block allocation, host mapping, short-lived
//! command recording and fences. [`DeviceContext`] captures exactly that
//! slice so the allocators stay testable and API-agnostic; the real engine
//! backs it with its Vulkan device, tests use [`software::SoftwareDevice`].
//!
//! Every fallible method returns [`MemResult`]; a failing device call is
//! wrapped as [`GfxMemError::DeviceApi`] and propagated with `?`. Callers do
//! not recover from device failures.

use core::ptr::NonNull;

use crate::error::MemResult;

pub mod software;

pub use software::SoftwareDevice;

/// Description of one device memory class (Vulkan memory type analogue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryClass {
    /// Memory lives on the device and is fast to access from shaders.
    pub device_local: bool,
    /// Memory can be mapped into the host address space.
    pub host_visible: bool,
    /// Total size of the backing heap in bytes.
    pub total_size: u64,
}

/// Opaque identifier for one device memory block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryBlockId(pub(crate) u64);

impl MemoryBlockId {
    /// Raw id value, for logging and external bookkeeping.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque identifier for a short-lived command recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandListId(pub(crate) u64);

impl CommandListId {
    /// Raw id value.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque identifier for a completion fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceId(pub(crate) u64);

impl FenceId {
    /// Raw id value.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// The device facilities consumed by the allocators.
///
/// Implementations are single-threaded collaborators: no method is required
/// to be re-entrant and interior mutability is the implementation's concern.
pub trait DeviceContext {
    /// Available memory classes, in index order.
    fn memory_classes(&self) -> Vec<MemoryClass>;

    /// Allocate one backing memory block from the given class.
    fn allocate_block(&self, memory_class: usize, size: u64) -> MemResult<MemoryBlockId>;

    /// Release a block previously returned by [`allocate_block`].
    ///
    /// [`allocate_block`]: DeviceContext::allocate_block
    fn free_block(&self, block: MemoryBlockId) -> MemResult<()>;

    /// Map a host-visible block into the host address space.
    ///
    /// The pointer stays valid until the block is freed.
    fn map_block(&self, block: MemoryBlockId) -> MemResult<NonNull<u8>>;

    /// Begin a short-lived command recording.
    fn begin_commands(&self) -> MemResult<CommandListId>;

    /// End and submit a command recording, signaling `fence` on completion.
    ///
    /// Consumes the command list; it must not be used again.
    fn submit_commands(&self, commands: CommandListId, fence: FenceId) -> MemResult<()>;

    /// Create an unsignaled fence.
    fn create_fence(&self) -> MemResult<FenceId>;

    /// Block until `fence` is signaled, then reset it to unsignaled.
    fn wait_fence(&self, fence: FenceId) -> MemResult<()>;

    /// Destroy a fence. Must not be in flight.
    fn destroy_fence(&self, fence: FenceId) -> MemResult<()>;
}
