//! Generation-counted handle tables
//!
//! A [`HandleTable`] is a slot map: a dense slot array, a free-index stack
//! and per-slot generation counters. Callers hold `{index, generation}`
//! handles instead of references, so a handle captured before its resource
//! was removed can never alias a later resource placed in the same slot —
//! the generation check catches it as [`GfxMemError::StaleHandle`].
//!
//! The engine instantiates one table each for meshes, textures and generic
//! storage buffers; the table itself is resource-agnostic.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

use crate::error::{GfxMemError, MemResult};

/// A stable, typed reference to a [`HandleTable`] entry.
///
/// Valid iff `index` is in range and the slot's generation still matches.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was created.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls: `T` itself need not be Clone/Eq/Hash for the handle to be.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

struct Slot<T> {
    value: Option<T>,
    generation: u32,
}

/// Slot map with generation-counted handles.
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> HandleTable<T> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Create an empty table with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    /// Store `value` and return its handle.
    ///
    /// Reuses a freed slot when one exists, otherwise appends a new slot
    /// starting at generation 0.
    pub fn create(&mut self, value: T) -> Handle<T> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            Handle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                value: Some(value),
                generation: 0,
            });
            Handle::new(index, 0)
        }
    }

    fn check(&self, handle: Handle<T>) -> MemResult<usize> {
        let index = handle.index as usize;
        match self.slots.get(index) {
            Some(slot) if slot.generation == handle.generation && slot.value.is_some() => {
                Ok(index)
            }
            _ => Err(GfxMemError::stale_handle(handle.index, handle.generation)),
        }
    }

    /// Borrow the value behind `handle`.
    pub fn get(&self, handle: Handle<T>) -> MemResult<&T> {
        let index = self.check(handle)?;
        Ok(self.slots[index].value.as_ref().expect("slot checked live"))
    }

    /// Mutably borrow the value behind `handle`.
    pub fn get_mut(&mut self, handle: Handle<T>) -> MemResult<&mut T> {
        let index = self.check(handle)?;
        Ok(self.slots[index].value.as_mut().expect("slot checked live"))
    }

    /// True if `handle` still refers to a live entry.
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.check(handle).is_ok()
    }

    /// Remove the entry behind `handle`, returning its value so the owner
    /// can tear the resource down (free its heap allocation, destroy views).
    ///
    /// The slot's generation increments unconditionally, so every handle to
    /// the removed entry is stale from this point on, even if the slot is
    /// never reused.
    pub fn remove(&mut self, handle: Handle<T>) -> MemResult<T> {
        let index = self.check(handle)?;
        let slot = &mut self.slots[index];
        let value = slot.value.take().expect("slot checked live");
        slot.generation += 1;
        self.free.push(handle.index);
        Ok(value)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots, live or free.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over live entries as `(handle, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(index as u32, slot.generation), value))
        })
    }

    /// Iterate over live entries with mutable access.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_mut()
                .map(|value| (Handle::new(index as u32, slot.generation), value))
        })
    }

    /// Verify the table is empty before shutdown.
    ///
    /// Owners must remove every handle explicitly; there is no implicit bulk
    /// free because each removal has resource teardown attached to it.
    pub fn destroy(&mut self) -> MemResult<()> {
        let live = self.len() as u64;
        if live > 0 {
            return Err(GfxMemError::teardown_violation("HandleTable", live));
        }
        self.slots.clear();
        self.free.clear();
        Ok(())
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for HandleTable<T> {
    fn drop(&mut self) {
        debug_assert!(
            self.is_empty(),
            "HandleTable dropped with {} live entr(ies)",
            self.len()
        );
    }
}
