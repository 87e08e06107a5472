//! Handle table for surface-resident objects.
//!
//! Backends cache textures and similar resources here instead of passing
//! reference-counted pointers around: callers hold plain integer handles
//! into an owned pool, with the shared count tracked explicitly.

/// Opaque handle into an [`ObjectArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    /// Raw value for embedding in transport types.
    pub fn to_raw(self) -> u64 {
        self.0 as u64
    }

    /// Rebuilds a handle from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Handle(raw as u32)
    }
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    shared: u32,
}

/// An owned pool of objects addressed by integer handles.
#[derive(Debug)]
pub struct ObjectArena<T> {
    slots: Vec<Option<Entry<T>>>,
    free: Vec<u32>,
}

impl<T> ObjectArena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Stores a value with an initial shared count of one.
    pub fn insert(&mut self, value: T) -> Handle {
        let entry = Entry { value, shared: 1 };
        match self.free.pop() {
            Some(index) => {
                debug_assert!(self.slots[index as usize].is_none());
                self.slots[index as usize] = Some(entry);
                Handle(index)
            }
            None => {
                self.slots.push(Some(entry));
                Handle(self.slots.len() as u32 - 1)
            }
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots
            .get(handle.0 as usize)?
            .as_ref()
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.0 as usize)?
            .as_mut()
            .map(|entry| &mut entry.value)
    }

    /// Bumps the shared count of an occupied slot.
    pub fn retain(&mut self, handle: Handle) {
        if let Some(Some(entry)) = self.slots.get_mut(handle.0 as usize) {
            entry.shared += 1;
        }
    }

    /// Drops one share; frees the slot when the count reaches zero.
    /// Returns true when the object was actually freed.
    pub fn release(&mut self, handle: Handle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.0 as usize) else {
            return false;
        };
        let Some(entry) = slot.as_mut() else {
            return false;
        };
        entry.shared -= 1;
        if entry.shared == 0 {
            *slot = None;
            self.free.push(handle.0);
            true
        } else {
            false
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ObjectArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_release_cycle() {
        let mut arena = ObjectArena::new();
        let handle = arena.insert("texture");
        assert_eq!(arena.get(handle), Some(&"texture"));
        assert!(arena.release(handle));
        assert_eq!(arena.get(handle), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn shared_count_defers_the_free() {
        let mut arena = ObjectArena::new();
        let handle = arena.insert(vec![1u8, 2, 3]);
        arena.retain(handle);
        assert!(!arena.release(handle));
        assert!(arena.get(handle).is_some());
        assert!(arena.release(handle));
        assert!(arena.get(handle).is_none());
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut arena = ObjectArena::new();
        let first = arena.insert(1);
        arena.release(first);
        let second = arena.insert(2);
        assert_eq!(first, second);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn handles_survive_raw_round_trip() {
        let mut arena = ObjectArena::new();
        let handle = arena.insert(7);
        assert_eq!(Handle::from_raw(handle.to_raw()), handle);
    }
}
