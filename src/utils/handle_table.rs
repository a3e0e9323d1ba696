use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Stable identifier for a resource stored in a [`HandleTable`].
///
/// The generation is bumped every time a slot is freed, so an id that outlives its resource
/// resolves to `None` instead of aliasing whatever reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ResourceId {
    pub index: u32,
    pub generation: u32,
}

impl ResourceId {
    pub const NULL: ResourceId = ResourceId {
        index: u32::MAX,
        generation: 0,
    };

    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::NULL
    }
}

/// Generational table that owns resources and hands out [`ResourceId`]s.
pub struct HandleTable<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<u32>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> ResourceId {
        if let Some(index) = self.free_list.pop_front() {
            self.slots[index as usize] = Some(item);
            return ResourceId::new(index, self.generations[index as usize]);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Some(item));
        self.generations.push(0);
        ResourceId::new(index, 0)
    }

    pub fn get(&self, id: ResourceId) -> Option<&T> {
        if self.is_live(id) {
            self.slots[id.index as usize].as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut T> {
        if self.is_live(id) {
            self.slots[id.index as usize].as_mut()
        } else {
            None
        }
    }

    pub fn remove(&mut self, id: ResourceId) -> Option<T> {
        if !self.is_live(id) {
            return None;
        }

        let index = id.index as usize;
        let item = self.slots[index].take();
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free_list.push_back(id.index);
        item
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.is_live(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|item| (ResourceId::new(index as u32, self.generations[index]), item))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.iter_mut().filter_map(|slot| slot.as_mut())
    }

    /// Removes every resource, in insertion-slot order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.len());
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(item) = slot.take() {
                self.generations[index] = self.generations[index].wrapping_add(1);
                self.free_list.push_back(index as u32);
                drained.push(item);
            }
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_live(&self, id: ResourceId) -> bool {
        let index = id.index as usize;
        self.generations.get(index) == Some(&id.generation)
            && self.slots.get(index).is_some_and(|slot| slot.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_id_does_not_resolve() {
        let mut table = HandleTable::new();
        let first = table.insert("albedo");
        assert_eq!(table.remove(first), Some("albedo"));

        let second = table.insert("normal");
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert!(table.get(first).is_none());
        assert_eq!(table.get(second), Some(&"normal"));
    }

    #[test]
    fn test_double_remove_is_harmless() {
        let mut table = HandleTable::new();
        let id = table.insert(7u32);
        assert_eq!(table.remove(id), Some(7));
        assert_eq!(table.remove(id), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain_empties_table() {
        let mut table = HandleTable::new();
        let a = table.insert(1);
        table.insert(2);
        assert_eq!(table.drain(), vec![1, 2]);
        assert!(table.is_empty());
        assert!(!table.contains(a));
    }

    #[test]
    fn test_null_id() {
        let table: HandleTable<u8> = HandleTable::new();
        assert!(ResourceId::default().is_null());
        assert!(table.get(ResourceId::NULL).is_none());
    }
}
