use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Unique identifier with generation tracking to prevent stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: usize,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Slot identifier wrapper shared by every typed handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId(pub GenerationalId);

impl EntityId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self(GenerationalId::new(index, generation))
    }

    pub fn index(&self) -> usize {
        self.0.index
    }

    pub fn generation(&self) -> u32 {
        self.0.generation
    }

    pub fn is_null(&self) -> bool {
        self.0.index == usize::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self(GenerationalId::new(usize::MAX, 0))
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub EntityId);

        impl $name {
            /// Handle that never resolves.
            pub fn invalid() -> Self {
                Self(EntityId::default())
            }

            pub fn index(&self) -> usize {
                self.0.index()
            }

            pub fn generation(&self) -> u32 {
                self.0.generation()
            }
        }
    };
}

typed_handle!(
    /// Stable reference to a rigid body inside a `RigidBodySet`.
    RigidBodyHandle
);
typed_handle!(
    /// Stable reference to a collider inside a `ColliderSet`.
    ColliderHandle
);
typed_handle!(
    /// Stable reference to a joint inside a `JointSet`.
    JointHandle
);

/// Generational arena that hands out stable IDs while preventing use-after-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "RawArena<T>",
    bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>")
)]
pub struct Arena<T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
}

/// Arena fields as they appear on the wire, checked before use.
#[derive(Deserialize)]
struct RawArena<T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
}

impl<T> TryFrom<RawArena<T>> for Arena<T> {
    type Error = String;

    fn try_from(raw: RawArena<T>) -> Result<Self, Self::Error> {
        if raw.items.len() != raw.generations.len() {
            return Err(format!(
                "arena has {} slots but {} generations",
                raw.items.len(),
                raw.generations.len()
            ));
        }
        let mut listed = vec![false; raw.items.len()];
        for &index in &raw.free_list {
            match raw.items.get(index) {
                None => return Err(format!("free slot {index} is out of range")),
                Some(Some(_)) => return Err(format!("free slot {index} is occupied")),
                Some(None) if listed[index] => {
                    return Err(format!("free slot {index} is listed twice"))
                }
                Some(None) => listed[index] = true,
            }
        }
        let empty = raw.items.iter().filter(|slot| slot.is_none()).count();
        if empty != raw.free_list.len() {
            return Err(format!(
                "{empty} empty slots but {} free-list entries",
                raw.free_list.len()
            ));
        }
        Ok(Self {
            items: raw.items,
            generations: raw.generations,
            free_list: raw.free_list,
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> EntityId {
        if let Some(index) = self.free_list.pop_front() {
            let generation = self.generations[index];
            self.items[index] = Some(item);
            return EntityId::new(index, generation);
        }

        let index = self.items.len();
        self.items.push(Some(item));
        self.generations.push(0);
        EntityId::new(index, 0)
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        if self.is_valid(id) {
            self.items.get(id.index()).and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        if self.is_valid(id) {
            self.items.get_mut(id.index()).and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    pub fn get2_mut(&mut self, id_a: EntityId, id_b: EntityId) -> Option<(&mut T, &mut T)> {
        if id_a.index() == id_b.index() {
            return None;
        }

        if !self.is_valid(id_a) || !self.is_valid(id_b) {
            return None;
        }

        let (first, second, flipped) = if id_a.index() < id_b.index() {
            (id_a, id_b, false)
        } else {
            (id_b, id_a, true)
        };

        let second_index = second.index();
        if second_index >= self.items.len() {
            return None;
        }

        let (left, right) = self.items.split_at_mut(second_index);
        let first_slot = left
            .get_mut(first.index())
            .and_then(|slot| slot.as_mut())?;
        let second_slot = right.get_mut(0).and_then(|slot| slot.as_mut())?;

        if flipped {
            Some((second_slot, first_slot))
        } else {
            Some((first_slot, second_slot))
        }
    }

    /// Removes the entry and bumps the slot generation so `id` never resolves again.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        if !self.is_valid(id) {
            return None;
        }
        let slot = self.items.get_mut(id.index())?;
        let item = slot.take()?;
        self.generations[id.index()] = self.generations[id.index()].wrapping_add(1);
        self.free_list.push_back(id.index());
        Some(item)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|item| (EntityId::new(index, self.generations[index]), item))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        let generations = &self.generations;
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(move |(index, slot)| {
                slot.as_mut()
                    .map(|item| (EntityId::new(index, generations[index]), item))
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|_| EntityId::new(index, self.generations[index]))
        })
    }

    pub fn len(&self) -> usize {
        self.items.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_valid(&self, id: EntityId) -> bool {
        self.generations
            .get(id.index())
            .copied()
            .map(|gen| gen == id.generation())
            .unwrap_or(false)
    }
}
