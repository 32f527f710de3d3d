use std::fmt;

use crate::Instance;

/// Stable opaque handle to an instance slot.
///
/// Layout:
/// ```text
/// [0..<32 slot index] [32..<64 generation]
/// ```
///
/// The generation is bumped when a slot is freed, so a handle held across
/// a disposal reads as absent instead of aliasing a recycled slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const INDEX_MASK: u64 = 0xFFFF_FFFF;
    pub const GEN_SHIFT: u64 = 32;

    #[inline]
    pub fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self((index as u64) | ((generation as u64) << Self::GEN_SHIFT))
    }

    #[inline]
    pub fn index(self) -> u32 {
        (self.0 & Self::INDEX_MASK) as u32
    }

    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> Self::GEN_SHIFT) as u32
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId(#{}.{})", self.index(), self.generation())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index(), self.generation())
    }
}

#[derive(Debug)]
struct ArenaSlot {
    generation: u32,
    instance: Option<Instance>,
}

/// Generational arena holding every live instance.
///
/// Registries elsewhere store only [`ObjectId`]s, so nothing outside the
/// arena keeps an instance alive; removal is the single point of disposal.
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<ArenaSlot>,
    free: Vec<u32>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance: Instance) -> ObjectId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.instance = Some(instance);
                ObjectId::from_raw_parts(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(ArenaSlot {
                    generation: 0,
                    instance: Some(instance),
                });
                ObjectId::from_raw_parts(index, 0)
            }
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&Instance> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.instance.as_ref()
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Instance> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.instance.as_mut()
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Instance> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let instance = slot.instance.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        Some(instance)
    }

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
