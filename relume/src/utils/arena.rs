use std::mem;

/// Generational handle into an [`Arena`].
///
/// Removing an item bumps its slot's generation, so handles to removed
/// items can never alias whatever gets allocated into the slot next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

#[derive(Clone, Debug)]
enum Slot<T> {
    Occupied { generation: u32, item: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Slot arena with a free list.
///
/// Removal leaves a tombstone instead of shifting the tail, so live
/// handles stay valid across any sequence of inserts and removes.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Option<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, item: T) -> Handle {
        self.len += 1;

        if let Some(index) = self.free {
            let Slot::Vacant {
                generation,
                next_free,
            } = self.slots[index as usize]
            else {
                unreachable!("free list points at an occupied slot");
            };

            self.free = next_free;

            self.slots[index as usize] = Slot::Occupied {
                generation: generation + 1,
                item,
            };

            Handle {
                index,
                generation: generation + 1,
            }
        } else {
            self.slots.push(Slot::Occupied {
                generation: 0,
                item,
            });

            Handle {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.index as usize)? {
            Slot::Occupied { generation, item }
                if *generation == handle.generation =>
            {
                Some(item)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize)? {
            Slot::Occupied { generation, item }
                if *generation == handle.generation =>
            {
                Some(item)
            }
            _ => None,
        }
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;

        match slot {
            Slot::Occupied { generation, .. }
                if *generation == handle.generation =>
            {
                let tombstone = Slot::Vacant {
                    generation: handle.generation,
                    next_free: self.free,
                };

                let Slot::Occupied { item, .. } = mem::replace(slot, tombstone)
                else {
                    unreachable!();
                };

                self.free = Some(handle.index);
                self.len -= 1;

                Some(item)
            }
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            match slot {
                Slot::Occupied { generation, item } => Some((
                    Handle {
                        index: index as u32,
                        generation: *generation,
                    },
                    item,
                )),
                Slot::Vacant { .. } => None,
            }
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
