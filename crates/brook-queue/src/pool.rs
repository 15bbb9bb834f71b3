use tracing::{trace, warn};

use crate::{buffer::AudioBuffer, types::BufferId};

/// Ownership state of one slot, as seen from the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Buffer is parked in the pool.
    Free,
    /// Buffer is out with the scheduler as the fill target.
    Filling,
    /// Buffer is out with the output engine.
    Enqueued,
}

enum Slot {
    Free(AudioBuffer),
    Filling,
    Enqueued,
}

impl Slot {
    fn state(&self) -> SlotState {
        match self {
            Self::Free(_) => SlotState::Free,
            Self::Filling => SlotState::Filling,
            Self::Enqueued => SlotState::Enqueued,
        }
    }
}

/// Arena of N identically sized buffers.
///
/// A buffer is moved out of its slot while it is being filled or rendered and
/// moved back in when released, so the fill path can never touch a buffer the
/// engine still owns. Slots are handed out in strict round-robin order.
pub struct BufferPool {
    slots: Vec<Slot>,
    cursor: usize,
    capacity: usize,
    max_packets: usize,
}

impl BufferPool {
    pub fn new(count: usize, capacity: usize, max_packets: usize) -> Self {
        let slots = (0..count)
            .map(|i| Slot::Free(AudioBuffer::new(BufferId::new(i), capacity, max_packets)))
            .collect();
        Self {
            slots,
            cursor: 0,
            capacity,
            max_packets,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Byte capacity shared by every buffer.
    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_packets(&self) -> usize {
        self.max_packets
    }

    pub fn state(&self, id: BufferId) -> Option<SlotState> {
        self.slots.get(id.0).map(Slot::state)
    }

    /// Buffers currently owned by the output engine.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Enqueued))
            .count()
    }

    /// Whether [`acquire`](Self::acquire) would succeed right now.
    pub fn next_is_free(&self) -> bool {
        matches!(self.slots.get(self.cursor), Some(Slot::Free(_)))
    }

    /// Take the next buffer in round-robin order, emptied.
    ///
    /// Returns `None` if that buffer has not come back yet.
    pub fn acquire(&mut self) -> Option<AudioBuffer> {
        let slot = self.slots.get_mut(self.cursor)?;
        if !matches!(slot, Slot::Free(_)) {
            return None;
        }
        let Slot::Free(mut buffer) = std::mem::replace(slot, Slot::Filling) else {
            return None;
        };
        buffer.reset();
        self.cursor = (self.cursor + 1) % self.slots.len();
        trace!(buffer = %buffer.id(), "acquired");
        Some(buffer)
    }

    /// Record that a filled buffer now belongs to the engine.
    pub fn mark_enqueued(&mut self, id: BufferId) -> bool {
        match self.slots.get_mut(id.0) {
            Some(slot @ Slot::Filling) => {
                *slot = Slot::Enqueued;
                true
            }
            _ => false,
        }
    }

    /// Return a buffer to its slot.
    ///
    /// A release for a slot that is already free (a duplicate notification, or
    /// one arriving after [`reclaim`](Self::reclaim)) is ignored.
    pub fn release(&mut self, buffer: AudioBuffer) -> bool {
        let id = buffer.id();
        match self.slots.get_mut(id.0) {
            Some(slot @ (Slot::Enqueued | Slot::Filling)) => {
                *slot = Slot::Free(buffer);
                true
            }
            _ => {
                warn!(buffer = %id, "ignoring release of a buffer the pool does not expect");
                false
            }
        }
    }

    /// Make every slot free again, replacing buffers that never came back.
    pub fn reclaim(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if !matches!(slot, Slot::Free(_)) {
                *slot = Slot::Free(AudioBuffer::new(
                    BufferId::new(i),
                    self.capacity,
                    self.max_packets,
                ));
            }
        }
        self.cursor = 0;
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let states: Vec<SlotState> = self.slots.iter().map(Slot::state).collect();
        f.debug_struct("BufferPool")
            .field("slots", &states)
            .field("cursor", &self.cursor)
            .field("capacity", &self.capacity)
            .finish()
    }
}
