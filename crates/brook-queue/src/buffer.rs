use crate::types::{BufferId, PacketDescriptor};

/// One fixed-capacity playback buffer.
///
/// Holds packet bytes back to back plus a bounded list of descriptors whose
/// offsets are relative to the start of the buffer. Capacity never changes
/// after allocation.
#[derive(Debug)]
pub struct AudioBuffer {
    id: BufferId,
    data: Vec<u8>,
    capacity: usize,
    packets: Vec<PacketDescriptor>,
    max_packets: usize,
    raw: bool,
}

impl AudioBuffer {
    pub fn new(id: BufferId, capacity: usize, max_packets: usize) -> Self {
        Self {
            id,
            data: Vec::with_capacity(capacity),
            capacity,
            packets: Vec::with_capacity(max_packets),
            max_packets,
            raw: false,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_packets(&self) -> usize {
        self.max_packets
    }

    pub fn used(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    /// No bytes and no descriptors. A zero-byte packet still counts.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.packets.is_empty()
    }

    /// No byte space or no descriptor slot left.
    pub fn is_full(&self) -> bool {
        self.remaining() == 0 || self.packets.len() >= self.max_packets
    }

    /// Filled by undemuxed bytes under a single synthetic descriptor.
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn packets(&self) -> &[PacketDescriptor] {
        &self.packets
    }

    /// Copy one packet in, rewriting its offset to the current fill level.
    ///
    /// Returns `false` and leaves the buffer untouched when the packet does not
    /// fit in the remaining space or the descriptor list is at its bound.
    #[must_use]
    pub(crate) fn push_packet(&mut self, desc: PacketDescriptor, bytes: &[u8]) -> bool {
        if self.raw || bytes.len() > self.remaining() || self.packets.len() >= self.max_packets {
            return false;
        }
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        self.packets.push(PacketDescriptor {
            offset,
            byte_size: bytes.len(),
            variable_frames: desc.variable_frames,
        });
        true
    }

    /// Copy as much of `bytes` as fits, extending the single whole-buffer
    /// descriptor. Returns the number of bytes copied.
    pub(crate) fn append_raw(&mut self, bytes: &[u8]) -> usize {
        if !self.raw && !self.packets.is_empty() {
            return 0;
        }
        let len = bytes.len().min(self.remaining());
        if len == 0 {
            return 0;
        }
        self.raw = true;
        self.data.extend_from_slice(&bytes[..len]);
        let used = self.data.len();
        match self.packets.first_mut() {
            Some(whole) => whole.byte_size = used,
            None => self.packets.push(PacketDescriptor::new(0, used)),
        }
        len
    }

    pub(crate) fn reset(&mut self) {
        self.data.clear();
        self.packets.clear();
        self.raw = false;
    }
}
