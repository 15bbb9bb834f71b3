//! Packs demuxed packets into the pool's fixed-capacity buffers.
//!
//! Fit-or-rotate rule: a packet that does not fit in the current buffer's
//! remaining space rotates the buffer first, then is copied. A buffer that
//! becomes full (no bytes or no descriptor slots left) rotates right away.
//! The next buffer is acquired lazily, when the next packet arrives, so a
//! rotation never waits for the engine.

use tracing::trace;

use crate::{
    buffer::AudioBuffer,
    error::{QueueError, QueueResult},
    pool::BufferPool,
    types::{PacketDescriptor, QueueStats},
};

/// Outcome of offering one packet to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Packet copied. `full` asks for an immediate rotation.
    Stored { full: bool },
    /// Packet does not fit; rotate and offer it again.
    Rotate,
    /// No fill target and the next buffer is still with the engine.
    NeedBuffer,
}

/// Outcome of offering undemuxed bytes to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawPlacement {
    Copied { len: usize, full: bool },
    Rotate,
    NeedBuffer,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    pool: Option<BufferPool>,
    current: Option<AudioBuffer>,
    stats: QueueStats,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start scheduling into a freshly allocated pool.
    pub fn install(&mut self, pool: BufferPool) {
        self.current = None;
        self.pool = Some(pool);
    }

    pub fn is_ready(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pool(&self) -> Option<&BufferPool> {
        self.pool.as_ref()
    }

    pub fn buffer_capacity(&self) -> Option<usize> {
        self.pool.as_ref().map(BufferPool::buffer_capacity)
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut QueueStats {
        &mut self.stats
    }

    /// Buffers held by the output engine.
    pub fn in_flight(&self) -> usize {
        self.pool.as_ref().map_or(0, BufferPool::in_flight)
    }

    /// The fill target holds bytes that have not been handed over yet.
    pub fn has_partial(&self) -> bool {
        self.current.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// A fill target exists or can be acquired without waiting.
    pub fn can_acquire(&self) -> bool {
        self.current.is_some() || self.pool.as_ref().is_some_and(BufferPool::next_is_free)
    }

    fn fill_target(&mut self) -> QueueResult<Option<&mut AudioBuffer>> {
        let pool = self.pool.as_mut().ok_or(QueueError::EngineNotReady)?;
        if self.current.is_none() {
            self.current = pool.acquire();
        }
        Ok(self.current.as_mut())
    }

    /// Offer one packet whose bytes are `data`.
    ///
    /// # Errors
    ///
    /// [`QueueError::OversizedPacket`] if the packet can never fit a buffer,
    /// [`QueueError::EngineNotReady`] before a pool is installed.
    pub fn place(&mut self, desc: &PacketDescriptor, data: &[u8]) -> QueueResult<Placement> {
        let capacity = self.buffer_capacity().ok_or(QueueError::EngineNotReady)?;
        if data.len() > capacity {
            return Err(QueueError::OversizedPacket {
                size: data.len(),
                capacity,
            });
        }
        let Some(current) = self.fill_target()? else {
            return Ok(Placement::NeedBuffer);
        };
        if !current.push_packet(*desc, data) {
            return Ok(Placement::Rotate);
        }
        let full = current.is_full();
        self.stats.packets += 1;
        self.stats.bytes += data.len() as u64;
        Ok(Placement::Stored { full })
    }

    /// Offer bytes that come without packet descriptors.
    ///
    /// # Errors
    ///
    /// [`QueueError::EngineNotReady`] before a pool is installed.
    pub fn place_raw(&mut self, data: &[u8]) -> QueueResult<RawPlacement> {
        let Some(current) = self.fill_target()? else {
            return Ok(RawPlacement::NeedBuffer);
        };
        let len = current.append_raw(data);
        if len == 0 {
            return Ok(RawPlacement::Rotate);
        }
        let full = current.is_full();
        self.stats.bytes += len as u64;
        Ok(RawPlacement::Copied { len, full })
    }

    /// Detach the fill target for hand-off. Empty buffers stay in place.
    pub fn take_current(&mut self) -> Option<AudioBuffer> {
        if !self.has_partial() {
            return None;
        }
        let buffer = self.current.take()?;
        if let Some(pool) = self.pool.as_mut() {
            pool.mark_enqueued(buffer.id());
        }
        self.stats.rotations += 1;
        trace!(
            buffer = %buffer.id(),
            used = buffer.used(),
            packets = buffer.packet_count(),
            "rotated"
        );
        Some(buffer)
    }

    /// Take back a buffer the engine has finished with.
    pub fn release(&mut self, buffer: AudioBuffer) -> bool {
        let Some(pool) = self.pool.as_mut() else {
            return false;
        };
        let released = pool.release(buffer);
        if released {
            self.stats.consumed += 1;
        }
        released
    }

    /// Return every buffer to the pool, discarding unsent bytes.
    pub fn reclaim(&mut self) {
        let current = self.current.take();
        if let Some(pool) = self.pool.as_mut() {
            if let Some(buffer) = current {
                pool.release(buffer);
            }
            pool.reclaim();
        }
    }
}

/// What the packet loops need from their caller: a scheduler, a way to hand
/// the current buffer to the engine and a way to wait for one to come back.
pub(crate) trait Handoff {
    fn scheduler(&mut self) -> &mut Scheduler;

    fn rotate(&mut self) -> QueueResult<()>;

    /// Block until [`Scheduler::can_acquire`] holds.
    fn wait_for_buffer(&mut self) -> QueueResult<()>;
}

/// Place every packet of a demuxed batch, in order.
pub(crate) fn submit_packets<H: Handoff + ?Sized>(
    h: &mut H,
    packets: &[PacketDescriptor],
    bytes: &[u8],
) -> QueueResult<()> {
    for desc in packets {
        let data = desc.slice(bytes)?;
        loop {
            match h.scheduler().place(desc, data)? {
                Placement::Stored { full } => {
                    if full {
                        h.rotate()?;
                    }
                    break;
                }
                Placement::Rotate => h.rotate()?,
                Placement::NeedBuffer => h.wait_for_buffer()?,
            }
        }
    }
    Ok(())
}

/// Copy an undemuxed batch, spilling across as many buffers as needed.
pub(crate) fn submit_raw<H: Handoff + ?Sized>(h: &mut H, mut bytes: &[u8]) -> QueueResult<()> {
    while !bytes.is_empty() {
        match h.scheduler().place_raw(bytes)? {
            RawPlacement::Copied { len, full } => {
                bytes = &bytes[len..];
                if full {
                    h.rotate()?;
                }
            }
            RawPlacement::Rotate => h.rotate()?,
            RawPlacement::NeedBuffer => h.wait_for_buffer()?,
        }
    }
    Ok(())
}
