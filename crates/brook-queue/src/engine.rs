//! Output engine contract.
//!
//! The engine renders buffers on its own thread and reports back through an
//! [`EngineNotifier`]. Buffers move into the engine on enqueue and move back
//! through [`EngineNotifier::buffer_consumed`], so a buffer is owned by exactly
//! one side at any time.

use std::sync::Weak;

use crate::{
    buffer::AudioBuffer, driver::Shared, error::EngineError, format::AudioFormat,
    types::BufferId,
};

/// An audio output engine constructed for one stream format.
///
/// Every method is called with the player's core lock held. Implementations
/// must not call back into the [`EngineNotifier`] from inside these methods;
/// notifications belong on the engine's render thread.
pub trait OutputEngine: Send {
    /// Reserve storage for buffer `id`. Called once per pool slot before the
    /// first enqueue.
    fn allocate_buffer(&mut self, id: BufferId, capacity: usize) -> Result<(), EngineError>;

    /// Opaque codec initialisation data ("magic cookie").
    fn set_codec_config(&mut self, config: &[u8]) -> Result<(), EngineError>;

    fn enqueue(&mut self, buffer: AudioBuffer) -> Result<(), EngineError>;

    fn start(&mut self) -> Result<(), EngineError>;

    /// Suspend rendering, keeping enqueued buffers.
    fn pause(&mut self) -> Result<(), EngineError>;

    /// Stop rendering. With `immediate == false` the engine plays out what is
    /// enqueued first and reports `running_changed(false)` when done.
    fn stop(&mut self, immediate: bool) -> Result<(), EngineError>;
}

pub trait EngineFactory: Send {
    fn create(
        &mut self,
        format: &AudioFormat,
        notifier: EngineNotifier,
    ) -> Result<Box<dyn OutputEngine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: FnMut(&AudioFormat, EngineNotifier) -> Result<Box<dyn OutputEngine>, EngineError> + Send,
{
    fn create(
        &mut self,
        format: &AudioFormat,
        notifier: EngineNotifier,
    ) -> Result<Box<dyn OutputEngine>, EngineError> {
        self(format, notifier)
    }
}

/// Typed handle the engine uses to reach its player.
///
/// Holds only a weak reference: once the player is gone every call is a no-op.
#[derive(Clone, Debug)]
pub struct EngineNotifier {
    shared: Weak<Shared>,
}

impl EngineNotifier {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }

    /// A notifier attached to nothing.
    pub fn detached() -> Self {
        Self { shared: Weak::new() }
    }

    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// Hand a rendered buffer back to the pool.
    pub fn buffer_consumed(&self, buffer: AudioBuffer) {
        if let Some(shared) = self.shared.upgrade() {
            shared.buffer_consumed(buffer);
        }
    }

    pub fn running_changed(&self, running: bool) {
        if let Some(shared) = self.shared.upgrade() {
            shared.running_changed(running);
        }
    }
}
