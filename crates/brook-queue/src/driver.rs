//! Driver thread and the shared core it serializes.
//!
//! All mutable player state lives in [`Core`] behind one mutex. The driver
//! thread feeds network chunks through the demuxer into the scheduler while
//! holding the lock, and releases it only inside condvar waits. Engine
//! notifications and control calls take the same lock, then wake the condvar.

use std::{sync::Arc, time::Duration};

use brook_net::{Feed, FeedMessage, FeedRequest, NetError};
use kanal::ReceiveErrorTimeout;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::{
    bridge::EngineBridge,
    buffer::AudioBuffer,
    config::QueueConfig,
    demux::{DemuxSink, Demuxer, DemuxerFactory, PropertyKind, StreamProperties},
    engine::{EngineFactory, EngineNotifier},
    error::{QueueError, QueueResult},
    events::{EventBus, PlayerEvent, StreamEvent},
    format::ContainerFormat,
    scheduler::{Handoff, Scheduler, submit_packets, submit_raw},
    state::{EngineCommand, PlaybackMachine, PlayerState, StopReason},
    types::{PacketDescriptor, StreamPosition},
};

pub(crate) struct Shared {
    pub(crate) core: Mutex<Core>,
    pub(crate) cond: Condvar,
    pub(crate) bus: EventBus,
    pub(crate) state_rx: watch::Receiver<PlayerState>,
}

impl Shared {
    pub(crate) fn new(
        config: &QueueConfig,
        position: StreamPosition,
        engines: Box<dyn EngineFactory>,
    ) -> Arc<Self> {
        let bus = EventBus::new(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(PlayerState::Initialized);
        Arc::new_cyclic(|weak| Self {
            core: Mutex::new(Core {
                machine: PlaybackMachine::new(config.threshold()),
                position,
                scheduler: Scheduler::new(),
                bridge: EngineBridge::new(engines, config),
                failure: None,
                produced_audio: false,
                feed_done: false,
                draining: false,
                poll: config.poll_interval,
                notifier: EngineNotifier::new(weak.clone()),
                bus: bus.clone(),
                state_tx,
            }),
            cond: Condvar::new(),
            bus,
            state_rx,
        })
    }

    pub(crate) fn buffer_consumed(&self, buffer: AudioBuffer) {
        self.core.lock().on_buffer_consumed(buffer);
        self.cond.notify_all();
    }

    pub(crate) fn running_changed(&self, running: bool) {
        self.core.lock().on_running_changed(running);
        self.cond.notify_all();
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").finish_non_exhaustive()
    }
}

pub(crate) struct Core {
    pub(crate) machine: PlaybackMachine,
    pub(crate) position: StreamPosition,
    pub(crate) scheduler: Scheduler,
    pub(crate) bridge: EngineBridge,
    pub(crate) failure: Option<QueueError>,
    produced_audio: bool,
    feed_done: bool,
    /// A failure let the engine play out; teardown waits for it.
    draining: bool,
    poll: Duration,
    notifier: EngineNotifier,
    bus: EventBus,
    state_tx: watch::Sender<PlayerState>,
}

impl Core {
    pub(crate) fn state(&self) -> PlayerState {
        self.machine.state()
    }

    /// Run `f` on the state machine, logging and publishing any state change.
    pub(crate) fn transition<R>(&mut self, f: impl FnOnce(&mut PlaybackMachine) -> R) -> R {
        let from = self.machine.state();
        let result = f(&mut self.machine);
        let to = self.machine.state();
        if from != to {
            debug!(?from, ?to, "state changed");
            self.state_tx.send_replace(to);
            self.bus.publish(PlayerEvent::StateChanged { from, to });
        }
        result
    }

    pub(crate) fn run_command(&mut self, command: Option<EngineCommand>) -> QueueResult<()> {
        match command {
            Some(command) => self.bridge.execute(command),
            None => Ok(()),
        }
    }

    fn rotate(&mut self) -> QueueResult<()> {
        let Some(buffer) = self.scheduler.take_current() else {
            return Ok(());
        };
        let (id, bytes, packets) = (buffer.id(), buffer.used(), buffer.packet_count());
        self.bridge.enqueue(buffer)?;
        self.scheduler.stats_mut().enqueued += 1;
        let in_flight = self.scheduler.in_flight();
        trace!(buffer = %id, bytes, packets, in_flight, "enqueued");
        self.bus.publish(PlayerEvent::BufferEnqueued {
            buffer: id,
            bytes,
            packets,
            in_flight,
        });
        let command = self.transition(|m| m.on_rotation(in_flight));
        self.run_command(command)
    }

    fn on_response_headers(&mut self, expected_length: Option<u64>) {
        if self.position.apply_response_length(expected_length) {
            debug!(
                ?expected_length,
                total = ?self.position.total_bytes_expected,
                "response headers"
            );
        }
        self.bus.publish(StreamEvent::ResponseHeaders {
            expected_length,
            total_bytes: self.position.total_bytes_expected,
        });
    }

    fn on_end_of_stream(&mut self) -> QueueResult<()> {
        self.feed_done = true;
        info!(received = self.position.bytes_received, "stream complete");
        self.bus.publish(StreamEvent::Complete {
            received: self.position.bytes_received,
        });
        let (produced, partial) = (self.produced_audio, self.scheduler.has_partial());
        let plan = self.transition(|m| m.on_end_of_stream(produced, partial))?;
        if plan.flush {
            self.rotate()?;
        }
        if plan.start {
            let command = self.transition(PlaybackMachine::begin_playback);
            self.run_command(command)?;
        }
        let drain = self.machine.take_drain();
        self.run_command(drain)
    }

    fn on_buffer_consumed(&mut self, buffer: AudioBuffer) {
        let id = buffer.id();
        if !self.scheduler.release(buffer) {
            return;
        }
        let in_flight = self.scheduler.in_flight();
        trace!(buffer = %id, in_flight, "consumed");
        self.bus.publish(PlayerEvent::BufferConsumed {
            buffer: id,
            in_flight,
        });
        let command = self.transition(|m| m.on_buffer_consumed(in_flight));
        if command.is_some() {
            self.scheduler.stats_mut().underruns += 1;
            warn!("underrun, rebuffering");
            self.bus.publish(PlayerEvent::Underrun);
        }
        if let Err(e) = self.run_command(command) {
            self.fail(e);
        }
    }

    fn on_running_changed(&mut self, running: bool) {
        if !self.bridge.is_constructed() {
            return;
        }
        debug!(running, "engine running state");
        self.bridge.set_running(running);
        self.transition(|m| m.on_running_changed(running));
        let drain = self.machine.take_drain();
        if let Err(e) = self.run_command(drain) {
            self.fail(e);
        }
    }

    /// Enter `Stopping` because of `err`. Enqueued audio drains unless the
    /// error compromises the buffers or the engine is not rendering.
    pub(crate) fn fail(&mut self, err: QueueError) {
        if err.is_cancelled() {
            return;
        }
        if self.state().is_stopping_or_stopped() {
            debug!(error = %err, "error after stop ignored");
            return;
        }
        error!(error = %err, state = ?self.state(), "playback failed");
        if let QueueError::ConnectionFailed(net) = &err {
            self.bus.publish(StreamEvent::Error(net.clone()));
        }
        self.bus.publish(PlayerEvent::Failed(err.clone()));
        let drain = !err.is_buffer_integrity() && self.bridge.is_running();
        self.failure = Some(err);
        let command = self.transition(|m| m.stop(StopReason::Failed, drain));
        self.draining = command == Some(EngineCommand::DrainAndStop);
        if self.draining
            && let Err(e) = self.run_command(command)
        {
            warn!(error = %e, "drain request failed");
            self.draining = false;
        }
    }

    /// Explicit stop from the control surface. Tears down at once.
    pub(crate) fn request_stop(&mut self) {
        self.transition(|m| m.stop(StopReason::Requested, false));
        self.draining = false;
        if self.state() == PlayerState::Stopping {
            self.teardown();
        }
    }

    fn should_teardown(&self) -> bool {
        self.state() == PlayerState::Stopping
            && (!self.draining || !self.bridge.is_running() || self.scheduler.in_flight() == 0)
    }

    fn teardown(&mut self) {
        self.bridge.teardown();
        self.scheduler.reclaim();
        self.draining = false;
        self.transition(PlaybackMachine::finish);
        let reason = self.machine.stop_reason().unwrap_or(StopReason::Requested);
        info!(?reason, stats = ?self.scheduler.stats(), "playback stopped");
        self.bus.publish(PlayerEvent::Finished(reason));
    }
}

/// Demuxer output routed into the core while the driver holds the lock.
struct Pipeline<'a, 'g> {
    cond: &'a Condvar,
    core: &'a mut MutexGuard<'g, Core>,
}

impl Pipeline<'_, '_> {
    fn ensure_engine(&mut self, props: &dyn StreamProperties) -> QueueResult<()> {
        let notifier = self.core.notifier.clone();
        if let Some(pool) = self.core.bridge.ensure_engine_constructed(props, notifier)? {
            self.core.bus.publish(PlayerEvent::EngineConstructed {
                buffer_count: pool.len(),
                buffer_size: pool.buffer_capacity(),
            });
            self.core.scheduler.install(pool);
        }
        self.core.bridge.propagate_codec_config(props);
        Ok(())
    }
}

impl DemuxSink for Pipeline<'_, '_> {
    fn on_property(&mut self, kind: PropertyKind, props: &dyn StreamProperties) -> QueueResult<()> {
        trace!(?kind, "demux property");
        match kind {
            PropertyKind::DataFormat => {
                if let Some(format) = props.data_format()?
                    && self.core.bridge.set_format(format)
                {
                    self.core.bus.publish(PlayerEvent::FormatDetected(format));
                }
            }
            PropertyKind::FormatList => {
                let list = props.format_list()?;
                if let Some(format) = self.core.bridge.offer_formats(&list) {
                    self.core.bus.publish(PlayerEvent::FormatUpgraded(format));
                }
            }
            PropertyKind::DataOffset => {
                self.core.position.audio_data_start_offset = props.data_offset()?;
            }
            PropertyKind::AudioDataByteCount => {
                self.core.position.audio_data_byte_count = props.audio_data_byte_count()?;
            }
            PropertyKind::ReadyToProducePackets => {
                debug!(playable = ?self.core.position.playable_range(), "demuxer ready");
            }
        }
        Ok(())
    }

    fn on_packets(
        &mut self,
        packets: Option<&[PacketDescriptor]>,
        bytes: &[u8],
        props: &dyn StreamProperties,
    ) -> QueueResult<()> {
        match packets {
            Some(packets) if packets.is_empty() => return Ok(()),
            None if bytes.is_empty() => return Ok(()),
            _ => {}
        }
        self.ensure_engine(props)?;
        match packets {
            Some(packets) => submit_packets(self, packets, bytes)?,
            None => submit_raw(self, bytes)?,
        }
        self.core.produced_audio = true;
        self.core.transition(PlaybackMachine::on_data);
        Ok(())
    }
}

impl Handoff for Pipeline<'_, '_> {
    fn scheduler(&mut self) -> &mut Scheduler {
        &mut self.core.scheduler
    }

    fn rotate(&mut self) -> QueueResult<()> {
        self.core.rotate()
    }

    fn wait_for_buffer(&mut self) -> QueueResult<()> {
        loop {
            if self.core.state().is_stopping_or_stopped() {
                return Err(QueueError::Cancelled);
            }
            if self.core.scheduler.can_acquire() {
                return Ok(());
            }
            trace!(in_flight = self.core.scheduler.in_flight(), "waiting for a free buffer");
            let poll = self.core.poll;
            self.cond.wait_for(&mut *self.core, poll);
        }
    }
}

/// Everything the driver thread takes ownership of.
pub(crate) struct DriverParts {
    pub(crate) feed: Box<dyn Feed>,
    pub(crate) demuxers: Box<dyn DemuxerFactory>,
    pub(crate) request: FeedRequest,
    pub(crate) hint: Option<ContainerFormat>,
}

pub(crate) fn run(shared: &Shared, parts: DriverParts) {
    let DriverParts {
        mut feed,
        mut demuxers,
        request,
        hint,
    } = parts;
    let (tx, rx) = kanal::unbounded();

    let opened = {
        let mut core = shared.core.lock();
        let opened = open(&mut core, feed.as_mut(), demuxers.as_mut(), request, hint, tx);
        if core.should_teardown() {
            core.teardown();
        }
        opened
    };
    shared.cond.notify_all();

    if let Some(mut demuxer) = opened {
        drive(shared, demuxer.as_mut(), &rx);
    }

    feed.cancel();
    debug!("driver thread exiting");
}

fn open(
    core: &mut MutexGuard<'_, Core>,
    feed: &mut dyn Feed,
    demuxers: &mut dyn DemuxerFactory,
    request: FeedRequest,
    hint: Option<ContainerFormat>,
    tx: kanal::Sender<FeedMessage>,
) -> Option<Box<dyn Demuxer>> {
    if core.state().is_stopping_or_stopped() {
        return None;
    }
    let demuxer = match demuxers.open(hint) {
        Ok(d) => d,
        Err(e) => {
            core.fail(e.into());
            return None;
        }
    };
    info!(url = %request.url, offset = request.start_offset, ?hint, "opening stream");
    if let Err(e) = feed.open(request, tx) {
        core.fail(e.into());
        return None;
    }
    core.transition(PlaybackMachine::driver_started);
    Some(demuxer)
}

fn drive(shared: &Shared, demuxer: &mut dyn Demuxer, rx: &kanal::Receiver<FeedMessage>) {
    loop {
        {
            let mut core = shared.core.lock();
            if core.should_teardown() {
                core.teardown();
                drop(core);
                shared.cond.notify_all();
                continue;
            }
            if core.state().is_terminal() {
                return;
            }
            if core.feed_done {
                let poll = core.poll;
                shared.cond.wait_for(&mut core, poll);
                continue;
            }
        }

        let poll = shared.core.lock().poll;
        let message = match rx.recv_timeout(poll) {
            Ok(message) => message,
            Err(ReceiveErrorTimeout::Timeout) => continue,
            Err(_) => FeedMessage::Complete(Some(NetError::http("feed closed without completing"))),
        };

        let mut core = shared.core.lock();
        handle(&shared.cond, &mut core, demuxer, message);
        if core.should_teardown() {
            core.teardown();
        }
        drop(core);
        shared.cond.notify_all();
    }
}

fn handle(
    cond: &Condvar,
    core: &mut MutexGuard<'_, Core>,
    demuxer: &mut dyn Demuxer,
    message: FeedMessage,
) {
    if core.state().is_stopping_or_stopped() {
        if matches!(message, FeedMessage::Complete(_)) {
            core.feed_done = true;
        }
        return;
    }
    let result = match message {
        FeedMessage::ResponseHeaders { expected_length } => {
            core.on_response_headers(expected_length);
            Ok(())
        }
        FeedMessage::Bytes(chunk) => {
            core.position.record_bytes(chunk.len());
            core.bus.publish(StreamEvent::Progress {
                received: core.position.bytes_received,
                total: core.position.total_bytes_expected,
            });
            let mut pipeline = Pipeline {
                cond,
                core: &mut *core,
            };
            demuxer.feed(&chunk, &mut pipeline)
        }
        FeedMessage::Complete(None) => core.on_end_of_stream(),
        FeedMessage::Complete(Some(e)) => {
            core.feed_done = true;
            Err(QueueError::ConnectionFailed(e))
        }
    };
    if let Err(e) = result {
        core.fail(e);
    }
}
