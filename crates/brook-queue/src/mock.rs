//! Hand-written collaborators for driving a [`Player`](crate::Player) in tests.
//!
//! - [`MockEngineFactory`] / [`MockEngineHandle`]: records every engine call
//!   and lets the test play the render thread, by hand or with
//!   [`MockEngineHandle::spawn_renderer`].
//! - [`ScriptedDemuxerFactory`]: emits a fixed property set, then cuts the
//!   byte stream into packets of scripted sizes across chunk boundaries.
//! - [`FaultyProperties`]: a [`PropertySnapshot`] whose reads can be made to
//!   fail.
//! - [`ScriptedFeed`]: delivers fixed chunks from its own thread.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use brook_net::{Feed, FeedMessage, FeedRequest, FeedSender, NetError, NetResult};
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    buffer::AudioBuffer,
    demux::{
        DemuxSink, Demuxer, DemuxerFactory, PropertyKind, PropertySnapshot, StreamProperties,
    },
    engine::{EngineFactory, EngineNotifier, OutputEngine},
    error::{DemuxError, EngineError, QueueError, QueueResult},
    format::{AudioFormat, ContainerFormat},
    types::{BufferId, PacketDescriptor},
};

// -- Output engine ----------------------------------------------------------------

/// Control and hand-off calls observed by a [`MockEngine`], in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineCall {
    SetCodecConfig(Vec<u8>),
    Enqueue {
        buffer: usize,
        bytes: usize,
        packets: usize,
    },
    Start,
    Pause,
    Stop { immediate: bool },
}

/// Copy of a buffer as it was when enqueued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnqueuedBuffer {
    pub buffer: usize,
    pub bytes: Vec<u8>,
    pub packets: Vec<PacketDescriptor>,
}

#[derive(Default)]
struct MockState {
    created: usize,
    format: Option<AudioFormat>,
    allocations: Vec<(usize, usize)>,
    codec_config: Option<Vec<u8>>,
    calls: Vec<EngineCall>,
    enqueued: Vec<EnqueuedBuffer>,
    queue: VecDeque<AudioBuffer>,
    notifier: Option<EngineNotifier>,
    started: bool,
    paused: bool,
    running: bool,
    draining: bool,
    stopped: bool,
    fail_enqueue: bool,
}

#[derive(Clone, Default)]
pub struct MockEngineFactory {
    state: Arc<Mutex<MockState>>,
    fail_create: bool,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose `create` always fails.
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn handle(&self) -> MockEngineHandle {
        MockEngineHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(
        &mut self,
        format: &AudioFormat,
        notifier: EngineNotifier,
    ) -> Result<Box<dyn OutputEngine>, EngineError> {
        if self.fail_create {
            return Err(EngineError::Format(format!("{:?}", format.codec)));
        }
        let mut state = self.state.lock();
        state.created += 1;
        state.format = Some(*format);
        state.notifier = Some(notifier);
        Ok(Box::new(MockEngine {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl OutputEngine for MockEngine {
    fn allocate_buffer(&mut self, id: BufferId, capacity: usize) -> Result<(), EngineError> {
        self.state.lock().allocations.push((id.index(), capacity));
        Ok(())
    }

    fn set_codec_config(&mut self, config: &[u8]) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::SetCodecConfig(config.to_vec()));
        state.codec_config = Some(config.to_vec());
        Ok(())
    }

    fn enqueue(&mut self, buffer: AudioBuffer) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(EngineError::Closed);
        }
        if state.fail_enqueue {
            return Err(EngineError::Operation("enqueue refused".into()));
        }
        state.calls.push(EngineCall::Enqueue {
            buffer: buffer.id().index(),
            bytes: buffer.used(),
            packets: buffer.packet_count(),
        });
        state.enqueued.push(EnqueuedBuffer {
            buffer: buffer.id().index(),
            bytes: buffer.bytes().to_vec(),
            packets: buffer.packets().to_vec(),
        });
        state.queue.push_back(buffer);
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Start);
        state.started = true;
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Pause);
        state.paused = true;
        Ok(())
    }

    fn stop(&mut self, immediate: bool) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Stop { immediate });
        if immediate {
            state.stopped = true;
            state.running = false;
            state.queue.clear();
        } else {
            state.draining = true;
        }
        Ok(())
    }
}

/// Test-side view of the engine the player constructed.
#[derive(Clone)]
pub struct MockEngineHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockEngineHandle {
    pub fn created(&self) -> usize {
        self.state.lock().created
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.state.lock().format
    }

    /// `(buffer, capacity)` per allocation.
    pub fn allocations(&self) -> Vec<(usize, usize)> {
        self.state.lock().allocations.clone()
    }

    pub fn codec_config(&self) -> Option<Vec<u8>> {
        self.state.lock().codec_config.clone()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn enqueued(&self) -> Vec<EnqueuedBuffer> {
        self.state.lock().enqueued.clone()
    }

    /// Buffers waiting to be rendered.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_started(&self) -> bool {
        let state = self.state.lock();
        state.started && !state.paused && !state.stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub fn set_fail_enqueue(&self, fail: bool) {
        self.state.lock().fail_enqueue = fail;
    }

    /// Tell the player the engine started or stopped rendering.
    pub fn report_running(&self, running: bool) {
        let notifier = {
            let mut state = self.state.lock();
            state.running = running;
            state.notifier.clone()
        };
        if let Some(notifier) = notifier {
            notifier.running_changed(running);
        }
    }

    /// Render the oldest queued buffer and hand it back. After a draining
    /// stop, rendering the last buffer also reports `running == false`.
    pub fn consume_one(&self) -> bool {
        let (buffer, notifier, finished) = {
            let mut state = self.state.lock();
            if state.stopped {
                return false;
            }
            let Some(buffer) = state.queue.pop_front() else {
                return false;
            };
            let finished = state.draining && state.queue.is_empty() && state.running;
            if finished {
                state.running = false;
            }
            (buffer, state.notifier.clone(), finished)
        };
        if let Some(notifier) = notifier {
            notifier.buffer_consumed(buffer);
            if finished {
                notifier.running_changed(false);
            }
        }
        true
    }

    pub fn consume_all(&self) -> usize {
        let mut n = 0;
        while self.consume_one() {
            n += 1;
        }
        n
    }

    /// Render on a background thread: confirm start, consume one buffer per
    /// tick while started and not paused, finish a draining stop.
    pub fn spawn_renderer(&self, tick: Duration) -> RendererGuard {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = self.clone();
        let flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("mock-renderer".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    handle.tick();
                    std::thread::sleep(tick);
                }
            })
            .ok();
        RendererGuard { stop, thread }
    }

    fn tick(&self) {
        let (started, running, draining, empty) = {
            let state = self.state.lock();
            if state.stopped || state.paused {
                return;
            }
            (
                state.started,
                state.running,
                state.draining,
                state.queue.is_empty(),
            )
        };
        if !started {
            return;
        }
        if !running {
            self.report_running(true);
        } else if !empty {
            self.consume_one();
        } else if draining {
            self.report_running(false);
        }
    }
}

/// Stops the renderer thread on drop.
pub struct RendererGuard {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for RendererGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// -- Demuxer ----------------------------------------------------------------------

/// Wraps a [`PropertySnapshot`]; the flagged reads fail with
/// [`DemuxError::Property`], the rest pass through.
#[derive(Clone, Debug, Default)]
pub struct FaultyProperties {
    pub props: PropertySnapshot,
    pub fail_data_format: bool,
    pub fail_codec_config: bool,
}

impl FaultyProperties {
    pub fn new(props: PropertySnapshot) -> Self {
        Self {
            props,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_data_format(mut self) -> Self {
        self.fail_data_format = true;
        self
    }

    #[must_use]
    pub fn failing_codec_config(mut self) -> Self {
        self.fail_codec_config = true;
        self
    }
}

impl StreamProperties for FaultyProperties {
    fn data_offset(&self) -> Result<Option<u64>, DemuxError> {
        self.props.data_offset()
    }

    fn audio_data_byte_count(&self) -> Result<Option<u64>, DemuxError> {
        self.props.audio_data_byte_count()
    }

    fn data_format(&self) -> Result<Option<AudioFormat>, DemuxError> {
        if self.fail_data_format {
            return Err(DemuxError::Property("data format".into()));
        }
        self.props.data_format()
    }

    fn format_list(&self) -> Result<Vec<AudioFormat>, DemuxError> {
        self.props.format_list()
    }

    fn packet_size_upper_bound(&self) -> Option<u32> {
        self.props.packet_size_upper_bound()
    }

    fn maximum_packet_size(&self) -> Option<u32> {
        self.props.maximum_packet_size()
    }

    fn codec_config(&self) -> Result<Option<Bytes>, DemuxError> {
        if self.fail_codec_config {
            return Err(DemuxError::Property("codec config".into()));
        }
        self.props.codec_config()
    }
}

#[derive(Clone, Debug)]
enum PacketSizes {
    Fixed(usize),
    List(VecDeque<usize>),
}

impl PacketSizes {
    fn peek(&self) -> Option<usize> {
        match self {
            Self::Fixed(size) => Some(*size),
            Self::List(list) => list.front().copied(),
        }
    }

    fn advance(&mut self) {
        if let Self::List(list) = self {
            list.pop_front();
        }
    }
}

/// Demuxer that reports `props` on the first chunk, then emits one batch per
/// chunk with every packet completed by it.
pub struct ScriptedDemuxer {
    props: PropertySnapshot,
    sizes: PacketSizes,
    pending: Vec<u8>,
    announced: bool,
    reject_after: Option<usize>,
    fed: usize,
}

impl ScriptedDemuxer {
    fn announce(&self, sink: &mut dyn DemuxSink) -> QueueResult<()> {
        let mut kinds = vec![PropertyKind::DataFormat];
        if !self.props.format_list.is_empty() {
            kinds.push(PropertyKind::FormatList);
        }
        if self.props.data_offset.is_some() {
            kinds.push(PropertyKind::DataOffset);
        }
        if self.props.audio_data_byte_count.is_some() {
            kinds.push(PropertyKind::AudioDataByteCount);
        }
        kinds.push(PropertyKind::ReadyToProducePackets);
        for kind in kinds {
            sink.on_property(kind, &self.props)?;
        }
        Ok(())
    }
}

impl Demuxer for ScriptedDemuxer {
    fn feed(&mut self, bytes: &[u8], sink: &mut dyn DemuxSink) -> QueueResult<()> {
        self.fed += bytes.len();
        if let Some(limit) = self.reject_after
            && self.fed > limit
        {
            return Err(QueueError::ParseFailed(DemuxError::Malformed(format!(
                "garbage after byte {limit}"
            ))));
        }
        if !self.announced {
            self.announced = true;
            self.announce(sink)?;
        }

        self.pending.extend_from_slice(bytes);
        let mut descs = Vec::new();
        let mut used = 0;
        while let Some(size) = self.sizes.peek() {
            if size == 0 || self.pending.len() - used < size {
                break;
            }
            descs.push(PacketDescriptor::new(used, size));
            used += size;
            self.sizes.advance();
        }
        if descs.is_empty() {
            return Ok(());
        }
        let batch: Vec<u8> = self.pending.drain(..used).collect();
        sink.on_packets(Some(&descs), &batch, &self.props)
    }
}

#[derive(Clone)]
pub struct ScriptedDemuxerFactory {
    props: PropertySnapshot,
    sizes: PacketSizes,
    reject_after: Option<usize>,
    open_error: Option<DemuxError>,
    hints: Arc<Mutex<Vec<Option<ContainerFormat>>>>,
}

impl ScriptedDemuxerFactory {
    /// Every packet is `size` bytes.
    pub fn fixed(props: PropertySnapshot, size: usize) -> Self {
        Self::with_sizes(props, PacketSizes::Fixed(size))
    }

    /// Packets of exactly these sizes, then nothing.
    pub fn sizes(props: PropertySnapshot, sizes: impl IntoIterator<Item = usize>) -> Self {
        Self::with_sizes(props, PacketSizes::List(sizes.into_iter().collect()))
    }

    fn with_sizes(props: PropertySnapshot, sizes: PacketSizes) -> Self {
        Self {
            props,
            sizes,
            reject_after: None,
            open_error: None,
            hints: Arc::default(),
        }
    }

    /// Fail `feed` once more than `limit` bytes have been seen.
    #[must_use]
    pub fn reject_after(mut self, limit: usize) -> Self {
        self.reject_after = Some(limit);
        self
    }

    #[must_use]
    pub fn failing_open(mut self, error: DemuxError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Hints passed to `open`, in order.
    pub fn hints(&self) -> Arc<Mutex<Vec<Option<ContainerFormat>>>> {
        Arc::clone(&self.hints)
    }
}

impl DemuxerFactory for ScriptedDemuxerFactory {
    fn open(&mut self, hint: Option<ContainerFormat>) -> Result<Box<dyn Demuxer>, DemuxError> {
        self.hints.lock().push(hint);
        if let Some(e) = self.open_error.clone() {
            return Err(e);
        }
        Ok(Box::new(ScriptedDemuxer {
            props: self.props.clone(),
            sizes: self.sizes.clone(),
            pending: Vec::new(),
            announced: false,
            reject_after: self.reject_after,
            fed: 0,
        }))
    }
}

// -- Feed -------------------------------------------------------------------------

/// Feed that plays back fixed chunks on its own thread.
pub struct ScriptedFeed {
    chunks: Vec<Bytes>,
    expected_length: Option<u64>,
    error: Option<NetError>,
    open_error: Option<NetError>,
    delay: Duration,
    hold_open: bool,
    handle: ScriptedFeedHandle,
    thread: Option<JoinHandle<()>>,
}

/// What a [`ScriptedFeed`] was asked to do.
#[derive(Clone, Default)]
pub struct ScriptedFeedHandle {
    requests: Arc<Mutex<Vec<FeedRequest>>>,
    cancelled: Arc<AtomicBool>,
    delivered: Arc<Mutex<u64>>,
}

impl ScriptedFeedHandle {
    pub fn requests(&self) -> Vec<FeedRequest> {
        self.requests.lock().clone()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Bytes sent so far.
    pub fn delivered(&self) -> u64 {
        *self.delivered.lock()
    }
}

impl ScriptedFeed {
    pub fn new(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        let chunks: Vec<Bytes> = chunks.into_iter().collect();
        let total = chunks.iter().map(|c| c.len() as u64).sum();
        Self {
            chunks,
            expected_length: Some(total),
            error: None,
            open_error: None,
            delay: Duration::ZERO,
            hold_open: false,
            handle: ScriptedFeedHandle::default(),
            thread: None,
        }
    }

    /// `data` cut into chunks of `chunk_size`.
    pub fn split(data: &[u8], chunk_size: usize) -> Self {
        Self::new(
            data.chunks(chunk_size.max(1))
                .map(Bytes::copy_from_slice)
                .collect::<Vec<_>>(),
        )
    }

    #[must_use]
    pub fn with_expected_length(mut self, len: Option<u64>) -> Self {
        self.expected_length = len;
        self
    }

    /// Complete with `error` after the chunks.
    #[must_use]
    pub fn with_error(mut self, error: NetError) -> Self {
        self.error = Some(error);
        self
    }

    /// Refuse to open.
    #[must_use]
    pub fn with_open_error(mut self, error: NetError) -> Self {
        self.open_error = Some(error);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Never send the completion; the stream stays open until cancelled.
    #[must_use]
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn handle(&self) -> ScriptedFeedHandle {
        self.handle.clone()
    }
}

impl Feed for ScriptedFeed {
    fn open(&mut self, request: FeedRequest, tx: FeedSender) -> NetResult<()> {
        self.handle.requests.lock().push(request);
        if let Some(e) = self.open_error.clone() {
            return Err(e);
        }
        let chunks = std::mem::take(&mut self.chunks);
        let expected_length = self.expected_length;
        let completion = match (self.hold_open, self.error.clone()) {
            (true, _) => None,
            (false, error) => Some(FeedMessage::Complete(error)),
        };
        let delay = self.delay;
        let handle = self.handle.clone();

        let thread = std::thread::Builder::new()
            .name("scripted-feed".to_string())
            .spawn(move || {
                let cancelled = || handle.cancelled.load(Ordering::Acquire);
                if tx
                    .send(FeedMessage::ResponseHeaders { expected_length })
                    .is_err()
                {
                    return;
                }
                for chunk in chunks {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    if cancelled() {
                        return;
                    }
                    let len = chunk.len() as u64;
                    if tx.send(FeedMessage::Bytes(chunk)).is_err() {
                        return;
                    }
                    *handle.delivered.lock() += len;
                }
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                match completion {
                    Some(completion) if !cancelled() => {
                        let _ = tx.send(completion);
                    }
                    Some(_) => {}
                    // Keep the channel open until the driver cancels.
                    None => {
                        while !cancelled() {
                            std::thread::sleep(Duration::from_millis(1));
                        }
                    }
                }
            })
            .map_err(|e| NetError::http(e.to_string()))?;
        self.thread = Some(thread);
        Ok(())
    }

    fn cancel(&mut self) {
        self.handle.cancelled.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
