//! Playback state machine.
//!
//! Pure bookkeeping: methods take what the driver observed and return the
//! engine command to issue, if any. The driver owns the machine under the core
//! lock and performs the commands.

use tracing::warn;

use crate::error::{QueueError, QueueResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PlayerState {
    #[default]
    Initialized,
    StartingThread,
    WaitingForData,
    Buffering,
    FlushingEof,
    WaitingForQueueStart,
    Playing,
    Paused,
    Stopping,
    Stopped,
}

impl PlayerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub fn is_stopping_or_stopped(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }

    /// Still filling towards the startup threshold.
    pub fn is_filling(self) -> bool {
        matches!(self, Self::WaitingForData | Self::Buffering)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StopReason {
    Requested,
    EndOfStream,
    Failed,
}

/// Instruction for the output engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineCommand {
    Start,
    Pause,
    /// Stop once everything already enqueued has been rendered.
    DrainAndStop,
    StopNow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartRequest {
    /// Fresh start: spawn the driver thread.
    SpawnDriver,
    /// Start while paused: restart the engine, nothing is re-fetched.
    Resume,
    Ignored,
}

/// What the driver should do once the feed has ended cleanly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EofPlan {
    /// Hand the partially filled buffer over.
    pub flush: bool,
    /// Start the engine regardless of the threshold.
    pub start: bool,
}

#[derive(Debug)]
pub struct PlaybackMachine {
    state: PlayerState,
    threshold: usize,
    engine_started: bool,
    eof: bool,
    drain_pending: bool,
    stop_reason: Option<StopReason>,
}

impl PlaybackMachine {
    /// `threshold` is the number of enqueued buffers that starts playback.
    pub fn new(threshold: usize) -> Self {
        Self {
            state: PlayerState::Initialized,
            threshold: threshold.max(1),
            engine_started: false,
            eof: false,
            drain_pending: false,
            stop_reason: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn engine_started(&self) -> bool {
        self.engine_started
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn request_start(&mut self) -> StartRequest {
        match self.state {
            PlayerState::Initialized => {
                self.state = PlayerState::StartingThread;
                StartRequest::SpawnDriver
            }
            PlayerState::Paused => {
                self.resume();
                StartRequest::Resume
            }
            _ => StartRequest::Ignored,
        }
    }

    /// The driver thread is running and has opened the feed.
    pub fn driver_started(&mut self) {
        if self.state == PlayerState::StartingThread {
            self.state = PlayerState::WaitingForData;
        }
    }

    /// Audio has been placed into a buffer.
    pub fn on_data(&mut self) {
        if self.state == PlayerState::WaitingForData {
            self.state = PlayerState::Buffering;
        }
    }

    /// A buffer was handed to the engine; `in_flight` counts it.
    pub fn on_rotation(&mut self, in_flight: usize) -> Option<EngineCommand> {
        if self.state.is_filling() && in_flight >= self.threshold {
            return self.begin_playback();
        }
        None
    }

    /// Tell the engine to render. The first start waits for the engine to
    /// confirm it is running; a restart after an underrun does not.
    pub fn begin_playback(&mut self) -> Option<EngineCommand> {
        if self.state.is_stopping_or_stopped() || self.state == PlayerState::Paused {
            return None;
        }
        if self.engine_started {
            self.state = PlayerState::Playing;
        } else {
            self.engine_started = true;
            self.state = PlayerState::WaitingForQueueStart;
        }
        Some(EngineCommand::Start)
    }

    /// Returns `true` when the engine has gone quiet and the driver can tear
    /// it down.
    pub fn on_running_changed(&mut self, running: bool) -> bool {
        match (running, self.state) {
            (true, PlayerState::WaitingForQueueStart) => {
                self.state = PlayerState::Playing;
                false
            }
            (false, PlayerState::Stopping) => true,
            (false, PlayerState::Playing | PlayerState::WaitingForQueueStart) if self.eof => {
                self.state = PlayerState::Stopping;
                self.stop_reason = Some(StopReason::EndOfStream);
                true
            }
            _ => false,
        }
    }

    /// The engine returned a buffer; `in_flight` no longer counts it.
    pub fn on_buffer_consumed(&mut self, in_flight: usize) -> Option<EngineCommand> {
        if in_flight == 0 && self.state == PlayerState::Playing && !self.eof {
            self.state = PlayerState::Buffering;
            return Some(EngineCommand::Pause);
        }
        None
    }

    /// The feed completed without error.
    ///
    /// # Errors
    ///
    /// [`QueueError::NoAudioDataFound`] if no packet was ever produced.
    pub fn on_end_of_stream(&mut self, produced_audio: bool, has_partial: bool) -> QueueResult<EofPlan> {
        self.eof = true;
        if !produced_audio {
            return Err(QueueError::NoAudioDataFound);
        }
        self.drain_pending = true;
        if self.state.is_filling() {
            self.state = PlayerState::FlushingEof;
            return Ok(EofPlan {
                flush: has_partial,
                start: true,
            });
        }
        Ok(EofPlan {
            flush: has_partial,
            start: false,
        })
    }

    /// After end of stream, the one-time request to let the engine play out
    /// and stop. Deferred while paused.
    pub fn take_drain(&mut self) -> Option<EngineCommand> {
        let ready = self.eof
            && self.drain_pending
            && self.engine_started
            && matches!(
                self.state,
                PlayerState::Playing | PlayerState::WaitingForQueueStart
            );
        if !ready {
            return None;
        }
        self.drain_pending = false;
        Some(EngineCommand::DrainAndStop)
    }

    pub fn pause(&mut self) -> Option<EngineCommand> {
        if self.state != PlayerState::Playing {
            warn!(state = ?self.state, "pause ignored");
            return None;
        }
        self.state = PlayerState::Paused;
        Some(EngineCommand::Pause)
    }

    pub fn resume(&mut self) -> Option<EngineCommand> {
        if self.state != PlayerState::Paused {
            warn!(state = ?self.state, "resume ignored");
            return None;
        }
        self.state = PlayerState::Playing;
        Some(EngineCommand::Start)
    }

    /// Move towards `Stopped`. `drain` lets enqueued audio play out instead of
    /// cutting it off. Returns the command for a started engine.
    pub fn stop(&mut self, reason: StopReason, drain: bool) -> Option<EngineCommand> {
        if self.state.is_stopping_or_stopped() {
            return None;
        }
        self.stop_reason = Some(reason);
        if self.state == PlayerState::Initialized {
            self.state = PlayerState::Stopped;
            return None;
        }
        self.state = PlayerState::Stopping;
        self.drain_pending = false;
        if !self.engine_started {
            return None;
        }
        Some(if drain {
            EngineCommand::DrainAndStop
        } else {
            EngineCommand::StopNow
        })
    }

    /// Teardown done.
    pub fn finish(&mut self) {
        if self.stop_reason.is_none() {
            self.stop_reason = Some(StopReason::Requested);
        }
        self.state = PlayerState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn filling(threshold: usize) -> PlaybackMachine {
        let mut m = PlaybackMachine::new(threshold);
        assert_eq!(m.request_start(), StartRequest::SpawnDriver);
        assert_eq!(m.state(), PlayerState::StartingThread);
        m.driver_started();
        assert_eq!(m.state(), PlayerState::WaitingForData);
        m.on_data();
        assert_eq!(m.state(), PlayerState::Buffering);
        m
    }

    fn playing(threshold: usize) -> PlaybackMachine {
        let mut m = filling(threshold);
        for in_flight in 1..threshold {
            assert_eq!(m.on_rotation(in_flight), None);
        }
        assert_eq!(m.on_rotation(threshold), Some(EngineCommand::Start));
        assert!(!m.on_running_changed(true));
        assert_eq!(m.state(), PlayerState::Playing);
        m
    }

    #[test]
    fn threshold_of_two_starts_on_second_rotation() {
        let mut m = filling(2);
        assert_eq!(m.on_rotation(1), None);
        assert_eq!(m.state(), PlayerState::Buffering);
        assert_eq!(m.on_rotation(2), Some(EngineCommand::Start));
        assert_eq!(m.state(), PlayerState::WaitingForQueueStart);
        // A third rotation does not start again.
        assert_eq!(m.on_rotation(3), None);
        m.on_running_changed(true);
        assert_eq!(m.state(), PlayerState::Playing);
    }

    #[test]
    fn rotation_before_any_data_can_start_too() {
        let mut m = PlaybackMachine::new(1);
        m.request_start();
        m.driver_started();
        assert_eq!(m.on_rotation(1), Some(EngineCommand::Start));
        assert_eq!(m.state(), PlayerState::WaitingForQueueStart);
    }

    #[test]
    fn pause_and_resume_toggle_playing() {
        let mut m = playing(2);
        assert_eq!(m.pause(), Some(EngineCommand::Pause));
        assert_eq!(m.state(), PlayerState::Paused);
        assert_eq!(m.pause(), None);
        assert_eq!(m.resume(), Some(EngineCommand::Start));
        assert_eq!(m.state(), PlayerState::Playing);
        assert_eq!(m.resume(), None);
    }

    #[test]
    fn start_while_paused_is_a_resume() {
        let mut m = playing(2);
        m.pause();
        assert_eq!(m.request_start(), StartRequest::Resume);
        assert_eq!(m.state(), PlayerState::Playing);
        assert_eq!(m.request_start(), StartRequest::Ignored);
    }

    #[test]
    fn underrun_rebuffers_then_goes_straight_to_playing() {
        let mut m = playing(2);
        assert_eq!(m.on_buffer_consumed(1), None);
        assert_eq!(m.on_buffer_consumed(0), Some(EngineCommand::Pause));
        assert_eq!(m.state(), PlayerState::Buffering);
        assert_eq!(m.on_rotation(1), None);
        assert_eq!(m.on_rotation(2), Some(EngineCommand::Start));
        assert_eq!(m.state(), PlayerState::Playing);
    }

    #[test]
    fn end_of_stream_while_filling_flushes_and_starts() {
        let mut m = filling(2);
        m.on_rotation(1);
        let plan = m.on_end_of_stream(true, true).unwrap();
        assert_eq!(
            plan,
            EofPlan {
                flush: true,
                start: true
            }
        );
        assert_eq!(m.state(), PlayerState::FlushingEof);
        // The flush rotation must not trigger a second start.
        assert_eq!(m.on_rotation(2), None);
        assert_eq!(m.begin_playback(), Some(EngineCommand::Start));
        assert_eq!(m.state(), PlayerState::WaitingForQueueStart);
        assert_eq!(m.take_drain(), Some(EngineCommand::DrainAndStop));
        assert_eq!(m.take_drain(), None);
    }

    #[test]
    fn end_of_stream_while_playing_only_drains() {
        let mut m = playing(2);
        let plan = m.on_end_of_stream(true, false).unwrap();
        assert!(!plan.start);
        assert_eq!(m.state(), PlayerState::Playing);
        assert_eq!(m.on_buffer_consumed(0), None);
        assert_eq!(m.take_drain(), Some(EngineCommand::DrainAndStop));
        assert!(m.on_running_changed(false));
        assert_eq!(m.state(), PlayerState::Stopping);
        m.finish();
        assert_eq!(m.state(), PlayerState::Stopped);
        assert_eq!(m.stop_reason(), Some(StopReason::EndOfStream));
    }

    #[test]
    fn drain_waits_for_resume() {
        let mut m = playing(2);
        m.pause();
        m.on_end_of_stream(true, false).unwrap();
        assert_eq!(m.take_drain(), None);
        m.resume();
        assert_eq!(m.take_drain(), Some(EngineCommand::DrainAndStop));
    }

    #[test]
    fn end_of_stream_without_audio_fails() {
        let mut m = PlaybackMachine::new(2);
        m.request_start();
        m.driver_started();
        assert_eq!(
            m.on_end_of_stream(false, false),
            Err(QueueError::NoAudioDataFound)
        );
    }

    #[test]
    fn engine_pause_is_not_an_end() {
        let mut m = playing(2);
        m.pause();
        assert!(!m.on_running_changed(false));
        assert_eq!(m.state(), PlayerState::Paused);
    }

    #[rstest]
    #[case::waiting(PlayerState::WaitingForData)]
    #[case::buffering(PlayerState::Buffering)]
    #[case::playing(PlayerState::Playing)]
    #[case::paused(PlayerState::Paused)]
    fn stop_reaches_stopped_from_any_active_state(#[case] target: PlayerState) {
        let mut m = playing(1);
        match target {
            PlayerState::Playing => {}
            PlayerState::Paused => {
                m.pause();
            }
            _ => {
                m = PlaybackMachine::new(1);
                m.request_start();
                m.driver_started();
                if target == PlayerState::Buffering {
                    m.on_data();
                }
            }
        }
        assert_eq!(m.state(), target);
        let cmd = m.stop(StopReason::Requested, false);
        assert_eq!(cmd.is_some(), m.engine_started());
        assert_eq!(m.state(), PlayerState::Stopping);
        assert_eq!(m.stop(StopReason::Requested, false), None);
        m.finish();
        assert!(m.state().is_terminal());
    }

    #[test]
    fn stop_before_start_is_immediate() {
        let mut m = PlaybackMachine::new(2);
        assert_eq!(m.stop(StopReason::Requested, false), None);
        assert_eq!(m.state(), PlayerState::Stopped);
        assert_eq!(m.request_start(), StartRequest::Ignored);
    }

    #[rstest]
    #[case(true, EngineCommand::DrainAndStop)]
    #[case(false, EngineCommand::StopNow)]
    fn failure_stop_command(#[case] drain: bool, #[case] expected: EngineCommand) {
        let mut m = playing(2);
        assert_eq!(m.stop(StopReason::Failed, drain), Some(expected));
        assert_eq!(m.stop_reason(), Some(StopReason::Failed));
    }
}
