//! Key-frame and start-frame tracking for the receive path.
//!
//! After a join or a loss the decoder can only resume at a key frame. The
//! tracker classifies every inbound packet, holds back packets that cannot be
//! decoded yet, and tells the caller when to ask the sender for an intra
//! refresh.
//!
//! Some senders mark key frames unreliably, so after
//! [`KEY_FRAME_FALLBACK_THRESHOLD`] packets without one, any start packet is
//! promoted to a key frame to force progress.

/// Packets without a key frame before start packets are promoted to key frames.
pub const KEY_FRAME_FALLBACK_THRESHOLD: u32 = 50;

/// Decimation for the "waiting for key frame" diagnostic.
const WAIT_LOG_INTERVAL: u32 = 200;

/// Synchronization state of one receive stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// A key frame has been seen since the last loss or decode failure.
    pub has_key: bool,
    /// Packets observed without a key frame. Only a key frame clears it, so
    /// it keeps growing across decode failures and loss.
    pub frames_since_key: u32,
    /// Packets observed during the current outage; drives the wait diagnostic.
    pub packets_waiting: u32,
    /// Key frames seen since `has_key` last became true.
    pub key_frames: u32,
    /// A start packet has been seen during the current outage.
    pub have_start_frame: bool,
    /// RTP timestamp of the most recently observed packet.
    pub last_input_timestamp: Option<u32>,
    /// Explicit refresh request, cleared by the next key frame.
    pub wait_for_key_frame: bool,
}

/// Whether a classified packet may proceed to reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// No key frame and no start packet yet; hold it back.
    AwaitKeyFrame,
}

#[derive(Debug, Default)]
pub struct SyncTracker {
    state: SyncState,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Classify one inbound packet and update the state.
    ///
    /// `is_start` and `is_key` come straight from the payload descriptor.
    /// Returns whether the packet should be reassembled.
    pub fn observe(&mut self, is_start: bool, is_key: bool, timestamp: u32) -> Admission {
        let state = &mut self.state;
        state.last_input_timestamp = Some(timestamp);

        let mut is_key = is_key;
        if !state.has_key {
            state.frames_since_key = state.frames_since_key.saturating_add(1);
            state.packets_waiting = state.packets_waiting.saturating_add(1);
            if state.frames_since_key > KEY_FRAME_FALLBACK_THRESHOLD && is_start && !is_key {
                tracing::warn!(
                    frames_since_key = state.frames_since_key,
                    "no key frame, treating start as key"
                );
                is_key = true;
            }
        }

        if is_start {
            state.have_start_frame = true;
        }

        if is_key {
            if state.has_key {
                state.key_frames = state.key_frames.saturating_add(1);
            } else {
                tracing::debug!(
                    waited = state.frames_since_key,
                    ts = timestamp,
                    "key frame acquired"
                );
                state.has_key = true;
                state.frames_since_key = 0;
                state.packets_waiting = 0;
                state.key_frames = 1;
            }
            state.wait_for_key_frame = false;
            return Admission::Admit;
        }

        if !state.has_key {
            if state.packets_waiting % WAIT_LOG_INTERVAL == 0 {
                tracing::debug!(
                    frames_since_key = state.frames_since_key,
                    waiting = state.packets_waiting,
                    "waiting for key frame"
                );
            }
            if !state.have_start_frame {
                return Admission::AwaitKeyFrame;
            }
        }

        Admission::Admit
    }

    /// A non-start packet arrived with nothing to attach it to: the start of
    /// its unit was lost, so the decoder reference is no longer trustworthy.
    pub fn on_packet_loss(&mut self) {
        if self.state.has_key {
            tracing::debug!("packet loss? dropping key frame state");
            self.drop_key_state();
        }
    }

    /// The decode transform failed or flagged corruption.
    pub fn on_decode_failure(&mut self) {
        self.drop_key_state();
    }

    /// Ask for a key frame even if the stream currently looks healthy.
    pub fn request_key_frame(&mut self) {
        self.state.wait_for_key_frame = true;
    }

    /// True while the caller should keep asking the sender for an intra
    /// refresh. Safe to poll on every call.
    pub fn needs_key_frame(&self) -> bool {
        !self.state.has_key || self.state.wait_for_key_frame
    }

    /// Back to the initial "nothing seen yet" state.
    pub fn reset(&mut self) {
        self.state = SyncState::default();
    }

    fn drop_key_state(&mut self) {
        self.state.has_key = false;
        self.state.have_start_frame = false;
        self.state.packets_waiting = 0;
        self.state.key_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_without_key() {
        let t = SyncTracker::new();
        assert!(t.needs_key_frame());
        assert!(!t.state().has_key);
    }

    #[test]
    fn key_frame_admits_and_clears_need() {
        let mut t = SyncTracker::new();
        assert_eq!(t.observe(true, true, 1), Admission::Admit);
        assert!(!t.needs_key_frame());
        assert_eq!(t.state().key_frames, 1);

        t.observe(true, true, 2);
        assert_eq!(t.state().key_frames, 2);
    }

    #[test]
    fn mid_stream_join_waits_for_start() {
        let mut t = SyncTracker::new();
        assert_eq!(t.observe(false, false, 1), Admission::AwaitKeyFrame);
        assert_eq!(t.observe(false, false, 1), Admission::AwaitKeyFrame);
        // a non-key start is admitted so the unit can be buffered
        assert_eq!(t.observe(true, false, 2), Admission::Admit);
        assert_eq!(t.observe(false, false, 2), Admission::Admit);
        assert!(t.needs_key_frame());
        assert_eq!(t.state().last_input_timestamp, Some(2));
    }

    #[test]
    fn start_promoted_after_fifty_misses() {
        let mut t = SyncTracker::new();
        for i in 0..KEY_FRAME_FALLBACK_THRESHOLD {
            t.observe(false, false, i);
        }
        assert_eq!(t.state().frames_since_key, 50);
        assert!(!t.state().has_key);

        t.observe(true, false, 100);
        assert!(t.state().has_key);
        assert!(!t.needs_key_frame());
    }

    #[test]
    fn fallback_survives_repeated_decode_failures() {
        let mut t = SyncTracker::new();
        let mut promoted_at = None;
        for i in 0..200u32 {
            t.observe(true, false, i);
            if t.state().has_key {
                promoted_at = Some(i);
                break;
            }
            t.observe(false, false, i);
            t.on_decode_failure();
            assert_eq!(t.state().packets_waiting, 0);
        }
        // two packets per unit: the 51st packet is the start of unit 25
        assert_eq!(promoted_at, Some(25));
        assert_eq!(t.state().frames_since_key, 0);
    }

    #[test]
    fn start_not_promoted_before_threshold() {
        let mut t = SyncTracker::new();
        for i in 0..KEY_FRAME_FALLBACK_THRESHOLD - 1 {
            t.observe(false, false, i);
        }
        t.observe(true, false, 100);
        assert!(!t.state().has_key);
    }

    #[test]
    fn decode_failure_requires_new_key() {
        let mut t = SyncTracker::new();
        t.observe(true, true, 1);
        t.on_decode_failure();
        assert!(t.needs_key_frame());
        assert!(!t.state().have_start_frame);

        assert_eq!(t.observe(false, false, 2), Admission::AwaitKeyFrame);
        assert!(t.needs_key_frame());
        t.observe(true, true, 3);
        assert!(!t.needs_key_frame());
    }

    #[test]
    fn packet_loss_only_matters_with_key() {
        let mut t = SyncTracker::new();
        t.observe(false, false, 1);
        t.on_packet_loss();
        assert_eq!(t.state().frames_since_key, 1);

        t.observe(true, true, 2);
        t.on_packet_loss();
        assert!(!t.state().has_key);
        assert_eq!(t.state().frames_since_key, 0);
    }

    #[test]
    fn explicit_request_until_key() {
        let mut t = SyncTracker::new();
        t.observe(true, true, 1);
        t.request_key_frame();
        assert!(t.needs_key_frame());
        t.observe(false, false, 1);
        assert!(t.needs_key_frame());
        t.observe(true, true, 2);
        assert!(!t.needs_key_frame());
    }
}
