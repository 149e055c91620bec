use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::parse_bandwidth;
use crate::error::Result;

/// Out-of-band requests for a [`CodecSession`](super::CodecSession).
///
/// Written by a control channel that may live on another thread, read and
/// cleared by the session at the start of its next encode or decode call.
/// Each flag is an independent atomic; there is no ordering between them, so
/// a request may take effect one call late.
#[derive(Debug, Default)]
pub struct ResetRequest {
    reset_encoder: AtomicBool,
    reset_decoder: AtomicBool,
    force_key_frame: AtomicBool,
    /// Pending bandwidth in kbps; 0 means none.
    new_bandwidth: AtomicU32,
}

impl ResetRequest {
    pub fn request_encoder_reset(&self) {
        self.reset_encoder.store(true, Ordering::SeqCst);
    }

    pub fn request_decoder_reset(&self) {
        self.reset_decoder.store(true, Ordering::SeqCst);
    }

    pub fn request_key_frame(&self) {
        self.force_key_frame.store(true, Ordering::SeqCst);
    }

    /// Queue a bandwidth change. A later value overwrites an unconsumed one;
    /// zero is ignored.
    pub fn set_bandwidth(&self, kbps: u32) {
        self.new_bandwidth.store(kbps, Ordering::SeqCst);
    }

    pub(crate) fn take_encoder_reset(&self) -> bool {
        self.reset_encoder.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_decoder_reset(&self) -> bool {
        self.reset_decoder.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_key_frame_request(&self) -> bool {
        self.force_key_frame.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_bandwidth(&self) -> Option<u32> {
        match self.new_bandwidth.swap(0, Ordering::SeqCst) {
            0 => None,
            kbps => Some(kbps),
        }
    }
}

/// Fire-and-forget commands accepted by the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ResetEncoder,
    ResetDecoder,
    GenerateKeyFrame,
    /// New target bandwidth in kbps.
    Bandwidth(u32),
}

impl ControlCommand {
    /// Expand a reset bitmask: bit 0 resets the encoder, bit 1 the decoder.
    pub fn from_reset_mask(mask: u32) -> Vec<Self> {
        let mut commands = Vec::with_capacity(2);
        if mask & 1 != 0 {
            commands.push(Self::ResetEncoder);
        }
        if mask & 2 != 0 {
            commands.push(Self::ResetDecoder);
        }
        commands
    }
}

/// Cloneable, thread-safe handle onto a session's [`ResetRequest`].
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    request: Arc<ResetRequest>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, command: ControlCommand) {
        tracing::debug!(?command, "control command");
        match command {
            ControlCommand::ResetEncoder => self.request.request_encoder_reset(),
            ControlCommand::ResetDecoder => self.request.request_decoder_reset(),
            ControlCommand::GenerateKeyFrame => self.request.request_key_frame(),
            ControlCommand::Bandwidth(kbps) => self.request.set_bandwidth(kbps),
        }
    }

    /// Queue a bandwidth change given as text (e.g. `"1mb"`).
    pub fn send_bandwidth_str(&self, value: &str) -> Result<()> {
        let kbps = parse_bandwidth(value)?;
        self.send(ControlCommand::Bandwidth(kbps));
        Ok(())
    }

    pub(crate) fn request(&self) -> &ResetRequest {
        &self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_consumed_once() {
        let handle = ControlHandle::new();
        handle.send(ControlCommand::ResetEncoder);
        handle.send(ControlCommand::GenerateKeyFrame);

        let req = handle.request();
        assert!(req.take_encoder_reset());
        assert!(!req.take_encoder_reset());
        assert!(!req.take_decoder_reset());
        assert!(req.take_key_frame_request());
        assert!(!req.take_key_frame_request());
    }

    #[test]
    fn latest_bandwidth_wins() {
        let handle = ControlHandle::new();
        handle.send(ControlCommand::Bandwidth(500));
        handle.send_bandwidth_str("1mb").unwrap();
        assert_eq!(handle.request().take_bandwidth(), Some(1024));
        assert_eq!(handle.request().take_bandwidth(), None);

        handle.send(ControlCommand::Bandwidth(0));
        assert_eq!(handle.request().take_bandwidth(), None);
        assert!(handle.send_bandwidth_str("lots").is_err());
    }

    #[test]
    fn reset_mask_bits() {
        assert!(ControlCommand::from_reset_mask(0).is_empty());
        assert_eq!(
            ControlCommand::from_reset_mask(3),
            vec![ControlCommand::ResetEncoder, ControlCommand::ResetDecoder]
        );
        assert_eq!(
            ControlCommand::from_reset_mask(2),
            vec![ControlCommand::ResetDecoder]
        );
    }

    #[test]
    fn handle_shared_across_threads() {
        let handle = ControlHandle::new();
        let remote = handle.clone();
        std::thread::spawn(move || remote.send(ControlCommand::ResetDecoder))
            .join()
            .unwrap();
        assert!(handle.request().take_decoder_reset());
    }
}
