//! Codec session lifecycle.
//!
//! A [`CodecSession`] is created at stream setup and owns everything one
//! stream needs: the encoder/decoder handles built by a [`CodecEngine`], the
//! send-side [`EmitCursor`], the receive-side [`Reassembler`] and
//! [`SyncTracker`], and the [`ResetRequest`] flags behind its
//! [`ControlHandle`].
//!
//! ## Lifecycle
//!
//! ```text
//! new()                       -> Uninitialized
//! first encode/decode call    -> Ready      (handle created lazily)
//! reset / size change         -> Ready      (handle dropped and recreated)
//! handle creation fails       -> Failed     (every later call errors)
//! drop                        -> handles released
//! ```
//!
//! ## Call contract
//!
//! Both paths are driven synchronously by one media loop. The send path is
//! [`encode`](CodecSession::encode) followed by
//! [`next_packet`](CodecSession::next_packet) until a packet comes back
//! end-marked. The receive path is one [`decode`](CodecSession::decode) per
//! packet. After every call the caller should check
//! [`needs_key_frame`](CodecSession::needs_key_frame) and, while it is true,
//! ask the remote sender for an intra refresh.

pub mod control;
pub mod engine;

use std::time::{Duration, Instant};

pub use control::{ControlCommand, ControlHandle, ResetRequest};
pub use engine::{CodecEngine, Decoded, EncodedFrame, VideoDecoder, VideoEncoder, VideoPicture};

use crate::config::{EncoderSettings, SessionConfig};
use crate::error::{CodecRole, Result, VpxError};
use crate::media::{Assembled, EmitCursor, InboundPacket, OutboundPacket, Reassembler};
use crate::payload;
use crate::sync::{Admission, SyncState, SyncTracker};

/// Coarse lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No encoder or decoder created yet.
    Uninitialized,
    /// At least one handle is live.
    Ready,
    /// Handle creation failed; the session must be torn down.
    Failed,
}

/// Non-fatal result of one [`CodecSession::decode`] call.
#[derive(Debug, PartialEq)]
pub enum DecodeOutcome<P> {
    /// A complete access unit decoded into a picture.
    Picture(P),
    /// Keep feeding packets.
    MoreDataNeeded,
    /// Loss, desync or corruption. Buffers and sync state were reset; the
    /// caller should expect loss and may request a key frame.
    Restart(VpxError),
    /// Packet rejected by the descriptor parser. Nothing else changed.
    Dropped(VpxError),
}

/// Rate limiter for forced key frames.
#[derive(Debug)]
struct KeyFramePacer {
    pending: bool,
    last_forced: Option<Instant>,
    min_interval: Duration,
}

impl KeyFramePacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            pending: false,
            last_forced: None,
            min_interval,
        }
    }

    fn request(&mut self) {
        self.pending = true;
    }

    /// Whether the next encode should force a key frame. A pending request
    /// stays pending until `min_interval` has passed since the last one.
    fn take(&mut self, now: Instant) -> bool {
        if !self.pending {
            return false;
        }

        let due = self
            .last_forced
            .is_none_or(|last| now.saturating_duration_since(last) > self.min_interval);

        if due {
            self.pending = false;
            self.last_forced = Some(now);
        } else {
            tracing::trace!("forced key frame deferred");
        }
        due
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// One VP8/VP9 stream: framing, reassembly, key-frame recovery and the
/// encoder/decoder handles behind them.
pub struct CodecSession<E: CodecEngine> {
    engine: E,
    config: SessionConfig,
    control: ControlHandle,
    failure: Option<VpxError>,

    encoder: Option<E::Encoder>,
    settings: EncoderSettings,
    cursor: Option<EmitCursor>,
    pacer: KeyFramePacer,
    start_time: Option<Instant>,
    last_encode: Option<Instant>,
    frame_count: u64,

    decoder: Option<E::Decoder>,
    reassembler: Reassembler,
    sync: SyncTracker,
}

impl<E: CodecEngine> CodecSession<E> {
    pub fn new(engine: E, config: SessionConfig) -> Result<Self> {
        config.validate()?;

        tracing::debug!(
            variant = %config.variant,
            max_packet_size = config.max_packet_size,
            encode = config.encode,
            decode = config.decode,
            "codec session created"
        );

        let settings = config.encoder_settings();
        let pacer = KeyFramePacer::new(config.key_frame_min_interval);
        let reassembler = Reassembler::new(config.variant);

        Ok(Self {
            engine,
            config,
            control: ControlHandle::new(),
            failure: None,
            encoder: None,
            settings,
            cursor: None,
            pacer,
            start_time: None,
            last_encode: None,
            frame_count: 0,
            decoder: None,
            reassembler,
            sync: SyncTracker::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle for the control channel; clone it onto any thread.
    pub fn control_handle(&self) -> ControlHandle {
        self.control.clone()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        if self.failure.is_some() {
            LifecycleState::Failed
        } else if self.encoder.is_some() || self.decoder.is_some() {
            LifecycleState::Ready
        } else {
            LifecycleState::Uninitialized
        }
    }

    /// Settings the current (or next) encoder is built with.
    pub fn encoder_settings(&self) -> EncoderSettings {
        self.settings
    }

    /// Pictures encoded since the encoder was last created.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// A forced key frame is queued but has not been honored yet.
    pub fn key_frame_pending(&self) -> bool {
        self.pacer.pending
    }

    /// Packets of the last encoded picture still waiting for
    /// [`next_packet`](Self::next_packet).
    pub fn has_pending_packets(&self) -> bool {
        self.cursor.as_ref().is_some_and(|c| !c.is_finished())
    }

    pub fn sync_state(&self) -> &SyncState {
        self.sync.state()
    }

    /// Bytes of the access unit currently being reassembled.
    pub fn buffered_len(&self) -> usize {
        self.reassembler.buffered_len()
    }

    /// The receive path cannot decode until the sender produces a key frame.
    pub fn needs_key_frame(&self) -> bool {
        self.sync.needs_key_frame()
    }

    /// Encode a new picture and return its first packet.
    ///
    /// Returns `Ok(None)` when the encode transform failed for this picture;
    /// the caller simply moves on to the next one. Remaining packets come from
    /// [`next_packet`](Self::next_packet).
    ///
    /// # Errors
    ///
    /// [`VpxError::InitFailure`] if the encoder cannot be created (fatal).
    pub fn encode(&mut self, picture: &E::Picture, now: Instant) -> Result<Option<OutboundPacket>> {
        self.check_failed()?;
        if !self.config.encode {
            return Err(VpxError::InvalidConfig(
                "session is not configured to encode".into(),
            ));
        }

        self.apply_encoder_requests(picture.width(), picture.height());

        let force_key_frame = self.pacer.take(now);
        if force_key_frame {
            tracing::debug!("forcing key frame");
        }

        let start = *self.start_time.get_or_insert(now);
        let pts_ms = millis(now.saturating_duration_since(start));
        let duration_ms = self
            .last_encode
            .map_or(pts_ms, |last| millis(now.saturating_duration_since(last)));

        let encoder = self.ensure_encoder()?;
        let result = encoder.encode(picture, pts_ms, duration_ms, force_key_frame);

        match result {
            Ok(frame) => {
                if self.has_pending_packets() {
                    tracing::debug!("previous picture not fully drained, dropping its tail");
                }
                self.last_encode = Some(now);
                self.frame_count += 1;

                tracing::trace!(
                    bytes = frame.data.len(),
                    key = frame.key_frame,
                    pts_ms,
                    duration_ms,
                    "picture encoded"
                );

                self.cursor = Some(EmitCursor::new(
                    self.config.variant,
                    frame.data,
                    frame.key_frame,
                    self.config.max_packet_size,
                )?);
                Ok(Some(self.next_packet()))
            }
            Err(err) => {
                tracing::warn!(%err, "encode failed, nothing produced");
                self.cursor = None;
                if force_key_frame {
                    self.pacer.request();
                }
                Ok(None)
            }
        }
    }

    /// Next packet of the last encoded picture ("same picture" call).
    ///
    /// The end-marked packet closes the picture. With nothing pending, a bare
    /// end-marked boundary is returned.
    pub fn next_packet(&mut self) -> OutboundPacket {
        match self.cursor.as_mut().and_then(|cursor| cursor.next_packet()) {
            Some(packet) => {
                if packet.end_of_frame {
                    self.cursor = None;
                }
                packet
            }
            None => {
                self.cursor = None;
                tracing::trace!("no pending frame data, emitting bare boundary");
                OutboundPacket::frame_boundary()
            }
        }
    }

    /// Feed one received packet.
    ///
    /// # Errors
    ///
    /// [`VpxError::InitFailure`] if the decoder cannot be created (fatal).
    /// Every per-packet problem is reported through [`DecodeOutcome`].
    pub fn decode(&mut self, packet: InboundPacket<'_>) -> Result<DecodeOutcome<E::Picture>> {
        self.check_failed()?;
        if !self.config.decode {
            return Err(VpxError::InvalidConfig(
                "session is not configured to decode".into(),
            ));
        }

        if self.control.request().take_decoder_reset() {
            tracing::info!("decoder reset requested");
            if self.decoder.take().is_some() {
                tracing::debug!("decoder destroyed");
            }
        }
        self.ensure_decoder()?;

        let assembled = if packet.data.is_empty() {
            self.reassembler.push(&packet)
        } else {
            let (descriptor, header_len) = match payload::parse(self.config.variant, packet.data) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::debug!(%err, ts = packet.timestamp, "dropping packet");
                    return Ok(DecodeOutcome::Dropped(err));
                }
            };
            let is_key =
                descriptor.is_key_frame_start(packet.data.get(header_len..).unwrap_or_default());
            if self.sync.observe(descriptor.is_start(), is_key, packet.timestamp)
                == Admission::AwaitKeyFrame
            {
                return Ok(DecodeOutcome::MoreDataNeeded);
            }
            self.reassembler.push_parsed(&packet, descriptor, header_len)
        };

        let decoded = match assembled {
            Ok(Assembled::Buffered) => return Ok(DecodeOutcome::MoreDataNeeded),
            Ok(Assembled::Discarded) => {
                self.sync.on_packet_loss();
                return Ok(DecodeOutcome::MoreDataNeeded);
            }
            Ok(Assembled::Complete(unit)) => {
                if unit.is_empty() {
                    tracing::trace!(ts = packet.timestamp, "empty access unit");
                    return Ok(DecodeOutcome::MoreDataNeeded);
                }
                let Some(decoder) = self.decoder.as_mut() else {
                    return Err(VpxError::InitFailure {
                        codec: CodecRole::Decoder,
                        reason: "decoder not initialized".into(),
                    });
                };
                tracing::trace!(bytes = unit.len(), ts = packet.timestamp, "decoding access unit");
                decoder.decode(unit)
            }
            Err(err @ VpxError::MalformedHeader { .. }) => {
                return Ok(DecodeOutcome::Dropped(err));
            }
            Err(err) => {
                self.sync.on_decode_failure();
                return Ok(DecodeOutcome::Restart(err));
            }
        };

        match decoded {
            Ok(Decoded::Picture(picture)) => Ok(DecodeOutcome::Picture(picture)),
            Ok(Decoded::NotYet) => Ok(DecodeOutcome::MoreDataNeeded),
            Ok(Decoded::Corrupted) => {
                tracing::debug!(ts = packet.timestamp, "decoder reported corruption");
                self.sync.on_decode_failure();
                Ok(DecodeOutcome::Restart(VpxError::DecodeCorrupted))
            }
            Err(err) => {
                tracing::debug!(%err, ts = packet.timestamp, "decode failed");
                self.sync.on_decode_failure();
                Ok(DecodeOutcome::Restart(err))
            }
        }
    }

    /// Consume pending control requests that affect the encoder.
    fn apply_encoder_requests(&mut self, width: u32, height: u32) {
        let request = self.control.request();
        let reset_requested = request.take_encoder_reset();
        let bandwidth = request.take_bandwidth();
        let key_frame_requested = request.take_key_frame_request();

        let mut reset = reset_requested;
        if reset_requested {
            tracing::info!("encoder reset requested");
        }

        if width != self.config.width || height != self.config.height {
            tracing::info!(
                from_width = self.config.width,
                from_height = self.config.height,
                width,
                height,
                "picture size changed, resetting encoder"
            );
            self.config.width = width;
            self.config.height = height;
            self.settings = self.config.encoder_settings();
            reset = true;
        }

        if let Some(kbps) = bandwidth {
            self.config.bandwidth_kbps = Some(kbps);
            self.settings = self.config.encoder_settings();

            if !reset {
                if let Some(encoder) = self.encoder.as_mut() {
                    match encoder.reconfigure(&self.settings) {
                        Ok(()) => tracing::info!(
                            bitrate_kbps = self.settings.bitrate_kbps,
                            "encoder bitrate updated in place"
                        ),
                        Err(err) => {
                            tracing::info!(%err, "in-place reconfigure unavailable, resetting encoder");
                            reset = true;
                        }
                    }
                }
            }
        }

        if reset {
            self.teardown_encoder();
            self.pacer.request();
        }

        if key_frame_requested {
            self.pacer.request();
        }
    }

    fn teardown_encoder(&mut self) {
        if self.encoder.take().is_some() {
            tracing::debug!("encoder destroyed");
        }
        self.cursor = None;
        self.start_time = None;
        self.last_encode = None;
        self.frame_count = 0;
    }

    fn ensure_encoder(&mut self) -> Result<&mut E::Encoder> {
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => match self.engine.create_encoder(self.config.variant, &self.settings) {
                Ok(encoder) => {
                    tracing::info!(
                        variant = %self.config.variant,
                        width = self.settings.width,
                        height = self.settings.height,
                        bitrate_kbps = self.settings.bitrate_kbps,
                        "encoder initialized"
                    );
                    encoder
                }
                Err(err) => return Err(self.fail(CodecRole::Encoder, err)),
            },
        };
        Ok(self.encoder.insert(encoder))
    }

    /// Create the decoder if needed. A fresh decoder starts from an empty
    /// buffer and needs a key frame.
    fn ensure_decoder(&mut self) -> Result<()> {
        if self.decoder.is_some() {
            return Ok(());
        }

        match self.engine.create_decoder(self.config.variant) {
            Ok(decoder) => {
                tracing::info!(variant = %self.config.variant, "decoder initialized");
                self.decoder = Some(decoder);
                self.reassembler.reset();
                self.sync.reset();
                self.sync.request_key_frame();
                Ok(())
            }
            Err(err) => Err(self.fail(CodecRole::Decoder, err)),
        }
    }

    fn check_failed(&self) -> Result<()> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Record a fatal construction failure.
    fn fail(&mut self, codec: CodecRole, cause: VpxError) -> VpxError {
        let reason = match cause {
            VpxError::InitFailure { reason, .. } => reason,
            other => other.to_string(),
        };
        let err = VpxError::InitFailure { codec, reason };
        tracing::error!(%err, "session unusable");
        self.failure = Some(err.clone());
        err
    }
}

impl<E: CodecEngine> Drop for CodecSession<E> {
    fn drop(&mut self) {
        tracing::debug!(
            encoder = self.encoder.is_some(),
            decoder = self.decoder.is_some(),
            discarded_bytes = self.reassembler.buffered_len(),
            "codec session torn down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_idle_without_request() {
        let mut pacer = KeyFramePacer::new(Duration::from_millis(250));
        assert!(!pacer.take(Instant::now()));
    }

    #[test]
    fn pacer_limits_forced_key_frames() {
        let t0 = Instant::now();
        let mut pacer = KeyFramePacer::new(Duration::from_millis(250));

        pacer.request();
        assert!(pacer.take(t0));
        assert!(!pacer.pending);

        pacer.request();
        assert!(!pacer.take(t0 + Duration::from_millis(100)));
        assert!(!pacer.take(t0 + Duration::from_millis(250)));
        assert!(pacer.pending);
        assert!(pacer.take(t0 + Duration::from_millis(251)));
        assert!(!pacer.take(t0 + Duration::from_millis(600)));
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
