use std::time::Duration;

use crate::error::{Result, VpxError};
use crate::payload::PayloadVariant;

/// Picture size assumed until the first picture arrives.
pub const DEFAULT_WIDTH: u32 = 320;
pub const DEFAULT_HEIGHT: u32 = 240;

/// Size used when an encoder is asked for a zero-sized picture.
const FALLBACK_WIDTH: u32 = 1280;
const FALLBACK_HEIGHT: u32 = 720;

/// Minimum spacing between two forced key frames.
pub const DEFAULT_KEY_FRAME_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Per-session configuration, fixed at stream setup.
///
/// No `Default`: the packet size limit comes from the transport and must be
/// supplied by the caller.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Payload descriptor format for the whole session.
    pub variant: PayloadVariant,
    /// Upper bound for descriptor + payload of each outbound packet.
    pub max_packet_size: usize,
    /// Negotiated picture width; replaced by the first encoded picture's size.
    pub width: u32,
    /// Negotiated picture height.
    pub height: u32,
    /// Negotiated target bitrate in kbps. `None` derives one from the picture size.
    pub bandwidth_kbps: Option<u32>,
    /// Forced key frames closer together than this are deferred.
    pub key_frame_min_interval: Duration,
    /// Whether this session encodes (send path).
    pub encode: bool,
    /// Whether this session decodes (receive path).
    pub decode: bool,
}

impl SessionConfig {
    /// Bidirectional session with default picture size and key-frame pacing.
    pub fn new(variant: PayloadVariant, max_packet_size: usize) -> Self {
        Self {
            variant,
            max_packet_size,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            bandwidth_kbps: None,
            key_frame_min_interval: DEFAULT_KEY_FRAME_MIN_INTERVAL,
            encode: true,
            decode: true,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_bandwidth(mut self, kbps: u32) -> Self {
        self.bandwidth_kbps = Some(kbps);
        self
    }

    pub fn with_key_frame_min_interval(mut self, interval: Duration) -> Self {
        self.key_frame_min_interval = interval;
        self
    }

    /// Restrict the session to one direction.
    pub fn with_roles(mut self, encode: bool, decode: bool) -> Self {
        self.encode = encode;
        self.decode = decode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let header_len = self.variant.send_header_len();
        if self.max_packet_size <= header_len {
            return Err(VpxError::InvalidConfig(format!(
                "max_packet_size {} must exceed the {}-byte {} descriptor",
                self.max_packet_size, header_len, self.variant
            )));
        }
        if !self.encode && !self.decode {
            return Err(VpxError::InvalidConfig(
                "session must encode, decode, or both".into(),
            ));
        }
        Ok(())
    }

    /// Encoder settings for the configured picture size and bandwidth.
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings::resolve(self.width, self.height, self.bandwidth_kbps)
    }
}

/// Parameters handed to the codec engine when an encoder is (re)created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
}

impl EncoderSettings {
    /// Fill in defaults and clamp the bitrate.
    ///
    /// - zero dimensions fall back to 1280x720;
    /// - no (or zero) bandwidth derives one from the picture size;
    /// - anything above the high-motion 30 fps estimate is truncated to it.
    pub fn resolve(width: u32, height: u32, bandwidth_kbps: Option<u32>) -> Self {
        let width = if width == 0 { FALLBACK_WIDTH } else { width };
        let height = if height == 0 { FALLBACK_HEIGHT } else { height };

        let mut bitrate_kbps = bandwidth_kbps
            .filter(|&kbps| kbps > 0)
            .unwrap_or_else(|| calc_bitrate_kbps(width, height, 1, 15.0));

        let ceiling = calc_bitrate_kbps(width, height, 4, 30.0);
        if bitrate_kbps > ceiling {
            tracing::warn!(
                requested = bitrate_kbps,
                ceiling,
                "bitrate truncated"
            );
            bitrate_kbps = ceiling;
        }

        Self {
            width,
            height,
            bitrate_kbps,
        }
    }
}

/// Rough target bitrate in kbps: `w * h * fps * motion * 0.07 / 1000`.
///
/// `motion` ranges from 1 (talking head) to 4 (high motion); 0 is treated as 1.
/// A non-positive `fps` is treated as 15.
pub fn calc_bitrate_kbps(width: u32, height: u32, motion: u32, fps: f64) -> u32 {
    let motion = motion.max(1);
    let fps = if fps > 0.0 { fps } else { 15.0 };
    let pixels = f64::from(width) * f64::from(height);
    (pixels * fps * f64::from(motion) * 0.07 / 1000.0) as u32
}

/// Parse a bandwidth string such as `"512kb"`, `"2mb"` or `"800"` into kbps.
///
/// A bare number is kbps. `mb`/`mbps` suffixes multiply by 1024.
pub fn parse_bandwidth(value: &str) -> Result<u32> {
    let lower = value.trim().to_ascii_lowercase();
    let digits_end = lower
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(digits_end);

    let invalid = || VpxError::InvalidConfig(format!("invalid bandwidth: {value:?}"));
    let number: u32 = number.parse().map_err(|_| invalid())?;

    let multiplier = match unit.trim() {
        "" | "k" | "kb" | "kbps" | "kbit" => 1,
        "m" | "mb" | "mbps" | "mbit" => 1024,
        _ => return Err(invalid()),
    };

    number.checked_mul(multiplier).ok_or_else(invalid)
}
