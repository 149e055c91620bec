//! Seams to the external codec engine.
//!
//! The pixel transform itself (libvpx or anything else) lives outside this
//! crate. A [`CodecEngine`] builds encoder and decoder handles for a session;
//! the session owns them exclusively and drops them on reset or teardown.

use crate::config::EncoderSettings;
use crate::error::{Result, VpxError};
use crate::payload::PayloadVariant;

/// Picture type fed to the encoder. Only its size matters to the session.
pub trait VideoPicture {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// One coded access unit produced by the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub key_frame: bool,
}

/// Result of handing a complete access unit to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<P> {
    Picture(P),
    /// Accepted, but no picture is ready yet.
    NotYet,
    /// The decoder flagged the unit as corrupted.
    Corrupted,
}

pub trait VideoEncoder {
    type Picture: VideoPicture;

    /// Encode one picture.
    ///
    /// `pts_ms` counts from the encoder's first frame; `duration_ms` is the
    /// time since the previous frame.
    fn encode(
        &mut self,
        picture: &Self::Picture,
        pts_ms: u64,
        duration_ms: u64,
        force_key_frame: bool,
    ) -> Result<EncodedFrame>;

    /// Apply new settings to the live encoder.
    ///
    /// Engines that cannot reconfigure in place keep the default, and the
    /// session falls back to recreating the encoder.
    fn reconfigure(&mut self, settings: &EncoderSettings) -> Result<()> {
        let _ = settings;
        Err(VpxError::Transform(
            "live reconfiguration not supported".into(),
        ))
    }
}

pub trait VideoDecoder {
    type Picture;

    fn decode(&mut self, access_unit: &[u8]) -> Result<Decoded<Self::Picture>>;
}

/// Factory for encoder and decoder handles.
pub trait CodecEngine {
    type Picture: VideoPicture;
    type Encoder: VideoEncoder<Picture = Self::Picture>;
    type Decoder: VideoDecoder<Picture = Self::Picture>;

    fn create_encoder(
        &self,
        variant: PayloadVariant,
        settings: &EncoderSettings,
    ) -> Result<Self::Encoder>;

    fn create_decoder(&self, variant: PayloadVariant) -> Result<Self::Decoder>;
}
