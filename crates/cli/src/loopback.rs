//! Synthetic codec engine for the loopback simulator.
//!
//! Coded frames are laid out as
//!
//! ```text
//! +-----+-------+--------+----------+----------------+
//! | tag | width | height | sequence | random filler  |
//! +-----+-------+--------+----------+----------------+
//!   1B     4B      4B        8B
//! ```
//!
//! where bit 0 of `tag` is clear on key frames, as in a VP8 frame tag. The
//! decoder refuses inter frames until it has seen a key frame, the way a real
//! decoder without a reference picture would.

use rand::RngExt;
use vpx_rtp::{
    CodecEngine, Decoded, EncodedFrame, EncoderSettings, PayloadVariant, Result, VideoDecoder,
    VideoEncoder, VideoPicture, VpxError,
};

const FRAME_HEADER_LEN: usize = 17;

/// Key frames carry this many times the filler of an inter frame.
const KEY_FRAME_SCALE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticPicture {
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
}

impl VideoPicture for SyntheticPicture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticEngine {
    /// Filler bytes per inter frame.
    frame_size: usize,
}

impl SyntheticEngine {
    pub fn new(frame_size: usize) -> Self {
        Self { frame_size }
    }
}

#[derive(Debug)]
pub struct SyntheticEncoder {
    frame_size: usize,
    settings: EncoderSettings,
    frames: u64,
}

impl VideoEncoder for SyntheticEncoder {
    type Picture = SyntheticPicture;

    fn encode(
        &mut self,
        picture: &SyntheticPicture,
        pts_ms: u64,
        _duration_ms: u64,
        force_key_frame: bool,
    ) -> Result<EncodedFrame> {
        let key_frame = force_key_frame || self.frames == 0;
        self.frames += 1;

        let filler = if key_frame {
            self.frame_size * KEY_FRAME_SCALE
        } else {
            self.frame_size
        };

        let mut rng = rand::rng();
        let mut data = Vec::with_capacity(FRAME_HEADER_LEN + filler);
        data.push(if key_frame { 0x00 } else { 0x01 });
        data.extend_from_slice(&picture.width.to_be_bytes());
        data.extend_from_slice(&picture.height.to_be_bytes());
        data.extend_from_slice(&picture.sequence.to_be_bytes());
        data.extend((0..filler).map(|_| rng.random::<u8>()));

        tracing::trace!(
            sequence = picture.sequence,
            pts_ms,
            key_frame,
            bitrate_kbps = self.settings.bitrate_kbps,
            "synthetic frame"
        );

        Ok(EncodedFrame { data, key_frame })
    }

    fn reconfigure(&mut self, settings: &EncoderSettings) -> Result<()> {
        self.settings = *settings;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SyntheticDecoder {
    has_reference: bool,
}

impl VideoDecoder for SyntheticDecoder {
    type Picture = SyntheticPicture;

    fn decode(&mut self, unit: &[u8]) -> Result<Decoded<SyntheticPicture>> {
        if unit.len() < FRAME_HEADER_LEN {
            return Err(VpxError::Transform(format!(
                "frame of {} bytes is shorter than its header",
                unit.len()
            )));
        }

        let key_frame = unit[0] & 0x01 == 0;
        if key_frame {
            self.has_reference = true;
        } else if !self.has_reference {
            return Ok(Decoded::Corrupted);
        }

        let word =
            |at: usize| u32::from_be_bytes([unit[at], unit[at + 1], unit[at + 2], unit[at + 3]]);
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&unit[9..17]);

        Ok(Decoded::Picture(SyntheticPicture {
            width: word(1),
            height: word(5),
            sequence: u64::from_be_bytes(sequence),
        }))
    }
}

impl CodecEngine for SyntheticEngine {
    type Picture = SyntheticPicture;
    type Encoder = SyntheticEncoder;
    type Decoder = SyntheticDecoder;

    fn create_encoder(
        &self,
        variant: PayloadVariant,
        settings: &EncoderSettings,
    ) -> Result<SyntheticEncoder> {
        tracing::debug!(%variant, ?settings, "synthetic encoder created");
        Ok(SyntheticEncoder {
            frame_size: self.frame_size,
            settings: *settings,
            frames: 0,
        })
    }

    fn create_decoder(&self, variant: PayloadVariant) -> Result<SyntheticDecoder> {
        tracing::debug!(%variant, "synthetic decoder created");
        Ok(SyntheticDecoder::default())
    }
}
