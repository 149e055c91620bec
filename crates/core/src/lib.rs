//! RTP framing for VP8 and VP9 video.
//!
//! Splits coded pictures into MTU-sized packets with the VP8 or VP9 payload
//! descriptor, reassembles them on the receiving side, tracks key-frame
//! synchronization across loss, and drives an external codec engine through a
//! per-stream [`CodecSession`].
//!
//! ```no_run
//! use vpx_rtp::{PayloadVariant, fragment};
//!
//! # fn main() -> vpx_rtp::Result<()> {
//! let unit = vec![0u8; 3000];
//! for packet in fragment(PayloadVariant::Vp8, &unit, true, 1200)? {
//!     // hand packet.data to the RTP sender, marker = packet.end_of_frame
//!     let _ = packet;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod payload;
pub mod session;
pub mod sync;

pub use config::{EncoderSettings, SessionConfig};
pub use error::{CodecRole, HeaderErrorKind, Result, VpxError};
pub use media::{
    Assembled, EmitCursor, InboundPacket, OutboundPacket, Reassembler, ReassemblyState, fragment,
};
pub use payload::{PayloadDescriptor, PayloadVariant};
pub use session::{
    CodecEngine, CodecSession, ControlCommand, ControlHandle, DecodeOutcome, Decoded,
    EncodedFrame, LifecycleState, VideoDecoder, VideoEncoder, VideoPicture,
};
pub use sync::{SyncState, SyncTracker};
