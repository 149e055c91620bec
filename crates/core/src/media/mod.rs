//! Access-unit framing over RTP.
//!
//! A coded VP8/VP9 frame (an *access unit*) rarely fits into one network
//! packet, so it travels as a run of fragments:
//!
//! ```text
//! access unit:  [................................................]
//! packets:      [D|.........] [D|.........] [D|.........] [D|....]
//!                start=1       start=0       start=0       start=0
//!                marker=0      marker=0      marker=0      marker=1
//! ```
//!
//! - **D** is the payload descriptor ([`crate::payload`]).
//! - The **start** bit lives in the descriptor.
//! - The **marker** is the RTP header's end-of-frame bit and travels beside
//!   the payload, never inside it.
//!
//! [`fragment::EmitCursor`] produces these packets on the send side and
//! [`reassembly::Reassembler`] glues them back together on the receive side.

pub mod fragment;
pub mod reassembly;

pub use fragment::{EmitCursor, fragment};
pub use reassembly::{Assembled, Reassembler, ReassemblyState};

/// One packet produced by the send path: descriptor plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub data: Vec<u8>,
    /// Value for the RTP marker bit: last packet of the access unit.
    pub end_of_frame: bool,
}

impl OutboundPacket {
    /// Zero-length, end-marked packet.
    ///
    /// Sent when the encoder produced nothing so the receiver still observes
    /// a frame boundary.
    pub fn frame_boundary() -> Self {
        Self {
            data: Vec::new(),
            end_of_frame: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow as an inbound packet carrying `timestamp`, as a loopback
    /// transport would deliver it.
    pub fn as_inbound(&self, timestamp: u32) -> InboundPacket<'_> {
        InboundPacket {
            data: &self.data,
            timestamp,
            end_of_frame: self.end_of_frame,
        }
    }
}

/// A received packet as handed over by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundPacket<'a> {
    /// Descriptor followed by payload.
    pub data: &'a [u8],
    /// RTP timestamp; equal for every fragment of one access unit.
    pub timestamp: u32,
    /// RTP marker bit.
    pub end_of_frame: bool,
}
