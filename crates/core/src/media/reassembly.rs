use super::InboundPacket;
use crate::error::{Result, VpxError};
use crate::payload::{self, PayloadDescriptor, PayloadVariant};

/// Initial capacity of the access-unit buffer; it grows as needed and is
/// reused for every unit after that.
const INITIAL_CAPACITY: usize = 512;

/// Receive-side reassembly state.
///
/// ```text
/// Idle ──start──▶ Collecting ──marker──▶ Complete ──next packet──▶ Idle
///   ▲                 │
///   └──desync/invalid─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// Waiting for a start packet; anything else is discarded.
    Idle,
    /// Appending fragments whose timestamp matches `timestamp`.
    Collecting { timestamp: u32 },
    /// The last unit was handed out; it is cleared on the next packet.
    Complete,
}

/// What happened to a packet pushed into the [`Reassembler`].
#[derive(Debug, PartialEq, Eq)]
pub enum Assembled<'a> {
    /// Dropped while waiting for a start packet (late join or lost start).
    Discarded,
    /// Appended to the unit in progress.
    Buffered,
    /// The end marker arrived; the whole access unit.
    Complete(&'a [u8]),
}

/// Collects descriptor-stripped fragments into one access unit.
///
/// The buffer only ever holds bytes from packets sharing one RTP timestamp.
/// It is cleared, never reallocated, between units.
#[derive(Debug)]
pub struct Reassembler {
    variant: PayloadVariant,
    state: ReassemblyState,
    buffer: Vec<u8>,
}

impl Reassembler {
    pub fn new(variant: PayloadVariant) -> Self {
        Self {
            variant,
            state: ReassemblyState::Idle,
            buffer: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// Bytes currently held for the unit in progress.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial unit and wait for the next start packet.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ReassemblyState::Idle;
    }

    /// Feed one packet.
    ///
    /// # Errors
    ///
    /// - [`VpxError::MalformedHeader`]: the packet is dropped, state untouched.
    /// - [`VpxError::InvalidPacket`]: descriptor with no payload; the partial
    ///   unit is dropped.
    /// - [`VpxError::Desynced`]: timestamp differs from the unit in progress;
    ///   the partial unit is dropped.
    ///
    /// After either of the last two the reassembler is [`ReassemblyState::Idle`]
    /// with an empty buffer and the caller should expect loss.
    pub fn push(&mut self, packet: &InboundPacket<'_>) -> Result<Assembled<'_>> {
        if self.state == ReassemblyState::Complete {
            self.reset();
        }

        if packet.data.is_empty() {
            return self.push_boundary(packet);
        }

        let (descriptor, header_len) = payload::parse(self.variant, packet.data)?;
        self.push_parsed(packet, descriptor, header_len)
    }

    /// Feed a non-empty packet whose descriptor the caller already parsed.
    ///
    /// `descriptor` and `header_len` must come from [`payload::parse`] on
    /// `packet.data`. Same outcomes as [`push`](Self::push), minus
    /// [`VpxError::MalformedHeader`].
    pub fn push_parsed(
        &mut self,
        packet: &InboundPacket<'_>,
        descriptor: PayloadDescriptor,
        header_len: usize,
    ) -> Result<Assembled<'_>> {
        if self.state == ReassemblyState::Complete {
            self.reset();
        }

        if descriptor.is_start() {
            if !self.buffer.is_empty() {
                tracing::debug!(
                    dropped = self.buffer.len(),
                    "start packet before end marker, packet loss?"
                );
            }
            self.buffer.clear();
            self.state = ReassemblyState::Collecting {
                timestamp: packet.timestamp,
            };
        }

        let ReassemblyState::Collecting {
            timestamp: expected,
        } = self.state
        else {
            tracing::trace!(ts = packet.timestamp, "waiting for a start packet");
            return Ok(Assembled::Discarded);
        };

        let body = packet.data.get(header_len..).unwrap_or_default();
        if body.is_empty() {
            tracing::debug!(header_len, "packet has no payload");
            self.reset();
            return Err(VpxError::InvalidPacket { header_len });
        }

        if packet.timestamp != expected {
            tracing::debug!(
                got = packet.timestamp,
                expected,
                "wrong timestamp, packet loss?"
            );
            self.reset();
            return Err(VpxError::Desynced {
                expected,
                got: packet.timestamp,
            });
        }

        self.buffer.extend_from_slice(body);

        if packet.end_of_frame {
            self.state = ReassemblyState::Complete;
            tracing::trace!(bytes = self.buffer.len(), ts = expected, "access unit complete");
            return Ok(Assembled::Complete(&self.buffer));
        }

        Ok(Assembled::Buffered)
    }

    /// A zero-byte packet: the sender's boundary for an empty access unit, or
    /// a bare end marker for the unit in progress.
    fn push_boundary(&mut self, packet: &InboundPacket<'_>) -> Result<Assembled<'_>> {
        if !packet.end_of_frame {
            self.reset();
            return Err(VpxError::InvalidPacket { header_len: 0 });
        }

        if let ReassemblyState::Collecting { timestamp } = self.state {
            if timestamp != packet.timestamp {
                self.reset();
                return Err(VpxError::Desynced {
                    expected: timestamp,
                    got: packet.timestamp,
                });
            }
        }

        self.state = ReassemblyState::Complete;
        Ok(Assembled::Complete(&self.buffer))
    }
}
