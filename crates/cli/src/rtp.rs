use rand::RngExt;

/// Size of the RTP fixed header without CSRCs or extensions.
pub const HEADER_LEN: usize = 12;

/// Dynamic payload type used for the simulated stream.
pub const PAYLOAD_TYPE: u8 = 96;

/// RTP clock rate for video.
pub const CLOCK_RATE: u32 = 90_000;

/// Sender-side RTP fixed header state (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The marker bit carries the end-of-access-unit flag; every fragment of one
/// access unit shares a timestamp.
#[derive(Debug)]
pub struct RtpSender {
    pt: u8,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpSender {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP sender created"
        );
        Self {
            pt,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::new(pt, rand::rng().random::<u32>())
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Prefix `payload` with a header and advance the sequence number.
    pub fn wrap(&mut self, payload: &[u8], marker: bool) -> Vec<u8> {
        let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
        packet.push(2 << 6);
        packet.push((u8::from(marker) << 7) | (self.pt & 0x7f));
        packet.extend_from_slice(&self.sequence.to_be_bytes());
        packet.extend_from_slice(&self.timestamp.to_be_bytes());
        packet.extend_from_slice(&self.ssrc.to_be_bytes());
        packet.extend_from_slice(payload);

        self.sequence = self.sequence.wrapping_add(1);
        packet
    }

    /// Move to the next access unit; `increment` is `CLOCK_RATE / fps`.
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment);
    }
}

/// Fields the receive path needs from a parsed RTP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpView<'a> {
    pub marker: bool,
    pub sequence: u16,
    pub timestamp: u32,
    pub payload: &'a [u8],
}

/// Parse a fixed header. Returns `None` for short or non-version-2 packets.
pub fn parse(packet: &[u8]) -> Option<RtpView<'_>> {
    if packet.len() < HEADER_LEN || packet[0] >> 6 != 2 {
        return None;
    }
    Some(RtpView {
        marker: packet[1] & 0x80 != 0,
        sequence: u16::from_be_bytes([packet[2], packet[3]]),
        timestamp: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
        payload: &packet[HEADER_LEN..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sender() -> RtpSender {
        RtpSender::new(PAYLOAD_TYPE, 0xAABBCCDD)
    }

    #[test]
    fn header_fields() {
        let mut s = make_sender();
        s.advance_timestamp(3000);
        let packet = s.wrap(&[1, 2, 3], true);

        assert_eq!(packet.len(), HEADER_LEN + 3);
        assert_eq!(packet[0] >> 6, 2);
        assert_eq!(packet[1] & 0x7f, PAYLOAD_TYPE);
        assert_eq!(&packet[8..12], &0xAABBCCDDu32.to_be_bytes());

        let view = parse(&packet).unwrap();
        assert!(view.marker);
        assert_eq!(view.timestamp, 3000);
        assert_eq!(view.payload, &[1, 2, 3]);
    }

    #[test]
    fn sequence_wraps() {
        let mut s = make_sender();
        s.sequence = u16::MAX;
        assert_eq!(parse(&s.wrap(&[], false)).unwrap().sequence, u16::MAX);
        assert_eq!(parse(&s.wrap(&[], false)).unwrap().sequence, 0);
    }

    #[test]
    fn empty_payload_keeps_marker() {
        let mut s = make_sender();
        let view_packet = s.wrap(&[], true);
        let view = parse(&view_packet).unwrap();
        assert!(view.marker);
        assert!(view.payload.is_empty());
    }

    #[test]
    fn rejects_short_or_wrong_version() {
        assert!(parse(&[0x80; 11]).is_none());
        assert!(parse(&[0x40; 12]).is_none());
    }

    #[test]
    fn random_ssrc_differs() {
        let a = RtpSender::with_random_ssrc(PAYLOAD_TYPE);
        let b = RtpSender::with_random_ssrc(PAYLOAD_TYPE);
        assert_ne!(a.ssrc, b.ssrc);
    }
}
