use std::iter::FusedIterator;

use super::OutboundPacket;
use crate::error::{Result, VpxError};
use crate::payload::{PayloadDescriptor, PayloadVariant};

/// Send-side cursor over one coded access unit.
///
/// Splits the unit into packets of at most `max_packet_size` bytes, each
/// prefixed with a single-byte payload descriptor:
///
/// - the first packet carries the start bit (and, for VP9, the key flag);
/// - the last packet, and only the last, is end-marked;
/// - an empty unit yields exactly one empty, end-marked packet.
///
/// The cursor is lazy and single-pass. Once the end-marked packet has been
/// returned it yields `None` forever.
#[derive(Debug)]
pub struct EmitCursor<B = Vec<u8>> {
    frame: B,
    offset: usize,
    variant: PayloadVariant,
    key_frame: bool,
    max_packet_size: usize,
    finished: bool,
}

/// Fragment a borrowed access unit.
pub fn fragment(
    variant: PayloadVariant,
    unit: &[u8],
    key_frame: bool,
    max_packet_size: usize,
) -> Result<EmitCursor<&[u8]>> {
    EmitCursor::new(variant, unit, key_frame, max_packet_size)
}

impl<B: AsRef<[u8]>> EmitCursor<B> {
    /// Fails with [`VpxError::InvalidConfig`] when `max_packet_size` leaves no
    /// room for payload after the descriptor.
    pub fn new(
        variant: PayloadVariant,
        frame: B,
        key_frame: bool,
        max_packet_size: usize,
    ) -> Result<Self> {
        let header_len = variant.send_header_len();
        if max_packet_size <= header_len {
            return Err(VpxError::InvalidConfig(format!(
                "max packet size {max_packet_size} leaves no room after {header_len}-byte descriptor"
            )));
        }

        Ok(Self {
            frame,
            offset: 0,
            variant,
            key_frame,
            max_packet_size,
            finished: false,
        })
    }

    /// Bytes of the access unit not yet emitted.
    pub fn remaining(&self) -> usize {
        self.frame.as_ref().len() - self.offset
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_key_frame(&self) -> bool {
        self.key_frame
    }

    /// Emit the next packet, or `None` once the end-marked packet is out.
    pub fn next_packet(&mut self) -> Option<OutboundPacket> {
        if self.finished {
            return None;
        }

        let frame = self.frame.as_ref();
        if frame.is_empty() {
            self.finished = true;
            tracing::trace!("empty access unit, emitting bare frame boundary");
            return Some(OutboundPacket::frame_boundary());
        }

        let descriptor = if self.offset == 0 {
            PayloadDescriptor::start(self.variant, self.key_frame)
        } else {
            PayloadDescriptor::continuation(self.variant)
        };

        let header_len = descriptor.encoded_len();
        let capacity = self.max_packet_size - header_len;
        let remaining = frame.len() - self.offset;
        let last = remaining <= capacity;
        let chunk_size = std::cmp::min(capacity, remaining);
        let chunk = &frame[self.offset..self.offset + chunk_size];

        let mut data = Vec::with_capacity(header_len + chunk.len());
        descriptor.write(&mut data);
        data.extend_from_slice(chunk);

        self.offset += chunk_size;
        self.finished = last;

        tracing::trace!(
            offset = self.offset,
            chunk = chunk_size,
            last,
            "fragment emitted"
        );

        Some(OutboundPacket {
            data,
            end_of_frame: last,
        })
    }
}

impl<B: AsRef<[u8]>> Iterator for EmitCursor<B> {
    type Item = OutboundPacket;

    fn next(&mut self) -> Option<OutboundPacket> {
        self.next_packet()
    }
}

impl<B: AsRef<[u8]>> FusedIterator for EmitCursor<B> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn bodies(packets: &[OutboundPacket]) -> Vec<usize> {
        packets.iter().map(|p| p.data.len() - 1).collect()
    }

    #[test]
    fn three_hundred_bytes_at_p100() {
        let unit = vec![0xAB; 300];
        let packets: Vec<_> = fragment(PayloadVariant::Vp8, &unit, true, 100)
            .unwrap()
            .collect();
        assert_eq!(packets.len(), 4);
        assert_eq!(bodies(&packets), vec![99, 99, 99, 3]);

        let markers: Vec<bool> = packets.iter().map(|p| p.end_of_frame).collect();
        assert_eq!(markers, vec![false, false, false, true]);
    }

    #[test]
    fn vp8_start_bit_only_on_first() {
        let unit = vec![0u8; 250];
        let packets: Vec<_> = fragment(PayloadVariant::Vp8, &unit, false, 100)
            .unwrap()
            .collect();
        assert_eq!(packets[0].data[0], 0x10);
        assert!(packets[1..].iter().all(|p| p.data[0] == 0x00));
    }

    #[test]
    fn vp9_key_flag_on_first_packet() {
        let unit = vec![0u8; 150];
        let packets: Vec<_> = fragment(PayloadVariant::Vp9, &unit, true, 100)
            .unwrap()
            .collect();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].data[0], 0x03);
        assert_eq!(packets[1].data[0], 0x00);
    }

    #[test]
    fn exact_fit_is_single_packet() {
        let unit = vec![7u8; 99];
        let packets: Vec<_> = fragment(PayloadVariant::Vp8, &unit, true, 100)
            .unwrap()
            .collect();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].end_of_frame);
        assert_eq!(packets[0].data.len(), 100);
    }

    #[test]
    fn empty_unit_emits_one_boundary() {
        let mut cursor = fragment(PayloadVariant::Vp9, &[], false, 100).unwrap();
        assert_eq!(cursor.next(), Some(OutboundPacket::frame_boundary()));
        assert!(cursor.is_finished());
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn owned_cursor_tracks_remaining() {
        let mut cursor = EmitCursor::new(PayloadVariant::Vp8, vec![1u8; 10], false, 5).unwrap();
        assert_eq!(cursor.remaining(), 10);
        cursor.next_packet();
        assert_eq!(cursor.remaining(), 6);
        assert_eq!(cursor.count(), 2);
    }

    #[test]
    fn packet_size_must_exceed_header() {
        assert!(matches!(
            fragment(PayloadVariant::Vp8, &[1, 2, 3], false, 1),
            Err(VpxError::InvalidConfig(_))
        ));
        assert!(fragment(PayloadVariant::Vp8, &[1, 2, 3], false, 2).is_ok());
    }
}
