//! RTP payload descriptors.
//!
//! Every packet of a VPx stream starts with a small bit-packed descriptor
//! telling the receiver where the fragment sits inside its access unit:
//!
//! | Variant | Module | Length | Start flag | Key flag |
//! |---------|--------|--------|------------|----------|
//! | VP8 | [`vp8`] | 1–6 bytes | S bit, partition 0 | P bit of the first payload byte |
//! | VP9 | [`vp9`] | 1 byte | S bit (`0x02`) | K bit (`0x01`) |
//!
//! The variant is chosen once per session from the negotiated encoding name
//! and never changes, so every function here takes the [`PayloadVariant`]
//! explicitly instead of guessing from the bytes.

pub mod vp8;
pub mod vp9;

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, VpxError};

pub use vp8::{PictureId, Vp8Descriptor, Vp8Extension};
pub use vp9::Vp9Descriptor;

/// Wire format of the payload descriptor for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadVariant {
    Vp8,
    Vp9,
}

impl PayloadVariant {
    /// Encoding name used in the SDP `a=rtpmap` line.
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
        }
    }

    /// Largest descriptor the send path ever writes.
    pub fn send_header_len(&self) -> usize {
        PayloadDescriptor::start(*self, false).encoded_len()
    }
}

impl fmt::Display for PayloadVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoding_name())
    }
}

impl FromStr for PayloadVariant {
    type Err = VpxError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("VP8") {
            Ok(Self::Vp8)
        } else if s.eq_ignore_ascii_case("VP9") {
            Ok(Self::Vp9)
        } else {
            Err(VpxError::InvalidConfig(format!(
                "unsupported encoding name: {s}"
            )))
        }
    }
}

/// A parsed payload descriptor of either variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadDescriptor {
    Vp8(Vp8Descriptor),
    Vp9(Vp9Descriptor),
}

impl PayloadDescriptor {
    /// Non-extended descriptor for the first packet of an access unit.
    ///
    /// VP9 carries the unit's key flag here; VP8 signals key frames inside
    /// the payload itself.
    pub fn start(variant: PayloadVariant, key_frame: bool) -> Self {
        match variant {
            PayloadVariant::Vp8 => Self::Vp8(Vp8Descriptor {
                start_of_partition: true,
                ..Default::default()
            }),
            PayloadVariant::Vp9 => Self::Vp9(Vp9Descriptor {
                is_start: true,
                is_key: key_frame,
            }),
        }
    }

    /// Non-extended descriptor for every packet after the first.
    pub fn continuation(variant: PayloadVariant) -> Self {
        match variant {
            PayloadVariant::Vp8 => Self::Vp8(Vp8Descriptor::default()),
            PayloadVariant::Vp9 => Self::Vp9(Vp9Descriptor::default()),
        }
    }

    pub fn variant(&self) -> PayloadVariant {
        match self {
            Self::Vp8(_) => PayloadVariant::Vp8,
            Self::Vp9(_) => PayloadVariant::Vp9,
        }
    }

    /// Whether this packet opens a new access unit.
    pub fn is_start(&self) -> bool {
        match self {
            Self::Vp8(d) => d.start_of_partition && d.partition_index == 0,
            Self::Vp9(d) => d.is_start,
        }
    }

    /// Whether this descriptor, followed by `payload`, starts a key frame.
    ///
    /// Same answer as [`is_key_frame_start`] on the whole packet, without
    /// parsing the descriptor again.
    pub fn is_key_frame_start(&self, payload: &[u8]) -> bool {
        match self {
            Self::Vp8(d) => d.is_key_frame_start(payload),
            Self::Vp9(d) => d.is_key,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Vp8(d) => d.encoded_len(),
            Self::Vp9(_) => vp9::HEADER_LEN,
        }
    }

    /// Serialize the descriptor, appending to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::Vp8(d) => d.write(out),
            Self::Vp9(d) => out.push(d.to_byte()),
        }
    }
}

/// Parse the descriptor at the front of `data`.
///
/// Returns the descriptor and the number of bytes it occupies; the payload
/// starts at that offset.
pub fn parse(variant: PayloadVariant, data: &[u8]) -> Result<(PayloadDescriptor, usize)> {
    match variant {
        PayloadVariant::Vp8 => vp8::parse(data).map(|(d, len)| (PayloadDescriptor::Vp8(d), len)),
        PayloadVariant::Vp9 => vp9::parse(data).map(|(d, len)| (PayloadDescriptor::Vp9(d), len)),
    }
}

/// Serialize a descriptor into a fresh buffer.
pub fn build(descriptor: &PayloadDescriptor) -> Vec<u8> {
    let mut out = Vec::with_capacity(descriptor.encoded_len());
    descriptor.write(&mut out);
    out
}

/// Whether the packet in `data` (descriptor + payload) starts a key frame.
pub fn is_key_frame_start(variant: PayloadVariant, data: &[u8]) -> bool {
    match variant {
        PayloadVariant::Vp8 => vp8::is_key_frame_start(data),
        PayloadVariant::Vp9 => vp9::is_key_frame_start(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn variant_from_encoding_name() {
        assert_eq!("VP8".parse::<PayloadVariant>().unwrap(), PayloadVariant::Vp8);
        assert_eq!("vp9".parse::<PayloadVariant>().unwrap(), PayloadVariant::Vp9);
        assert!("H264".parse::<PayloadVariant>().is_err());
    }

    #[test]
    fn send_path_headers_are_single_byte() {
        assert_eq!(build(&PayloadDescriptor::start(PayloadVariant::Vp8, true)), vec![0x10]);
        assert_eq!(build(&PayloadDescriptor::continuation(PayloadVariant::Vp8)), vec![0x00]);
        assert_eq!(build(&PayloadDescriptor::start(PayloadVariant::Vp9, true)), vec![0x03]);
        assert_eq!(build(&PayloadDescriptor::start(PayloadVariant::Vp9, false)), vec![0x02]);
        assert_eq!(build(&PayloadDescriptor::continuation(PayloadVariant::Vp9)), vec![0x00]);
        assert_eq!(PayloadVariant::Vp8.send_header_len(), 1);
        assert_eq!(PayloadVariant::Vp9.send_header_len(), 1);
    }

    #[test]
    fn parse_dispatches_by_variant() {
        // 0x02 is a VP9 start but a plain VP8 continuation for partition 2
        let (d, _) = parse(PayloadVariant::Vp9, &[0x02]).unwrap();
        assert!(d.is_start());
        assert_eq!(d.variant(), PayloadVariant::Vp9);

        let (d, _) = parse(PayloadVariant::Vp8, &[0x02]).unwrap();
        assert!(!d.is_start());
        assert_eq!(d.variant(), PayloadVariant::Vp8);
    }

    #[test]
    fn key_frame_scenarios() {
        assert!(is_key_frame_start(PayloadVariant::Vp8, &[0x10, 0x00]));
        assert!(!is_key_frame_start(PayloadVariant::Vp8, &[0x00, 0x01]));
        assert!(is_key_frame_start(PayloadVariant::Vp9, &[0x03, 0x80]));
    }

    #[test]
    fn parsed_descriptor_key_test_matches_packet_test() {
        let packets: [(PayloadVariant, &[u8]); 6] = [
            (PayloadVariant::Vp8, &[0x10, 0x00]),
            (PayloadVariant::Vp8, &[0x10, 0x01]),
            (PayloadVariant::Vp8, &[0x90, 0x80, 0x05, 0x00]),
            (PayloadVariant::Vp8, &[0x12, 0x00]),
            (PayloadVariant::Vp9, &[0x03, 0x80]),
            (PayloadVariant::Vp9, &[0x02, 0x80]),
        ];
        for (variant, data) in packets {
            let (descriptor, len) = parse(variant, data).unwrap();
            assert_eq!(
                descriptor.is_key_frame_start(&data[len..]),
                is_key_frame_start(variant, data),
                "{variant} {data:02x?}"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_parse_never_reads_past_input(data in prop::collection::vec(any::<u8>(), 0..12)) {
            for variant in [PayloadVariant::Vp8, PayloadVariant::Vp9] {
                if let Ok((descriptor, len)) = parse(variant, &data) {
                    prop_assert!(len <= data.len());
                    prop_assert_eq!(descriptor.encoded_len(), len);
                }
                let _ = is_key_frame_start(variant, &data);
            }
        }
    }
}
