use crate::error::{HeaderErrorKind, Result, VpxError};

const KEY_BIT: u8 = 0x01;
const START_BIT: u8 = 0x02;

/// Length of the VP9 descriptor; this variant carries no extensions.
pub const HEADER_LEN: usize = 1;

/// Single-byte VP9 payload descriptor.
///
/// ```text
///  0 1 2 3 4 5 6 7
/// +-+-+-+-+-+-+-+-+
/// |  reserved |S|K|
/// +-+-+-+-+-+-+-+-+
/// ```
///
/// - **S** (`0x02`): first packet of an access unit
/// - **K** (`0x01`): the access unit is a key frame
///
/// The reserved bits are written as zero and ignored on receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vp9Descriptor {
    pub is_start: bool,
    pub is_key: bool,
}

impl Vp9Descriptor {
    pub fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.is_start {
            b |= START_BIT;
        }
        if self.is_key {
            b |= KEY_BIT;
        }
        b
    }

    pub fn from_byte(b: u8) -> Self {
        Self {
            is_start: b & START_BIT != 0,
            is_key: b & KEY_BIT != 0,
        }
    }
}

pub fn parse(data: &[u8]) -> Result<(Vp9Descriptor, usize)> {
    let first = data
        .first()
        .copied()
        .ok_or(VpxError::malformed(HeaderErrorKind::Empty))?;
    Ok((Vp9Descriptor::from_byte(first), HEADER_LEN))
}

pub fn is_key_frame_start(data: &[u8]) -> bool {
    data.first().is_some_and(|b| b & KEY_BIT != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_map_to_flags() {
        let (d, len) = parse(&[0x03, 0xAA]).unwrap();
        assert_eq!(len, HEADER_LEN);
        assert!(d.is_start);
        assert!(d.is_key);

        let (d, _) = parse(&[0x02]).unwrap();
        assert!(d.is_start && !d.is_key);

        let (d, _) = parse(&[0xFC]).unwrap();
        assert!(!d.is_start && !d.is_key, "reserved bits ignored");
    }

    #[test]
    fn byte_round_trip() {
        for b in [0x00, 0x01, 0x02, 0x03] {
            assert_eq!(Vp9Descriptor::from_byte(b).to_byte(), b);
        }
    }

    #[test]
    fn empty_rejected() {
        assert!(matches!(
            parse(&[]),
            Err(VpxError::MalformedHeader {
                kind: HeaderErrorKind::Empty
            })
        ));
    }

    #[test]
    fn key_bit_detection() {
        assert!(is_key_frame_start(&[0x03]));
        assert!(!is_key_frame_start(&[0x02]));
        assert!(!is_key_frame_start(&[]));
    }
}
