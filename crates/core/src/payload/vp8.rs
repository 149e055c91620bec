use crate::error::{HeaderErrorKind, Result, VpxError};

const X_BIT: u8 = 0x80;
const N_BIT: u8 = 0x20;
const S_BIT: u8 = 0x10;
const PID_MASK: u8 = 0x07;

const I_BIT: u8 = 0x80;
const L_BIT: u8 = 0x40;
const T_BIT: u8 = 0x20;
const K_BIT: u8 = 0x10;

const M_BIT: u8 = 0x80;
const Y_BIT: u8 = 0x20;
const KEYIDX_MASK: u8 = 0x1f;

/// VP8 RTP payload descriptor (RFC 7741 §4.2).
///
/// ```text
///      0 1 2 3 4 5 6 7
///     +-+-+-+-+-+-+-+-+
///     |X|R|N|S|R| PID | (REQUIRED)
///     +-+-+-+-+-+-+-+-+
/// X:  |I|L|T|K| RSV   | (OPTIONAL)
///     +-+-+-+-+-+-+-+-+
/// I:  |M| PictureID   | (OPTIONAL)
///     +-+-+-+-+-+-+-+-+
///     |   PictureID   | (present when M is set)
///     +-+-+-+-+-+-+-+-+
/// L:  |   TL0PICIDX   | (OPTIONAL)
///     +-+-+-+-+-+-+-+-+
/// T/K:|TID|Y| KEYIDX  | (OPTIONAL)
///     +-+-+-+-+-+-+-+-+
/// ```
///
/// All fields are read by masking bytes in wire order, so the layout does not
/// depend on host endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vp8Descriptor {
    /// N: the frame can be discarded without affecting others.
    pub non_referenced: bool,
    /// S: first packet of a VP8 partition.
    pub start_of_partition: bool,
    /// PID: partition index (3 bits).
    pub partition_index: u8,
    /// Optional fields, present when the X bit is set.
    pub extension: Option<Vp8Extension>,
}

/// Optional fields that follow the X byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vp8Extension {
    pub picture_id: Option<PictureId>,
    pub tl0_pic_idx: Option<u8>,
    /// TID (2 bits), present when T is set.
    pub temporal_layer: Option<u8>,
    /// Y: layer sync bit, only meaningful alongside TID.
    pub layer_sync: bool,
    /// KEYIDX (5 bits), present when K is set.
    pub key_index: Option<u8>,
}

/// PictureID in its 7-bit or 15-bit (M bit set) form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureId {
    Short(u8),
    Long(u16),
}

impl PictureId {
    fn encoded_len(&self) -> usize {
        match self {
            Self::Short(_) => 1,
            Self::Long(_) => 2,
        }
    }
}

impl Vp8Extension {
    fn encoded_len(&self) -> usize {
        let mut len = 1;
        len += self.picture_id.map_or(0, |id| id.encoded_len());
        if self.tl0_pic_idx.is_some() {
            len += 1;
        }
        if self.temporal_layer.is_some() || self.key_index.is_some() {
            len += 1;
        }
        len
    }
}

impl Vp8Descriptor {
    /// Whether the X bit is set.
    pub fn extended(&self) -> bool {
        self.extension.is_some()
    }

    /// A partition other than 0 begins here. Tolerated, but worth a log line.
    pub fn starts_nonzero_partition(&self) -> bool {
        self.start_of_partition && self.partition_index != 0
    }

    /// Key-frame test against the payload that follows this descriptor.
    pub fn is_key_frame_start(&self, payload: &[u8]) -> bool {
        if self.starts_nonzero_partition() {
            tracing::debug!(
                partition_index = self.partition_index,
                "VP8 start packet for non-zero partition"
            );
        }

        self.start_of_partition
            && self.partition_index == 0
            && payload.first().is_some_and(|b| b & 0x01 == 0)
    }

    /// Number of descriptor bytes this value serializes to.
    pub fn encoded_len(&self) -> usize {
        1 + self.extension.map_or(0, |ext| ext.encoded_len())
    }

    /// Serialize the descriptor, appending to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        let mut first = self.partition_index & PID_MASK;
        if self.extension.is_some() {
            first |= X_BIT;
        }
        if self.non_referenced {
            first |= N_BIT;
        }
        if self.start_of_partition {
            first |= S_BIT;
        }
        out.push(first);

        let Some(ext) = self.extension else {
            return;
        };

        let mut x = 0u8;
        if ext.picture_id.is_some() {
            x |= I_BIT;
        }
        if ext.tl0_pic_idx.is_some() {
            x |= L_BIT;
        }
        if ext.temporal_layer.is_some() {
            x |= T_BIT;
        }
        if ext.key_index.is_some() {
            x |= K_BIT;
        }
        out.push(x);

        match ext.picture_id {
            Some(PictureId::Short(id)) => out.push(id & 0x7f),
            Some(PictureId::Long(id)) => {
                let [hi, lo] = (id & 0x7fff).to_be_bytes();
                out.push(M_BIT | hi);
                out.push(lo);
            }
            None => {}
        }

        if let Some(idx) = ext.tl0_pic_idx {
            out.push(idx);
        }

        if ext.temporal_layer.is_some() || ext.key_index.is_some() {
            let mut tk = ext.temporal_layer.unwrap_or(0) << 6;
            if ext.layer_sync {
                tk |= Y_BIT;
            }
            tk |= ext.key_index.unwrap_or(0) & KEYIDX_MASK;
            out.push(tk);
        }
    }
}

fn byte_at(data: &[u8], pos: usize, kind: HeaderErrorKind) -> Result<u8> {
    data.get(pos).copied().ok_or(VpxError::malformed(kind))
}

/// Parse a VP8 payload descriptor, returning it with its length in bytes.
///
/// Every optional field is bounds-checked before it is read; a descriptor that
/// claims more bytes than `data` holds is rejected with
/// [`VpxError::MalformedHeader`].
pub fn parse(data: &[u8]) -> Result<(Vp8Descriptor, usize)> {
    let first = byte_at(data, 0, HeaderErrorKind::Empty)?;
    let mut pos = 1usize;

    let mut descriptor = Vp8Descriptor {
        non_referenced: first & N_BIT != 0,
        start_of_partition: first & S_BIT != 0,
        partition_index: first & PID_MASK,
        extension: None,
    };

    if first & X_BIT == 0 {
        return Ok((descriptor, pos));
    }

    let x = byte_at(data, pos, HeaderErrorKind::TruncatedExtension)?;
    pos += 1;
    let mut ext = Vp8Extension::default();

    if x & I_BIT != 0 {
        let b = byte_at(data, pos, HeaderErrorKind::TruncatedPictureId)?;
        pos += 1;
        if b & M_BIT != 0 {
            let lo = byte_at(data, pos, HeaderErrorKind::TruncatedPictureId)?;
            pos += 1;
            ext.picture_id = Some(PictureId::Long(u16::from_be_bytes([b & 0x7f, lo])));
        } else {
            ext.picture_id = Some(PictureId::Short(b & 0x7f));
        }
    }

    if x & L_BIT != 0 {
        ext.tl0_pic_idx = Some(byte_at(data, pos, HeaderErrorKind::TruncatedTl0PicIdx)?);
        pos += 1;
    }

    if x & (T_BIT | K_BIT) != 0 {
        let tk = byte_at(data, pos, HeaderErrorKind::TruncatedTidKeyIdx)?;
        pos += 1;
        if x & T_BIT != 0 {
            ext.temporal_layer = Some(tk >> 6);
            ext.layer_sync = tk & Y_BIT != 0;
        }
        if x & K_BIT != 0 {
            ext.key_index = Some(tk & KEYIDX_MASK);
        }
    }

    descriptor.extension = Some(ext);
    Ok((descriptor, pos))
}

/// Whether `data` begins a VP8 key frame.
///
/// True only for the start of partition 0 whose first payload byte has the
/// P bit (bit 0 of the VP8 frame tag) clear, which marks an intra frame.
pub fn is_key_frame_start(data: &[u8]) -> bool {
    let Ok((descriptor, header_len)) = parse(data) else {
        return false;
    };
    descriptor.is_key_frame_start(data.get(header_len..).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_start_descriptor() {
        let (d, len) = parse(&[0x10, 0xAA]).unwrap();
        assert_eq!(len, 1);
        assert!(d.start_of_partition);
        assert!(!d.non_referenced);
        assert!(!d.extended());
        assert_eq!(d.partition_index, 0);
    }

    #[test]
    fn partition_index_and_n_bit() {
        let (d, len) = parse(&[0x25]).unwrap();
        assert_eq!(len, 1);
        assert!(d.non_referenced);
        assert!(!d.start_of_partition);
        assert_eq!(d.partition_index, 5);
    }

    #[test]
    fn short_picture_id() {
        let (d, len) = parse(&[0x90, 0x80, 0x17, 0x9d]).unwrap();
        assert_eq!(len, 3);
        let ext = d.extension.unwrap();
        assert_eq!(ext.picture_id, Some(PictureId::Short(0x17)));
        assert_eq!(ext.tl0_pic_idx, None);
    }

    #[test]
    fn long_picture_id_with_all_fields() {
        // X, I(M), L, T, K
        let data = [0x90, 0xF0, 0x81, 0x23, 0x05, 0b10_1_00111, 0x9d];
        let (d, len) = parse(&data).unwrap();
        assert_eq!(len, 6);
        let ext = d.extension.unwrap();
        assert_eq!(ext.picture_id, Some(PictureId::Long(0x0123)));
        assert_eq!(ext.tl0_pic_idx, Some(0x05));
        assert_eq!(ext.temporal_layer, Some(2));
        assert!(ext.layer_sync);
        assert_eq!(ext.key_index, Some(7));
    }

    #[test]
    fn k_without_t_still_consumes_byte() {
        let (d, len) = parse(&[0x80, 0x10, 0x03, 0xFF]).unwrap();
        assert_eq!(len, 3);
        let ext = d.extension.unwrap();
        assert_eq!(ext.temporal_layer, None);
        assert_eq!(ext.key_index, Some(3));
    }

    #[test]
    fn truncated_fields_rejected() {
        let cases: [(&[u8], HeaderErrorKind); 5] = [
            (&[], HeaderErrorKind::Empty),
            (&[0x80], HeaderErrorKind::TruncatedExtension),
            (&[0x80, 0x80], HeaderErrorKind::TruncatedPictureId),
            (&[0x80, 0x80, 0x80], HeaderErrorKind::TruncatedPictureId),
            (&[0x80, 0x40], HeaderErrorKind::TruncatedTl0PicIdx),
        ];
        for (data, kind) in cases {
            assert_eq!(parse(data), Err(VpxError::MalformedHeader { kind }));
        }
        assert_eq!(
            parse(&[0x80, 0x20]),
            Err(VpxError::MalformedHeader {
                kind: HeaderErrorKind::TruncatedTidKeyIdx
            })
        );
    }

    #[test]
    fn write_then_parse_extended() {
        let d = Vp8Descriptor {
            non_referenced: true,
            start_of_partition: true,
            partition_index: 0,
            extension: Some(Vp8Extension {
                picture_id: Some(PictureId::Long(0x1234)),
                tl0_pic_idx: Some(9),
                temporal_layer: Some(1),
                layer_sync: false,
                key_index: None,
            }),
        };
        let mut out = Vec::new();
        d.write(&mut out);
        assert_eq!(out.len(), d.encoded_len());
        assert_eq!(out.len(), 6);
        let (parsed, len) = parse(&out).unwrap();
        assert_eq!(len, 6);
        // T written, K absent: KEYIDX is not reported back
        assert_eq!(parsed, d);
    }

    #[test]
    fn key_frame_start_detection() {
        assert!(is_key_frame_start(&[0x10, 0x00]));
        assert!(!is_key_frame_start(&[0x00, 0x01]));
        assert!(!is_key_frame_start(&[0x10, 0x01]));
        // start of partition 1 is never a key frame start
        assert!(!is_key_frame_start(&[0x11, 0x00]));
        // no payload byte to inspect
        assert!(!is_key_frame_start(&[0x10]));
        // extension skipped before looking at the payload
        assert!(is_key_frame_start(&[0x90, 0x80, 0x05, 0x00]));
        assert!(!is_key_frame_start(&[0x90, 0x80]));
    }

    #[test]
    fn nonzero_partition_only_flagged_at_start() {
        let (start, _) = parse(&[0x12]).unwrap();
        assert!(start.starts_nonzero_partition());

        // continuation of partition 2, the common case for multi-partition frames
        let (cont, _) = parse(&[0x02]).unwrap();
        assert!(!cont.starts_nonzero_partition());
        assert!(!cont.is_key_frame_start(&[0x00]));

        let (first, _) = parse(&[0x10]).unwrap();
        assert!(!first.starts_nonzero_partition());
        assert!(first.is_key_frame_start(&[0x00]));
        assert!(!first.is_key_frame_start(&[]));
    }
}
