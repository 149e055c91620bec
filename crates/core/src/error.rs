//! Error types for the VP8/VP9 RTP framing library.

use std::fmt;

/// Errors that can occur while framing, reassembling, or driving a codec session.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Descriptor**: [`MalformedHeader`](Self::MalformedHeader): the payload
///   descriptor declares more bytes than the packet carries.
/// - **Reassembly**: [`InvalidPacket`](Self::InvalidPacket),
///   [`Desynced`](Self::Desynced): lost or reordered fragments.
/// - **Codec**: [`DecodeCorrupted`](Self::DecodeCorrupted),
///   [`Transform`](Self::Transform), [`InitFailure`](Self::InitFailure).
/// - **Setup**: [`InvalidConfig`](Self::InvalidConfig).
///
/// Only [`InitFailure`](Self::InitFailure) is fatal for a session; everything
/// else is recovered locally and reported so the caller keeps calling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VpxError {
    /// The descriptor's extension bits point past the end of the packet.
    #[error("malformed payload descriptor: {kind}")]
    MalformedHeader { kind: HeaderErrorKind },

    /// Nothing left after stripping the payload descriptor.
    #[error("invalid packet: no payload after {header_len}-byte descriptor")]
    InvalidPacket { header_len: usize },

    /// A fragment's RTP timestamp does not match the access unit being collected.
    #[error("desynced: packet timestamp {got}, expected {expected}")]
    Desynced { expected: u32, got: u32 },

    /// The decode transform flagged the access unit as corrupted.
    #[error("decoder reported a corrupted picture")]
    DecodeCorrupted,

    /// The external encode/decode transform failed for this call.
    #[error("codec transform failed: {0}")]
    Transform(String),

    /// Encoder or decoder construction failed. The session is unusable afterwards.
    #[error("{codec} initialization failed: {reason}")]
    InitFailure { codec: CodecRole, reason: String },

    /// Session configuration rejected at setup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VpxError {
    /// Whether the session must be torn down after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InitFailure { .. })
    }

    pub(crate) fn malformed(kind: HeaderErrorKind) -> Self {
        Self::MalformedHeader { kind }
    }
}

/// Which descriptor field ran past the end of the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderErrorKind {
    /// Packet had no bytes at all.
    Empty,
    /// X bit set but the extension byte is missing.
    TruncatedExtension,
    /// I bit set but the (1 or 2 byte) PictureID is missing.
    TruncatedPictureId,
    /// L bit set but TL0PICIDX is missing.
    TruncatedTl0PicIdx,
    /// T or K bit set but the TID/KEYIDX byte is missing.
    TruncatedTidKeyIdx,
}

impl fmt::Display for HeaderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty packet"),
            Self::TruncatedExtension => write!(f, "truncated extension byte"),
            Self::TruncatedPictureId => write!(f, "truncated picture id"),
            Self::TruncatedTl0PicIdx => write!(f, "truncated TL0PICIDX"),
            Self::TruncatedTidKeyIdx => write!(f, "truncated TID/KEYIDX"),
        }
    }
}

/// Side of the codec a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecRole {
    Encoder,
    Decoder,
}

impl fmt::Display for CodecRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoder => write!(f, "encoder"),
            Self::Decoder => write!(f, "decoder"),
        }
    }
}

/// Convenience alias for `Result<T, VpxError>`.
pub type Result<T> = std::result::Result<T, VpxError>;
