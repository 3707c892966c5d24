//! Multiplexed exec stream framing
//!
//! The engine carries stdout and stderr on one byte stream. Each frame
//! starts with an 8-byte header:
//!
//! ```text
//! [stream type, 0, 0, 0, len (u32 big-endian)] payload...
//! ```
//!
//! Stream type 1 is stdout, 2 is stderr (0 is stdin and is ignored).

use guardctl_core::{Error, ExecResult, Result};

/// Size of the per-frame header
pub const HEADER_LEN: usize = 8;

/// Stream a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(StreamKind::Stdin),
            1 => Some(StreamKind::Stdout),
            2 => Some(StreamKind::Stderr),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            StreamKind::Stdin => 0,
            StreamKind::Stdout => 1,
            StreamKind::Stderr => 2,
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: StreamKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn stdout(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: StreamKind::Stdout,
            payload: payload.into(),
        }
    }

    pub fn stderr(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: StreamKind::Stderr,
            payload: payload.into(),
        }
    }

    /// Encode with the engine's header
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len() as u32;
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.kind.as_byte());
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Iterator over the frames of a complete byte buffer
///
/// Decoding stops at the first incomplete frame; whatever is left is
/// available from [`FrameDecoder::remainder`]. An unknown stream type
/// yields one error and ends the iteration.
pub struct FrameDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> FrameDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    /// Bytes not consumed by a complete frame
    pub fn remainder(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

impl Iterator for FrameDecoder<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let rest = &self.buf[self.pos..];
        if rest.len() < HEADER_LEN {
            return None;
        }

        let Some(kind) = StreamKind::from_byte(rest[0]) else {
            self.failed = true;
            return Some(Err(Error::Transport(format!(
                "Unknown stream type {} at offset {}",
                rest[0], self.pos
            ))));
        };

        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let end = HEADER_LEN + len;
        if rest.len() < end {
            return None;
        }

        let payload = rest[HEADER_LEN..end].to_vec();
        self.pos += end;
        Some(Ok(Frame { kind, payload }))
    }
}

/// Stdout and stderr payloads joined in arrival order
pub fn interleaved_lossy(frames: impl IntoIterator<Item = Frame>) -> String {
    let mut bytes = Vec::new();
    for frame in frames {
        if frame.kind != StreamKind::Stdin {
            bytes.extend_from_slice(&frame.payload);
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Output split back into its two streams
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demuxed {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Demuxed {
    pub fn push(&mut self, frame: Frame) {
        match frame.kind {
            StreamKind::Stdout => self.stdout.extend_from_slice(&frame.payload),
            StreamKind::Stderr => self.stderr.extend_from_slice(&frame.payload),
            StreamKind::Stdin => {}
        }
    }

    /// Aggregate frames in arrival order
    pub fn collect(frames: impl IntoIterator<Item = Frame>) -> Self {
        let mut out = Self::default();
        for frame in frames {
            out.push(frame);
        }
        out
    }

    /// Decode a raw multiplexed buffer
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut out = Self::default();
        for frame in FrameDecoder::new(bytes) {
            out.push(frame?);
        }
        Ok(out)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn into_exec_result(self) -> ExecResult {
        ExecResult::from_output(self.stdout_lossy(), self.stderr_lossy())
    }
}
