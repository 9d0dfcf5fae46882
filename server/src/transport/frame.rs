//! Length-prefixed frame reassembly for the byte-stream transports.
//!
//! The wire carries `u32_be(len) ++ bytes`, where `len` counts the command
//! byte plus its payload. Reads can split or merge frames arbitrarily;
//! the assembler buffers until a declared length is satisfied. A length
//! above [`MAX_FRAME_LEN`] is a protocol error and the caller closes the
//! connection rather than buffer toward it.

use protocol::FRAME_HEADER_LEN;

/// Upper bound on a declared frame body. No schema comes anywhere near
/// this; a peer declaring more is not speaking this protocol.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("declared frame length {declared} exceeds the {MAX_FRAME_LEN}-byte limit")]
pub struct OversizedFrame {
    pub declared: usize,
}

#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// The next complete frame body (without its length prefix), if one
    /// is buffered. Zero-length frames cannot carry a command byte and
    /// are skipped.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, OversizedFrame> {
        loop {
            if self.buf.len() < FRAME_HEADER_LEN {
                return Ok(None);
            }
            let mut header = [0u8; FRAME_HEADER_LEN];
            header.copy_from_slice(&self.buf[..FRAME_HEADER_LEN]);
            let declared = u32::from_be_bytes(header) as usize;
            if declared == 0 {
                log::warn!("dropping zero-length frame");
                self.buf.drain(..FRAME_HEADER_LEN);
                continue;
            }
            if declared > MAX_FRAME_LEN {
                return Err(OversizedFrame { declared });
            }
            if self.buf.len() < FRAME_HEADER_LEN + declared {
                return Ok(None);
            }
            let frame = self.buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + declared].to_vec();
            self.buf.drain(..FRAME_HEADER_LEN + declared);
            return Ok(Some(frame));
        }
    }
}
