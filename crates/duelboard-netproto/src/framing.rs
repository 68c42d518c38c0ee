use bytes::{Buf, Bytes, BytesMut};

use crate::{
    constants::{FRAME_DELIMITER, MAX_FRAME_LEN},
    error::ProtoError,
};

/// Splits a byte stream into newline-delimited frames:
/// - keeps an internal receive buffer (`BytesMut`)
/// - drains every complete line, in arrival order
/// - keeps a partial trailing line for the next read
pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(initial_capacity),
        }
    }

    /// Mutable access to the receive buffer for socket reads.
    ///
    /// Typical usage:
    /// - `framer.buf_mut().reserve(n)`
    /// - `socket.read_buf(framer.buf_mut()).await?`
    pub fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drain all complete frames (delimiter stripped).
    ///
    /// Fails once a partial line exceeds [`MAX_FRAME_LEN`]: the stream can no
    /// longer be trusted to resynchronise, so the caller should drop it.
    pub fn drain_frames(&mut self) -> Result<Vec<Bytes>, ProtoError> {
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == FRAME_DELIMITER) {
            let line = self.buf.split_to(pos).freeze();
            self.buf.advance(1);
            if line.is_empty() {
                continue;
            }
            out.push(line);
        }

        if self.buf.len() > MAX_FRAME_LEN {
            return Err(ProtoError::FrameTooLarge(self.buf.len()));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::LineFramer;
    use crate::{
        codec::{decode_frame, encode_frame},
        constants::MAX_FRAME_LEN,
        messages::{GameState, Message},
    };

    #[test]
    fn framer_splits_across_reads() {
        let mut framer = LineFramer::new(64);
        let frame = encode_frame(&Message::StateUpdate {
            state: GameState::default(),
        })
        .unwrap();

        let (head, tail) = frame.split_at(10);
        framer.buf_mut().extend_from_slice(head);
        assert!(framer.drain_frames().unwrap().is_empty());
        assert_eq!(framer.pending(), 10);

        framer.buf_mut().extend_from_slice(tail);
        framer.buf_mut().extend_from_slice(&frame);
        let frames = framer.drain_frames().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(framer.pending(), 0);
        for f in frames {
            assert!(decode_frame(&f).is_ok());
        }
    }

    #[test]
    fn framer_skips_blank_lines_and_keeps_order() {
        let mut framer = LineFramer::new(64);
        framer.buf_mut().extend_from_slice(b"one\n\n\ntwo\nthr");
        let frames = framer.drain_frames().unwrap();
        assert_eq!(frames, vec![&b"one"[..], &b"two"[..]]);
        assert_eq!(framer.pending(), 3);
    }

    #[test]
    fn framer_rejects_unbounded_line() {
        let mut framer = LineFramer::new(64);
        framer
            .buf_mut()
            .extend_from_slice(&vec![b'a'; MAX_FRAME_LEN + 1]);
        assert!(framer.drain_frames().is_err());
    }
}
