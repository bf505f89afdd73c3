//! The writing half of a framed connection.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN, Serialize, frame_too_long};

/// Writes one length prefixed frame per message.
///
/// The prefix and the serialized head of the message are staged in a reused
/// buffer, a borrowed tail (prediction values) is written straight from the
/// caller's memory.
pub struct Sender<W: AsyncWrite + Unpin> {
    tx: W,
    head: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> Sender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            head: Vec::new(),
        }
    }

    /// Frames `msg` and flushes it.
    ///
    /// # Errors
    /// An io error if the message can't be serialized, if its frame is longer
    /// than the receiving end accepts, or if writing fails.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        self.head.clear();
        self.head.extend_from_slice(&[0; LEN_TYPE_SIZE]);

        let tail = msg.serialize(&mut self.head)?.unwrap_or_default();

        let body = self.head.len() - LEN_TYPE_SIZE + tail.len();
        let len = LenType::try_from(body).map_err(|_| frame_too_long(body))?;
        if len > MAX_FRAME_LEN {
            return Err(frame_too_long(body));
        }
        self.head[..LEN_TYPE_SIZE].copy_from_slice(&len.to_be_bytes());

        self.tx.write_all(&self.head).await?;
        if !tail.is_empty() {
            self.tx.write_all(tail).await?;
        }

        self.tx.flush().await
    }
}
