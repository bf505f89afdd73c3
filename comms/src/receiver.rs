use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Align8, Deserialize, MAX_FRAME_LEN, frame_too_long};

/// Reads the frames written by a `Sender`.
pub struct Receiver<R: AsyncRead + Unpin> {
    rx: R,
}

impl<R: AsyncRead + Unpin> Receiver<R> {
    pub(super) fn new(rx: R) -> Self {
        Self { rx }
    }

    /// Reads the next frame into `buf` and deserializes it.
    ///
    /// `buf` is made of 8 byte words so f64 payloads can be borrowed out of
    /// it. The returned message borrows from `buf`, so it's reused between
    /// calls without reallocating.
    ///
    /// # Errors
    /// `io::ErrorKind::UnexpectedEof` once the peer hung up, `InvalidData` for
    /// frames over the size limit or that don't deserialize.
    pub async fn recv_into<'buf, T, B>(&mut self, buf: &'buf mut Vec<B>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
        B: Align8,
    {
        let len = self.rx.read_u64().await?;
        if len > MAX_FRAME_LEN {
            return Err(frame_too_long(len));
        }
        let len = len as usize;

        buf.clear();
        buf.resize(len.div_ceil(size_of::<B>()), B::zeroed());

        let frame = &mut bytemuck::cast_slice_mut::<B, u8>(buf.as_mut_slice())[..len];
        self.rx.read_exact(frame).await?;

        T::deserialize(frame)
    }
}
