mod align;
mod deserialize;
pub mod msg;
mod receiver;
mod sender;
mod serialize;
pub mod specs;

use std::{fmt::Display, io};

use tokio::io::{AsyncRead, AsyncWrite};

pub use align::Align8;
pub use deserialize::Deserialize;
pub use receiver::Receiver;
pub use sender::Sender;
pub use serialize::Serialize;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// The longest frame a `Receiver` accepts, 4 GiB.
const MAX_FRAME_LEN: LenType = 1 << 32;

fn frame_too_long(len: impl Display) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("frame of {len} bytes exceeds the limit of {MAX_FRAME_LEN} bytes"),
    )
}

/// Creates both `Receiver` and `Sender` network channel parts.
///
/// Given a reader and a writer creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of a receiver and a sender.
pub fn channel<R, W>(rx: R, tx: W) -> (Receiver<R>, Sender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (Receiver::new(rx), Sender::new(tx))
}
