//! Every frame is a big-endian `u32` payload length followed by the payload, one JSON document.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Result, TransError};

pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Reads the next frame. Returns `None` if the peer closed the connection between two frames.
///
/// Bytes that were read but don't form a complete frame yet are kept in `buf`, so it is fine to
/// drop the future and call this again later.
pub async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = parse_frame(buf)? {
            return Ok(Some(frame));
        }

        if reader.read_buf(buf).await? == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(TransError::UnexpectedEof)
            };
        }
    }
}

/// Takes a complete frame off the front of `buf`.
fn parse_frame(buf: &mut BytesMut) -> Result<Option<Bytes>> {
    if buf.len() < LEN_PREFIX {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransError::FrameTooLarge(len));
    }

    if buf.len() < LEN_PREFIX + len {
        buf.reserve(LEN_PREFIX + len - buf.len());
        return Ok(None);
    }

    buf.advance(LEN_PREFIX);
    let frame = buf.split_to(len).freeze();
    trace!(len, "Read frame");
    Ok(Some(frame))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransError::FrameTooLarge(payload.len()));
    }

    // fits, MAX_FRAME_SIZE is below u32::MAX
    let len = payload.len() as u32;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    trace!(len, "Wrote frame");
    Ok(())
}
