//! Length-prefixed framing: a 4-byte big-endian payload length followed by
//! the payload (one JSON envelope per frame).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::BusError;
use crate::message::BusMessage;

pub const LENGTH_BYTES: usize = 4;

/// Default upper bound for one frame. Image blobs are the large case.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Append `data` to `buf` with its length header.
pub fn encode(data: &[u8], buf: &mut Vec<u8>) -> Result<(), BusError> {
    let len = u32::try_from(data.len()).map_err(|_| BusError::FrameTooLarge {
        len: data.len(),
        max: u32::MAX as usize,
    })?;
    buf.reserve(LENGTH_BYTES + data.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R, max_payload: usize) -> Result<Option<Vec<u8>>, BusError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_BYTES];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(BusError::Io(e)),
    }

    let len = u32::from_be_bytes(header) as usize;
    if max_payload > 0 && len > max_payload {
        return Err(BusError::FrameTooLarge {
            len,
            max: max_payload,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<(), BusError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    encode(data, &mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_message<R>(reader: &mut R, max_payload: usize) -> Result<Option<BusMessage>, BusError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader, max_payload).await? {
        Some(frame) => Ok(Some(BusMessage::from_frame(&frame)?)),
        None => Ok(None),
    }
}

pub async fn write_message<W>(writer: &mut W, message: &BusMessage) -> Result<(), BusError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &message.to_frame()?).await
}
