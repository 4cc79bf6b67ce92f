//! Frame codec: 4-byte big-endian length prefix + postcard body.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::NetError;

/// Maximum frame size: 16 MiB. Data batches during a key handoff are
/// the only messages that grow with load.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Serialize `msg` and write it as one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = postcard::to_allocvec(msg).map_err(|e| NetError::Codec(e.to_string()))?;

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame and deserialize it.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, NetError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(NetError::OversizeFrame { len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    postcard::from_bytes(&payload).map_err(|e| NetError::Codec(e.to_string()))
}
