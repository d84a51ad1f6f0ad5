//! Native messaging framing: a 4 byte length in native byte order followed by that many bytes
//! of UTF-8 JSON.

use std::io::ErrorKind;

use anyhow::{bail, Result};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Browsers refuse host messages above 1 MiB.
pub const MAX_OUTGOING_FRAME: usize = 1024 * 1024;

/// Browsers may send up to 4 GiB; nothing legitimate comes close to this.
pub const MAX_INCOMING_FRAME: usize = 64 * 1024 * 1024;

/// Reads one frame. `Ok(None)` means the browser closed the pipe between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut length = [0u8; 4];
    match reader.read_exact(&mut length).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let length = u32::from_ne_bytes(length) as usize;
    if length > MAX_INCOMING_FRAME {
        bail!("Incoming frame of {length} bytes exceeds limit");
    }
    let mut payload = vec![0; length];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_OUTGOING_FRAME {
        bail!("Outgoing frame of {} bytes exceeds limit", payload.len());
    }
    writer
        .write_all(&(payload.len() as u32).to_ne_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_message<T: DeserializeOwned, R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<T>> {
    match read_frame(reader).await? {
        Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
        None => Ok(None),
    }
}

pub async fn write_message<T: Serialize, W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &T,
) -> Result<()> {
    write_frame(writer, &serde_json::to_vec(message)?).await
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use anyhow::Result;
    use serde_json::{json, Value};

    use super::*;

    #[tokio::test]
    async fn test_frames_in_sequence() -> Result<()> {
        let mut buffer = Cursor::new(Vec::new());
        write_message(&mut buffer, &json!({"type": "startup"})).await?;
        write_message(&mut buffer, &json!({"type": "tabActivated", "tabId": 4})).await?;

        let bytes = buffer.into_inner();
        assert_eq!(&bytes[..4], &(18u32).to_ne_bytes());

        let mut reader = bytes.as_slice();
        let first: Option<Value> = read_message(&mut reader).await?;
        let second: Option<Value> = read_message(&mut reader).await?;
        let end: Option<Value> = read_message(&mut reader).await?;
        assert_eq!(first, Some(json!({"type": "startup"})));
        assert_eq!(second, Some(json!({"type": "tabActivated", "tabId": 4})));
        assert_eq!(end, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_payload_is_an_error() -> Result<()> {
        let mut bytes = 10u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        let mut reader = bytes.as_slice();
        assert!(read_frame(&mut reader).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_frames_are_rejected() -> Result<()> {
        let bytes = ((MAX_INCOMING_FRAME + 1) as u32).to_ne_bytes();
        let mut reader = bytes.as_slice();
        assert!(read_frame(&mut reader).await.is_err());

        let mut sink = Cursor::new(Vec::new());
        assert!(write_frame(&mut sink, &vec![b' '; MAX_OUTGOING_FRAME + 1])
            .await
            .is_err());
        assert!(sink.into_inner().is_empty());
        Ok(())
    }
}
