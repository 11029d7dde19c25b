//! Length-prefixed frames for the relay's control channel.
//!
//! ```text
//! ┌──────────┬──────────┬────────────────────────┐
//! │ len (4B) │ type(1B) │   msgpack payload      │
//! │ u32 BE   │ u8       │                        │
//! └──────────┴──────────┴────────────────────────┘
//! ```
//! `len` counts the type byte and the payload, not itself.
//!
//! One request frame yields exactly one response or error frame. A
//! `GetNextProcessEvent` reply may follow its request after an unbounded
//! delay; nothing else is written on the connection in between.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Client → relay: `{"id", "method" | "code", "body"}`.
pub const MSG_REQUEST: u8 = 0x01;
/// Relay → client: `{"id", "ok": true, "body"}`.
pub const MSG_RESPONSE: u8 = 0x02;
/// Relay → client: `{"id", "ok": false, "error": {"code", "message"}}`.
pub const MSG_ERROR: u8 = 0xFF;

fn invalid_data(msg: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

/// Read one frame as `(msg_type, payload)`.
///
/// `Ok(None)` means the peer closed the connection between frames. Frames
/// whose `len` exceeds `max_frame_bytes` are rejected before allocating.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> std::io::Result<Option<(u8, Vec<u8>)>> {
    let frame_len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    if frame_len == 0 {
        return Err(invalid_data("frame has no type byte".to_string()));
    }
    if frame_len > max_frame_bytes {
        return Err(invalid_data(format!(
            "frame of {} bytes exceeds limit of {}",
            frame_len, max_frame_bytes
        )));
    }

    let msg_type = reader.read_u8().await?;
    let mut payload = vec![0u8; frame_len as usize - 1];
    reader.read_exact(&mut payload).await?;
    Ok(Some((msg_type, payload)))
}

/// Write one frame and flush it.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    let frame_len = payload
        .len()
        .checked_add(1)
        .and_then(|len| u32::try_from(len).ok())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("payload of {} bytes does not fit a frame", payload.len()),
            )
        })?;

    let mut header = [0u8; 5];
    header[..4].copy_from_slice(&frame_len.to_be_bytes());
    header[4] = msg_type;
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}
