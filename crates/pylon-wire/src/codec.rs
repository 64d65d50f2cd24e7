use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{CommandTag, EventTag, Result, WireError};

/// Upper bound on a single length-prefixed string. Anything larger is
/// treated as stream corruption rather than a legitimate payload.
const MAX_STRING_BYTES: usize = 64 * 1024 * 1024;

/// Buffers one logical message (tag plus payload) and writes it to the
/// stream in a single call.
///
/// The receiver only ever performs exact byte-count reads, so batching the
/// fields of one message is observationally identical to sending them one
/// `send` at a time. Messages must still never interleave on one socket;
/// callers serialize sends through a lock.
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn command(tag: CommandTag) -> Self {
        Self {
            buf: tag.bytes().to_vec(),
        }
    }

    pub fn event(tag: EventTag) -> Self {
        Self {
            buf: tag.bytes().to_vec(),
        }
    }

    /// An untagged message. Only the rendezvous handshake (the debug-id
    /// string a freshly connected target sends) uses this.
    pub fn raw() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_i32(if v { 1 } else { 0 });
    }

    /// Strings are length-prefixed with an `i32` number of UTF-8 bytes,
    /// with no terminator.
    pub fn write_string(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub async fn send<W: AsyncWrite + Unpin>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.buf).await?;
        writer.flush().await
    }
}

/// Read exactly four tag bytes. Interpretation (command vs event) is up to
/// the caller; both directions use the same fixed-width framing.
pub async fn read_tag_bytes<R: AsyncRead + Unpin>(reader: &mut R) -> Result<[u8; 4]> {
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag).await?;
    Ok(tag)
}

pub async fn read_i32<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).await?;
    Ok(i32::from_le_bytes(bytes))
}

pub async fn read_string<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
    let len = read_i32(reader).await?;
    if len < 0 {
        return Err(WireError::Protocol(format!(
            "negative string length {len}"
        )));
    }
    let len = len as usize;
    if len > MAX_STRING_BYTES {
        return Err(WireError::Protocol(format!(
            "string length {len} exceeds limit {MAX_STRING_BYTES}"
        )));
    }
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).await?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn i32_round_trips_across_the_full_range() {
        for v in [i32::MIN, -1, 0, 1, 0x0102_0304, i32::MAX] {
            let mut w = WireWriter::command(CommandTag::BreakAll);
            w.write_i32(v);
            let buf = w.into_vec();
            let mut slice = &buf[4..];
            assert_eq!(read_i32(&mut slice).await.unwrap(), v);
        }
    }

    #[tokio::test]
    async fn i32_is_little_endian_on_the_wire() {
        let mut w = WireWriter::command(CommandTag::ResumeThread);
        w.write_i32(0x0102_0304);
        assert_eq!(&w.into_vec()[4..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[tokio::test]
    async fn strings_round_trip_byte_identically() {
        for s in ["", "hello", "héllo wörld", "日本語テキスト", "a\0b"] {
            let mut w = WireWriter::event(EventTag::Output);
            w.write_string(s);
            let buf = w.into_vec();
            let mut slice = &buf[4..];
            assert_eq!(read_string(&mut slice).await.unwrap(), s);
        }
    }

    #[tokio::test]
    async fn string_length_counts_bytes_not_chars() {
        let mut w = WireWriter::event(EventTag::Output);
        w.write_string("é");
        let buf = w.into_vec();
        assert_eq!(i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]), 2);
    }

    #[tokio::test]
    async fn negative_string_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-5i32).to_le_bytes());
        let mut slice = &buf[..];
        match read_string(&mut slice).await {
            Err(WireError::Protocol(msg)) => assert!(msg.contains("negative")),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_payload_surfaces_as_io_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(10i32).to_le_bytes());
        buf.extend_from_slice(b"abc");
        let mut slice = &buf[..];
        assert!(matches!(
            read_string(&mut slice).await,
            Err(WireError::Io(_))
        ));
    }
}
