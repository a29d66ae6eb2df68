use crate::codec::{read_varint, write_varint, CodecError, MAX_FRAME_LEN};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// A framed protocol connection: VarInt length prefix, then VarInt packet id
/// and fields. No compression, no encryption.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
        }
    }

    /// Read a single packet frame, returning (packet_id, payload).
    /// Incomplete frames accumulate; malformed or oversized frames error and
    /// the connection should be dropped by the caller.
    pub async fn read_packet(&mut self) -> anyhow::Result<(i32, BytesMut)> {
        loop {
            if let Some(result) = try_parse_packet(&mut self.read_buf)? {
                return Ok(result);
            }
            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                return Err(anyhow::anyhow!("connection closed by peer"));
            }
            self.read_buf.extend_from_slice(&tmp[..n]);
        }
    }

    /// Write a packet with the given ID and payload.
    pub async fn write_packet(&mut self, packet_id: i32, payload: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(packet_id, payload);
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Split the connection into read and write halves so one task can own
    /// each direction. Buffered inbound bytes move to the read half.
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            ConnectionReader {
                stream: read_half,
                read_buf: self.read_buf,
            },
            ConnectionWriter { stream: write_half },
        )
    }
}

/// Read half of a split connection.
pub struct ConnectionReader {
    stream: OwnedReadHalf,
    read_buf: BytesMut,
}

impl ConnectionReader {
    pub async fn read_packet(&mut self) -> anyhow::Result<(i32, BytesMut)> {
        loop {
            if let Some(result) = try_parse_packet(&mut self.read_buf)? {
                return Ok(result);
            }
            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                return Err(anyhow::anyhow!("connection closed by peer"));
            }
            self.read_buf.extend_from_slice(&tmp[..n]);
        }
    }
}

/// Write half of a split connection. Owns the sole reference to the TCP sink.
pub struct ConnectionWriter {
    stream: OwnedWriteHalf,
}

impl ConnectionWriter {
    pub async fn write_packet(&mut self, packet_id: i32, payload: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(packet_id, payload);
        self.stream.write_all(&frame).await?;
        Ok(())
    }
}

// === Shared helpers ===

fn try_parse_packet(read_buf: &mut BytesMut) -> anyhow::Result<Option<(i32, BytesMut)>> {
    if read_buf.is_empty() {
        return Ok(None);
    }

    let mut peek = read_buf.clone();
    let length = match read_varint(&mut peek) {
        Ok(len) => len as usize,
        // A frame length split across reads is not an error yet.
        Err(CodecError::TruncatedField) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if length > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(length).into());
    }

    let varint_bytes = read_buf.len() - peek.len();

    if peek.remaining() < length {
        return Ok(None);
    }

    read_buf.advance(varint_bytes);
    let mut packet_data = read_buf.split_to(length);

    let packet_id = read_varint(&mut packet_data)?;
    trace!(
        "Read packet id=0x{:02X} len={}",
        packet_id,
        packet_data.len()
    );

    Ok(Some((packet_id, packet_data)))
}

fn build_frame(packet_id: i32, payload: &[u8]) -> BytesMut {
    let mut packet_buf = BytesMut::new();
    write_varint(&mut packet_buf, packet_id);
    packet_buf.extend_from_slice(payload);

    let mut frame = BytesMut::new();
    write_varint(&mut frame, packet_buf.len() as i32);
    frame.extend_from_slice(&packet_buf);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_frame() {
        let frame = build_frame(0x02, &[0xAA, 0xBB]);
        let mut buf = BytesMut::from(&frame[..]);
        let (id, payload) = try_parse_packet(&mut buf).unwrap().unwrap();
        assert_eq!(id, 0x02);
        assert_eq!(&payload[..], &[0xAA, 0xBB]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits() {
        let frame = build_frame(0x01, &[1, 2, 3, 4]);
        for cut in 0..frame.len() {
            let mut buf = BytesMut::from(&frame[..cut]);
            assert!(
                try_parse_packet(&mut buf).unwrap().is_none(),
                "prefix of {} bytes must not parse",
                cut
            );
        }
    }

    #[test]
    fn test_two_frames_parse_in_order() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&build_frame(0x01, &[1]));
        buf.extend_from_slice(&build_frame(0x02, &[2]));
        let (id1, _) = try_parse_packet(&mut buf).unwrap().unwrap();
        let (id2, _) = try_parse_packet(&mut buf).unwrap().unwrap();
        assert_eq!((id1, id2), (0x01, 0x02));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, (MAX_FRAME_LEN + 1) as i32);
        buf.extend_from_slice(&[0u8; 16]);
        assert!(try_parse_packet(&mut buf).is_err());
    }

    #[test]
    fn test_malformed_length_rejected() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF][..]);
        assert!(try_parse_packet(&mut buf).is_err());
    }
}
