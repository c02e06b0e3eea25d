use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use crate::frame::{Command, FrameHeader, HEADER_LEN, UUID_LEN};

/// The mirror of `PaddingWriter`: strips the one-time UUID prefix and
/// each frame's header/padding, handing the caller back plain content
/// bytes. Buffers partial reads internally so callers never have to
/// reassemble a frame split across TCP segments themselves.
pub struct PaddingReader<R> {
    inner: R,
    buf: BytesMut,
    seen_uuid: Option<Uuid>,
}

impl<R: AsyncRead + Unpin> PaddingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            seen_uuid: None,
        }
    }

    pub fn peer_uuid(&self) -> Option<Uuid> {
        self.seen_uuid
    }

    async fn fill_until(&mut self, n: usize) -> io::Result<()> {
        while self.buf.len() < n {
            let mut chunk = [0u8; 4096];
            let read = self.inner.read(&mut chunk).await?;
            if read == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended mid-frame"));
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(())
    }

    /// Returns the next frame's command and content (padding already
    /// discarded). Consumes the leading UUID transparently on the first
    /// call if one hasn't been observed yet.
    pub async fn read_frame(&mut self) -> io::Result<(Command, Bytes)> {
        if self.seen_uuid.is_none() {
            self.fill_until(UUID_LEN).await?;
            let uuid_bytes = self.buf.split_to(UUID_LEN);
            self.seen_uuid = Some(Uuid::from_slice(&uuid_bytes).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, e.to_string())
            })?);
        }

        self.fill_until(HEADER_LEN).await?;
        let header_bytes = self.buf.split_to(HEADER_LEN);
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&header_bytes);
        let header = FrameHeader::decode(&raw)?;

        let total = header.content_len as usize + header.padding_len as usize;
        self.fill_until(total).await?;
        let content = self.buf.split_to(header.content_len as usize).freeze();
        let _padding = self.buf.split_to(header.padding_len as usize);

        Ok((header.cmd, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::PaddingWriter;

    #[tokio::test]
    async fn round_trips_a_padded_stream() {
        let uuid = Uuid::new_v4();
        let mut wire = Vec::new();
        {
            let mut w = PaddingWriter::new(&mut wire, uuid);
            w.write_frame(Command::PaddingContinue, b"first chunk", 37).await.unwrap();
            w.write_frame(Command::PaddingEnd, b"second chunk, longer", 0).await.unwrap();
        }

        let mut r = PaddingReader::new(wire.as_slice());
        let (cmd1, content1) = r.read_frame().await.unwrap();
        assert_eq!(cmd1, Command::PaddingContinue);
        assert_eq!(&content1[..], b"first chunk");

        let (cmd2, content2) = r.read_frame().await.unwrap();
        assert_eq!(cmd2, Command::PaddingEnd);
        assert_eq!(&content2[..], b"second chunk, longer");

        assert_eq!(r.peer_uuid(), Some(uuid));
    }

    #[tokio::test]
    async fn round_trips_when_wire_bytes_arrive_one_at_a_time() {
        let uuid = Uuid::new_v4();
        let mut wire = Vec::new();
        {
            let mut w = PaddingWriter::new(&mut wire, uuid);
            w.write_frame(Command::PaddingContinue, b"x", 10).await.unwrap();
        }

        struct OneByteAtATime<'a> {
            data: &'a [u8],
            pos: usize,
        }
        impl<'a> tokio::io::AsyncRead for OneByteAtATime<'a> {
            fn poll_read(
                mut self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                if self.pos < self.data.len() {
                    buf.put_slice(&[self.data[self.pos]]);
                    self.pos += 1;
                }
                std::task::Poll::Ready(Ok(()))
            }
        }

        let mut r = PaddingReader::new(OneByteAtATime { data: &wire, pos: 0 });
        let (cmd, content) = r.read_frame().await.unwrap();
        assert_eq!(cmd, Command::PaddingContinue);
        assert_eq!(&content[..], b"x");
    }
}
