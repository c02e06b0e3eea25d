use std::io;

use bytes::{BufMut, BytesMut};
use rand::RngCore;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::frame::{Command, FrameHeader, MAX_PAYLOAD, UUID_LEN};

/// Wraps an `AsyncWrite` and frames every call to `write_frame` with the
/// padding header, sending the stream UUID once up front. Padding bytes
/// are filled with random data rather than zeros so a passive observer
/// sees uniform-looking record sizes without a detectable all-zero tail.
pub struct PaddingWriter<W> {
    inner: W,
    uuid: Uuid,
    sent_uuid: bool,
}

impl<W: AsyncWrite + Unpin> PaddingWriter<W> {
    pub fn new(inner: W, uuid: Uuid) -> Self {
        Self {
            inner,
            uuid,
            sent_uuid: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// `content.len() + padding_len` must be within `MAX_PAYLOAD`.
    pub async fn write_frame(&mut self, cmd: Command, content: &[u8], padding_len: u16) -> io::Result<()> {
        if content.len() + padding_len as usize > MAX_PAYLOAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "content + padding exceeds the per-frame ceiling",
            ));
        }
        let header = FrameHeader {
            cmd,
            content_len: content.len() as u16,
            padding_len,
        };

        let mut buf = BytesMut::with_capacity(UUID_LEN + 5 + content.len() + padding_len as usize);
        if !self.sent_uuid {
            buf.put_slice(self.uuid.as_bytes());
            self.sent_uuid = true;
        }
        buf.put_slice(&header.encode());
        buf.put_slice(content);
        if padding_len > 0 {
            let mut padding = vec![0u8; padding_len as usize];
            rand::thread_rng().fill_bytes(&mut padding);
            buf.put_slice(&padding);
        }

        self.inner.write_all(&buf).await
    }

    pub async fn write_direct(&mut self, content: &[u8]) -> io::Result<()> {
        self.inner.write_all(content).await
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_uuid_once_then_omits_it() {
        let mut out = Vec::new();
        let uuid = Uuid::nil();
        {
            let mut w = PaddingWriter::new(&mut out, uuid);
            w.write_frame(Command::PaddingContinue, b"hello", 4).await.unwrap();
            w.write_frame(Command::PaddingEnd, b"world", 0).await.unwrap();
        }
        // uuid(16) + header(5) + "hello"(5) + padding(4)
        //          + header(5) + "world"(5) + padding(0)
        assert_eq!(out.len(), 16 + 5 + 5 + 4 + 5 + 5);
        assert_eq!(&out[..16], uuid.as_bytes());
    }
}
