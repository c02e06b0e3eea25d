use std::io;

use bytes::Bytes;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::frame::{Command, MAX_PAYLOAD};
use crate::handshake::{detect_version, is_application_data_record, looks_like_tls_client_hello, TlsVersion};
use crate::reader::PaddingReader;
use crate::splice::SpliceGate;
use crate::writer::PaddingWriter;

/// Outbound packets inspected for a TLS ClientHello before the filter
/// gives up deciding and just drains padding on the exhaustion path.
const PACKETS_TO_FILTER: u32 = 8;

/// A buffer only gets reshaped once it would leave less than this much
/// room for padding inside a single frame.
const RESHAPE_RESERVE: usize = 64;

/// Content below this length gets a padding floor biased toward record
/// sizes a real TLS record would carry, so short control messages don't
/// stand out against padded application data.
const SHORT_CONTENT_THRESHOLD: usize = 900;
const SHORT_CONTENT_PADDING_FLOOR: u16 = 900;

fn reshape(buf: &[u8]) -> Vec<&[u8]> {
    let max_chunk = MAX_PAYLOAD - RESHAPE_RESERVE;
    if buf.len() <= max_chunk {
        vec![buf]
    } else {
        buf.chunks(max_chunk).collect()
    }
}

fn padding_for(content_len: usize) -> u16 {
    let reserve = (MAX_PAYLOAD - content_len.min(MAX_PAYLOAD)) as u16;
    let floor = if content_len < SHORT_CONTENT_THRESHOLD {
        SHORT_CONTENT_PADDING_FLOOR.min(reserve)
    } else {
        0
    };
    if floor >= reserve {
        reserve
    } else {
        rand::thread_rng().gen_range(floor..=reserve)
    }
}

/// Drives [`PaddingWriter`] through the TLS-aware padding decision: for
/// the first [`PACKETS_TO_FILTER`] outbound writes it inspects the bytes
/// for a ClientHello to learn whether the stream is TLS and which
/// version, then once a TLS application-data record is observed (or the
/// inspection window runs out on non-TLS traffic) it emits the final
/// padded frame and switches to raw passthrough for everything after.
///
/// `EnableXtls` from spec.md is approximated here as "ClientHello
/// advertised `supported_versions` 1.3" — cipher-suite enumeration is
/// not parsed, since every cipher TLS 1.3 offers is splice-safe in
/// practice. The upstream End/Direct split (still-framed-but-unpadded
/// vs. immediately-raw) also collapses into one splice transition here;
/// both finalize padding and hand off to [`PaddingWriter::write_direct`].
pub struct VisionWriter<W> {
    writer: PaddingWriter<W>,
    gate: SpliceGate,
    packets_left: u32,
    is_tls: bool,
    is_tls13: bool,
}

impl<W: AsyncWrite + Unpin> VisionWriter<W> {
    pub fn new(inner: W, uuid: Uuid) -> Self {
        let mut gate = SpliceGate::new();
        gate.mark_eligibility(true);
        Self {
            writer: PaddingWriter::new(inner, uuid),
            gate,
            packets_left: PACKETS_TO_FILTER,
            is_tls: false,
            is_tls13: false,
        }
    }

    pub fn splice_ready(&self) -> bool {
        self.gate.splice_ready()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn inspect(&mut self, buf: &[u8]) {
        if !self.is_tls && looks_like_tls_client_hello(buf) {
            self.is_tls = true;
            self.is_tls13 = detect_version(buf) == TlsVersion::Tls13;
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.gate.splice_ready() {
            return self.writer.write_direct(buf).await;
        }

        if self.packets_left > 0 {
            self.inspect(buf);
            self.packets_left -= 1;
        }

        let ends_on_application_data = self.is_tls && is_application_data_record(buf);
        let exhausted_without_tls = self.packets_left == 0 && !self.is_tls;

        let chunks = reshape(buf);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let is_last_chunk = i == last;
            let cmd = if is_last_chunk && ends_on_application_data {
                if self.is_tls13 {
                    Command::Direct
                } else {
                    Command::PaddingEnd
                }
            } else if is_last_chunk && exhausted_without_tls {
                Command::PaddingEnd
            } else {
                Command::PaddingContinue
            };
            let padding_len = padding_for(chunk.len());
            self.writer.write_frame(cmd, chunk, padding_len).await?;
            if cmd != Command::PaddingContinue {
                self.gate.mark_padding_ended();
            }
        }
        Ok(())
    }
}

/// Mirrors [`VisionWriter`] on the read side. The reader never runs the
/// TLS filter itself — spec.md's algorithm only inspects outbound
/// bytes — it just tracks the same splice gate off the commands the
/// peer's writer already decided, and stops stripping frames once a
/// non-`Continue` command has been observed.
pub struct VisionReader<R> {
    reader: PaddingReader<R>,
    gate: SpliceGate,
}

impl<R: AsyncRead + Unpin> VisionReader<R> {
    pub fn new(inner: R) -> Self {
        let mut gate = SpliceGate::new();
        gate.mark_eligibility(true);
        Self {
            reader: PaddingReader::new(inner),
            gate,
        }
    }

    pub fn splice_ready(&self) -> bool {
        self.gate.splice_ready()
    }

    pub fn peer_uuid(&self) -> Option<Uuid> {
        self.reader.peer_uuid()
    }

    pub async fn read(&mut self) -> io::Result<Bytes> {
        let (cmd, content) = self.reader.read_frame().await?;
        if cmd != Command::PaddingContinue {
            self.gate.mark_padding_ended();
        }
        Ok(content)
    }
}
