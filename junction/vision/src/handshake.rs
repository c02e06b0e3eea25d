/// TLS record content types we care about — just enough to tell a
/// handshake from application data, never a full record-layer parser.
const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const CONTENT_TYPE_APPLICATION_DATA: u8 = 0x17;
const HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 0x01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsVersion {
    /// Legacy record version 3.1–3.3 with no `supported_versions`
    /// extension advertising 1.3.
    Tls12OrEarlier,
    /// A `supported_versions` extension listing 0x0304 was found in the
    /// ClientHello.
    Tls13,
}

/// True if `buf` begins with a well-formed TLS record header for a
/// handshake message. Requires at least 6 bytes (5-byte record header
/// plus the handshake message type byte).
pub fn looks_like_tls_client_hello(buf: &[u8]) -> bool {
    if buf.len() < 6 {
        return false;
    }
    buf[0] == CONTENT_TYPE_HANDSHAKE
        && buf[1] == 0x03
        && (0x01..=0x04).contains(&buf[2])
        && buf[5] == HANDSHAKE_TYPE_CLIENT_HELLO
}

pub fn is_application_data_record(buf: &[u8]) -> bool {
    !buf.is_empty() && buf[0] == CONTENT_TYPE_APPLICATION_DATA
}

/// Scans a ClientHello's extensions for `supported_versions` containing
/// TLS 1.3 (0x03 0x04). `hello` is the full record including the 5-byte
/// record header and 4-byte handshake header; on any parse failure this
/// falls back to `Tls12OrEarlier` rather than erroring, since an
/// ambiguous handshake should never block the connection.
pub fn detect_version(hello: &[u8]) -> TlsVersion {
    const SUPPORTED_VERSIONS_EXT: u16 = 43;
    const TLS13: [u8; 2] = [0x03, 0x04];

    // record(5) + handshake header(4) + legacy_version(2) + random(32)
    let mut pos = 5 + 4 + 2 + 32;
    if hello.len() <= pos {
        return TlsVersion::Tls12OrEarlier;
    }

    // session_id
    let Some(&session_id_len) = hello.get(pos) else {
        return TlsVersion::Tls12OrEarlier;
    };
    pos += 1 + session_id_len as usize;

    // cipher_suites
    let Some(cipher_len) = hello.get(pos..pos + 2) else {
        return TlsVersion::Tls12OrEarlier;
    };
    let cipher_len = u16::from_be_bytes([cipher_len[0], cipher_len[1]]) as usize;
    pos += 2 + cipher_len;

    // compression_methods
    let Some(&compression_len) = hello.get(pos) else {
        return TlsVersion::Tls12OrEarlier;
    };
    pos += 1 + compression_len as usize;

    // extensions
    let Some(ext_total_len) = hello.get(pos..pos + 2) else {
        return TlsVersion::Tls12OrEarlier;
    };
    let ext_total_len = u16::from_be_bytes([ext_total_len[0], ext_total_len[1]]) as usize;
    pos += 2;
    let ext_end = (pos + ext_total_len).min(hello.len());

    while pos + 4 <= ext_end {
        let ext_type = u16::from_be_bytes([hello[pos], hello[pos + 1]]);
        let ext_len = u16::from_be_bytes([hello[pos + 2], hello[pos + 3]]) as usize;
        let body_start = pos + 4;
        let body_end = body_start + ext_len;
        if body_end > ext_end {
            break;
        }
        if ext_type == SUPPORTED_VERSIONS_EXT {
            let body = &hello[body_start..body_end];
            if body.chunks(2).any(|chunk| chunk == TLS13) {
                return TlsVersion::Tls13;
            }
        }
        pos = body_end;
    }

    TlsVersion::Tls12OrEarlier
}
