use std::io;

use tokio::io::AsyncRead;

use crate::lookahead::LookaheadStream;

/// How many bytes must be peeked before a connection can be classified.
pub const HEADER_LEN: usize = 6;

// TLS record content type for handshake messages.
const RECORD_TYPE_HANDSHAKE: u8 = 0x16;
// Major version shared by SSL 3.0 and TLS 1.0 through 1.3 records.
const RECORD_VERSION_MAJOR: u8 = 0x03;
// Handshake message type of a ClientHello, right after the 5-byte record header.
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
// High bit of the 2-byte SSLv2 record length, as sent by legacy ClientHellos.
const SSLV2_CLIENT_HELLO: u8 = 0x80;

/// The protocol family spoken by the peer on a classified connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// The peer opened with something that looks like a TLS/SSL ClientHello.
    Encrypted,
    /// Anything else, most likely plaintext HTTP.
    Plain,
}

impl Protocol {
    pub fn is_encrypted(self) -> bool {
        self == Protocol::Encrypted
    }
}

/// Sniff the first bytes of a connection.
///
/// This only recognizes a handshake-looking prefix; the TLS layer is still responsible for
/// rejecting malformed handshakes.
pub fn classify(header: &[u8; HEADER_LEN]) -> Protocol {
    match header {
        [RECORD_TYPE_HANDSHAKE, RECORD_VERSION_MAJOR, _, _, _, HANDSHAKE_CLIENT_HELLO] => {
            Protocol::Encrypted
        }
        [SSLV2_CLIENT_HELLO, ..] => Protocol::Encrypted,
        _ => Protocol::Plain,
    }
}

/// Peek the first bytes of `stream` and classify them, leaving them available to later reads.
pub async fn classify_stream<S: AsyncRead + Unpin>(
    stream: &mut LookaheadStream<S>,
) -> io::Result<Protocol> {
    let header = stream.peek(HEADER_LEN).await?;
    let header: &[u8; HEADER_LEN] = header
        .try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "unexpected peek length"))?;
    Ok(classify(header))
}
