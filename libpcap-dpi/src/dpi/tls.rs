use tls_parser::{
    parse_tls_extension, parse_tls_plaintext, SNIType, TlsExtension, TlsMessage,
    TlsMessageHandshake,
};

const RECORD_HEADER_LEN: usize = 5;
const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const MIN_VERSION: u16 = 0x0300;
const MAX_VERSION: u16 = 0x0304;
const EXTENSION_HEADER_LEN: usize = 4;
const EXTENSION_SERVER_NAME: u16 = 0x0000;

/// Test if `payload` starts with a complete TLS record holding a ClientHello
pub fn is_client_hello(payload: &[u8]) -> bool {
    if payload.len() <= RECORD_HEADER_LEN || payload[0] != CONTENT_TYPE_HANDSHAKE {
        return false;
    }
    let version = u16::from_be_bytes([payload[1], payload[2]]);
    if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
        return false;
    }
    let record_len = u16::from_be_bytes([payload[3], payload[4]]) as usize;
    RECORD_HEADER_LEN + record_len <= payload.len() && payload[5] == HANDSHAKE_CLIENT_HELLO
}

/// Extract the host name announced in the server_name extension of a ClientHello
///
/// Any parsing error means no name.
pub fn extract_sni(payload: &[u8]) -> Option<String> {
    if !is_client_hello(payload) {
        return None;
    }
    let (_, record) = match parse_tls_plaintext(payload) {
        Ok(r) => r,
        Err(e) => {
            trace!("ClientHello parsing failed: {:?}", e);
            return None;
        }
    };
    for msg in record.msg.iter() {
        if let TlsMessage::Handshake(TlsMessageHandshake::ClientHello(ch)) = msg {
            let raw = find_extension(ch.ext?, EXTENSION_SERVER_NAME)?;
            return match parse_tls_extension(raw) {
                Ok((_, TlsExtension::SNI(names))) => names
                    .into_iter()
                    .find(|(t, _)| *t == SNIType::HostName)
                    .map(|(_, name)| String::from_utf8_lossy(name).into_owned())
                    .filter(|name| !name.is_empty()),
                Ok(_) => None,
                Err(e) => {
                    trace!("server_name extension parsing failed: {:?}", e);
                    None
                }
            };
        }
    }
    None
}

/// Walk the (type, length) extension headers and return the first extension of
/// type `ext_type`, header included
///
/// Bodies of other extensions are skipped by their declared length, never parsed.
fn find_extension(mut ext: &[u8], ext_type: u16) -> Option<&[u8]> {
    while ext.len() >= EXTENSION_HEADER_LEN {
        let t = u16::from_be_bytes([ext[0], ext[1]]);
        let len = EXTENSION_HEADER_LEN + u16::from_be_bytes([ext[2], ext[3]]) as usize;
        if len > ext.len() {
            trace!("extension 0x{:04x} overflows the extensions block", t);
            return None;
        }
        if t == ext_type {
            return Some(&ext[..len]);
        }
        ext = &ext[len..];
    }
    None
}
