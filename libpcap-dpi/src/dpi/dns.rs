const DNS_HEADER_LEN: usize = 12;
const FLAG_QR: u8 = 0x80;
/// Longer length bytes are compression pointers, which end the name
const MAX_LABEL_LEN: usize = 63;

/// Decode the first question name of a DNS query message
///
/// Responses, messages without questions, and names with no label give `None`.
pub fn extract_query(payload: &[u8]) -> Option<String> {
    if payload.len() < DNS_HEADER_LEN || payload[2] & FLAG_QR != 0 {
        return None;
    }
    let qdcount = u16::from_be_bytes([payload[4], payload[5]]);
    if qdcount == 0 {
        return None;
    }
    let mut labels = Vec::new();
    let mut pos = DNS_HEADER_LEN;
    while let Some(&len) = payload.get(pos) {
        let len = len as usize;
        if len == 0 || len > MAX_LABEL_LEN {
            break;
        }
        let label = match payload.get(pos + 1..pos + 1 + len) {
            Some(label) => label,
            None => break,
        };
        labels.push(String::from_utf8_lossy(label));
        pos += 1 + len;
    }
    if labels.is_empty() {
        return None;
    }
    Some(labels.join("."))
}
