/// Method prefixes identifying an HTTP request (first 4 bytes)
const METHOD_PREFIXES: [&[u8; 4]; 7] = [
    b"GET ", b"POST", b"PUT ", b"HEAD", b"DELE", b"PATC", b"OPTI",
];

/// Only the start of the payload is searched for the Host header
const SCAN_LIMIT: usize = 2048;
const MIN_REQUEST_LEN: usize = 10;

pub fn is_http_request(payload: &[u8]) -> bool {
    payload.len() >= 4 && METHOD_PREFIXES.iter().any(|m| payload[..4] == m[..])
}

/// Extract the value of the `Host` header from an HTTP request, without port
pub fn extract_host(payload: &[u8]) -> Option<String> {
    if payload.len() <= MIN_REQUEST_LEN || !is_http_request(payload) {
        return None;
    }
    let text = String::from_utf8_lossy(&payload[..payload.len().min(SCAN_LIMIT)]);
    // the request line is never a header
    for line in text.split('\n').skip(1) {
        let line = line.trim_end_matches('\r');
        match line.get(..5) {
            Some(name) if name.eq_ignore_ascii_case("host:") => {
                let host = strip_port(line[5..].trim());
                return if host.is_empty() {
                    None
                } else {
                    Some(host.to_owned())
                };
            }
            _ => (),
        }
        if line.is_empty() {
            // end of headers
            break;
        }
    }
    None
}

fn strip_port(value: &str) -> &str {
    match value.rfind(':') {
        Some(pos)
            if pos + 1 < value.len() && value[pos + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &value[..pos]
        }
        _ => value,
    }
}
