//! HTTP request-head parsing.
//!
//! Just enough HTTP/1.1 to find the Host header: the proxy never
//! interprets the request beyond routing it.

/// End-of-head marker offset in `buf`, if the full head has arrived.
pub(crate) fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// Extracts the Host header value from a request head.
///
/// Header names are case-insensitive; any port suffix is stripped.
pub(crate) fn parse_host(head: &str) -> Option<&str> {
    for line in head.lines().skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("host") {
            let value = value.trim();
            let host = value.split(':').next().unwrap_or(value);
            if host.is_empty() {
                return None;
            }
            return Some(host);
        }
    }
    None
}

/// The leftmost dot-separated label of a hostname.
///
/// A host with no dot carries no service key and is malformed for
/// routing purposes.
pub(crate) fn service_key(host: &str) -> Option<&str> {
    let (key, rest) = host.split_once('.')?;
    if key.is_empty() || rest.is_empty() {
        return None;
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &str = "GET /index.html HTTP/1.1\r\nHost: abc123.vm.example.com:8080\r\nUser-Agent: curl\r\n\r\n";

    #[test]
    fn test_head_end_found() {
        assert_eq!(head_end(HEAD.as_bytes()), Some(HEAD.len()));
    }

    #[test]
    fn test_head_end_incomplete() {
        assert_eq!(head_end(b"GET / HTTP/1.1\r\nHost: a.b\r\n"), None);
    }

    #[test]
    fn test_parse_host_strips_port() {
        assert_eq!(parse_host(HEAD), Some("abc123.vm.example.com"));
    }

    #[test]
    fn test_parse_host_case_insensitive() {
        let head = "GET / HTTP/1.1\r\nhOsT: svc.example.com\r\n\r\n";
        assert_eq!(parse_host(head), Some("svc.example.com"));
    }

    #[test]
    fn test_parse_host_missing() {
        let head = "GET / HTTP/1.1\r\nUser-Agent: curl\r\n\r\n";
        assert_eq!(parse_host(head), None);
    }

    #[test]
    fn test_service_key_is_leftmost_label() {
        assert_eq!(service_key("abc123.vm.example.com"), Some("abc123"));
    }

    #[test]
    fn test_service_key_requires_dot() {
        assert_eq!(service_key("localhost"), None);
        assert_eq!(service_key(".example.com"), None);
        assert_eq!(service_key("trailing."), None);
    }
}
