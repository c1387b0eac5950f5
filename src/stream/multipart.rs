//! `multipart/x-mixed-replace` framing for MJPEG
//!
//! Browsers render each part in place of the previous one, so a plain
//! `<img src="/stream">` plays the feed.

use bytes::Bytes;

/// Ends every part.
pub const PART_TAIL: &[u8] = b"\r\n";

/// Response head of a stream, sent once before the first part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHead {
    pub content_type: String,
    pub headers: Vec<(&'static str, &'static str)>,
}

impl StreamHead {
    pub fn new(boundary: &str) -> Self {
        Self {
            content_type: format!("multipart/x-mixed-replace; boundary={boundary}"),
            headers: vec![
                ("access-control-allow-origin", "*"),
                ("cache-control", "no-cache"),
            ],
        }
    }

    /// HTTP/1.1 status line and headers, for writers talking to a raw socket.
    pub fn to_http1(&self) -> Bytes {
        let mut head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\n",
            self.content_type
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        Bytes::from(head)
    }
}

/// Delimiter and part headers for a JPEG of `len` bytes.
pub fn part_head(boundary: &str, len: usize) -> Bytes {
    Bytes::from(format!(
        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_head_layout() {
        assert_eq!(
            &part_head("frame", 1234)[..],
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 1234\r\n\r\n"
        );
    }

    #[test]
    fn http1_head_carries_cors_and_cache_headers() {
        let head = StreamHead::new("jpgboundary").to_http1();
        let text = std::str::from_utf8(&head).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: multipart/x-mixed-replace; boundary=jpgboundary\r\n"));
        assert!(text.contains("access-control-allow-origin: *\r\n"));
        assert!(text.contains("cache-control: no-cache\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
