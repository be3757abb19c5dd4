//! `multipart/form-data` parsing for document uploads.
//!
//! Works on the already-collected body. Only the part named `file` is kept;
//! other fields are ignored.

use bytes::Bytes;

/// Name of the form field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// Why an upload body could not yield a file.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MultipartError {
    /// The request is not `multipart/form-data`.
    #[error("expected multipart/form-data, got {0:?}")]
    NotMultipart(String),

    /// The `boundary` parameter is missing or empty.
    #[error("missing boundary in Content-Type")]
    MissingBoundary,

    /// No part named `file` was found.
    #[error("missing file field in multipart form data")]
    MissingFile,
}

/// The uploaded file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Client-side filename, empty when the part carried none.
    pub filename: String,
    /// Part `Content-Type`, if present.
    pub content_type: Option<String>,
    /// Part body.
    pub data: Bytes,
}

/// Extract the boundary from a `multipart/form-data; boundary=...` content type.
///
/// # Errors
///
/// [`MultipartError::NotMultipart`] or [`MultipartError::MissingBoundary`].
pub fn extract_boundary(content_type: &str) -> Result<String, MultipartError> {
    let mut params = content_type.split(';');
    let essence = params.next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::NotMultipart(content_type.to_owned()));
    }

    params
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_owned())
        .filter(|boundary| !boundary.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Find the `file` part in a multipart body.
///
/// # Errors
///
/// [`MultipartError::MissingFile`] when no part is named `file`.
pub fn parse_file_part(body: &Bytes, boundary: &str) -> Result<FilePart, MultipartError> {
    let delimiter = format!("--{boundary}");

    for (start, end) in part_ranges(body, delimiter.as_bytes()) {
        let part = &body[start..end];
        let Some(split) = find_bytes(part, b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&part[..split]);
        let disposition = ContentDisposition::parse(&headers);
        if disposition.name.as_deref() != Some(FILE_FIELD) {
            continue;
        }

        let data_start = start + split + 4;
        return Ok(FilePart {
            filename: disposition.filename.unwrap_or_default(),
            content_type: header_value(&headers, "content-type").map(str::to_owned),
            data: body.slice(data_start..end),
        });
    }

    Err(MultipartError::MissingFile)
}

/// Byte ranges of each part's content (headers + body), without delimiters.
fn part_ranges(body: &[u8], delimiter: &[u8]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let Some(first) = find_bytes(body, delimiter) else {
        return ranges;
    };
    let mut cursor = first + delimiter.len();

    loop {
        // `--` right after a delimiter closes the body.
        if body[cursor..].starts_with(b"--") {
            break;
        }
        let start = cursor + crlf_len(&body[cursor..]);
        let Some(next) = find_bytes(&body[start..], delimiter) else {
            break;
        };
        let mut end = start + next;
        if body[..end].ends_with(b"\r\n") {
            end -= 2;
        }
        ranges.push((start, end.max(start)));
        cursor = start + next + delimiter.len();
    }

    ranges
}

#[derive(Debug, Default)]
struct ContentDisposition {
    name: Option<String>,
    filename: Option<String>,
}

impl ContentDisposition {
    fn parse(headers: &str) -> Self {
        let Some(value) = header_value(headers, "content-disposition") else {
            return Self::default();
        };
        let mut disposition = Self::default();
        for param in value.split(';').skip(1) {
            let Some((key, raw)) = param.split_once('=') else {
                continue;
            };
            let unquoted = raw.trim().trim_matches('"').to_owned();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => disposition.name = Some(unquoted),
                "filename" => disposition.filename = Some(unquoted),
                _ => {}
            }
        }
        disposition
    }
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

fn crlf_len(data: &[u8]) -> usize {
    if data.starts_with(b"\r\n") { 2 } else { 0 }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_extract_boundary() {
        let ct = "multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxkTrZu0gW";
        assert_eq!(
            extract_boundary(ct).unwrap(),
            "----WebKitFormBoundary7MA4YWxkTrZu0gW"
        );
        assert_eq!(
            extract_boundary(r#"Multipart/Form-Data; charset=utf-8; boundary="abc123""#).unwrap(),
            "abc123"
        );
    }

    #[test]
    fn test_should_reject_non_multipart_and_missing_boundary() {
        assert!(matches!(
            extract_boundary("application/json"),
            Err(MultipartError::NotMultipart(_))
        ));
        assert_eq!(
            extract_boundary("multipart/form-data"),
            Err(MultipartError::MissingBoundary)
        );
        assert_eq!(
            extract_boundary("multipart/form-data; boundary="),
            Err(MultipartError::MissingBoundary)
        );
    }

    #[test]
    fn test_should_find_file_after_other_fields() {
        let body = Bytes::from_static(
            b"------boundary\r\n\
              Content-Disposition: form-data; name=\"note\"\r\n\
              \r\n\
              ignored\r\n\
              ------boundary\r\n\
              Content-Disposition: form-data; filename=\"a b.txt\"; name=\"file\"\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              hello world\r\n\
              ------boundary--\r\n",
        );

        let part = parse_file_part(&body, "----boundary").unwrap();
        assert_eq!(part.filename, "a b.txt");
        assert_eq!(part.content_type.as_deref(), Some("text/plain"));
        assert_eq!(part.data.as_ref(), b"hello world");
    }

    #[test]
    fn test_should_keep_binary_payload_intact() {
        let body = Bytes::from_static(
            b"--xyzzy\r\n\
              Content-Disposition: form-data; name=\"file\"; filename=\"x.bin\"\r\n\
              \r\n\
              \x00\x01\r\n\x02\x03\r\n\
              --xyzzy--\r\n",
        );

        let part = parse_file_part(&body, "xyzzy").unwrap();
        assert_eq!(part.data.as_ref(), b"\x00\x01\r\n\x02\x03");
        assert_eq!(part.content_type, None);
    }

    #[test]
    fn test_should_report_missing_file_field() {
        let body = Bytes::from_static(
            b"--abc\r\n\
              Content-Disposition: form-data; name=\"key\"\r\n\
              \r\n\
              test\r\n\
              --abc--\r\n",
        );

        assert_eq!(parse_file_part(&body, "abc"), Err(MultipartError::MissingFile));
        assert_eq!(
            parse_file_part(&Bytes::from_static(b"no delimiters here"), "abc"),
            Err(MultipartError::MissingFile)
        );
    }
}
