//! Request body parsing
//!
//! Turns a fully drained body into form fields and uploaded files.
//! Malformed input degrades to whatever could be recovered, never an error.

use hyper::body::Bytes;
use std::collections::BTreeMap;

/// A file part of a `multipart/form-data` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field the file was sent under
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Parsed request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostData {
    pub fields: BTreeMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl PostData {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }
}

/// Parse a query string into key/value pairs; repeated keys keep the last value
pub fn parse_query(query: Option<&str>) -> BTreeMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// Parse a request body according to its `Content-Type`
///
/// `multipart/form-data` is split into fields and files; every other body
/// is read as `application/x-www-form-urlencoded`.
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> PostData {
    if body.is_empty() {
        return PostData::default();
    }

    if let Some(boundary) = content_type.and_then(multipart_boundary) {
        return parse_multipart(body, &boundary);
    }

    PostData {
        fields: url::form_urlencoded::parse(body).into_owned().collect(),
        files: Vec::new(),
    }
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    let mut parts = content_type.split(';');
    let mime = parts.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    parts
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

fn parse_multipart(body: &[u8], boundary: &str) -> PostData {
    let delimiter = format!("--{boundary}");
    let mut post = PostData::default();

    for part in split_on(body, delimiter.as_bytes()).into_iter().skip(1) {
        // closing delimiter
        if part.starts_with(b"--") {
            break;
        }
        let part = part.strip_prefix(b"\r\n").unwrap_or(part);
        let part = part.strip_suffix(b"\r\n").unwrap_or(part);

        let Some(split) = find(part, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&part[..split]);
        let data = &part[split + 4..];

        let mut name = None;
        let mut filename = None;
        let mut content_type = None;
        for line in head.lines() {
            let Some((header, value)) = line.split_once(':') else {
                continue;
            };
            if header.trim().eq_ignore_ascii_case("content-disposition") {
                name = disposition_param(value, "name");
                filename = disposition_param(value, "filename");
            } else if header.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_string());
            }
        }

        let Some(name) = name else {
            continue;
        };
        match filename {
            Some(filename) => post.files.push(UploadedFile {
                field: name,
                filename,
                content_type,
                data: Bytes::copy_from_slice(data),
            }),
            None => {
                post.fields
                    .insert(name, String::from_utf8_lossy(data).into_owned());
            }
        }
    }

    post
}

fn disposition_param(value: &str, key: &str) -> Option<String> {
    value
        .split(';')
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split_on<'a>(mut haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    while let Some(at) = find(haystack, needle) {
        pieces.push(&haystack[..at]);
        haystack = &haystack[at + needle.len()..];
    }
    pieces.push(haystack);
    pieces
}
