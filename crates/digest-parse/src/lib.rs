use bytes::{Bytes, BytesMut};
use digest_core::{auth::is_token_char, Headers, HttpVersion, Method, Request, RequestLine, Response};
use smol_str::SmolStr;

mod header_values;

pub use header_values::{
    parse_authorization_header, parse_www_authenticate_header, MAX_AUTH_HEADER_LEN,
};

/// Largest request head (request line + headers) accepted.
pub const DEFAULT_MAX_HEAD_SIZE: usize = 8 * 1024;
const MAX_HEADER_COUNT: usize = 100;

/// Parses an HTTP/1.x request head from raw bytes.
///
/// Anything after the blank line terminating the head is ignored.
pub fn parse_request_head(data: &Bytes) -> Option<Request> {
    parse_request_head_with_limit(data, DEFAULT_MAX_HEAD_SIZE)
}

/// Parses a request head with an explicit size bound.
pub fn parse_request_head_with_limit(data: &Bytes, max_size: usize) -> Option<Request> {
    let head = split_head(data)?;
    if head.len() > max_size {
        return None;
    }
    let mut lines = head.split("\r\n");
    let first = lines.next()?;
    if first.is_empty() {
        return None;
    }
    let start = parse_request_line(first)?;
    let headers = parse_headers(lines)?;
    Some(Request::new(start, headers))
}

/// Returns the byte offset just past the `\r\n\r\n` terminating a head, if present.
pub fn find_head_end(data: &[u8]) -> Option<usize> {
    let delim = b"\r\n\r\n";
    data.windows(delim.len())
        .position(|window| window == delim)
        .map(|pos| pos + delim.len())
}

/// Serializes a response with a `Content-Length` computed from the body.
pub fn serialize_response(res: &Response) -> Bytes {
    let mut buf = String::new();
    use std::fmt::Write;

    let _ = write!(
        buf,
        "{} {} {}\r\n",
        HttpVersion::Http11.as_str(),
        res.status().code(),
        res.status().reason()
    );

    for header in res.headers().iter() {
        if header.name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        let _ = write!(buf, "{}: {}\r\n", header.name, header.value);
    }

    let _ = write!(buf, "Content-Length: {}\r\n", res.body().len());
    buf.push_str("\r\n");

    let mut out = BytesMut::with_capacity(buf.len() + res.body().len());
    out.extend_from_slice(buf.as_bytes());
    out.extend_from_slice(res.body().as_ref());
    out.freeze()
}

/// Returns the first header value matching `name` (case insensitive).
pub fn header<'a>(headers: &'a Headers, name: &str) -> Option<&'a SmolStr> {
    headers.get(name)
}

fn split_head(data: &Bytes) -> Option<&str> {
    let end = find_head_end(data.as_ref())?;
    std::str::from_utf8(&data[..end - 4]).ok()
}

fn parse_request_line(line: &str) -> Option<RequestLine> {
    use nom::{
        bytes::complete::{tag, take_while1},
        combinator::rest,
        sequence::tuple,
    };

    let mut parser = tuple((
        take_while1::<_, _, nom::error::Error<_>>(is_token_char),
        tag::<_, _, nom::error::Error<_>>(" "),
        take_while1::<_, _, nom::error::Error<_>>(is_target_char),
        tag::<_, _, nom::error::Error<_>>(" "),
        rest::<_, nom::error::Error<_>>,
    ));
    let (_, (method_token, _, target, _, version_token)) = parser(line).ok()?;

    let version = HttpVersion::parse(version_token)?;
    RequestLine::new(Method::from_token(method_token), target)
        .ok()
        .map(|start| start.with_version(version))
}

/// Request headers. Obsolete line folding is refused (RFC 9112 §5.2).
fn parse_headers<'a, I>(lines: I) -> Option<Headers>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            return None;
        }
        let (name, value) = line.split_once(':')?;
        if name.is_empty() || !name.chars().all(is_token_char) {
            return None;
        }
        let value = value.trim_matches(|c| c == ' ' || c == '\t');
        if value.chars().any(|c| c.is_control() && c != '\t') {
            return None;
        }
        if headers.len() >= MAX_HEADER_COUNT {
            return None;
        }
        headers.push(SmolStr::new(name), SmolStr::new(value));
    }
    Some(headers)
}

fn is_target_char(c: char) -> bool {
    c.is_ascii_graphic()
}
