use crate::{
    errors::ParseError,
    http::types::{slice_to_usize, Header},
    Method,
};
use memchr::memchr2;

/// A parsed HTTP request.
///
/// Built once per accepted connection from the bytes of a single read and
/// never modified afterwards. Owns its data, so it outlives the read buffer
/// it was parsed from.
///
/// # Input data requirements
///
/// The whole request must arrive in one read of the gateway buffer; requests
/// spanning several reads are not reassembled.
///
/// #### First line
///
/// Exactly three whitespace-separated tokens:
/// ```text
/// [METHOD] [TARGET] [VERSION]
/// GET /api/users?sort=name HTTP/1.1
/// ```
/// `[METHOD]` must be one of [`Method`]. `[VERSION]` is kept verbatim and is
/// not validated. `[TARGET]` is split on the first `?` into path and query;
/// the path is **not** normalized (no `.`/`..` resolution, no percent decoding).
///
/// #### Line endings
///
/// `CRLF`, bare `LF` and bare `CR` are all accepted as line terminators in
/// the head. The body is kept byte-for-byte.
///
/// #### Headers
///
/// ```text
/// [NAME]: [VALUE]
/// ```
/// - Names are lower-cased, names and values are trimmed.
/// - Lines without `:` are skipped.
/// - A repeated name has its values joined with `,`.
/// - The first empty line ends the head.
///
/// #### Body
///
/// Everything after the empty line. Truncated to `Content-Length` when that
/// header holds a non-negative integer; otherwise the whole remainder is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    target: String,
    path: String,
    query: String,
    version: String,

    headers: Vec<Header>,
    content_length: Option<usize>,

    body: Vec<u8>,
}

// Public API
impl Request {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Raw request target as received, e.g. `/api/users?sort=name`.
    #[inline(always)]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Target without the query string, e.g. `/api/users`.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string without the leading `?`. Empty when absent.
    #[inline(always)]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Protocol token from the request line, e.g. `HTTP/1.1`.
    #[inline(always)]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Headers in order of first appearance, names lower-cased.
    #[inline(always)]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Returns the header value with case-insensitive name matching.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }

    /// Parsed `Content-Length`, if the header was present and numeric.
    #[inline(always)]
    pub const fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, if it is valid UTF-8.
    #[inline]
    pub fn body_str(&self) -> Option<&str> {
        simdutf8::basic::from_utf8(&self.body).ok()
    }

    /// Splits the raw query into `key=value` pairs. No percent decoding is done;
    /// a pair without `=` yields an empty value.
    ///
    /// # Examples
    ///
    /// For target `/search?q=rust&page=2&debug`:
    /// ```text
    /// [("q", "rust"), ("page", "2"), ("debug", "")]
    /// ```
    pub fn query_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
    }
}

// Parsing
impl Request {
    /// Parses one complete request from `buf`.
    ///
    /// # Errors
    ///
    /// - [`ParseError::Empty`] for an empty buffer
    /// - [`ParseError::InvalidEncoding`] if the head is not UTF-8
    /// - [`ParseError::MalformedRequestLine`] if the first line does not hold 3 tokens
    /// - [`ParseError::UnknownMethod`] for methods outside [`Method`]
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.is_empty() {
            return Err(ParseError::Empty);
        }

        let (lines, body) = split_head(buf)?;
        let mut lines = lines.into_iter();

        let first_line = lines.next().unwrap_or_default();
        let tokens: Vec<&str> = first_line.split_ascii_whitespace().collect();
        let &[method, target, version] = &tokens[..] else {
            return Err(ParseError::MalformedRequestLine {
                tokens: tokens.len(),
            });
        };

        let method = Method::from_token(method)?;
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        let headers = parse_headers(lines);
        let content_length = headers
            .iter()
            .find(|h| h.name == "content-length")
            .and_then(|h| slice_to_usize(h.value.as_bytes()));

        let body = match content_length {
            Some(len) => &body[..len.min(body.len())],
            None => body,
        };

        Ok(Request {
            method,
            target: target.to_owned(),
            path: path.to_owned(),
            query: query.to_owned(),
            version: version.to_owned(),

            headers,
            content_length,

            body: body.to_vec(),
        })
    }
}

/// Splits `buf` into head lines (terminators stripped) and the body that
/// follows the first empty line. Without an empty line the body is empty.
fn split_head(buf: &[u8]) -> Result<(Vec<&str>, &[u8]), ParseError> {
    let mut lines = Vec::with_capacity(16);
    let mut start = 0;

    while let Some((end, next)) = line_end(buf, start) {
        if end == start {
            return Ok((lines, &buf[next..]));
        }

        lines.push(as_str(&buf[start..end])?);
        start = next;
    }

    if start < buf.len() {
        lines.push(as_str(&buf[start..])?);
    }

    Ok((lines, &buf[buf.len()..]))
}

#[inline]
fn line_end(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let pos = from + memchr2(b'\r', b'\n', &buf[from..])?;

    let next = match (buf[pos], buf.get(pos + 1)) {
        (b'\r', Some(b'\n')) => pos + 2,
        _ => pos + 1,
    };

    Some((pos, next))
}

#[inline]
fn as_str(line: &[u8]) -> Result<&str, ParseError> {
    simdutf8::basic::from_utf8(line).map_err(|_| ParseError::InvalidEncoding)
}

fn parse_headers<'a, I: Iterator<Item = &'a str>>(lines: I) -> Vec<Header> {
    let mut headers: Vec<Header> = Vec::new();

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };

        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();

        match headers.iter_mut().find(|h| h.is(name)) {
            Some(existing) => {
                existing.value.push(',');
                existing.value.push_str(value);
            }
            None => headers.push(Header::new(name.to_ascii_lowercase(), value)),
        }
    }

    headers
}
