//! HTTP response model and wire serializer for the gateway.

use self::write::{BodyWriter, WriteBuffer};
use crate::{
    http::types::{Header, StatusCode},
    mime,
};
use std::borrow::Cow;

/// An HTTP response as produced by a handler, the static-file fallback or an
/// error path.
///
/// `Content-Type` is always present (default `text/plain`) and `Content-Length`
/// is always derived from the body when the response is serialized, so it can
/// never disagree with the bytes that are sent.
///
/// # Examples
/// ```
/// use tiny_gateway::{Response, StatusCode};
///
/// let resp = Response::new(StatusCode::Ok)
///     .with_content_type("text/html")
///     .with_header("Cache-Control", "no-store")
///     .with_body("<h1>Hello World</h1>");
///
/// assert_eq!(resp.content_length(), 20);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: StatusCode,
    content_type: Cow<'static, str>,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

impl Response {
    /// Creates an empty `text/plain` response with the given status.
    #[inline]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_type: Cow::Borrowed(mime::TEXT_PLAIN),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Shorthand for a `200 OK` response with a body.
    #[inline]
    pub fn ok<T: WriteBuffer>(body: T) -> Self {
        Self::new(StatusCode::Ok).with_body(body)
    }

    /// Replaces the status.
    #[inline]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets the `Content-Type`.
    #[inline]
    pub fn with_content_type<C: Into<Cow<'static, str>>>(mut self, content_type: C) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Appends a header. Duplicate names are kept in order.
    ///
    /// `Content-Type` is routed to [`with_content_type`](Self::with_content_type);
    /// `Content-Length` is ignored since it is always computed from the body.
    #[inline]
    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.push_header(Header::new(name, value));
        self
    }

    /// Replaces the body.
    #[inline]
    pub fn with_body<T: WriteBuffer>(mut self, data: T) -> Self {
        self.body.clear();
        data.write_to(&mut self.body);
        self
    }

    /// Writes the body via closure, replacing any previous body.
    ///
    /// # Examples
    /// ```
    /// use tiny_gateway::{Response, StatusCode};
    /// use std::io::Write;
    ///
    /// let resp = Response::new(StatusCode::Ok).with_body_writer(|w| {
    ///     w.write("temp=");
    ///     w.write(21);
    ///     let _ = write!(w, ", unit={}", 'C');
    /// });
    ///
    /// assert_eq!(resp.body(), b"temp=21, unit=C");
    /// ```
    #[inline]
    pub fn with_body_writer<F: FnOnce(&mut BodyWriter)>(mut self, f: F) -> Self {
        self.body.clear();
        f(&mut BodyWriter(&mut self.body));
        self
    }

    #[inline]
    fn push_header(&mut self, header: Header) {
        if header.is("content-type") {
            self.content_type = Cow::Owned(header.value);
        } else if !header.is("content-length") {
            self.headers.push(header);
        }
    }
}

// Public API
impl Response {
    #[inline(always)]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[inline(always)]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Always the exact byte length of the body.
    #[inline(always)]
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// Headers added with [`with_header`](Self::with_header), in order.
    #[inline(always)]
    pub fn extra_headers(&self) -> &[Header] {
        &self.headers
    }

    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Every header in wire order: `Content-Type`, `Content-Length`, then the extras.
    pub fn headers(&self) -> Vec<Header> {
        let mut all = Vec::with_capacity(self.headers.len() + 2);
        all.push(Header::new("Content-Type", &*self.content_type));
        all.push(Header::new("Content-Length", self.body.len().to_string()));
        all.extend(self.headers.iter().cloned());
        all
    }
}

// Construction from the gateway side
impl Response {
    /// Assembles a response from a status, a raw header list and a body, as
    /// delivered by an environ-style handler.
    pub(crate) fn from_parts(status: StatusCode, headers: Vec<Header>, body: Vec<u8>) -> Self {
        let mut resp = Self::new(status);
        for header in headers {
            resp.push_header(header);
        }
        resp.body = body;
        resp
    }

    /// `404 Not Found` naming the requested path.
    pub(crate) fn not_found(path: &str) -> Self {
        Self::new(StatusCode::NotFound).with_body_writer(|w| {
            w.write(StatusCode::NotFound.as_str());
            w.write(" ");
            w.write(path);
            w.write("\r\n");
        })
    }

    /// Generic `500 Internal Server Error` that reveals nothing about the cause.
    pub(crate) fn internal_error() -> Self {
        Self::new(StatusCode::InternalServerError).with_body_writer(|w| {
            w.write(StatusCode::InternalServerError.as_str());
            w.write("\r\n");
        })
    }
}

// Serialization
impl Response {
    /// Writes the status line and headers, ending with the empty line.
    /// `leading` headers are written before the response's own headers.
    pub(crate) fn write_head(&self, leading: &[Header], buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.status.first_line());

        for header in leading {
            Self::write_header(buffer, &header.name, &header.value);
        }
        Self::write_header(buffer, "Content-Type", &self.content_type);
        Self::write_header(buffer, "Content-Length", self.body.len());
        for header in &self.headers {
            Self::write_header(buffer, &header.name, &header.value);
        }

        buffer.extend_from_slice(b"\r\n");
    }

    /// The exact bytes sent on the wire: head followed by the body.
    pub fn to_bytes(&self, leading: &[Header]) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(128 + self.body.len());
        self.write_head(leading, &mut buffer);
        buffer.extend_from_slice(&self.body);
        buffer
    }

    #[inline(always)]
    fn write_header<N: WriteBuffer, V: WriteBuffer>(buffer: &mut Vec<u8>, name: N, value: V) {
        name.write_to(buffer);
        buffer.extend_from_slice(b": ");
        value.write_to(buffer);
        buffer.extend_from_slice(b"\r\n");
    }

    #[inline]
    const fn number_to_bytes(mut n: u128) -> ([u8; 39], usize) {
        let mut buffer = [b'0'; 39];
        let mut i = 39;

        if n == 0 {
            return (buffer, 38);
        }

        while n > 0 {
            i -= 1;
            buffer[i] = b'0' + (n % 10) as u8;
            n /= 10;
        }

        (buffer, i)
    }
}

pub mod write {
    use super::*;

    /// Writer for constructing a response body.
    /// Used in [with_body_writer](Response::with_body_writer).
    ///
    /// Accepts anything implementing [`WriteBuffer`] and also implements
    /// [`std::io::Write`], so `write!` works too.
    #[derive(Debug)]
    pub struct BodyWriter<'a>(pub(crate) &'a mut Vec<u8>);

    impl BodyWriter<'_> {
        /// Appends content to the response body.
        #[inline]
        pub fn write<T: WriteBuffer>(&mut self, value: T) {
            value.write_to(self.0);
        }
    }

    impl std::io::Write for BodyWriter<'_> {
        #[inline]
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        #[inline]
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Trait for writing a value's wire representation into a byte buffer.
    ///
    /// Implemented for strings, byte slices, integers, `bool` and `char`.
    /// Floating-point numbers are left out on purpose: format them yourself
    /// with the precision you need.
    ///
    /// # Example
    /// ```
    /// use tiny_gateway::WriteBuffer;
    ///
    /// struct Celsius(i16);
    ///
    /// impl WriteBuffer for Celsius {
    ///     fn write_to(&self, buffer: &mut Vec<u8>) {
    ///         self.0.write_to(buffer);
    ///         buffer.extend_from_slice("°C".as_bytes());
    ///     }
    /// }
    /// ```
    pub trait WriteBuffer {
        /// Appends the value's representation to `buffer`.
        fn write_to(&self, buffer: &mut Vec<u8>);
    }

    macro_rules! impl_write_buffer {
        (text => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    let text: &str = self.as_ref();
                    buffer.extend_from_slice(text.as_bytes());
                }
            })*
        };
        (bytes => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    let bytes: &[u8] = self.as_ref();
                    buffer.extend_from_slice(bytes);
                }
            })*
        };
        (unsigned => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    write_unsigned(*self as u128, buffer);
                }
            })*
        };
        (signed => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    if *self < 0 {
                        buffer.push(b'-');
                    }
                    write_unsigned((*self as i128).unsigned_abs(), buffer);
                }
            })*
        };
    }

    impl<T: WriteBuffer + ?Sized> WriteBuffer for &T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }

    impl WriteBuffer for str {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self.as_bytes());
        }
    }

    impl WriteBuffer for [u8] {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self);
        }
    }

    impl<const N: usize> WriteBuffer for [u8; N] {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self);
        }
    }

    impl_write_buffer! { text => String, Box<str>, Cow<'_, str> }
    impl_write_buffer! { bytes => Vec<u8>, Box<[u8]>, Cow<'_, [u8]> }
    impl_write_buffer! { unsigned => u8, u16, u32, u64, u128, usize }
    impl_write_buffer! { signed => i8, i16, i32, i64, i128, isize }

    impl WriteBuffer for bool {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(match self {
                true => b"true",
                false => b"false",
            });
        }
    }

    impl WriteBuffer for char {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            let mut buf = [0u8; 4];
            buffer.extend_from_slice(self.encode_utf8(&mut buf).as_bytes());
        }
    }

    #[inline(always)]
    fn write_unsigned(value: u128, buffer: &mut Vec<u8>) {
        let (arr, start) = Response::number_to_bytes(value);
        buffer.extend_from_slice(&arr[start..]);
    }
}
