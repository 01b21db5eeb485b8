//! CGI/WSGI-style request environment for the lower-level handler interface.

use crate::{
    errors::HandlerError,
    http::{
        request::Request,
        response::Response,
        types::{Header, Method, StatusCode},
    },
};
use std::{borrow::Cow, io, net::SocketAddr};

/// Per-request environment record, derived from a parsed [`Request`].
///
/// The well-known CGI fields are typed; every request header is kept in
/// [`http_headers`](Self::http_headers) under its `HTTP_<UPPER_SNAKE>` name.
/// For code written against string keys there is [`var`](Self::var).
///
/// The body is exposed as a readable stream in [`input`](Self::input):
///
/// ```
/// use std::io::Read;
/// use tiny_gateway::{Environ, Request};
///
/// let req = Request::parse(b"POST /form HTTP/1.1\r\nContent-Length: 3\r\n\r\na=1").unwrap();
/// let mut env = Environ::new(&req, "0.0.0.0", 80, ([10, 0, 0, 7], 51000).into());
///
/// let mut body = String::new();
/// env.input.read_to_string(&mut body).unwrap();
///
/// assert_eq!(body, "a=1");
/// assert_eq!(env.var("CONTENT_LENGTH").as_deref(), Some("3"));
/// assert_eq!(env.var("REMOTE_ADDR").as_deref(), Some("10.0.0.7"));
/// ```
#[derive(Debug, Clone)]
pub struct Environ<'a> {
    pub request_method: Method,
    /// Text of the target before its first `/`, usually empty.
    pub script_name: &'a str,
    pub path_info: &'a str,
    pub query_string: &'a str,
    pub content_type: Option<&'a str>,
    /// Parsed `Content-Length`; [`var`](Self::var) returns the header text as sent.
    pub content_length: Option<usize>,

    pub server_name: &'a str,
    pub server_port: u16,
    pub server_protocol: &'a str,
    pub remote_addr: SocketAddr,

    /// `(HTTP_<NAME>, value)` for every request header, in request order.
    pub http_headers: Vec<(String, &'a str)>,

    /// The request body (`wsgi.input`).
    pub input: io::Cursor<&'a [u8]>,
}

impl<'a> Environ<'a> {
    pub const GATEWAY_INTERFACE: &'static str = "CGI/1.1";
    pub const URL_SCHEME: &'static str = "http";
    pub const WSGI_VERSION: (u8, u8) = (1, 0);

    /// Builds the environment for `request`, received on `server_name:server_port`
    /// from `remote_addr`.
    pub fn new(
        request: &'a Request,
        server_name: &'a str,
        server_port: u16,
        remote_addr: SocketAddr,
    ) -> Self {
        let target = request.target();
        let script_name = target.split('/').next().unwrap_or_default();

        Self {
            request_method: request.method(),
            script_name,
            path_info: request.path(),
            query_string: request.query(),
            content_type: request.content_type(),
            content_length: request.content_length(),
            server_name,
            server_port,
            server_protocol: request.version(),
            remote_addr,
            http_headers: request
                .headers()
                .iter()
                .map(|h| (cgi_name(&h.name), h.value.as_str()))
                .collect(),
            input: io::Cursor::new(request.body()),
        }
    }

    /// Looks up a value by its CGI/WSGI key.
    ///
    /// Returns `None` for unknown keys, for `HTTP_*` headers the request did
    /// not carry, and for `CONTENT_TYPE`/`CONTENT_LENGTH` when absent.
    /// `wsgi.input` is not a string; use [`input`](Self::input).
    pub fn var(&self, key: &str) -> Option<Cow<'a, str>> {
        let value = match key {
            "REQUEST_METHOD" => Cow::Borrowed(self.request_method.as_str()),
            "SCRIPT_NAME" => Cow::Borrowed(self.script_name),
            "PATH_INFO" => Cow::Borrowed(self.path_info),
            "QUERY_STRING" => Cow::Borrowed(self.query_string),
            "CONTENT_TYPE" => Cow::Borrowed(self.content_type?),
            "CONTENT_LENGTH" => Cow::Borrowed(self.http_header("HTTP_CONTENT_LENGTH")?),
            "SERVER_NAME" => Cow::Borrowed(self.server_name),
            "SERVER_PORT" => Cow::Owned(self.server_port.to_string()),
            "SERVER_PROTOCOL" => Cow::Borrowed(self.server_protocol),
            "REMOTE_ADDR" | "REMOTE_HOST" => Cow::Owned(self.remote_addr.ip().to_string()),
            "GATEWAY_INTERFACE" => Cow::Borrowed(Self::GATEWAY_INTERFACE),
            "wsgi.url_scheme" => Cow::Borrowed(Self::URL_SCHEME),
            "wsgi.version" => {
                let (major, minor) = Self::WSGI_VERSION;
                Cow::Owned(format!("({major}, {minor})"))
            }
            "wsgi.multithread" | "wsgi.multiprocess" | "wsgi.run_once" => Cow::Borrowed("false"),
            _ if key.starts_with("HTTP_") => Cow::Borrowed(self.http_header(key)?),
            _ => return None,
        };

        Some(value)
    }

    fn http_header(&self, key: &str) -> Option<&'a str> {
        self.http_headers
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| *value)
    }
}

/// `user-agent` -> `HTTP_USER_AGENT`
fn cgi_name(header: &str) -> String {
    let mut name = String::with_capacity(5 + header.len());
    name.push_str("HTTP_");
    name.extend(header.chars().map(|c| match c {
        '-' => '_',
        c => c.to_ascii_uppercase(),
    }));
    name
}

/// The `start_response` half of the environ-style handler interface.
///
/// A handler calls [`start`](Self::start) once it knows the status and headers,
/// then returns the body. Returning without starting is a
/// [`HandlerError::MissingStartResponse`].
#[derive(Debug, Default)]
pub struct StartResponse {
    status: Option<StatusCode>,
    headers: Vec<Header>,
}

impl StartResponse {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records the response status and headers. A second call replaces the first.
    pub fn start<I, H>(&mut self, status: StatusCode, headers: I)
    where
        I: IntoIterator<Item = H>,
        H: Into<Header>,
    {
        self.status = Some(status);
        self.headers = headers.into_iter().map(Into::into).collect();
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.status.is_some()
    }

    /// Combines the recorded status and headers with `body`.
    pub(crate) fn finish(self, body: Vec<u8>) -> Result<Response, HandlerError> {
        let status = self.status.ok_or(HandlerError::MissingStartResponse)?;
        Ok(Response::from_parts(status, self.headers, body))
    }
}
