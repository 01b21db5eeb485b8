//! tiny_gateway - Minimal HTTP/1.1 gateway for resource-constrained devices
//!
//! A single-threaded, blocking HTTP server: it accepts one connection, reads
//! one bounded buffer, parses the request, routes it to a handler or a static
//! file, sends the response and closes the connection before accepting the next.
//!
//! # Features
//!
//! - **Routing** - path patterns with `<name>` captures, first registration wins
//! - **Two handler styles** - [`Request`] in, [`Response`] out, or a CGI/WSGI-style
//!   [`Environ`] with [`StartResponse`]
//! - **Static files** - `GET` requests without a route are served from a root
//!   directory, with the content type taken from the extension
//! - **Poll or serve forever** - drive the gateway from your own main loop with
//!   [`Gateway::poll`], or hand over control with [`Gateway::serve_forever`]
//! - **Pluggable sockets** - any [`Transport`] works, [`TcpTransport`] is the default
//!
//! # Protocol Support
//!
//! HTTP/1.1 request and status lines. Every response is sent with
//! `Connection: close`; keep-alive, chunked encoding and TLS are not supported.
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use tiny_gateway::{Gateway, HandlerError, Request, Response, Router};
//!
//! fn hello(_: &Request, _: &[&str]) -> Result<Response, HandlerError> {
//!     Ok(Response::ok("Hello World!"))
//! }
//!
//! fn main() -> Result<(), tiny_gateway::Error> {
//!     let mut router = Router::new();
//!     router.route("/", hello)?;
//!
//!     Gateway::builder().router(router).build()?.serve_forever()
//! }
//! ```
//! Polling from an existing main loop:
//! ```no_run
//! use tiny_gateway::{Gateway, GatewayConfig, Method, Request, Response, Router, StatusCode};
//!
//! fn main() -> Result<(), tiny_gateway::Error> {
//!     let mut router = Router::new();
//!     router.register(&[Method::Put], "/led/<color>", |_: &Request, c: &[&str]| {
//!         Ok::<_, tiny_gateway::HandlerError>(
//!             Response::new(StatusCode::Accepted).with_body(format!("led set to {}", c[0])),
//!         )
//!     })?;
//!
//!     let mut gateway = Gateway::builder()
//!         .config(GatewayConfig {
//!             port: 8080,
//!             root: "/www".into(),
//!             nonblocking: true,
//!             ..GatewayConfig::default()
//!         })
//!         .router(router)
//!         .build()?;
//!
//!     gateway.start()?;
//!     loop {
//!         // read sensors, blink LEDs...
//!         if let Err(err) = gateway.poll() {
//!             eprintln!("request failed: {err}");
//!         }
//!     }
//! }
//! ```
//!
//! # Logging
//!
//! Events are emitted with [`tracing`]; install any subscriber to see them.

pub(crate) mod http {
    pub(crate) mod environ;
    pub(crate) mod files;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod gateway;
    pub(crate) mod router;
    pub(crate) mod transport;
}
pub(crate) mod config;
pub(crate) mod errors;
pub mod mime;

pub use crate::{
    config::GatewayConfig,
    errors::{Error, HandlerError, ParseError},
    http::{
        environ::{Environ, StartResponse},
        files::{FileSource, FsRoot},
        request::Request,
        response::{
            write::{BodyWriter, WriteBuffer},
            Response,
        },
        types::{Header, Method, StatusCode},
    },
    server::{
        gateway::{Gateway, GatewayBuilder, Poll, ShutdownHandle},
        router::{EnvironHandler, Handler, Resolved, Route, Router},
        transport::{Connection, Listener, TcpTransport, Transport},
    },
};

#[cfg(test)]
pub mod tools {
    use std::str::from_utf8;

    #[inline]
    pub fn str_op(value: &[u8]) -> &str {
        from_utf8(value).unwrap()
    }

    /// A response as a client sees it.
    #[derive(Debug)]
    pub struct ParsedResponse {
        /// Status line without the version, e.g. `200 OK`.
        pub status: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl ParsedResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    pub fn parse_response(raw: &[u8]) -> ParsedResponse {
        let end = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response head is not terminated");

        let mut lines = str_op(&raw[..end]).split("\r\n");
        let status = lines
            .next()
            .and_then(|line| line.strip_prefix("HTTP/1.1 "))
            .expect("bad status line")
            .to_owned();

        let headers = lines
            .map(|line| {
                let (name, value) = line.split_once(": ").expect("bad header line");
                (name.to_owned(), value.to_owned())
            })
            .collect();

        ParsedResponse {
            status,
            headers,
            body: raw[end + 4..].to_vec(),
        }
    }
}
