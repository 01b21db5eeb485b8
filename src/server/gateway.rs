use crate::{
    config::GatewayConfig,
    errors::Error,
    http::{
        environ::{Environ, StartResponse},
        files::{serve_static, FileSource, FsRoot},
        request::Request,
        response::Response,
        types::{Header, Method},
    },
    server::{
        router::{Endpoint, Resolved, Router},
        transport::{Connection, Listener, TcpTransport, Transport},
    },
};
use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::{debug, info, warn};

/// Pause between idle polls in [`Gateway::serve_forever`] with a non-blocking listener.
const IDLE_PAUSE: Duration = Duration::from_millis(1);

/// Outcome of a single [`Gateway::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// A connection was accepted, answered and closed.
    Served,
    /// Non-blocking mode only: no client was waiting.
    Idle,
}

/// Stops [`Gateway::serve_forever`] from another thread.
///
/// The flag is checked between connections, so a gateway blocked in
/// `accept` stops after the next client has been served.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    #[inline]
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    fn reset(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Single-threaded HTTP gateway.
///
/// Serves one connection at a time: accept, read one buffer, parse, route to
/// a handler or a static file, send the response, close.
///
/// Every response carries `Server` and `Connection: close` ahead of its own
/// headers; connections are never kept alive.
///
/// # Errors and debug mode
///
/// An unparseable request or a failing handler is answered with
/// `500 Internal Server Error`. With [`GatewayConfig::debug`] set, the
/// connection is closed without a response and the error is returned from
/// [`poll`](Self::poll) instead.
///
/// # Examples
///
/// ```no_run
/// use tiny_gateway::{Gateway, GatewayConfig, HandlerError, Request, Response, Router};
///
/// fn hello(_: &Request, _: &[&str]) -> Result<Response, HandlerError> {
///     Ok(Response::ok("Hello World"))
/// }
///
/// let mut router = Router::new();
/// router.route("/", hello)?;
///
/// let mut gateway = Gateway::builder()
///     .config(GatewayConfig {
///         port: 8080,
///         ..GatewayConfig::default()
///     })
///     .router(router)
///     .build()?;
///
/// gateway.serve_forever()?;
/// # Ok::<(), tiny_gateway::Error>(())
/// ```
pub struct Gateway<T: Transport = TcpTransport> {
    config: GatewayConfig,
    router: Router,
    files: Box<dyn FileSource>,

    transport: T,
    listener: Option<T::Listener>,

    buffer: Box<[u8]>,
    leading: [Header; 2],
    shutdown: ShutdownHandle,
}

impl Gateway<TcpTransport> {
    /// Creates a new builder. The transport defaults to [`TcpTransport`].
    #[inline]
    pub fn builder() -> GatewayBuilder<TcpTransport> {
        GatewayBuilder {
            config: None,
            router: None,
            files: None,
            transport: TcpTransport,
        }
    }
}

// Lifecycle
impl<T: Transport> Gateway<T> {
    /// Binds and listens on the configured host and port.
    ///
    /// Calling it again while listening does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::Bind`] when the address cannot be bound.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.listener.is_some() {
            debug!("gateway already listening");
            return Ok(());
        }

        let listener = self
            .transport
            .listen(
                &self.config.host,
                self.config.port,
                self.config.backlog,
                self.config.nonblocking,
            )
            .map_err(|source| Error::Bind {
                addr: self.config.addr(),
                source,
            })?;

        match listener.local_addr() {
            Ok(addr) => info!(%addr, routes = self.router.len(), "gateway listening"),
            Err(_) => info!(addr = %self.config.addr(), routes = self.router.len(), "gateway listening"),
        }

        self.listener = Some(listener);
        Ok(())
    }

    /// Closes the listening socket.
    pub fn stop(&mut self) {
        if self.listener.take().is_some() {
            info!("gateway stopped");
        }
    }

    /// Accepts and serves at most one connection.
    ///
    /// Blocks until a client connects unless the gateway is non-blocking, in
    /// which case [`Poll::Idle`] is returned when nobody is waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::NotStarted`] before [`start`](Self::start)
    /// - [`Error::Accept`] when accepting fails
    /// - [`Error::Io`] when reading from or sending to the client fails
    /// - [`Error::Parse`] and [`Error::Handler`] in debug mode only
    pub fn poll(&mut self) -> Result<Poll, Error> {
        let listener = self.listener.as_mut().ok_or(Error::NotStarted)?;

        let (mut conn, remote) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(Poll::Idle),
            Err(err) => return Err(Error::Accept(err)),
        };

        debug!(%remote, "accepted connection");
        self.serve_connection(&mut conn, remote)?;

        Ok(Poll::Served)
    }

    /// Starts if needed, then serves connections until the
    /// [`ShutdownHandle`] fires.
    ///
    /// Accept and connection I/O errors are logged and skipped.
    ///
    /// # Errors
    ///
    /// [`Error::Bind`] from [`start`](Self::start), and in debug mode the
    /// first [`Error::Parse`] or [`Error::Handler`].
    pub fn serve_forever(&mut self) -> Result<(), Error> {
        self.start()?;

        loop {
            if self.shutdown.reset() {
                self.stop();
                return Ok(());
            }

            match self.poll() {
                Ok(Poll::Served) => {}
                Ok(Poll::Idle) => thread::sleep(IDLE_PAUSE),
                Err(err @ (Error::Accept(_) | Error::Io(_))) => {
                    warn!(error = %err, "connection failed, waiting for the next one");
                    thread::sleep(IDLE_PAUSE);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs one full request/response cycle on an already accepted
    /// connection and closes it, whatever the outcome.
    pub fn serve_connection<C: Connection>(
        &mut self,
        conn: &mut C,
        remote: SocketAddr,
    ) -> Result<(), Error> {
        let result = self.exchange(conn, remote);

        debug!(%remote, "closing connection");
        if let Err(err) = conn.close() {
            debug!(error = %err, "closing connection failed");
        }

        result
    }
}

// Public API
impl<T: Transport> Gateway<T> {
    #[inline]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[inline]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Route table access, e.g. to register routes after building.
    #[inline]
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    #[inline]
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// The bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    #[inline]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }
}

// Request cycle
impl<T: Transport> Gateway<T> {
    fn exchange<C: Connection>(&mut self, conn: &mut C, remote: SocketAddr) -> Result<(), Error> {
        let len = conn.recv_into(&mut self.buffer)?;
        debug!(bytes = len, "bytes received");

        if len == 0 {
            debug!(%remote, "client sent nothing");
            return Ok(());
        }

        let response = match self.respond(&self.buffer[..len], remote) {
            Ok(response) => response,
            Err(err) if err.is_request_local() && !self.config.debug => {
                warn!(error = %err, "answering with 500");
                Response::internal_error()
            }
            Err(err) => return Err(err),
        };

        self.send_response(conn, &response)
    }

    fn respond(&self, raw: &[u8], remote: SocketAddr) -> Result<Response, Error> {
        let request = Request::parse(raw)?;
        debug!(method = %request.method(), target = request.target(), "request parsed");

        let path = request.path();
        match self.router.resolve(path, request.method()) {
            Some(resolved) => self.dispatch(&resolved, &request, remote),
            None if request.method() == Method::Get && !path.trim_start_matches('/').is_empty() => {
                debug!(path, "no route, trying static file");
                Ok(serve_static(&*self.files, path))
            }
            None => {
                debug!(method = %request.method(), path, "no route or file found");
                Ok(Response::not_found(path))
            }
        }
    }

    fn dispatch(
        &self,
        resolved: &Resolved,
        request: &Request,
        remote: SocketAddr,
    ) -> Result<Response, Error> {
        let captures = &resolved.captures;

        let result = match resolved.route.endpoint() {
            Endpoint::Request(handler) => handler.handle(request, captures),
            Endpoint::Environ(handler) => {
                let port = self.local_addr().map_or(self.config.port, |addr| addr.port());
                let mut environ = Environ::new(request, &self.config.host, port, remote);
                let mut start = StartResponse::new();

                handler
                    .call(&mut environ, captures, &mut start)
                    .and_then(|body| start.finish(body))
            }
        };

        result.map_err(|source| Error::Handler {
            path: request.path().to_owned(),
            source,
        })
    }

    fn send_response<C: Connection>(&self, conn: &mut C, response: &Response) -> Result<(), Error> {
        let mut head = Vec::with_capacity(256);
        response.write_head(&self.leading, &mut head);

        debug!(status = %response.status(), bytes = head.len(), "sending head");
        if !self.send_all(conn, &head)? {
            return Ok(());
        }

        let body = response.body();
        if !body.is_empty() {
            debug!(bytes = body.len(), "sending body");
            self.send_all(conn, body)?;
        }

        Ok(())
    }

    /// Sends all of `buf`, retrying on would-block and interrupts.
    ///
    /// Returns `false` when the send was abandoned: the peer went away or the
    /// configured retry limit ran out. Only would-block counts toward the limit.
    fn send_all<C: Connection>(&self, conn: &mut C, buf: &[u8]) -> Result<bool, Error> {
        let mut sent = 0;
        let mut stalled = 0usize;

        while sent < buf.len() {
            match conn.send(&buf[sent..]) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection accepted no bytes",
                    )));
                }
                Ok(n) => {
                    sent += n;
                    stalled = 0;
                    continue;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::BrokenPipe
                    ) =>
                {
                    warn!(sent, total = buf.len(), "connection reset by peer, response dropped");
                    return Ok(false);
                }
                Err(err) => return Err(Error::Io(err)),
            }

            stalled += 1;
            if self.config.send_retry_limit.is_some_and(|limit| stalled > limit) {
                warn!(sent, total = buf.len(), retries = stalled - 1, "send stalled, response dropped");
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Builder for [`Gateway`].
///
/// Nothing is required: the config defaults to [`GatewayConfig::default`],
/// the router to an empty one and static files to an [`FsRoot`] at
/// [`GatewayConfig::root`].
pub struct GatewayBuilder<T: Transport> {
    config: Option<GatewayConfig>,
    router: Option<Router>,
    files: Option<Box<dyn FileSource>>,
    transport: T,
}

impl<T: Transport> GatewayBuilder<T> {
    #[inline]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[inline]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Replaces the filesystem as the source of static files.
    #[inline]
    pub fn files<F: FileSource + 'static>(mut self, files: F) -> Self {
        self.files = Some(Box::new(files));
        self
    }

    /// Replaces the socket layer.
    #[inline]
    pub fn transport<U: Transport>(self, transport: U) -> GatewayBuilder<U> {
        GatewayBuilder {
            config: self.config,
            router: self.router,
            files: self.files,
            transport,
        }
    }

    /// Validates the config and assembles the gateway. Does not bind yet.
    pub fn build(self) -> Result<Gateway<T>, Error> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let files = self
            .files
            .unwrap_or_else(|| Box::new(FsRoot::new(config.root.clone())));

        Ok(Gateway {
            router: self.router.unwrap_or_default(),
            files,

            transport: self.transport,
            listener: None,

            buffer: vec![0; config.buffer_size].into_boxed_slice(),
            leading: [
                Header::new("Server", config.server_name.as_str()),
                Header::new("Connection", "close"),
            ],
            shutdown: ShutdownHandle::default(),

            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tools::*, HandlerError, StatusCode};
    use std::{
        cell::RefCell,
        collections::VecDeque,
        sync::{Mutex, OnceLock},
    };

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Accept(usize),
        Zero,
        WouldBlock,
        Interrupted,
        Reset,
    }

    /// Scripted client connection. Sends follow `steps`, then accept everything.
    #[derive(Debug, Default)]
    struct MockConn {
        request: Vec<u8>,
        recv_error: Option<io::ErrorKind>,
        steps: VecDeque<Step>,
        sent: Vec<u8>,
        send_calls: usize,
        closed: bool,
    }

    impl MockConn {
        fn new(request: &[u8]) -> Self {
            Self {
                request: request.to_vec(),
                ..Self::default()
            }
        }

        fn steps<I: IntoIterator<Item = Step>>(mut self, steps: I) -> Self {
            self.steps = steps.into_iter().collect();
            self
        }

        fn failing_recv(mut self, kind: io::ErrorKind) -> Self {
            self.recv_error = Some(kind);
            self
        }
    }

    impl Connection for MockConn {
        fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(kind) = self.recv_error {
                return Err(kind.into());
            }
            let n = self.request.len().min(buf.len());
            buf[..n].copy_from_slice(&self.request[..n]);
            Ok(n)
        }

        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.send_calls += 1;
            match self.steps.pop_front() {
                Some(Step::Accept(n)) => {
                    let n = n.min(buf.len());
                    self.sent.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
                Some(Step::Zero) => Ok(0),
                Some(Step::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
                Some(Step::Interrupted) => Err(io::ErrorKind::Interrupted.into()),
                Some(Step::Reset) => Err(io::ErrorKind::ConnectionReset.into()),
                None => {
                    self.sent.extend_from_slice(buf);
                    Ok(buf.len())
                }
            }
        }

        fn close(&mut self) -> io::Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn remote() -> SocketAddr {
        ([10, 0, 0, 2], 50123).into()
    }

    enum Incoming {
        Fail(io::ErrorKind),
        Client(MockConn),
    }

    /// Hands out scripted clients, then fires the shutdown handle once the
    /// script runs dry. Closed connections are collected in `served`.
    #[derive(Default)]
    struct ScriptedTransport {
        incoming: RefCell<VecDeque<Incoming>>,
        shutdown: Arc<OnceLock<ShutdownHandle>>,
        served: Arc<Mutex<Vec<MockConn>>>,
    }

    struct ScriptedListener {
        incoming: VecDeque<Incoming>,
        shutdown: Arc<OnceLock<ShutdownHandle>>,
        served: Arc<Mutex<Vec<MockConn>>>,
    }

    struct RecordedConn {
        conn: MockConn,
        served: Arc<Mutex<Vec<MockConn>>>,
    }

    impl Transport for ScriptedTransport {
        type Listener = ScriptedListener;

        fn listen(&self, _: &str, _: u16, _: i32, _: bool) -> io::Result<ScriptedListener> {
            Ok(ScriptedListener {
                incoming: self.incoming.take(),
                shutdown: self.shutdown.clone(),
                served: self.served.clone(),
            })
        }
    }

    impl Listener for ScriptedListener {
        type Conn = RecordedConn;

        fn accept(&mut self) -> io::Result<(RecordedConn, SocketAddr)> {
            match self.incoming.pop_front() {
                Some(Incoming::Fail(kind)) => Err(kind.into()),
                Some(Incoming::Client(conn)) => Ok((
                    RecordedConn {
                        conn,
                        served: self.served.clone(),
                    },
                    remote(),
                )),
                None => {
                    if let Some(handle) = self.shutdown.get() {
                        handle.shutdown();
                    }
                    Err(io::ErrorKind::WouldBlock.into())
                }
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(([127, 0, 0, 1], 8080).into())
        }
    }

    impl Connection for RecordedConn {
        fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.conn.recv_into(buf)
        }

        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.conn.send(buf)
        }

        fn close(&mut self) -> io::Result<()> {
            self.conn.close()?;
            self.served.lock().unwrap().push(std::mem::take(&mut self.conn));
            Ok(())
        }
    }

    fn scripted<I: IntoIterator<Item = Incoming>>(
        incoming: I,
    ) -> (Gateway<ScriptedTransport>, Arc<Mutex<Vec<MockConn>>>) {
        let transport = ScriptedTransport {
            incoming: RefCell::new(incoming.into_iter().collect()),
            ..ScriptedTransport::default()
        };
        let shutdown = transport.shutdown.clone();
        let served = transport.served.clone();

        let gateway = Gateway::builder()
            .router(router())
            .transport(transport)
            .build()
            .unwrap();
        shutdown.set(gateway.shutdown_handle()).unwrap();

        (gateway, served)
    }

    fn gateway(config: GatewayConfig, router: Router) -> Gateway {
        Gateway::builder()
            .config(config)
            .router(router)
            .build()
            .unwrap()
    }

    fn hello(_: &Request, _: &[&str]) -> Result<Response, HandlerError> {
        Ok(Response::ok("Hello World"))
    }

    fn item(_: &Request, captures: &[&str]) -> Result<Response, HandlerError> {
        Ok(Response::ok(format!("item {}", captures[0])))
    }

    fn broken(_: &Request, _: &[&str]) -> Result<Response, HandlerError> {
        Err(HandlerError::value("sensor offline"))
    }

    fn big(_: &Request, _: &[&str]) -> Result<Response, HandlerError> {
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        Ok(Response::ok(body).with_content_type("application/octet-stream"))
    }

    fn router() -> Router {
        let mut router = Router::new();
        router
            .route("/", hello)
            .unwrap()
            .route("/items/<id>", item)
            .unwrap()
            .route("/broken", broken)
            .unwrap()
            .route("/big", big)
            .unwrap();
        router
    }

    fn exchange(gateway: &mut Gateway, request: &[u8]) -> (Result<(), Error>, MockConn) {
        let mut conn = MockConn::new(request);
        let result = gateway.serve_connection(&mut conn, remote());
        (result, conn)
    }

    #[test]
    fn handler_response() {
        let mut gw = gateway(GatewayConfig::default(), router());
        let (result, conn) = exchange(&mut gw, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");

        result.unwrap();
        assert!(conn.closed);
        assert_eq!(
            str_op(&conn.sent),
            concat!(
                "HTTP/1.1 200 OK\r\n",
                "Server: tiny_gateway\r\n",
                "Connection: close\r\n",
                "Content-Type: text/plain\r\n",
                "Content-Length: 11\r\n",
                "\r\n",
                "Hello World",
            )
        );
    }

    #[test]
    fn routed_responses() {
        let mut gw = gateway(GatewayConfig::default(), router());

        #[rustfmt::skip]
        let cases: [(&[u8], &str, &[u8]); 5] = [
            (b"GET /items/42 HTTP/1.1\r\n\r\n",   "200 OK",        b"item 42"),
            (b"GET /items/42/ HTTP/1.1\r\n\r\n",  "200 OK",        b"item 42"),
            (b"GET /?x=1 HTTP/1.1\r\n\r\n",       "200 OK",        b"Hello World"),
            (b"POST /items/42 HTTP/1.1\r\n\r\n",  "404 Not Found", b"404 Not Found /items/42\r\n"),
            (b"GET / HTTP/1.1",                   "200 OK",        b"Hello World"),
        ];

        for (request, status, body) in cases {
            let (result, conn) = exchange(&mut gw, request);
            result.unwrap();

            let parsed = parse_response(&conn.sent);
            assert_eq!(parsed.status, status, "{}", str_op(request));
            assert_eq!(parsed.body, body, "{}", str_op(request));
            assert_eq!(parsed.header("connection"), Some("close"));
        }
    }

    #[test]
    fn static_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"Hello from a file").unwrap();

        let config = GatewayConfig {
            root: dir.path().to_path_buf(),
            ..GatewayConfig::default()
        };
        let mut gw = gateway(config, Router::new());

        let (result, conn) = exchange(&mut gw, b"GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n");
        result.unwrap();
        let parsed = parse_response(&conn.sent);
        assert_eq!(parsed.status, "200 OK");
        assert_eq!(parsed.header("content-type"), Some("text/plain"));
        assert_eq!(parsed.body, b"Hello from a file");

        std::fs::remove_file(dir.path().join("hello.txt")).unwrap();

        let (result, conn) = exchange(&mut gw, b"GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n");
        result.unwrap();
        let parsed = parse_response(&conn.sent);
        assert_eq!(parsed.status, "404 Not Found");
        assert!(str_op(&parsed.body).contains("/hello.txt"));

        // only GET falls back to files, and never for the root
        for request in [&b"POST /hello.txt HTTP/1.1\r\n\r\n"[..], &b"GET / HTTP/1.1\r\n\r\n"[..]] {
            let (result, conn) = exchange(&mut gw, request);
            result.unwrap();
            assert_eq!(parse_response(&conn.sent).status, "404 Not Found");
        }
    }

    #[test]
    fn custom_file_source() {
        let mut gw = Gateway::builder()
            .files(|path: &str| -> io::Result<Vec<u8>> {
                match path {
                    "/app.js" => Ok(b"console.log(1)".to_vec()),
                    _ => Err(io::ErrorKind::NotFound.into()),
                }
            })
            .build()
            .unwrap();

        let (result, conn) = exchange(&mut gw, b"GET /app.js HTTP/1.1\r\n\r\n");
        result.unwrap();

        let parsed = parse_response(&conn.sent);
        assert_eq!(parsed.header("content-type"), Some("text/javascript"));
        assert_eq!(parsed.body, b"console.log(1)");
    }

    #[test]
    fn errors_by_mode() {
        #[rustfmt::skip]
        let requests: [&[u8]; 3] = [
            b"GET /broken HTTP/1.1\r\n\r\n",
            b"GET /broken\r\n\r\n",
            b"BREW /coffee HTTP/1.1\r\n\r\n",
        ];

        let mut gw = gateway(GatewayConfig::default(), router());
        for request in requests {
            let (result, conn) = exchange(&mut gw, request);
            result.unwrap();

            let parsed = parse_response(&conn.sent);
            assert_eq!(parsed.status, "500 Internal Server Error");
            assert_eq!(parsed.body, b"500 Internal Server Error\r\n");
            assert!(conn.closed);
        }

        let debug = GatewayConfig {
            debug: true,
            ..GatewayConfig::default()
        };
        let mut gw = gateway(debug, router());

        let (result, conn) = exchange(&mut gw, requests[0]);
        assert!(matches!(
            result,
            Err(Error::Handler { ref path, source: HandlerError::Value(_) }) if path == "/broken"
        ));
        assert!(conn.sent.is_empty());
        assert!(conn.closed);

        let (result, _) = exchange(&mut gw, requests[1]);
        assert!(matches!(
            result,
            Err(Error::Parse(crate::ParseError::MalformedRequestLine { tokens: 2 }))
        ));

        let (result, _) = exchange(&mut gw, requests[2]);
        assert!(matches!(result, Err(Error::Parse(crate::ParseError::UnknownMethod(_)))));
    }

    #[test]
    fn empty_read_closes_silently() {
        let mut gw = gateway(GatewayConfig::default(), router());
        let (result, conn) = exchange(&mut gw, b"");

        result.unwrap();
        assert!(conn.sent.is_empty());
        assert!(conn.closed);
    }

    #[test]
    fn truncated_to_buffer() {
        let config = GatewayConfig {
            buffer_size: 16,
            ..GatewayConfig::default()
        };
        let mut gw = gateway(config, router());

        // only "GET /items/42 HT" fits in the buffer
        let (result, conn) = exchange(&mut gw, b"GET /items/42 HTTP/1.1\r\n\r\n");
        result.unwrap();
        assert_eq!(parse_response(&conn.sent).status, "200 OK");
    }

    #[test]
    fn would_block_midway() {
        let mut gw = gateway(GatewayConfig::default(), router());
        let mut conn = MockConn::new(b"GET /big HTTP/1.1\r\n\r\n").steps([
            Step::Accept(40),
            Step::WouldBlock,
            Step::Accept(10_000),
            Step::Accept(1000),
            Step::WouldBlock,
            Step::WouldBlock,
            Step::Accept(2500),
            Step::WouldBlock,
        ]);

        gw.serve_connection(&mut conn, remote()).unwrap();

        let parsed = parse_response(&conn.sent);
        let expected: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        assert_eq!(parsed.status, "200 OK");
        assert_eq!(parsed.header("content-length"), Some("10000"));
        assert_eq!(parsed.body.len(), 10_000);
        assert_eq!(parsed.body, expected);
        assert!(conn.closed);
    }

    #[test]
    fn reset_abandons_response() {
        let mut gw = gateway(GatewayConfig::default(), router());
        let mut conn = MockConn::new(b"GET /big HTTP/1.1\r\n\r\n").steps([
            Step::Accept(50),
            Step::Accept(500),
            Step::Reset,
        ]);

        gw.serve_connection(&mut conn, remote()).unwrap();

        // head went out, body was dropped on the reset
        assert!(str_op(&conn.sent).ends_with("Content-Length: 10000\r\n\r\n"));
        assert_eq!(conn.send_calls, 3);
        assert!(conn.closed);
    }

    #[test]
    fn retry_limit() {
        let config = GatewayConfig {
            send_retry_limit: Some(2),
            ..GatewayConfig::default()
        };
        let mut gw = gateway(config, router());

        let mut conn = MockConn::new(b"GET / HTTP/1.1\r\n\r\n").steps([
            Step::WouldBlock,
            Step::WouldBlock,
            Step::Accept(10),
            Step::WouldBlock,
            Step::WouldBlock,
            Step::WouldBlock,
        ]);
        gw.serve_connection(&mut conn, remote()).unwrap();

        assert_eq!(conn.sent, b"HTTP/1.1 2");
        assert_eq!(conn.send_calls, 6);
        assert!(conn.closed);
    }

    #[test]
    fn interrupts_are_not_stalls() {
        let config = GatewayConfig {
            send_retry_limit: Some(1),
            ..GatewayConfig::default()
        };
        let mut gw = gateway(config, router());

        let mut conn = MockConn::new(b"GET / HTTP/1.1\r\n\r\n").steps([
            Step::Interrupted,
            Step::Interrupted,
            Step::WouldBlock,
            Step::Interrupted,
            Step::Interrupted,
            Step::Accept(20),
            Step::WouldBlock,
            Step::Interrupted,
        ]);
        gw.serve_connection(&mut conn, remote()).unwrap();

        let parsed = parse_response(&conn.sent);
        assert_eq!(parsed.status, "200 OK");
        assert_eq!(parsed.body, b"Hello World");
    }

    #[test]
    fn zero_length_send() {
        let mut gw = gateway(GatewayConfig::default(), router());
        let mut conn = MockConn::new(b"GET / HTTP/1.1\r\n\r\n").steps([Step::Accept(10), Step::Zero]);

        let result = gw.serve_connection(&mut conn, remote());

        assert!(matches!(result, Err(Error::Io(ref err)) if err.kind() == io::ErrorKind::WriteZero));
        assert_eq!(conn.send_calls, 2);
        assert!(conn.closed);
    }

    #[test]
    fn poll_reports_connection_errors() {
        let (mut gw, served) = scripted([
            Incoming::Fail(io::ErrorKind::ConnectionAborted),
            Incoming::Client(
                MockConn::new(b"GET / HTTP/1.1\r\n\r\n").failing_recv(io::ErrorKind::ConnectionReset),
            ),
        ]);
        gw.start().unwrap();

        assert!(matches!(
            gw.poll(),
            Err(Error::Accept(ref err)) if err.kind() == io::ErrorKind::ConnectionAborted
        ));
        assert!(matches!(
            gw.poll(),
            Err(Error::Io(ref err)) if err.kind() == io::ErrorKind::ConnectionReset
        ));
        assert_eq!(gw.poll().unwrap(), Poll::Idle);

        let served = served.lock().unwrap();
        assert_eq!(served.len(), 1);
        assert!(served[0].closed);
        assert!(served[0].sent.is_empty());
    }

    #[test]
    fn serve_forever_survives_connection_errors() {
        let (mut gw, served) = scripted([
            Incoming::Fail(io::ErrorKind::ConnectionAborted),
            Incoming::Client(
                MockConn::new(b"GET / HTTP/1.1\r\n\r\n").failing_recv(io::ErrorKind::ConnectionReset),
            ),
            Incoming::Fail(io::ErrorKind::Other),
            Incoming::Client(MockConn::new(b"GET /items/7 HTTP/1.1\r\n\r\n")),
        ]);

        gw.serve_forever().unwrap();
        assert!(!gw.is_listening());

        let served = served.lock().unwrap();
        assert_eq!(served.len(), 2);
        assert!(served[0].sent.is_empty());

        let parsed = parse_response(&served[1].sent);
        assert_eq!(parsed.status, "200 OK");
        assert_eq!(parsed.body, b"item 7");
        assert!(served.iter().all(|conn| conn.closed));
    }

    #[test]
    fn environ_handler() {
        let mut router = Router::new();
        router
            .register_environ(
                &[Method::Post],
                "/echo/<tag>",
                |env: &mut Environ, captures: &[&str], start: &mut StartResponse| -> Result<Vec<u8>, HandlerError> {
                    let mut body = format!(
                        "{} {} {} {}:",
                        captures[0],
                        env.var("QUERY_STRING").unwrap_or_default(),
                        env.var("HTTP_X_DEVICE").unwrap_or_default(),
                        env.var("SERVER_PORT").unwrap_or_default(),
                    )
                    .into_bytes();
                    io::Read::read_to_end(&mut env.input, &mut body)
                        .map_err(|e| HandlerError::value(e.to_string()))?;

                    start.start(
                        StatusCode::Created,
                        [("Content-Type", "text/csv"), ("X-Echo", "1")],
                    );
                    Ok(body)
                },
            )
            .unwrap()
            .register_environ(
                &[Method::Get],
                "/silent",
                |_: &mut Environ, _: &[&str], _: &mut StartResponse| -> Result<Vec<u8>, HandlerError> {
                    Ok(b"no status".to_vec())
                },
            )
            .unwrap();

        let config = GatewayConfig {
            port: 8080,
            ..GatewayConfig::default()
        };
        let mut gw = gateway(config, router);

        let (result, conn) = exchange(
            &mut gw,
            b"POST /echo/t1?n=5 HTTP/1.1\r\nX-Device: probe\r\nContent-Length: 4\r\n\r\nabcdEXTRA",
        );
        result.unwrap();

        let parsed = parse_response(&conn.sent);
        assert_eq!(parsed.status, "201 Created");
        assert_eq!(parsed.header("content-type"), Some("text/csv"));
        assert_eq!(parsed.header("x-echo"), Some("1"));
        assert_eq!(parsed.header("server"), Some("tiny_gateway"));
        assert_eq!(str_op(&parsed.body), "t1 n=5 probe 8080:abcd");

        let (result, conn) = exchange(&mut gw, b"GET /silent HTTP/1.1\r\n\r\n");
        result.unwrap();
        assert_eq!(parse_response(&conn.sent).status, "500 Internal Server Error");
    }

    #[test]
    fn lifecycle() {
        let mut gw = gateway(
            GatewayConfig {
                host: "127.0.0.1".into(),
                port: 0,
                nonblocking: true,
                ..GatewayConfig::default()
            },
            router(),
        );

        assert!(matches!(gw.poll(), Err(Error::NotStarted)));
        assert_eq!(gw.local_addr(), None);

        gw.start().unwrap();
        assert!(gw.is_listening());
        assert_ne!(gw.local_addr().map(|a| a.port()), Some(0));
        assert_eq!(gw.poll().unwrap(), Poll::Idle);

        gw.stop();
        assert!(!gw.is_listening());
        assert!(matches!(gw.poll(), Err(Error::NotStarted)));
    }

    #[test]
    fn bind_failure() {
        let mut first = gateway(
            GatewayConfig {
                host: "127.0.0.1".into(),
                port: 0,
                ..GatewayConfig::default()
            },
            Router::new(),
        );
        first.start().unwrap();
        let port = first.local_addr().unwrap().port();

        let mut second = gateway(
            GatewayConfig {
                host: "127.0.0.1".into(),
                port,
                ..GatewayConfig::default()
            },
            Router::new(),
        );
        assert!(matches!(second.start(), Err(Error::Bind { .. })));
    }

    #[test]
    fn invalid_config() {
        let result = Gateway::builder()
            .config(GatewayConfig {
                buffer_size: 0,
                ..GatewayConfig::default()
            })
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
