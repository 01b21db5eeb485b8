use crate::{
    errors::{Error, HandlerError},
    http::{
        environ::{Environ, StartResponse},
        request::Request,
        response::Response,
        types::Method,
    },
};
use regex::Regex;
use std::fmt;
use tracing::trace;

/// Characters a `<name>` segment may capture.
const CAPTURE: &str = "([a-zA-Z0-9._-]+)";

/// A request handler: receives the parsed request and the positional path
/// captures of the matched route.
///
/// Implemented for every matching closure, so plain functions work too.
///
/// # Examples
///
/// ```
/// use tiny_gateway::{HandlerError, Request, Response, Router};
///
/// fn item(_: &Request, captures: &[&str]) -> Result<Response, HandlerError> {
///     let id: u32 = captures[0]
///         .parse()
///         .map_err(|_| HandlerError::value("id must be a number"))?;
///
///     Ok(Response::ok(id * 2))
/// }
///
/// let mut router = Router::new();
/// router.route("/items/<id>", item).unwrap();
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Produces the response for `req`.
    ///
    /// # Errors
    ///
    /// A returned [`HandlerError`] is answered with `500 Internal Server Error`,
    /// or handed to the caller of the gateway in debug mode.
    fn handle(&self, req: &Request, captures: &[&str]) -> Result<Response, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&Request, &[&str]) -> Result<Response, HandlerError> + Send + Sync + 'static,
{
    #[inline]
    fn handle(&self, req: &Request, captures: &[&str]) -> Result<Response, HandlerError> {
        self(req, captures)
    }
}

/// The lower-level handler interface: an [`Environ`] record and a
/// [`StartResponse`] to report status and headers through. The returned
/// bytes become the response body.
///
/// # Examples
///
/// ```
/// use tiny_gateway::{Environ, HandlerError, Method, Router, StartResponse, StatusCode};
///
/// let mut router = Router::new();
/// router
///     .register_environ(
///         &[Method::Get],
///         "/whoami",
///         |env: &mut Environ, _: &[&str], start: &mut StartResponse| {
///             start.start(StatusCode::Ok, [("Content-Type", "text/plain")]);
///             Ok::<_, HandlerError>(env.remote_addr.ip().to_string().into_bytes())
///         },
///     )
///     .unwrap();
/// ```
pub trait EnvironHandler: Send + Sync + 'static {
    fn call(
        &self,
        environ: &mut Environ<'_>,
        captures: &[&str],
        start_response: &mut StartResponse,
    ) -> Result<Vec<u8>, HandlerError>;
}

impl<F> EnvironHandler for F
where
    F: Fn(&mut Environ<'_>, &[&str], &mut StartResponse) -> Result<Vec<u8>, HandlerError>
        + Send
        + Sync
        + 'static,
{
    #[inline]
    fn call(
        &self,
        environ: &mut Environ<'_>,
        captures: &[&str],
        start_response: &mut StartResponse,
    ) -> Result<Vec<u8>, HandlerError> {
        self(environ, captures, start_response)
    }
}

pub(crate) enum Endpoint {
    Request(Box<dyn Handler>),
    Environ(Box<dyn EnvironHandler>),
}

/// A registered `(pattern, methods, handler)` triple.
pub struct Route {
    pattern: String,
    matcher: Regex,
    methods: Vec<Method>,
    endpoint: Endpoint,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("regex", &self.matcher.as_str())
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

impl Route {
    fn new(methods: &[Method], pattern: &str, endpoint: Endpoint) -> Result<Self, Error> {
        let matcher = Regex::new(&Self::compile(pattern)).map_err(|source| Error::Pattern {
            pattern: pattern.to_owned(),
            source,
        })?;

        Ok(Self {
            pattern: pattern.to_owned(),
            matcher,
            methods: methods.to_vec(),
            endpoint,
        })
    }

    /// Turns a route pattern into an anchored regular expression.
    ///
    /// `<name>` segments capture, everything else matches literally, and the
    /// trailing `/` is optional.
    fn compile(pattern: &str) -> String {
        let mut regex = String::with_capacity(pattern.len() * 2 + 4);
        regex.push('^');

        for segment in pattern.split('/') {
            match is_variable(segment) {
                true => regex.push_str(CAPTURE),
                false => regex.push_str(&regex::escape(segment)),
            }
            regex.push('/');
        }

        regex.push_str("?$");
        regex
    }

    #[inline(always)]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[inline(always)]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    #[inline(always)]
    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// `<identifier>` with an ASCII identifier inside.
fn is_variable(segment: &str) -> bool {
    let Some(name) = segment
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
    else {
        return false;
    };

    match name.as_bytes() {
        [first, rest @ ..] => {
            (first.is_ascii_alphabetic() || *first == b'_')
                && rest.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_')
        }
        [] => false,
    }
}

/// Result of a successful [`Router::resolve`].
#[derive(Debug)]
pub struct Resolved<'r, 'p> {
    pub route: &'r Route,
    /// Captured segment values, left to right.
    pub captures: Vec<&'p str>,
}

/// Ordered route table.
///
/// Routes are tried in registration order and the first one whose pattern
/// matches the path and whose method set contains the request method wins.
/// There is no specificity ranking: when patterns overlap, register the
/// narrower one first.
///
/// # Examples
///
/// ```
/// use tiny_gateway::{HandlerError, Method, Request, Response, Router};
///
/// fn index(_: &Request, _: &[&str]) -> Result<Response, HandlerError> {
///     Ok(Response::ok("index"))
/// }
///
/// fn led(_: &Request, captures: &[&str]) -> Result<Response, HandlerError> {
///     Ok(Response::ok(format!("led {}", captures[0])))
/// }
///
/// let mut router = Router::new();
/// router
///     .route("/", index)?
///     .register(&[Method::Get, Method::Put], "/led/<color>", led)?;
///
/// let found = router.resolve("/led/red/", Method::Put).unwrap();
/// assert_eq!(found.route.pattern(), "/led/<color>");
/// assert_eq!(found.captures, ["red"]);
///
/// assert!(router.resolve("/led", Method::Get).is_none());
/// # Ok::<(), tiny_gateway::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `methods` on `pattern`.
    ///
    /// # Errors
    ///
    /// [`Error::Pattern`] when the pattern does not compile.
    pub fn register<H: Handler>(
        &mut self,
        methods: &[Method],
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, Error> {
        self.push(methods, pattern, Endpoint::Request(Box::new(handler)))
    }

    /// Registers an environ-style handler for `methods` on `pattern`.
    pub fn register_environ<H: EnvironHandler>(
        &mut self,
        methods: &[Method],
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, Error> {
        self.push(methods, pattern, Endpoint::Environ(Box::new(handler)))
    }

    /// Registers `handler` for `GET` on `pattern`.
    #[inline]
    pub fn route<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, Error> {
        self.register(&[Method::Get], pattern, handler)
    }

    fn push(
        &mut self,
        methods: &[Method],
        pattern: &str,
        endpoint: Endpoint,
    ) -> Result<&mut Self, Error> {
        let route = Route::new(methods, pattern, endpoint)?;
        trace!(pattern, regex = route.matcher.as_str(), ?methods, "route registered");

        self.routes.push(route);
        Ok(self)
    }

    /// Finds the first route matching `path` and `method`.
    pub fn resolve<'r, 'p>(&'r self, path: &'p str, method: Method) -> Option<Resolved<'r, 'p>> {
        trace!(routes = self.routes.len(), path, %method, "resolving route");

        for route in &self.routes {
            let method_match = route.methods.contains(&method);
            let found = route.matcher.captures(path);

            trace!(
                pattern = route.pattern.as_str(),
                path_match = found.is_some(),
                method_match,
                "route match attempt"
            );

            if let (Some(caps), true) = (found, method_match) {
                let captures = caps.iter().skip(1).flatten().map(|m| m.as_str()).collect();
                return Some(Resolved { route, captures });
            }
        }

        None
    }

    #[inline]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
