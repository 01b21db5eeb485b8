//! Serves a few routes and the files of a directory.
//!
//! ```text
//! cargo run --example hello_world -- --port 8080 --root ./www --debug
//! curl http://127.0.0.1:8080/
//! curl http://127.0.0.1:8080/greet/ferris
//! curl -X PUT http://127.0.0.1:8080/led/red
//! curl http://127.0.0.1:8080/env?verbose=1
//! ```

use clap::Parser;
use std::{io::Read, path::PathBuf};
use tiny_gateway::{
    Environ, Gateway, GatewayConfig, HandlerError, Method, Request, Response, Router,
    StartResponse, StatusCode,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hello_world")]
#[command(about = "Minimal gateway serving routes and static files", long_about = None)]
struct Cli {
    /// TOML file with gateway settings; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to serve static files from
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Propagate request errors instead of answering with 500
    #[arg(short, long)]
    debug: bool,
}

fn index(_: &Request, _: &[&str]) -> Result<Response, HandlerError> {
    Ok(Response::ok("<h1>Hello World</h1>").with_content_type("text/html"))
}

fn greet(req: &Request, captures: &[&str]) -> Result<Response, HandlerError> {
    let greeting = req
        .query_pairs()
        .find(|(key, _)| *key == "greeting")
        .map_or("Hello", |(_, value)| value);

    Ok(Response::ok(format!("{greeting}, {}!", captures[0])))
}

fn led(_: &Request, captures: &[&str]) -> Result<Response, HandlerError> {
    match captures[0] {
        "red" | "green" | "blue" | "off" => Ok(Response::new(StatusCode::Accepted)
            .with_header("X-Led", captures[0])
            .with_body_writer(|w| {
                w.write("led set to ");
                w.write(captures[0]);
            })),
        other => Err(HandlerError::value(format!("unknown color '{other}'"))),
    }
}

fn env(
    environ: &mut Environ,
    _: &[&str],
    start: &mut StartResponse,
) -> Result<Vec<u8>, HandlerError> {
    let mut body = String::new();
    for key in [
        "REQUEST_METHOD",
        "PATH_INFO",
        "QUERY_STRING",
        "REMOTE_ADDR",
        "SERVER_NAME",
        "SERVER_PORT",
        "GATEWAY_INTERFACE",
    ] {
        body.push_str(&format!("{key}={}\n", environ.var(key).unwrap_or_default()));
    }
    for (name, value) in &environ.http_headers {
        body.push_str(&format!("{name}={value}\n"));
    }
    environ
        .input
        .read_to_string(&mut body)
        .map_err(|err| HandlerError::type_mismatch(err.to_string()))?;

    start.start(StatusCode::Ok, [("Cache-Control", "no-store")]);
    Ok(body.into_bytes())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(root) = cli.root {
        config.root = root;
    }
    config.debug |= cli.debug;

    let default_filter = if config.debug { "tiny_gateway=debug" } else { "tiny_gateway=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut router = Router::new();
    router
        .route("/", index)?
        .route("/greet/<name>", greet)?
        .register(&[Method::Put, Method::Post], "/led/<color>", led)?
        .register_environ(&[Method::Get, Method::Post], "/env", env)?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        root = %config.root.display(),
        debug = config.debug,
        "configuration loaded"
    );

    let mut gateway = Gateway::builder().config(config).router(router).build()?;
    gateway.serve_forever()?;

    Ok(())
}
