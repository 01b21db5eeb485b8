//! Static file collaborator used when no route matches a `GET` request.

use crate::{http::response::Response, mime};
use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};
use tracing::debug;

/// Source of static file contents, addressed by request path.
///
/// Implemented for [`FsRoot`] and for any `Fn(&str) -> io::Result<Vec<u8>>`,
/// so files can also be served from memory:
///
/// ```
/// use std::io;
/// use tiny_gateway::FileSource;
///
/// let files = |path: &str| -> io::Result<Vec<u8>> {
///     match path {
///         "/index.html" => Ok(b"<h1>hi</h1>".to_vec()),
///         _ => Err(io::ErrorKind::NotFound.into()),
///     }
/// };
///
/// assert!(files.read("/index.html").is_ok());
/// assert!(files.read("/missing").is_err());
/// ```
pub trait FileSource: Send + Sync {
    /// Returns the full contents of the file at the request `path`.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

impl<F> FileSource for F
where
    F: Fn(&str) -> io::Result<Vec<u8>> + Send + Sync,
{
    #[inline]
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self(path)
    }
}

/// Files below a directory on the local filesystem.
///
/// Request paths are joined onto the root component by component. Paths
/// containing `..` or any absolute/prefix component never reach the
/// filesystem and are reported as not found.
#[derive(Debug, Clone)]
pub struct FsRoot {
    root: PathBuf,
}

impl FsRoot {
    #[inline]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a request path to a filesystem path below the root.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let mut full = self.root.clone();

        for comp in Path::new(path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(part) => full.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }

        Some(full)
    }
}

impl FileSource for FsRoot {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let full = self
            .resolve(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "path escapes the static root"))?;

        fs::read(full)
    }
}

/// Answers `path` from `files`: `200 OK` with the extension's content type,
/// or `404 Not Found` naming the path.
pub(crate) fn serve_static(files: &dyn FileSource, path: &str) -> Response {
    match files.read(path) {
        Ok(contents) => {
            debug!(path, bytes = contents.len(), "serving static file");
            Response::ok(contents).with_content_type(mime::mime_type(path))
        }
        Err(err) => {
            debug!(path, error = %err, "static file not found");
            Response::not_found(path)
        }
    }
}
