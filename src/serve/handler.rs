use std::io::ErrorKind;
use std::path::Path;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::{debug, error, warn};

use crate::config::{Config, DirectoryPolicy};
use crate::http::mime;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::serve::resolver::{Resolved, ResolveError, Resolver};

/// Characters percent-encoded in listing hrefs.
const HREF_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'#')
    .add(b'?')
    .add(b'%');

/// Serves files from the root directory.
///
/// The handler is shared read-only across all connections; the root and
/// directory policy are fixed for the process lifetime.
pub struct StaticHandler {
    resolver: Resolver,
    policy: DirectoryPolicy,
}

impl StaticHandler {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            resolver: Resolver::new(config.root_dir.clone())?,
            policy: config.directory_policy,
        })
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Explicit verb dispatch. GET and HEAD are served; every other
    /// recognized verb is answered 405 without touching the filesystem.
    pub async fn handle(&self, req: &Request) -> Response {
        match req.method {
            Method::GET => self.serve(req, false).await,
            Method::HEAD => self.serve(req, true).await,
            _ => {
                debug!(method = ?req.method, target = %req.path, "method not allowed");
                let mut response = Response::error_page(StatusCode::MethodNotAllowed);
                response.headers.set("Allow", "GET, HEAD");
                response
            }
        }
    }

    async fn serve(&self, req: &Request, head_only: bool) -> Response {
        match self.resolver.resolve(&req.path).await {
            Ok(Resolved::File(path)) => self.serve_file(&path, head_only).await,
            Ok(Resolved::Redirect(location)) => Response::redirect(&location),
            Ok(Resolved::Directory(path)) => match self.policy {
                DirectoryPolicy::Listing => self.serve_listing(&path, &req.path).await,
                DirectoryPolicy::Forbidden => Response::error_page(StatusCode::Forbidden),
                DirectoryPolicy::NotFound => Response::error_page(StatusCode::NotFound),
            },
            Err(ResolveError::BadTarget) => Response::error_page(StatusCode::BadRequest),
            Err(ResolveError::Traversal) => {
                warn!(target = %req.path, "rejected path traversal attempt");
                Response::error_page(StatusCode::Forbidden)
            }
            Err(ResolveError::NotFound) => {
                debug!(target = %req.path, "not found");
                Response::error_page(StatusCode::NotFound)
            }
        }
    }

    /// For GET the file is opened and handed to the writer to stream; for
    /// HEAD only the metadata is consulted, with Content-Length set to the
    /// size the GET body would have.
    async fn serve_file(&self, path: &Path, head_only: bool) -> Response {
        let content_type = mime::content_type_for(path);

        if head_only {
            return match tokio::fs::metadata(path).await {
                Ok(meta) => ResponseBuilder::new(StatusCode::Ok)
                    .header("Content-Type", content_type)
                    .header("Content-Length", meta.len().to_string())
                    .build(),
                Err(e) => self.io_error_response(path, e),
            };
        }

        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => return self.io_error_response(path, e),
        };

        match file.metadata().await {
            Ok(meta) => ResponseBuilder::new(StatusCode::Ok)
                .header("Content-Type", content_type)
                .file(file, meta.len())
                .build(),
            Err(e) => self.io_error_response(path, e),
        }
    }

    async fn serve_listing(&self, dir: &Path, target: &str) -> Response {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => return self.io_error_response(dir, e),
        };

        let mut names: Vec<String> = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                        name.push('/');
                    }
                    names.push(name);
                }
                Ok(None) => break,
                Err(e) => return self.io_error_response(dir, e),
            }
        }
        names.sort();

        let title = escape_html(target);
        let mut page = format!(
            "<!DOCTYPE html>\n<html>\n<head><title>Index of {title}</title></head>\n<body>\n<h1>Index of {title}</h1>\n<ul>\n"
        );
        for name in &names {
            let href = utf8_percent_encode(name, HREF_ENCODE);
            let label = escape_html(name);
            page.push_str(&format!("<li><a href=\"{href}\">{label}</a></li>\n"));
        }
        page.push_str("</ul>\n</body>\n</html>\n");

        ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", "text/html")
            .body(page.into_bytes())
            .build()
    }

    /// Maps filesystem errors that slipped past resolution (races, odd
    /// permissions) onto responses. The body stays generic; the path only
    /// ever appears in the log.
    fn io_error_response(&self, path: &Path, err: std::io::Error) -> Response {
        match err.kind() {
            ErrorKind::NotFound => Response::error_page(StatusCode::NotFound),
            ErrorKind::PermissionDenied => Response::error_page(StatusCode::Forbidden),
            _ => {
                error!(path = %path.display(), error = %err, "failed to serve path");
                Response::error_page(StatusCode::InternalServerError)
            }
        }
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
