//! Static directory handlers
//!
//! A thin `get` handler that maps the tail of the route onto a directory.

use std::path::{Component, Path, PathBuf};

use hyper::StatusCode;

use super::{BoxFuture, Handler, HandlerMethod, HandlerSpec};
use crate::error::HandlerResult;
use crate::http::mime;

impl HandlerSpec {
    /// Serve files from `directory` under `^/<route>/(.*)`
    ///
    /// Without a route, the directory name stripped of surrounding
    /// slashes is used.
    pub fn static_dir(route: Option<&str>, directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        let prefix = route.map_or_else(
            || directory.to_string_lossy().trim_matches('/').to_string(),
            |r| r.trim_matches('/').to_string(),
        );

        Self::new(format!("^/{}/(.*)", regex::escape(&prefix)))
            .directory(directory)
            .on_async(HandlerMethod::Get, serve_static)
    }
}

fn serve_static(handler: &mut Handler) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let target = handler.directory().and_then(|dir| {
            let relative = handler.params.args.get(1).map_or("", String::as_str);
            resolve_within(dir, relative)
        });

        let Some(path) = target else {
            not_found(handler);
            return Ok(());
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                not_found(handler);
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), "static file unavailable: {e}");
                not_found(handler);
                return Ok(());
            }
        }

        match tokio::fs::read(&path).await {
            Ok(data) => {
                let length = data.len().to_string();
                handler.write_head(
                    StatusCode::OK,
                    &[
                        ("Content-Type", mime::content_type_for(&path)),
                        ("Content-Length", length.as_str()),
                    ],
                );
                handler.end(data);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "static file read failed: {e}");
                handler.write_head(StatusCode::INTERNAL_SERVER_ERROR, &[]);
                handler.end(format!("Error 500 {e}"));
            }
        }
        Ok(())
    })
}

fn not_found(handler: &mut Handler) {
    handler.write_head(StatusCode::NOT_FOUND, &[("Content-Type", "text/plain")]);
    handler.end("404 Not found");
}

/// Join `relative` onto `dir`, refusing anything that could leave it
fn resolve_within(dir: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return None;
    }
    Some(dir.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_from_directory_name() {
        let spec = HandlerSpec::static_dir(None, "/images/");
        assert_eq!(spec.route(), "^/images/(.*)");
        assert_eq!(spec.directory_path(), Some(Path::new("/images/")));
        assert!(spec.handles(HandlerMethod::Get));
        assert!(!spec.handles(HandlerMethod::Post));
    }

    #[test]
    fn test_explicit_route_is_escaped() {
        let spec = HandlerSpec::static_dir(Some("assets.v1"), "demo/assets");
        assert_eq!(spec.route(), r"^/assets\.v1/(.*)");
    }

    #[test]
    fn test_resolve_within() {
        let dir = Path::new("/srv/static");
        assert_eq!(
            resolve_within(dir, "css/site.css"),
            Some(PathBuf::from("/srv/static/css/site.css"))
        );
        assert_eq!(resolve_within(dir, "../etc/passwd"), None);
        assert_eq!(resolve_within(dir, "a/../../b"), None);
        assert_eq!(resolve_within(dir, "/etc/passwd"), None);
    }
}
