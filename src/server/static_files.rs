use std::path::{Component, Path, PathBuf};
use chrono::{DateTime, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::debug;
use crate::error::HandlerError;
use super::content_manager::ContentManager;
use super::http::{format_http_date, split_target, Request};
use super::response::{escape_html, Response};

/// Tried in order when a directory is requested.
pub const INDEX_FILES: &[&str] = &["index.html", "index.htm"];

/// Every file is served with this type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const LISTING_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const LINK: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'#').add(b'%').add(b'\'')
    .add(b'<').add(b'>').add(b'?').add(b'`').add(b'{').add(b'}');

/// Serves files and directory listings below a fixed root.
pub struct StaticFiles<M: ContentManager> {
    root: PathBuf,
    fs: M,
}

impl<M: ContentManager> StaticFiles<M> {
    pub fn new(root: &Path, fs: M) -> StaticFiles<M> {
        StaticFiles { root: root.to_path_buf(), fs }
    }

    /// Maps a request target onto the serving root. Query and fragment are
    /// dropped, `%XX` escapes decoded, and `.`, `..` and empty segments
    /// skipped. Nothing is looked up on disk.
    pub fn resolve(&self, request_path: &str) -> PathBuf {
        let (path, _) = split_target(request_path);
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        let mut resolved = self.root.clone();
        for segment in decoded.split('/') {
            for component in Path::new(segment).components() {
                if let Component::Normal(part) = component {
                    resolved.push(part);
                }
            }
        }
        resolved
    }

    /// Answers a GET (`include_body`) or HEAD for `request`.
    pub fn serve(&self, request: &Request, response: &mut Response, include_body: bool) -> Result<(), HandlerError> {
        let (path, query) = split_target(&request.path);
        let mut fs_path = self.resolve(path);

        if self.fs.is_directory(&fs_path) {
            if !path.ends_with('/') {
                let location = format!("{}/{}", path, query);
                return response.send_empty(301, &[("Location", location.as_str())]);
            }
            match INDEX_FILES.iter().map(|name| fs_path.join(name)).find(|p| self.fs.is_file(p)) {
                Some(index) => fs_path = index,
                None => return self.list_directory(&fs_path, path, response, include_body),
            }
        } else if path.ends_with('/') {
            debug!("{} is not a directory", fs_path.display());
            return response.send_empty(404, &[]);
        }
        self.send_file(&fs_path, request, response, include_body)
    }

    fn send_file(&self, fs_path: &Path, request: &Request, response: &mut Response, include_body: bool) -> Result<(), HandlerError> {
        let opened = self.fs.open_for_read(fs_path)
            .and_then(|file| self.fs.stat_size(fs_path).map(|size| (file, size)));
        let (mut file, size) = match opened {
            Ok(found) => found,
            Err(e) => {
                debug!("Error opening {}:{}", fs_path.display(), e);
                return response.send_empty(404, &[]);
            }
        };

        let modified = self.fs.modified(fs_path).map(DateTime::<Utc>::from);
        if let (Some(since), Some(modified)) = (request.headers.if_modified_since(), modified) {
            if modified.timestamp() <= since.timestamp() {
                response.send_response(304)?;
                return response.end_headers();
            }
        }

        response.send_response(200)?;
        response.send_header("Content-Type", DEFAULT_CONTENT_TYPE)?;
        response.send_header("Content-Length", &size.to_string())?;
        if let Some(modified) = modified {
            response.send_header("Last-Modified", &format_http_date(&modified))?;
        }
        response.end_headers()?;
        if include_body {
            response.copy_body(&mut file)?;
        }
        Ok(())
    }

    fn list_directory(&self, dir: &Path, request_path: &str, response: &mut Response, include_body: bool) -> Result<(), HandlerError> {
        let mut names = match self.fs.list_entries(dir) {
            Ok(names) => names,
            Err(e) => {
                debug!("Error listing {}:{}", dir.display(), e);
                return response.send_empty(404, &[]);
            }
        };
        names.sort_by_key(|name| name.to_lowercase());

        let body = self.render_listing(dir, request_path, &names);
        response.send_response(200)?;
        response.send_header("Content-Type", LISTING_CONTENT_TYPE)?;
        response.send_header("Content-Length", &body.len().to_string())?;
        response.end_headers()?;
        if include_body {
            response.write_body(body.as_bytes())?;
        }
        Ok(())
    }

    /// Directories get a trailing `/` in label and link, symlinks an `@` in
    /// the label only.
    fn render_listing(&self, dir: &Path, request_path: &str, names: &[String]) -> String {
        let title = escape_html(&percent_decode_str(request_path).decode_utf8_lossy());
        let mut html = format!(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 3.2 Final//EN\"><html>\n\
             <title>Directory listing for {0}</title>\n\
             <body>\n<h2>Directory listing for {0}</h2>\n<hr>\n<ul>\n", title);
        for name in names {
            let full = dir.join(name);
            let mut label = name.clone();
            let mut link = name.clone();
            if self.fs.is_directory(&full) {
                label.push('/');
                link.push('/');
            }
            if self.fs.is_symlink(&full) {
                label = format!("{}@", name);
            }
            let href = utf8_percent_encode(&link, LINK).to_string();
            html.push_str(&format!("<li><a href=\"{}\">{}</a>\n", escape_html(&href), escape_html(&label)));
        }
        html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
        html
    }
}
