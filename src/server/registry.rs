use std::collections::HashMap;
use std::sync::Arc;
use crate::error::HandlerError;
use super::content_manager::ContentManager;
use super::http::Request;
use super::response::Response;
use super::static_files::StaticFiles;

/// Something that can answer requests for one HTTP method.
pub trait MethodHandler: Send + Sync {
    fn handle(&self, request: &Request, response: &mut Response) -> Result<(), HandlerError>;
}

/// Handlers keyed by method name. Method names are matched exactly, so
/// `get` is not `GET`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn MethodHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> HandlerRegistry {
        HandlerRegistry::default()
    }

    /// GET and HEAD served from `files`.
    pub fn with_static_files<M: ContentManager + 'static>(files: StaticFiles<M>) -> HandlerRegistry {
        let files = Arc::new(files);
        let mut registry = HandlerRegistry::new();
        registry.register("GET", StaticFileHandler { files: files.clone(), include_body: true });
        registry.register("HEAD", StaticFileHandler { files, include_body: false });
        registry
    }

    pub fn register<H: MethodHandler + 'static>(&mut self, method: &str, handler: H) {
        self.handlers.insert(method.to_string(), Box::new(handler));
    }

    pub fn get(&self, method: &str) -> Option<&dyn MethodHandler> {
        self.handlers.get(method).map(|h| h.as_ref())
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(|m| m.as_str()).collect();
        methods.sort_unstable();
        methods
    }
}

struct StaticFileHandler<M: ContentManager> {
    files: Arc<StaticFiles<M>>,
    include_body: bool,
}

impl<M: ContentManager> MethodHandler for StaticFileHandler<M> {
    fn handle(&self, request: &Request, response: &mut Response) -> Result<(), HandlerError> {
        self.files.serve(request, response, self.include_body)
    }
}
