//! Ordered route table.
//!
//! Routes are matched in insertion order and the first match wins; there is no
//! specificity ranking. The table is built once at startup and never mutated.
use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use http::Method;
use thiserror::Error;

use crate::core::{
    context::RequestContext,
    error::HandlerError,
    handler::{Handler, HandlerRegistry, HandlerResult},
    path_matcher::{MatcherError, PathMatcher, PathVars},
};

/// Extension of route files when none is configured.
pub const DEFAULT_ROUTE_EXTENSION: &str = "route";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RouteTableError {
    #[error("failed to read route directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    InvalidTemplate(#[from] MatcherError),

    #[error("route template '{template}' does not end with an HTTP method")]
    InvalidMethod { template: String },

    #[error("route template '{template}' is registered more than once")]
    DuplicateRoute { template: String },
}

/// Where the route table comes from.
pub enum RouteSource {
    /// Walk `root` recursively. Every file ending in `.{extension}` becomes a
    /// route whose template is its relative path without the extension; the
    /// handler is looked up in `registry` by that template.
    Directory {
        root: PathBuf,
        extension: String,
        registry: HandlerRegistry,
    },
    /// Ready-made template -> handler pairs, kept in the given order.
    Mapping(Vec<(String, Arc<dyn Handler>)>),
}

impl RouteSource {
    pub fn directory(root: impl Into<PathBuf>, registry: HandlerRegistry) -> Self {
        Self::Directory {
            root: root.into(),
            extension: DEFAULT_ROUTE_EXTENSION.to_string(),
            registry,
        }
    }

    pub fn mapping() -> MappingBuilder {
        MappingBuilder::default()
    }
}

/// Ordered builder for [`RouteSource::Mapping`].
#[derive(Default)]
pub struct MappingBuilder {
    routes: Vec<(String, Arc<dyn Handler>)>,
}

impl MappingBuilder {
    pub fn route(mut self, template: impl Into<String>, handler: impl Handler) -> Self {
        self.routes.push((template.into(), Arc::new(handler)));
        self
    }

    pub fn build(self) -> RouteSource {
        RouteSource::Mapping(self.routes)
    }
}

/// Handler slot of a route: loaded, or the reason it could not be loaded.
#[derive(Clone)]
pub enum RouteHandler {
    Loaded(Arc<dyn Handler>),
    LoadError(String),
}

impl RouteHandler {
    pub async fn invoke(&self, ctx: RequestContext) -> HandlerResult {
        match self {
            Self::Loaded(handler) => handler.call(ctx).await,
            Self::LoadError(reason) => Err(HandlerError::Internal(eyre::eyre!(
                "route handler failed to load: {reason}"
            ))),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(_) => f.write_str("Loaded"),
            Self::LoadError(reason) => f.debug_tuple("LoadError").field(reason).finish(),
        }
    }
}

#[derive(Debug)]
pub struct CompiledRoute {
    matcher: PathMatcher,
    method: Method,
    handler: RouteHandler,
}

impl CompiledRoute {
    pub fn new(template: &str, handler: RouteHandler) -> Result<Self, RouteTableError> {
        let method = template
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty() && !segment.contains('{'))
            .and_then(|segment| Method::from_bytes(segment.as_bytes()).ok())
            .ok_or_else(|| RouteTableError::InvalidMethod {
                template: template.to_string(),
            })?;

        Ok(Self {
            matcher: PathMatcher::compile(template)?,
            method,
            handler,
        })
    }

    pub fn template(&self) -> &str {
        self.matcher.template()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a CompiledRoute,
    pub vars: PathVars,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Build the table. A mapping is trusted and any bad template fails the
    /// build. A directory only fails when its root cannot be read; bad files
    /// and unreadable subdirectories are logged and skipped.
    pub fn build(source: RouteSource) -> Result<Self, RouteTableError> {
        let routes = match source {
            RouteSource::Mapping(pairs) => compile_mapping(pairs)?,
            RouteSource::Directory {
                root,
                extension,
                registry,
            } => load_directory(&root, &extension, &registry)?,
        };

        tracing::info!("Route table built with {} routes", routes.len());
        Ok(Self { routes })
    }

    /// First route matching `path` (already percent-decoded) and `method`.
    pub fn find(&self, path: &str, method: &Method) -> Option<RouteMatch<'_>> {
        let candidate = match_candidate(path, method);
        self.routes.iter().find_map(|route| {
            route
                .matcher
                .captures(&candidate)
                .map(|vars| RouteMatch { route, vars })
        })
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn load_error_count(&self) -> usize {
        self.routes
            .iter()
            .filter(|route| !route.handler.is_loaded())
            .count()
    }
}

/// `/users/42` + `GET` -> `/users/42/GET`
pub fn match_candidate(path: &str, method: &Method) -> String {
    if path.ends_with('/') {
        format!("{path}{method}")
    } else {
        format!("{path}/{method}")
    }
}

fn register(routes: &mut Vec<CompiledRoute>, route: CompiledRoute) {
    tracing::debug!(
        "Registered route {} ({})",
        route.template(),
        if route.handler.is_loaded() { "loaded" } else { "load error" }
    );
    routes.push(route);
}

fn compile_mapping(
    pairs: Vec<(String, Arc<dyn Handler>)>,
) -> Result<Vec<CompiledRoute>, RouteTableError> {
    let mut seen = HashSet::new();
    let mut routes = Vec::with_capacity(pairs.len());
    for (template, handler) in pairs {
        if !seen.insert(template.clone()) {
            return Err(RouteTableError::DuplicateRoute { template });
        }
        register(
            &mut routes,
            CompiledRoute::new(&template, RouteHandler::Loaded(handler))?,
        );
    }
    Ok(routes)
}

fn load_directory(
    root: &Path,
    extension: &str,
    registry: &HandlerRegistry,
) -> Result<Vec<CompiledRoute>, RouteTableError> {
    let mut files = Vec::new();
    discover_route_files(root, extension, &mut files)?;

    let mut routes = Vec::with_capacity(files.len());
    for file in files {
        let Some(template) = template_for(root, &file) else {
            tracing::warn!("Skipping route file with non UTF-8 path: {}", file.display());
            continue;
        };

        let handler = match load_handler(&file, &template, registry) {
            Ok(handler) => RouteHandler::Loaded(handler),
            Err(reason) => {
                tracing::error!("Failed to load route {}: {}", template, reason);
                RouteHandler::LoadError(reason)
            }
        };

        match CompiledRoute::new(&template, handler) {
            Ok(route) => register(&mut routes, route),
            Err(e) => tracing::error!("Skipping route file {}: {}", file.display(), e),
        }
    }
    Ok(routes)
}

fn load_handler(
    file: &Path,
    template: &str,
    registry: &HandlerRegistry,
) -> Result<Arc<dyn Handler>, String> {
    fs::File::open(file).map_err(|e| format!("cannot open {}: {e}", file.display()))?;
    registry
        .get(template)
        .ok_or_else(|| format!("no handler registered for '{template}'"))
}

/// Depth-first walk with entries sorted by name so discovery order is stable.
/// Only a failure to read `dir` itself is returned; unreadable subdirectories
/// are logged and skipped.
fn discover_route_files(
    dir: &Path,
    extension: &str,
    out: &mut Vec<PathBuf>,
) -> Result<(), RouteTableError> {
    let io_err = |source| RouteTableError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir)
        .map_err(io_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            if let Err(e) = discover_route_files(&path, extension, out) {
                tracing::error!("Skipping route directory: {}", e);
            }
        } else if path.extension().is_some_and(|ext| ext == extension) {
            out.push(path);
        }
    }
    Ok(())
}

fn template_for(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?.with_extension("");
    let mut template = String::new();
    for component in relative.components() {
        template.push('/');
        template.push_str(component.as_os_str().to_str()?);
    }
    Some(template)
}
