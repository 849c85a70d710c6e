//! Route handler abstraction and the registry that binds handlers to templates.
use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use async_trait::async_trait;

use crate::core::{body::HandlerResponse, context::RequestContext, error::HandlerError};

pub type HandlerResult = Result<HandlerResponse, HandlerError>;

/// A route handler. Implemented for every `async fn(RequestContext) -> HandlerResult`.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: RequestContext) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, ctx: RequestContext) -> HandlerResult {
        (self)(ctx).await
    }
}

/// Handlers compiled into the binary, keyed by route template
/// (e.g. `/params/{route}/POST`). Route discovery resolves every discovered
/// template against this table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same template.
    pub fn register(&mut self, template: impl Into<String>, handler: impl Handler) -> &mut Self {
        let template = template.into();
        if self
            .handlers
            .insert(template.clone(), Arc::new(handler))
            .is_some()
        {
            tracing::warn!("Handler for '{}' registered twice; keeping the latest", template);
        }
        self
    }

    pub fn with(mut self, template: impl Into<String>, handler: impl Handler) -> Self {
        self.register(template, handler);
        self
    }

    pub fn get(&self, template: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(template).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut templates: Vec<_> = self.handlers.keys().collect();
        templates.sort();
        f.debug_struct("HandlerRegistry")
            .field("templates", &templates)
            .finish()
    }
}
