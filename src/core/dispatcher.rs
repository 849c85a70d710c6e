//! Request pipeline.
//!
//! `Received -> Matched -> BodyDecoded -> HandlerInvoked -> ResponseEncoded -> Sent`.
//! Any fault between matching and encoding is turned into a status and message,
//! rendered through the `/errors/{status}` route when one exists, and otherwise
//! sent as plain text. Every response leaves with the CORS header set, and the
//! request logger (if any) sees every request exactly once.
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::body::Body;
use bytes::Bytes;
use eyre::eyre;
use http::{
    HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header, request::Parts,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use url::Url;

use crate::{
    core::{
        body::{RequestBody, TEXT_PLAIN},
        context::{MatchedRoute, RequestContext},
        error::{HandlerError, HttpError},
        route_table::RouteTable,
    },
    ports::{
        request_logger::{RequestLogEntry, RequestLogger},
        static_files::StaticFiles,
    },
};

/// Default request body limit (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Fixed CORS header set attached to every response.
#[derive(Debug, Clone)]
pub struct CorsHeaders {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
}

impl CorsHeaders {
    pub fn new(origin: &str, methods: &str, headers: &str) -> eyre::Result<Self> {
        let value = |name: &str, raw: &str| {
            HeaderValue::from_str(raw).map_err(|e| eyre!("invalid CORS {name} '{raw}': {e}"))
        };
        Ok(Self {
            allow_origin: value("origin", origin)?,
            allow_methods: value("methods", methods)?,
            allow_headers: value("headers", headers)?,
        })
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.allow_origin.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allow_methods.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            self.allow_headers.clone(),
        );
    }
}

impl Default for CorsHeaders {
    fn default() -> Self {
        Self {
            allow_origin: HeaderValue::from_static("*"),
            allow_methods: HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
            allow_headers: HeaderValue::from_static("*"),
        }
    }
}

/// Routes every request through the fixed processing pipeline.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    static_files: Option<Arc<dyn StaticFiles>>,
    request_logger: Option<Arc<dyn RequestLogger>>,
    cors: CorsHeaders,
    max_body_bytes: usize,
    default_authority: String,
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteTable>) -> Self {
        Self {
            routes,
            static_files: None,
            request_logger: None,
            cors: CorsHeaders::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            default_authority: "localhost".to_string(),
        }
    }

    /// Serve files from here when no route matches.
    pub fn with_static_files(mut self, static_files: Arc<dyn StaticFiles>) -> Self {
        self.static_files = Some(static_files);
        self
    }

    pub fn with_request_logger(mut self, logger: Arc<dyn RequestLogger>) -> Self {
        self.request_logger = Some(logger);
        self
    }

    pub fn with_cors(mut self, cors: CorsHeaders) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Authority used to build request URLs when the client sent no `Host`.
    pub fn with_default_authority(mut self, authority: impl Into<String>) -> Self {
        self.default_authority = authority.into();
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Handle one request. Never fails: faults become error responses.
    pub async fn dispatch(&self, req: Request<Body>, client: Option<SocketAddr>) -> Response<Body> {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let url = self.request_url(&parts);

        let (mut response, error) = if parts.method == Method::OPTIONS {
            (Response::new(Body::empty()), None)
        } else {
            let result = match &url {
                Ok(url) => self.process(&parts, url, body).await,
                Err(e) => Err(HandlerError::from(e.clone())),
            };
            match result {
                Ok(response) => (response, None),
                Err(error) => {
                    let response = self.recover(&parts, url.as_ref().ok(), &error).await;
                    (response, Some(error))
                }
            }
        };

        self.cors.apply(response.headers_mut());

        let url_text = url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|_| parts.uri.to_string());
        tracing::debug!(
            "{} {} -> {} in {:?}",
            parts.method,
            url_text,
            response.status(),
            started.elapsed()
        );
        self.log_request(
            client,
            &parts.method,
            &url_text,
            &response,
            error.as_ref(),
            started.elapsed(),
        );

        response
    }

    async fn process(
        &self,
        parts: &Parts,
        url: &Url,
        body: Body,
    ) -> Result<Response<Body>, HandlerError> {
        let path = urlencoding::decode(parts.uri.path())
            .map_err(|_| HttpError::bad_request("request path is not valid UTF-8"))?;

        let Some(found) = self.routes.find(&path, &parts.method) else {
            return self.serve_static(&parts.method, &path).await;
        };

        let bytes = self.read_body(body).await?;
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        let decoded = RequestBody::decode(bytes, content_type)?;

        let ctx = RequestContext::new(url.clone(), parts.method.clone())
            .with_headers(parts.headers.clone())
            .with_body(decoded)
            .with_route(MatchedRoute {
                path: found.route.template().to_string(),
                vars: found.vars,
            });

        found.route.handler().invoke(ctx).await?.encode()
    }

    async fn serve_static(&self, method: &Method, path: &str) -> Result<Response<Body>, HandlerError> {
        let readable = *method == Method::GET || *method == Method::HEAD;
        let Some(static_files) = self.static_files.as_ref().filter(|_| readable) else {
            return Err(HttpError::not_found(format!("{path} not found")).into());
        };

        let file = static_files
            .serve(path)
            .await
            .map_err(HttpError::from)?;

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, file.content_type)
            .body(Body::from(file.bytes))
            .map_err(|e| eyre!("failed to build static file response: {e}"))?)
    }

    async fn read_body(&self, body: Body) -> Result<Bytes, HandlerError> {
        match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(HttpError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("request body exceeds {} bytes", self.max_body_bytes),
            )
            .into()),
            Err(e) => Err(eyre!("failed to read request body: {e}").into()),
        }
    }

    /// Error recovery: log, try the `/errors/{status}` route, else plain text.
    async fn recover(
        &self,
        parts: &Parts,
        url: Option<&Url>,
        error: &HandlerError,
    ) -> Response<Body> {
        let status = error.status();
        let message = error.message();

        match error {
            HandlerError::Internal(report) => {
                tracing::error!(
                    "Unhandled fault while serving {} {}: {:?}",
                    parts.method,
                    parts.uri,
                    report
                );
            }
            _ => tracing::debug!("{} {} failed: {}", parts.method, parts.uri, error),
        }

        if let Some(url) = url {
            if let Some(response) = self.render_error_route(url, status, &message).await {
                return response;
            }
        }

        plain_error_response(status, message)
    }

    async fn render_error_route(
        &self,
        url: &Url,
        status: StatusCode,
        message: &str,
    ) -> Option<Response<Body>> {
        let error_path = format!("/errors/{}", status.as_u16());
        let found = self.routes.find(&error_path, &Method::GET)?;
        let template = found.route.template().to_string();

        let ctx = RequestContext::new(url.clone(), Method::GET)
            .with_body(RequestBody::Text(message.to_string()))
            .with_route(MatchedRoute {
                path: template.clone(),
                vars: found.vars,
            });

        let rendered = match found.route.handler().invoke(ctx).await {
            Ok(response) => response.with_status(status).encode(),
            Err(e) => Err(e),
        };

        match rendered {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::error!("Error route {} failed: {:?}", template, e);
                None
            }
        }
    }

    /// Request URL from the `Host` authority plus the routed path and query.
    /// A `Host` that is not a bare authority is replaced by the default one.
    fn request_url(&self, parts: &Parts) -> Result<Url, HttpError> {
        let mut url = parts
            .headers
            .get(header::HOST)
            .and_then(|host| host.to_str().ok())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .and_then(authority_url)
            .or_else(|| authority_url(&self.default_authority))
            .ok_or_else(|| {
                HttpError::bad_request(format!(
                    "invalid request authority '{}'",
                    self.default_authority
                ))
            })?;

        url.set_path(parts.uri.path());
        url.set_query(parts.uri.query());
        Ok(url)
    }

    fn log_request(
        &self,
        client: Option<SocketAddr>,
        method: &Method,
        url: &str,
        response: &Response<Body>,
        error: Option<&HandlerError>,
        elapsed: Duration,
    ) {
        if let Some(logger) = &self.request_logger {
            logger.log(&RequestLogEntry {
                client,
                method,
                url,
                status: response.status(),
                error,
                elapsed,
            });
        }
    }
}

fn authority_url(authority: &str) -> Option<Url> {
    let url = Url::parse(&format!("http://{authority}/")).ok()?;
    let bare = url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none()
        && url.username().is_empty()
        && url.password().is_none();
    bare.then_some(url)
}

fn plain_error_response(status: StatusCode, message: String) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}
