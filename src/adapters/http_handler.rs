use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
    http::HeaderValue,
    routing::any,
};
use hyper::Response;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::{core::Dispatcher, tracing_setup};

/// HTTP handler bridging axum to the request dispatcher
#[derive(Clone)]
pub struct HttpHandler {
    dispatcher: Arc<Dispatcher>,
}

impl HttpHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Main request handler: runs the dispatcher inside a request span
    pub async fn handle_request(
        &self,
        req: Request,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let request_id = Uuid::new_v4().to_string();
        let span =
            tracing_setup::create_request_span(req.method().as_str(), req.uri().path(), &request_id);

        let mut response = self
            .dispatcher
            .dispatch(req, client_addr)
            .instrument(span.clone())
            .await;
        span.record("http.status_code", response.status().as_u16());

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }

    /// Axum router sending every path and method to this handler.
    ///
    /// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
    /// client address reaches the request logger.
    pub fn into_router(self) -> Router {
        let handler = Arc::new(self);
        Router::new()
            .fallback(any(move |req: Request| {
                let handler = handler.clone();
                async move {
                    // Present when served through into_make_service_with_connect_info
                    let client_addr = req
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| *addr);
                    Ok::<Response<AxumBody>, Infallible>(
                        handler.handle_request(req, client_addr).await,
                    )
                }
            }))
            .layer(TraceLayer::new_for_http())
    }
}
