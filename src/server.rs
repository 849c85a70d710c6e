use std::{future::IntoFuture, net::SocketAddr, sync::Arc};

use eyre::{Result, WrapErr};
use tokio::net::TcpListener;

use crate::{
    adapters::{FileSystemAdapter, HttpHandler, TracingRequestLogger},
    config::models::ServerConfig,
    core::{CorsHeaders, Dispatcher, HandlerRegistry, RouteSource, RouteTable},
    utils::graceful_shutdown::{GracefulShutdown, ShutdownReason},
};

/// Discover the route table described by `config`, resolving handlers in `registry`.
pub fn build_route_table(config: &ServerConfig, registry: HandlerRegistry) -> Result<RouteTable> {
    let source = RouteSource::Directory {
        root: config.routes.clone(),
        extension: config.route_extension.clone(),
        registry,
    };
    let routes = RouteTable::build(source).wrap_err_with(|| {
        format!(
            "Failed to build route table from {}",
            config.routes.display()
        )
    })?;

    if routes.is_empty() {
        tracing::warn!("No route files found in {}", config.routes.display());
    } else if routes.load_error_count() > 0 {
        tracing::warn!(
            "{} of {} routes failed to load and will answer 500",
            routes.load_error_count(),
            routes.len()
        );
    }
    Ok(routes)
}

/// Wire a dispatcher from configuration.
pub fn build_dispatcher(config: &ServerConfig, registry: HandlerRegistry) -> Result<Dispatcher> {
    let routes = build_route_table(config, registry)?;
    let cors = CorsHeaders::new(
        &config.cors.allow_origin,
        &config.cors.allow_methods,
        &config.cors.allow_headers,
    )
    .wrap_err("Invalid CORS configuration")?;

    let mut dispatcher = Dispatcher::new(Arc::new(routes))
        .with_cors(cors)
        .with_max_body_bytes(config.max_body_bytes)
        .with_default_authority(config.listen_addr());

    if let Some(static_root) = &config.static_root {
        tracing::info!("Serving static files from {}", static_root.display());
        dispatcher = dispatcher.with_static_files(Arc::new(FileSystemAdapter::new(static_root)));
    }
    if config.access_log {
        dispatcher = dispatcher.with_request_logger(Arc::new(TracingRequestLogger::new()));
    }
    Ok(dispatcher)
}

/// Serve on an already bound listener until `shutdown` fires and connections drain.
pub async fn serve_listener(
    listener: TcpListener,
    dispatcher: Dispatcher,
    shutdown: Arc<GracefulShutdown>,
) -> Result<ShutdownReason> {
    let local_addr = listener
        .local_addr()
        .wrap_err("Failed to read listener address")?;
    let app = HttpHandler::new(Arc::new(dispatcher)).into_router();

    let mut token = shutdown.shutdown_token();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        token.wait_for_shutdown().await;
    });

    tracing::info!("Listening on http://{local_addr}");
    let reason = shutdown.run_until_drained(server.into_future()).await?;
    tracing::info!("Server stopped ({:?})", reason);
    Ok(reason)
}

/// Bind `hostname:port` and serve until SIGINT or SIGTERM.
pub async fn run(config: &ServerConfig, dispatcher: Dispatcher) -> Result<()> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {addr}"))?;

    let shutdown = Arc::new(GracefulShutdown::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {:?}", e);
        }
    });

    serve_listener(listener, dispatcher, shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::builtin::builtin_registry;

    #[test]
    fn test_build_dispatcher_from_directory() {
        let routes = TempDir::new().unwrap();
        std::fs::create_dir_all(routes.path().join("hello-world")).unwrap();
        std::fs::write(routes.path().join("hello-world/GET.route"), "").unwrap();
        std::fs::write(routes.path().join("missing.route"), "").unwrap();
        std::fs::create_dir_all(routes.path().join("bad/{not-valid}")).unwrap();
        std::fs::write(routes.path().join("bad/{not-valid}/GET.route"), "").unwrap();

        let config = ServerConfig {
            routes: routes.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let dispatcher = build_dispatcher(&config, builtin_registry()).unwrap();
        assert_eq!(dispatcher.routes().len(), 2);
        assert_eq!(dispatcher.routes().load_error_count(), 1);
    }

    #[test]
    fn test_empty_routes_directory_builds_empty_table() {
        let routes = TempDir::new().unwrap();
        let config = ServerConfig {
            routes: routes.path().to_path_buf(),
            ..ServerConfig::default()
        };
        assert!(build_route_table(&config, builtin_registry()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_routes_directory_fails() {
        let config = ServerConfig {
            routes: "/definitely/not/here".into(),
            ..ServerConfig::default()
        };
        assert!(build_dispatcher(&config, builtin_registry()).is_err());
    }

    #[tokio::test]
    async fn test_serve_listener_stops_on_shutdown() {
        let routes = TempDir::new().unwrap();
        let config = ServerConfig {
            routes: routes.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let dispatcher = build_dispatcher(&config, builtin_registry()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = Arc::new(GracefulShutdown::new());

        let server = tokio::spawn(serve_listener(listener, dispatcher, shutdown.clone()));
        tokio::task::yield_now().await;
        shutdown.trigger_shutdown(ShutdownReason::Graceful);

        let reason = server.await.unwrap().unwrap();
        assert_eq!(reason, ShutdownReason::Graceful);
    }
}
