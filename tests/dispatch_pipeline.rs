// End-to-end tests driving the axum router over the shipped `routes/` directory
#[cfg(test)]
mod test {
    use std::{path::PathBuf, sync::Arc, time::Duration};

    use axum::{
        Router,
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use vshs::{
        HttpHandler, builtin::builtin_registry, config::ServerConfig, server::build_dispatcher,
    };

    fn routes_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("routes")
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            routes: routes_dir(),
            access_log: false,
            ..ServerConfig::default()
        }
    }

    fn app_with(config: ServerConfig) -> Router {
        let dispatcher = build_dispatcher(&config, builtin_registry()).unwrap();
        HttpHandler::new(Arc::new(dispatcher)).into_router()
    }

    fn app() -> Router {
        app_with(test_config())
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "localhost:8080")
            .body(Body::empty())
            .unwrap()
    }

    fn request_with_body(method: Method, uri: &str, content_type: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "localhost:8080")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn content_type(response: &axum::response::Response) -> Option<&str> {
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_hello_world() {
        let response = app()
            .oneshot(request(Method::GET, "/hello-world"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(content_type(&response), Some("application/json"));
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert_eq!(
            body_text(response).await,
            "{\n    \"message\": \"Hello World\"\n}"
        );
    }

    #[tokio::test]
    async fn test_params_echo() {
        let response = app()
            .oneshot(request_with_body(
                Method::POST,
                "/params/C?url=B",
                "text/plain;charset=UTF-8",
                r#"{"body": "A"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(
            body,
            json!({
                "urlParams": {"url": "B"},
                "bodyParams": {"body": "A"},
                "pathParams": {"route": "C"},
            })
        );
    }

    #[tokio::test]
    async fn test_querytype_reports_decoded_body() {
        let cases = [
            ("text/plain", "hello", "String"),
            ("text/plain", r#"{"a": 1}"#, "Object"),
            ("application/x-www-form-urlencoded", "a=1&b=2", "URLSearchParams"),
            ("application/octet-stream", "raw", "Uint8Array"),
            ("image/png", "png", "image/png"),
        ];

        for (mime, payload, expected) in cases {
            let response = app()
                .oneshot(request_with_body(Method::POST, "/querytype", mime, payload))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{mime}");
            assert_eq!(content_type(&response), Some("text/plain"));
            assert_eq!(body_text(response).await, expected, "{mime}");
        }

        let response = app()
            .oneshot(request(Method::POST, "/querytype"))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "null");
    }

    #[tokio::test]
    async fn test_unknown_route_rendered_by_error_route() {
        let response = app()
            .oneshot(request(Method::GET, "/nope"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(content_type(&response), Some("application/json"));
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], 404);
        assert_eq!(body["path"], "/nope");
        assert_eq!(body["error"], "/nope not found");
    }

    #[tokio::test]
    async fn test_wrong_method_is_not_found() {
        let response = app()
            .oneshot(request(Method::DELETE, "/hello-world"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_handler_http_error_keeps_status() {
        let response = app()
            .oneshot(request_with_body(
                Method::POST,
                "/demo/foo",
                "application/json",
                r#"{"message": "hi"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "Parameter name can't be equal to \"foo\".");
    }

    #[tokio::test]
    async fn test_malformed_json_is_internal_error() {
        let app = app();
        let response = app
            .clone()
            .oneshot(request_with_body(
                Method::POST,
                "/params/x",
                "application/json",
                "{not json",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // The server keeps serving
        let response = app
            .oneshot(request(Method::GET, "/hello-world"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_options_short_circuit() {
        let response = app()
            .oneshot(request(Method::OPTIONS, "/anything/at/all"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, PATCH, DELETE, OPTIONS"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_server_sent_events_stream() {
        let response = app()
            .oneshot(request(Method::GET, "/server-sent-events"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(content_type(&response), Some("text/event-stream"));

        let mut body = response.into_body();
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("no event within 5s")
            .expect("stream ended")
            .unwrap();
        let data = frame.into_data().unwrap();
        assert_eq!(&data[..], b"event: event_name\ndata: {\"count\":0}\n\n");
    }

    #[tokio::test]
    async fn test_static_fallback() {
        let public = TempDir::new().unwrap();
        std::fs::write(public.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(public.path().join("app.js"), "let x = 1;").unwrap();

        let app = app_with(ServerConfig {
            static_root: Some(public.path().to_path_buf()),
            ..test_config()
        });

        let response = app.clone().oneshot(request(Method::GET, "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(content_type(&response), Some("text/html"));
        assert_eq!(body_text(response).await, "<h1>home</h1>");

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/app.js"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(content_type(&response).unwrap().ends_with("javascript"));

        let response = app
            .oneshot(request(Method::GET, "/missing.css"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let app = app_with(ServerConfig {
            max_body_bytes: 8,
            ..test_config()
        });

        let response = app
            .oneshot(request_with_body(
                Method::POST,
                "/params/x",
                "text/plain",
                "this body is longer than eight bytes",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
