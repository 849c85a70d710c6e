//! Demonstration handlers shipped with the binary.
//!
//! Each handler is registered under the template of its route file in the
//! `routes/` directory at the repository root.

use std::{collections::BTreeMap, time::Duration, time::SystemTime};

use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::core::{
    HandlerRegistry, HandlerResponse, HandlerResult, HttpError, RequestBody, RequestContext,
    SseChannel,
};

/// Interval between two events of `/server-sent-events`
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Registry holding every demonstration handler.
pub fn builtin_registry() -> HandlerRegistry {
    let board = MessageBoard::new(64);
    let post_board = board.clone();

    HandlerRegistry::new()
        .with("/hello-world/GET", hello_world)
        .with("/params/{route}/POST", params)
        .with("/querytype/POST", query_type)
        .with("/server-sent-events/GET", server_sent_events)
        .with("/errors/{status}/GET", error_page)
        .with("/demo/{name}/GET", move |ctx: RequestContext| {
            let board = board.clone();
            async move { board.subscribe(ctx) }
        })
        .with("/demo/{name}/POST", move |ctx: RequestContext| {
            let board = post_board.clone();
            async move { board.post(ctx) }
        })
}

async fn hello_world(_ctx: RequestContext) -> HandlerResult {
    HandlerResponse::json(&json!({ "message": "Hello World" }))
}

/// Echoes query, body and path variables back as JSON.
async fn params(ctx: RequestContext) -> HandlerResult {
    // Later duplicates win, like building an object from the pairs
    let url_params: BTreeMap<String, String> = ctx.query_pairs().into_iter().collect();
    let path_params: BTreeMap<&String, &String> = ctx.route.vars.iter().collect();

    HandlerResponse::json(&json!({
        "urlParams": url_params,
        "bodyParams": ctx.body.to_json().unwrap_or(Value::Null),
        "pathParams": path_params,
    }))
}

/// Names the kind of body the request was decoded into.
async fn query_type(ctx: RequestContext) -> HandlerResult {
    Ok(HandlerResponse::text(body_kind(&ctx.body)))
}

fn body_kind(body: &RequestBody) -> String {
    match body {
        RequestBody::Empty | RequestBody::Json(Value::Null) => "null".to_string(),
        RequestBody::Text(_) | RequestBody::Json(Value::String(_)) => "String".to_string(),
        RequestBody::Json(Value::Bool(_)) => "Boolean".to_string(),
        RequestBody::Json(Value::Number(_)) => "Number".to_string(),
        RequestBody::Json(Value::Array(_)) => "Array".to_string(),
        RequestBody::Json(Value::Object(_)) => "Object".to_string(),
        RequestBody::Form(_) => "URLSearchParams".to_string(),
        RequestBody::Binary(_) => "Uint8Array".to_string(),
        RequestBody::Blob(blob) => blob.mime.clone(),
    }
}

/// Streams `{"count": n}` as `event_name` events until the client leaves.
async fn server_sent_events(_ctx: RequestContext) -> HandlerResult {
    let channel = SseChannel::new();
    let sender = channel.sender();

    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        // The first tick completes immediately
        interval.tick().await;

        let mut count: u64 = 0;
        loop {
            interval.tick().await;
            if sender
                .send(&json!({ "count": count }), Some("event_name"))
                .is_err()
            {
                break;
            }
            count += 1;
        }
    });
    channel.on_close(move || ticker.abort());

    Ok(HandlerResponse::stream(channel))
}

/// Renders `/errors/{status}`; the body carries the error message as text.
async fn error_page(ctx: RequestContext) -> HandlerResult {
    let status = ctx.var("status").unwrap_or_default();
    let message = ctx.body.as_text().unwrap_or_default();

    HandlerResponse::json(&json!({
        "status": status.parse::<u16>().ok(),
        "error": message,
        "path": ctx.url.path(),
    }))
}

/// In-memory message board behind `/demo/{name}`.
#[derive(Clone)]
struct MessageBoard {
    tx: broadcast::Sender<Value>,
}

impl MessageBoard {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    fn post(&self, ctx: RequestContext) -> HandlerResult {
        let name = ctx.var("name").unwrap_or_default().to_string();
        if name == "foo" {
            return Err(HttpError::bad_request("Parameter name can't be equal to \"foo\".").into());
        }

        let message = ctx
            .body
            .as_json()
            .and_then(|body| body.get("message"))
            .cloned()
            .unwrap_or(Value::Null);
        let timestamp = humantime::format_rfc3339_millis(SystemTime::now()).to_string();
        let entry = json!({ "timestamp": timestamp, "name": name, "message": message });

        // No subscriber is not an error
        let delivered = self.tx.send(entry.clone()).unwrap_or(0);
        tracing::debug!(name = %name, delivered, "demo message posted");

        HandlerResponse::json(&json!({ "answer": "OK", "message": entry }))
    }

    /// Streams the messages posted under the same name as `message` events.
    fn subscribe(&self, ctx: RequestContext) -> HandlerResult {
        let name = ctx.var("name").unwrap_or_default().to_string();
        let mut messages = self.tx.subscribe();
        let channel = SseChannel::new();
        let sender = channel.sender();

        let forwarder = tokio::spawn(async move {
            loop {
                let entry = tokio::select! {
                    _ = sender.closed() => break,
                    received = messages.recv() => match received {
                        Ok(entry) => entry,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "demo subscriber lagging");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };

                if entry.get("name").and_then(Value::as_str) != Some(name.as_str()) {
                    continue;
                }
                if sender.send(&entry, Some("message")).is_err() {
                    break;
                }
            }
        });
        channel.on_close(move || forwarder.abort());

        Ok(HandlerResponse::stream(channel))
    }
}
