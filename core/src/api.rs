/// Chat REST API + SSE — HTTP surface for a UI frontend
///
/// Endpoints:
///   GET    /api/status
///   POST   /api/login                  body: {"user_id":"...","display_name":"..."}
///   POST   /api/logout
///   GET    /api/roster
///   PUT    /api/profile                body: {"display_name":"...","avatar_url":"..."}
///   GET    /api/conversations/:user_id   open + return the log
///   DELETE /api/conversations            close the open conversation
///   POST   /api/send                   body: {"to":"<id>","text":"..."}
///   POST   /api/edit                   body: {"conversation_id":"...","message_id":"...","text":"..."}
///   DELETE /api/messages/:conversation_id/:message_id
///   GET    /events                     SSE stream of ChatEvent JSON
use crate::client::ChatClient;
use crate::error::{ChatError, Result};
use crate::session::CurrentUser;
use crate::types::ChatEvent;
use futures_util::stream::{unfold, StreamExt};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

// ─── Type alias ──────────────────────────────────────────────────────────────

type BoxBody = http_body_util::combinators::BoxBody<bytes::Bytes, Infallible>;
type Resp = Response<BoxBody>;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn cors_headers(builder: hyper::http::response::Builder) -> hyper::http::response::Builder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
}

fn json_resp(status: StatusCode, body: Vec<u8>) -> Resp {
    cors_headers(Response::builder())
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(bytes::Bytes::from(body)).boxed())
        .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new()).boxed()))
}

fn json_ok(value: serde_json::Value) -> Resp {
    json_resp(StatusCode::OK, serde_json::to_vec(&value).unwrap_or_default())
}

fn json_err(status: StatusCode, msg: &str) -> Resp {
    json_resp(
        status,
        serde_json::to_vec(&serde_json::json!({ "error": msg })).unwrap_or_default(),
    )
}

fn error_resp(e: &ChatError) -> Resp {
    let status = match e {
        ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ChatError::Subscription(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_err(status, &e.to_string())
}

fn sse_resp(rx: tokio::sync::broadcast::Receiver<ChatEvent>) -> Resp {
    // Keepalive comment sent immediately so the client knows the connection is live
    let initial = bytes::Bytes::from(": connected\n\n");
    let first = futures_util::stream::once(async move {
        Ok::<Frame<bytes::Bytes>, Infallible>(Frame::data(initial))
    });

    let events = unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    let data = format!("data: {}\n\n", json);
                    let frame = Frame::data(bytes::Bytes::from(data));
                    return Some((Ok::<_, Infallible>(frame), rx));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    // Client is too slow — skip lagged events and continue
                    tracing::warn!("SSE client lagged {} events", n);
                    continue;
                }
                Err(_) => return None, // channel closed
            }
        }
    });

    let stream = first.chain(events);
    cors_headers(Response::builder())
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream; charset=utf-8")
        .header("Cache-Control", "no-cache")
        .header("X-Accel-Buffering", "no") // disable nginx buffering
        .body(StreamBody::new(stream).boxed())
        .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new()).boxed()))
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub async fn start_api(client: ChatClient, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(ChatError::Io)?;
    info!("Chat API started on http://{}", addr);

    let client = Arc::new(client);
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let io = TokioIo::new(stream);
                let client = client.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let client = client.clone();
                        async move { Ok::<_, Infallible>(handle(req, client).await) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        // Ignore client-disconnect errors (normal for SSE)
                        if !e.is_incomplete_message() {
                            error!("Chat API connection error: {:?}", e);
                        }
                    }
                });
            }
            Err(e) => error!("Chat API accept error: {}", e),
        }
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

async fn handle(req: Request<hyper::body::Incoming>, client: Arc<ChatClient>) -> Resp {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    // CORS preflight
    if method == Method::OPTIONS {
        return cors_headers(Response::builder())
            .status(StatusCode::NO_CONTENT)
            .body(Full::new(bytes::Bytes::new()).boxed())
            .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new()).boxed()));
    }

    match (method.clone(), path.as_str()) {
        (Method::GET, "/api/status") => get_status(&client).await,
        (Method::POST, "/api/login") => post_login(req, &client).await,
        (Method::POST, "/api/logout") => post_logout(&client).await,
        (Method::GET, "/api/roster") => get_roster(&client).await,
        (Method::PUT, "/api/profile") => put_profile(req, &client).await,
        (Method::DELETE, "/api/conversations") => delete_conversation(&client).await,
        (Method::POST, "/api/send") => post_send(req, &client).await,
        (Method::POST, "/api/edit") => post_edit(req, &client).await,
        (Method::GET, "/events") => get_sse(&client),
        _ => {
            // Dynamic segments
            if method == Method::GET && path.starts_with("/api/conversations/") {
                let user_id = path.trim_start_matches("/api/conversations/").to_string();
                return get_conversation(&user_id, &client).await;
            }
            if method == Method::DELETE && path.starts_with("/api/messages/") {
                let rest = path.trim_start_matches("/api/messages/");
                if let Some((conversation_id, message_id)) = rest.split_once('/') {
                    return delete_message(conversation_id, message_id, &client).await;
                }
                return json_err(
                    StatusCode::BAD_REQUEST,
                    "expected /api/messages/:conversation/:id",
                );
            }
            json_err(StatusCode::NOT_FOUND, "not found")
        }
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn get_status(client: &ChatClient) -> Resp {
    let user = client.current_user().await;
    let active = client.active_conversation().await;
    let state = client.sync_state().await;
    json_ok(serde_json::json!({
        "user": user,
        "active_conversation": active,
        "sync_state": state,
    }))
}

#[derive(Deserialize)]
struct LoginRequest {
    user_id: String,
    display_name: String,
}

async fn post_login(req: Request<hyper::body::Incoming>, client: &ChatClient) -> Resp {
    let body = match read_body(req).await {
        Ok(b) => b,
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("body read error: {}", e)),
    };
    let r: LoginRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("invalid JSON: {}", e)),
    };
    if r.user_id.trim().is_empty() {
        return json_err(StatusCode::BAD_REQUEST, "user_id is empty");
    }
    let user = CurrentUser {
        id: r.user_id,
        display_name: r.display_name,
    };
    match client.sign_in(user).await {
        Ok(profile) => json_ok(serde_json::json!({ "profile": profile })),
        Err(e) => error_resp(&e),
    }
}

async fn post_logout(client: &ChatClient) -> Resp {
    match client.logout().await {
        Ok(()) => json_ok(serde_json::json!({ "success": true })),
        Err(e) => error_resp(&e),
    }
}

async fn get_roster(client: &ChatClient) -> Resp {
    match client.fetch_roster() {
        Ok(users) => json_ok(serde_json::json!({ "users": users })),
        Err(e) => error_resp(&e),
    }
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    display_name: String,
    avatar_url: Option<String>,
}

async fn put_profile(req: Request<hyper::body::Incoming>, client: &ChatClient) -> Resp {
    let body = match read_body(req).await {
        Ok(b) => b,
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("body read error: {}", e)),
    };
    let r: UpdateProfileRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("invalid JSON: {}", e)),
    };
    let user = match client.current_user().await {
        Some(u) => u,
        None => return error_resp(&ChatError::Unauthenticated),
    };
    match client.update_profile(&user.id, &r.display_name, r.avatar_url) {
        Ok(true) => json_ok(serde_json::json!({ "success": true })),
        Ok(false) => json_err(StatusCode::NOT_FOUND, "profile not found"),
        Err(e) => error_resp(&e),
    }
}

async fn get_conversation(user_id: &str, client: &ChatClient) -> Resp {
    match client.open_conversation_with(user_id).await {
        Ok(key) => {
            let messages = client.log(&key).await;
            json_ok(serde_json::json!({
                "conversation_id": key,
                "messages": messages,
            }))
        }
        Err(e) => error_resp(&e),
    }
}

async fn delete_conversation(client: &ChatClient) -> Resp {
    client.close_conversation().await;
    json_ok(serde_json::json!({ "success": true }))
}

#[derive(Deserialize)]
struct SendRequest {
    to: String,
    text: String,
}

async fn post_send(req: Request<hyper::body::Incoming>, client: &ChatClient) -> Resp {
    let body = match read_body(req).await {
        Ok(b) => b,
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("body read error: {}", e)),
    };
    let r: SendRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("invalid JSON: {}", e)),
    };
    let user = match client.current_user().await {
        Some(u) => u,
        None => return error_resp(&ChatError::Unauthenticated),
    };
    let key = crate::conversation::conversation_key(&user.id, &r.to);
    match client.send(&key, &r.text, &r.to).await {
        Ok(outcome) => json_ok(serde_json::json!({
            "conversation_id": outcome.conversation_id,
            "message_id": outcome.message_id,
        })),
        Err(e) => error_resp(&e),
    }
}

#[derive(Deserialize)]
struct EditRequest {
    conversation_id: String,
    message_id: String,
    text: String,
}

async fn post_edit(req: Request<hyper::body::Incoming>, client: &ChatClient) -> Resp {
    let body = match read_body(req).await {
        Ok(b) => b,
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("body read error: {}", e)),
    };
    let r: EditRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("invalid JSON: {}", e)),
    };
    match client.edit(&r.conversation_id, &r.message_id, &r.text).await {
        Ok(()) => json_ok(serde_json::json!({ "success": true })),
        Err(e) => error_resp(&e),
    }
}

async fn delete_message(conversation_id: &str, message_id: &str, client: &ChatClient) -> Resp {
    match client.delete(conversation_id, message_id).await {
        Ok(()) => json_ok(serde_json::json!({ "success": true })),
        Err(e) => error_resp(&e),
    }
}

fn get_sse(client: &ChatClient) -> Resp {
    let rx = client.event_sender().subscribe();
    sse_resp(rx)
}

// ─── Utilities ────────────────────────────────────────────────────────────────

async fn read_body(
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<bytes::Bytes, String> {
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| e.to_string())
}
