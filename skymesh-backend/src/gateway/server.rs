use crate::gateway::methods;
use crate::gateway::protocol::{GatewayEvent, RpcError, RpcRequest, RpcResponse};
use crate::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{Message, Session};
use futures_util::StreamExt;
use serde::Serialize;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(ws_handler)));
}

/// Upgrade to a WebSocket, send history and the handle, then forward
/// broadcasts and answer RPC requests until the client goes away
async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let peer = req
        .connection_info()
        .peer_addr()
        .unwrap_or("unknown")
        .to_string();
    log::info!("Dashboard client connected from {}", peer);

    let (client_id, mut event_rx) = state.broadcaster.subscribe();

    actix_web::rt::spawn(async move {
        let greeting = [
            GatewayEvent::history(&state.conversations.snapshot()),
            GatewayEvent::handle_update(&state.handle),
        ];
        for event in &greeting {
            if send_json(&mut session, event).await.is_err() {
                state.broadcaster.unsubscribe(&client_id);
                return;
            }
        }

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        log::debug!("Dashboard client {} was dropped by the broadcaster", client_id);
                        break;
                    };
                    if send_json(&mut session, &event).await.is_err() {
                        break;
                    }
                }
                msg = msg_stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let response = process_request(&text, &state).await;
                            if send_json(&mut session, &response).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(bytes))) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            log::error!("WebSocket error from {}: {}", peer, e);
                            break;
                        }
                    }
                }
            }
        }

        state.broadcaster.unsubscribe(&client_id);
        let _ = session.close(None).await;
        log::info!("Dashboard client {} disconnected", peer);
    });

    Ok(response)
}

async fn send_json<T: Serialize>(session: &mut Session, payload: &T) -> Result<(), actix_ws::Closed> {
    match serde_json::to_string(payload) {
        Ok(json) => session.text(json).await,
        Err(e) => {
            log::error!("Failed to encode dashboard message: {}", e);
            Ok(())
        }
    }
}

pub(crate) async fn process_request(text: &str, state: &AppState) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(_) => {
            return RpcResponse::error("".to_string(), RpcError::parse_error());
        }
    };

    let id = request.id.clone();

    match dispatch_method(&request, state).await {
        Ok(value) => RpcResponse::success(id, value),
        Err(error) => RpcResponse::error(id, error),
    }
}

async fn dispatch_method(
    request: &RpcRequest,
    state: &AppState,
) -> Result<serde_json::Value, RpcError> {
    match request.method.as_str() {
        "ping" => methods::handle_ping().await,
        "get_handle" => methods::handle_get_handle(&state.handle).await,
        "get_history" => methods::handle_get_history(&state.conversations).await,
        _ => Err(RpcError::method_not_found()),
    }
}
