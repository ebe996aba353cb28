use actix_web::{web, HttpResponse, Responder};
use skymesh_types::ServiceStatus;

use crate::bluesky::PollerState;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/status").route(web::get().to(get_status)));
}

fn service_status(state: &AppState) -> ServiceStatus {
    let poller = state.poller_status.read().clone();
    ServiceStatus {
        running: poller.state != PollerState::Stopped,
        uptime_secs: state.started_at.elapsed().as_secs(),
        handle: poller.handle.unwrap_or_else(|| state.handle.clone()),
        poller_state: poller.state.as_str().to_string(),
        watermark: poller.watermark,
        poll_interval_ms: state.poll_interval_ms,
        stats: state.conversations.stats(),
    }
}

async fn get_status(state: web::Data<AppState>) -> impl Responder {
    let status = service_status(&state);
    let poller = state.poller_status.read().clone();

    HttpResponse::Ok().json(serde_json::json!({
        "status": status,
        "poller": poller,
        "dashboard_clients": state.broadcaster.client_count(),
    }))
}
