//! Read-only view of the conversation history for HTTP clients.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use skymesh_types::{ApiResponse, Conversation, ConversationStatus};

use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/conversations")
            .route("", web::get().to(list_conversations))
            .route("/{id}", web::get().to(get_conversation)),
    );
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<ConversationStatus>,
    limit: Option<usize>,
}

async fn list_conversations(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let conversations: Vec<Conversation> = state
        .conversations
        .snapshot()
        .into_iter()
        .filter(|c| query.status.is_none_or(|s| c.status == s))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    HttpResponse::Ok().json(ApiResponse::ok(conversations))
}

async fn get_conversation(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.conversations.get(&id) {
        Some(conversation) => HttpResponse::Ok().json(ApiResponse::ok(conversation)),
        None => HttpResponse::NotFound()
            .json(ApiResponse::<()>::err(format!("Conversation {} not found", id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use chrono::Utc;

    fn seeded_state() -> web::Data<AppState> {
        let state = crate::test_support::app_state("bot.example.com");
        for id in ["a", "b", "c"] {
            let mut conversation = Conversation::processing(
                id,
                &format!("at://did:plc:alice/app.bsky.feed.post/{}", id),
                "alice.bsky.social",
                "why?",
                Utc::now(),
            );
            if id == "b" {
                conversation.fail("boom");
            }
            state.conversations.upsert(conversation);
        }
        web::Data::new(state)
    }

    #[actix_web::test]
    async fn test_list_newest_first() {
        let app = test::init_service(App::new().app_data(seeded_state()).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/conversations").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success"], true);
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[actix_web::test]
    async fn test_filter_by_status() {
        let app = test::init_service(App::new().app_data(seeded_state()).configure(config)).await;
        let req = test::TestRequest::get()
            .uri("/api/conversations?status=error")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["id"], "b");
        assert_eq!(data[0]["error"], "boom");
    }

    #[actix_web::test]
    async fn test_unknown_conversation() {
        let app = test::init_service(App::new().app_data(seeded_state()).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/conversations/zzz").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }
}
