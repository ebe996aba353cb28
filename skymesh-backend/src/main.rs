use actix_cors::Cors;
use actix_files::Files;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

mod agent_mesh;
mod bluesky;
mod bridge;
mod config;
mod controllers;
mod conversations;
mod dashboard;
mod gateway;
mod http;
mod text;
mod threading;

use agent_mesh::AgentMeshClient;
use bluesky::poller::{PollerStatus, SharedPollerStatus};
use bluesky::{BlueskyError, BlueskySession, MentionPoller, PollerHandle};
use bridge::MentionBridge;
use config::{BridgeConfig, Config};
use conversations::ConversationStore;
use gateway::EventBroadcaster;
use threading::ReplyPublisher;

pub struct AppState {
    /// Handle shown on the dashboard
    pub handle: String,
    pub conversations: Arc<ConversationStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub poller_status: SharedPollerStatus,
    pub started_at: Instant,
    pub poll_interval_ms: u64,
}

/// Poller task plus the session it is logged in with
struct RunningBridge {
    poller: PollerHandle,
    session: Arc<BlueskySession>,
}

impl RunningBridge {
    async fn shutdown(self) {
        match self.session.identity() {
            Some(identity) => log::info!("Stopping mention poller for @{}", identity.handle),
            None => log::info!("Stopping mention poller"),
        }
        self.poller.stop().await;
        if let Err(e) = self.session.logout().await {
            log::warn!("Bluesky: Logout failed: {}", e);
        }
    }
}

async fn start_bridge(
    config: &BridgeConfig,
    conversations: Arc<ConversationStore>,
    broadcaster: Arc<EventBroadcaster>,
    poller_status: SharedPollerStatus,
) -> Result<RunningBridge, BlueskyError> {
    let client = http::shared_client().clone();

    let session = Arc::new(BlueskySession::new(
        client.clone(),
        &config.bluesky.service,
        &config.bluesky.handle,
        &config.bluesky.app_password,
    ));

    let answerer = Arc::new(AgentMeshClient::new(
        client,
        &config.agent_mesh.api_url,
        config.agent_mesh.timeout,
    ));
    log::info!("Answering questions with Agent Mesh at {}", answerer.api_url());

    let publisher = ReplyPublisher::new(session.clone(), config.pacing, config.langs.clone())
        .with_refetch_chain_parents(config.refetch_chain_parents);

    let bridge = Arc::new(MentionBridge::new(
        answerer,
        publisher,
        conversations,
        broadcaster,
        config.limits,
    ));

    let poller = MentionPoller::new(session.clone(), bridge, config.poller)
        .with_status(poller_status)
        .start()
        .await?;

    Ok(RunningBridge { poller, session })
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(std::io::Error::other)?;
    let port = config.port;

    let conversations = Arc::new(ConversationStore::new(config.history_limit));
    let broadcaster = Arc::new(EventBroadcaster::new());
    let poller_status: SharedPollerStatus = Arc::new(RwLock::new(PollerStatus::default()));

    // The dashboard runs even when the bridge cannot start
    let (bridge, poll_interval_ms) = match BridgeConfig::from_env() {
        Ok(bridge_config) => {
            let interval_ms = bridge_config.poller.interval.as_millis() as u64;
            let started = start_bridge(
                &bridge_config,
                conversations.clone(),
                broadcaster.clone(),
                poller_status.clone(),
            )
            .await;
            match started {
                Ok(running) => (Some(running), interval_ms),
                Err(e) => {
                    log::error!("Failed to start mention poller: {}", e);
                    (None, interval_ms)
                }
            }
        }
        Err(e) => {
            log::warn!("Mention poller disabled: {}", e);
            (None, 0)
        }
    };

    match &config.dashboard_dir {
        Some(dir) => log::info!("Serving dashboard from: {}", dir),
        None => log::info!("Serving built-in dashboard"),
    }
    log::info!("Starting skymesh dashboard on port {} as @{}", port, config.handle);

    let started_at = Instant::now();
    let handle = config.handle.clone();
    let dashboard_dir = config.dashboard_dir.clone();
    let store = conversations.clone();
    let events = broadcaster.clone();
    let status = poller_status.clone();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let app = App::new()
            .app_data(web::Data::new(AppState {
                handle: handle.clone(),
                conversations: Arc::clone(&store),
                broadcaster: Arc::clone(&events),
                poller_status: Arc::clone(&status),
                started_at,
                poll_interval_ms,
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::conversations::config)
            .configure(controllers::status::config)
            .configure(gateway::server::config);

        match &dashboard_dir {
            Some(dir) => app.service(Files::new("/", dir.clone()).index_file("index.html")),
            None => app.configure(dashboard::config),
        }
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    if let Some(running) = bridge {
        running.shutdown().await;
    }

    server
}
