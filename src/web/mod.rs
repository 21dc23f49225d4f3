mod api;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::info;

use crate::{
    encyclopedia::Encyclopedia,
    sanctuary::{AttractionEvent, Sanctuary},
};

pub use api::{ApiError, CurrentUser, USER_HEADER};

pub struct AppState {
    pub sanctuary: Arc<Sanctuary>,
    pub encyclopedia: Option<Arc<Encyclopedia>>,
    events: broadcast::Sender<AttractionEvent>,
}

impl AppState {
    pub fn new(sanctuary: Arc<Sanctuary>, encyclopedia: Option<Arc<Encyclopedia>>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            sanctuary,
            encyclopedia,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttractionEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: AttractionEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::banner))
        .route("/api/auth/ping", get(api::auth_ping))
        .route("/api/auth/logout", post(api::logout))
        .route("/api/auth/users", get(api::list_users))
        .route(
            "/api/auth/users/:id",
            put(api::rename_user).delete(api::delete_user),
        )
        .route("/api/economy/ping", get(api::economy_ping))
        .route("/api/users", post(api::register))
        .route("/api/birds", get(api::list_birds))
        .route("/api/birds/ping", get(api::birds_ping))
        .route("/api/birds/encyclopedia", get(api::encyclopedia))
        .route("/api/birds/:id", get(api::get_bird))
        .route("/api/accessories", get(api::list_accessories))
        .route("/api/accessories/:id", get(api::get_accessory))
        .route("/api/food", get(api::list_food))
        .route("/api/food/:id", get(api::get_food))
        .route("/api/shop/accessories", get(api::shop_accessories))
        .route("/api/shop/food", get(api::shop_food))
        .route("/api/shop/inventory", get(api::inventory))
        .route("/api/yard", get(api::get_yard).post(api::create_yard))
        .route("/api/yard/accessory", post(api::place_accessory))
        .route("/api/yard/food", post(api::place_food))
        .route("/api/yard/attract", post(api::attract))
        .route("/api/yard/purchase", post(api::purchase))
        .route("/api/yard/coins", get(api::coins))
        .route("/api/yard/earn-coins", post(api::earn_coins))
        .route("/api/yard/events", get(api::yard_events))
        .with_state(state)
}

pub async fn run(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("bird sanctuary API listening on http://{addr} (Ctrl+C to stop)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
