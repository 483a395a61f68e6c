/**
 * API REST CARTOVM - Serveur HTTP principal du kernel
 *
 * RÔLE : Expose l'état de topologie et les actions du moteur au frontend.
 * Interface unique entre la surface de rendu (drag/resize/connect) et le
 * coordinateur.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, CORS permissif (dashboard servi depuis une autre origine)
 * - Lectures : /api/vms, /api/metrics, /api/graph servent le dernier état
 *   publié, y compris sous panne prolongée des backends (last-known-good)
 * - Actions : refresh manuel, reset, événements d'édition => commandes vers
 *   le coordinateur ; layout GET/POST/DELETE => store de persistance
 * - Erreurs HTTP standardisées : un échec d'écriture du layout rend 500,
 *   un refresh en échec rend 502, le graphe en mémoire reste intact
 */

use crate::coordinator::{CoordinatorHandle, TopologyState};
use crate::graph::{Edge, GraphNode, NodeSize, Position, SavedLayout};
use crate::layout_store::LayoutStore;
use crate::models::{MetricsByIp, Service};
use crate::prometheus::PrometheusService;
use crate::state::Shared;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub state: Shared<TopologyState>,
    pub store: Arc<dyn LayoutStore>,
    pub prometheus: Arc<PrometheusService>,
    pub coordinator: CoordinatorHandle,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/vms", get(get_vms))
        .route("/api/metrics", get(get_metrics))
        .route("/api/prometheus/status", get(prometheus_status))
        .route(
            "/api/layout",
            get(get_layout).post(save_layout).delete(delete_layout),
        )
        .route("/api/graph", get(get_graph))
        .route("/api/graph/reset", post(reset_graph))
        .route("/api/refresh", post(trigger_refresh))
        .route("/api/graph/nodes/{id}/position", post(move_node))
        .route("/api/graph/nodes/{id}/size", post(resize_node))
        .route("/api/graph/edges", post(connect_edge))
        .route("/api/graph/edges/{id}", delete(remove_edge))
        .with_state(app_state)
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct VmsView {
    services: Vec<Service>,
    #[serde(rename = "lastUpdated")]
    last_updated: Option<String>,
}

// GET /api/vms (dernier snapshot d'inventaire)
async fn get_vms(State(app): State<AppState>) -> Json<VmsView> {
    let current = app.state.lock();
    Json(VmsView {
        services: current.services.clone(),
        last_updated: current.last_inventory_sync.clone(),
    })
}

// GET /api/metrics (agrégats par IP)
async fn get_metrics(State(app): State<AppState>) -> Json<MetricsByIp> {
    Json(app.state.lock().metrics_by_ip.clone())
}

#[derive(Serialize)]
struct PrometheusStatusView {
    available: bool,
    url: Option<String>,
}

// GET /api/prometheus/status (joignabilité de la source de métriques)
async fn prometheus_status(State(app): State<AppState>) -> Json<PrometheusStatusView> {
    let available = app.prometheus.is_available().await;
    Json(PrometheusStatusView {
        available,
        url: app.prometheus.url().map(str::to_string),
    })
}

// GET /api/layout ({} si rien n'a jamais été sauvegardé)
async fn get_layout(State(app): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match app.store.read().await {
        Ok(Some(layout)) => {
            serde_json::to_value(&layout)
                .map(Json)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
        }
        Ok(None) => Ok(Json(json!({}))),
        Err(e) => {
            eprintln!("[layout] lecture en échec: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// POST /api/layout (remplace le document en bloc)
async fn save_layout(
    State(app): State<AppState>,
    Json(layout): Json<SavedLayout>,
) -> Result<Json<Value>, StatusCode> {
    match app.store.write(&layout).await {
        Ok(()) => Ok(Json(json!({"success": true}))),
        Err(e) => {
            eprintln!("[layout] écriture en échec: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// DELETE /api/layout
async fn delete_layout(State(app): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match app.store.clear().await {
        Ok(()) => Ok(Json(json!({"success": true}))),
        Err(e) => {
            eprintln!("[layout] effacement en échec: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Serialize)]
struct GraphView {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
}

// GET /api/graph (état publié observé par la surface de rendu)
async fn get_graph(State(app): State<AppState>) -> Json<GraphView> {
    let current = app.state.lock();
    Json(GraphView {
        nodes: current.nodes.clone(),
        edges: current.edges.clone(),
    })
}

// POST /api/refresh (refresh manuel awaitable : fini/échoué)
async fn trigger_refresh(State(app): State<AppState>) -> (StatusCode, Json<Value>) {
    match app.coordinator.refresh().await {
        Ok(()) => (StatusCode::OK, Json(json!({"success": true}))),
        Err(e) => {
            eprintln!("[topo] refresh manuel en échec: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"success": false, "error": e.to_string()})),
            )
        }
    }
}

// POST /api/graph/reset (réapplique le dernier layout sauvegardé)
async fn reset_graph(State(app): State<AppState>) -> (StatusCode, Json<Value>) {
    match app.coordinator.reset_layout().await {
        Ok(applied) => (
            StatusCode::OK,
            Json(json!({"success": true, "applied": applied})),
        ),
        Err(e) => {
            eprintln!("[layout] reset en échec: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": e.to_string()})),
            )
        }
    }
}

// POST /api/graph/nodes/{id}/position (drag de la surface de rendu)
async fn move_node(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(position): Json<Position>,
) -> Json<Value> {
    app.coordinator.node_moved(id, position).await;
    Json(json!({"success": true}))
}

// POST /api/graph/nodes/{id}/size (resize d'un groupe)
async fn resize_node(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(size): Json<NodeSize>,
) -> Json<Value> {
    app.coordinator.node_resized(id, size).await;
    Json(json!({"success": true}))
}

#[derive(Debug, Deserialize)]
struct ConnectEdgeBody {
    id: Option<String>,
    source: String,
    target: String,
}

// POST /api/graph/edges (lien créé par l'opérateur)
async fn connect_edge(
    State(app): State<AppState>,
    Json(body): Json<ConnectEdgeBody>,
) -> Json<Edge> {
    let edge = Edge {
        id: body.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        source: body.source,
        target: body.target,
    };
    app.coordinator.edge_connected(edge.clone()).await;
    Json(edge)
}

// DELETE /api/graph/edges/{id}
async fn remove_edge(State(app): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    app.coordinator.edge_removed(id).await;
    Json(json!({"success": true}))
}
