/**
 * CARTOVM KERNEL - Point d'entrée principal du serveur CartoVM
 *
 * RÔLE : Bootstrap du système complet : config, sources externes
 * (inventaire, Prometheus), store de layout, coordinateur de polling,
 * API REST.
 *
 * ARCHITECTURE : Acteur mono-écrivain sur l'état de topologie + deux timers
 * de poll + API Axum en lecture/commande. Le frontend observe le graphe et
 * renvoie les éditions opérateur ; le kernel garantit qu'un poll ne les
 * écrase jamais.
 */

mod config;
mod coordinator;
mod graph;
mod http;
mod layout_store;
mod merge;
mod models;
mod prometheus;
mod reconcile;
mod sources;
mod state;

use crate::coordinator::Coordinator;
use crate::layout_store::{FileLayoutStore, LayoutStore};
use crate::prometheus::PrometheusService;
use crate::sources::{HttpInventorySource, InventorySource, MetricsSource};

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas

    let cfg = config::load_config().await;
    if cfg.inventory_url.is_none() {
        eprintln!("[kernel] INVENTORY_URL non configurée, l'inventaire restera vide");
    }

    // dossier du document de layout
    if let Some(parent) = Path::new(&cfg.layout_file).parent() {
        std::fs::create_dir_all(parent).unwrap_or_else(|e| {
            eprintln!("[kernel] warning: création du dossier data impossible: {e}");
        });
    }

    let store: Arc<dyn LayoutStore> = Arc::new(FileLayoutStore::new(&cfg.layout_file));
    let prometheus = Arc::new(PrometheusService::new(cfg.prometheus_url.clone()));
    let inventory: Arc<dyn InventorySource> =
        Arc::new(HttpInventorySource::new(cfg.inventory_url.clone()));
    let metrics: Arc<dyn MetricsSource> = prometheus.clone();

    // coordinateur : init + timers + commandes, écrivain unique de l'état
    let coordinator = Coordinator::new(
        inventory,
        metrics,
        store.clone(),
        Duration::from_secs(cfg.inventory_interval_secs),
        Duration::from_secs(cfg.metrics_interval_secs),
    );
    let shared = coordinator.state();
    let handle = coordinator.spawn();

    // fabrique l'état unique pour Axum
    let app_state = http::AppState {
        state: shared,
        store,
        prometheus,
        coordinator: handle.clone(),
    };
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.bind_port));
    println!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            // teardown : les fetchs encore en vol ne seront plus publiés
            handle.shutdown();
            println!("[kernel] arrêt demandé");
        })
        .await
        .unwrap();
}
