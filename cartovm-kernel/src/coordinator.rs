/**
 * COORDINATEUR DE POLLING - Écrivain unique de l'état de topologie partagé
 *
 * RÔLE : Orchestre les deux timers indépendants (inventaire 30 min,
 * métriques 30 s), le chargement initial, le refresh manuel et les actions
 * save/reset, en sérialisant tous leurs effets sur l'état partagé.
 *
 * ARCHITECTURE : Acteur mono-écrivain. Les timers et les commandes passent
 * par la même boucle select!, chaque tick calcule un état complet puis le
 * publie en une seule affectation. Les lecteurs (API HTTP, surface de
 * rendu) observent l'état via Shared<TopologyState> sans jamais le muter.
 *
 * INVARIANTS :
 * - Un tick inventaire reconstruit le graphe avec les noeuds en mémoire
 *   comme source de position : les drags non sauvegardés survivent
 * - Un tick métriques ne touche jamais positions, tailles ni layout store
 * - Un fetch en échec dégrade le tick et se retente au tick suivant
 * - Après révocation du drapeau de vie, plus aucune publication
 */

use crate::graph::{build_graph, Edge, GraphNode, NodeSize, Position, SavedLayout};
use crate::layout_store::{LayoutStore, LayoutStoreError};
use crate::merge::merge_metrics;
use crate::models::{MetricsByIp, Service};
use crate::reconcile::{apply_saved_layout, snapshot_layout};
use crate::sources::{InventorySource, MetricsSource};
use crate::state::{new_state, Liveness, Shared};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};

/// L'état observable complet : remplacé en bloc à chaque publication.
#[derive(Debug, Clone, Default)]
pub struct TopologyState {
    pub services: Vec<Service>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<Edge>,
    pub metrics_by_ip: MetricsByIp,
    pub last_inventory_sync: Option<String>,
    pub last_metrics_sync: Option<String>,
}

pub enum Command {
    Refresh { reply: oneshot::Sender<Result<()>> },
    SaveLayout { reply: oneshot::Sender<Result<SavedLayout>> },
    ResetLayout { reply: oneshot::Sender<Result<bool>> },
    NodeMoved { id: String, position: Position },
    NodeResized { id: String, size: NodeSize },
    EdgeConnected(Edge),
    EdgeRemoved(String),
}

/// Poignée clonable vers l'acteur : commandes + teardown.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
    liveness: Liveness,
}

impl CoordinatorHandle {
    /// Refresh manuel : un tick inventaire puis un tick métriques,
    /// awaitable pour que l'UI affiche un résultat fini/échoué.
    pub async fn refresh(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Refresh { reply: tx })
            .await
            .map_err(|_| anyhow!("coordinator unavailable"))?;
        rx.await.map_err(|_| anyhow!("coordinator dropped the request"))?
    }

    pub async fn save_layout(&self) -> Result<SavedLayout> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::SaveLayout { reply: tx })
            .await
            .map_err(|_| anyhow!("coordinator unavailable"))?;
        rx.await.map_err(|_| anyhow!("coordinator dropped the request"))?
    }

    /// Rend true si un layout sauvegardé a été appliqué, false pour un no-op.
    pub async fn reset_layout(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::ResetLayout { reply: tx })
            .await
            .map_err(|_| anyhow!("coordinator unavailable"))?;
        rx.await.map_err(|_| anyhow!("coordinator dropped the request"))?
    }

    // Événements de la surface de rendu : fire-and-forget, l'acteur les
    // sérialise avec les ticks.
    pub async fn node_moved(&self, id: String, position: Position) {
        let _ = self.tx.send(Command::NodeMoved { id, position }).await;
    }

    pub async fn node_resized(&self, id: String, size: NodeSize) {
        let _ = self.tx.send(Command::NodeResized { id, size }).await;
    }

    pub async fn edge_connected(&self, edge: Edge) {
        let _ = self.tx.send(Command::EdgeConnected(edge)).await;
    }

    pub async fn edge_removed(&self, id: String) {
        let _ = self.tx.send(Command::EdgeRemoved(id)).await;
    }

    /// Teardown : révoque le drapeau de vie, tout résultat de fetch encore
    /// en vol sera jeté au lieu d'être publié.
    pub fn shutdown(&self) {
        self.liveness.revoke();
    }
}

pub struct Coordinator {
    inventory: Arc<dyn InventorySource>,
    metrics: Arc<dyn MetricsSource>,
    store: Arc<dyn LayoutStore>,
    state: Shared<TopologyState>,
    liveness: Liveness,
    inventory_period: Duration,
    metrics_period: Duration,
}

impl Coordinator {
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        metrics: Arc<dyn MetricsSource>,
        store: Arc<dyn LayoutStore>,
        inventory_period: Duration,
        metrics_period: Duration,
    ) -> Self {
        Self {
            inventory,
            metrics,
            store,
            state: new_state(TopologyState::default()),
            liveness: Liveness::new(),
            inventory_period,
            metrics_period,
        }
    }

    /// L'état partagé observé par les lecteurs ; seul l'acteur y écrit.
    pub fn state(&self) -> Shared<TopologyState> {
        self.state.clone()
    }

    /// Démarre la boucle mono-écrivain et rend la poignée de commande.
    pub fn spawn(self) -> CoordinatorHandle {
        let (tx, mut rx) = mpsc::channel::<Command>(32);
        let handle = CoordinatorHandle {
            tx,
            liveness: self.liveness.clone(),
        };

        tokio::spawn(async move {
            let this = self;
            this.initialize().await;

            let mut inventory_timer = tokio::time::interval(this.inventory_period);
            let mut metrics_timer = tokio::time::interval(this.metrics_period);
            // le premier tick d'un interval part immédiatement, l'init vient de le couvrir
            inventory_timer.tick().await;
            metrics_timer.tick().await;

            loop {
                tokio::select! {
                    _ = inventory_timer.tick() => {
                        let _ = this.inventory_tick().await;
                    }
                    _ = metrics_timer.tick() => {
                        let _ = this.metrics_tick().await;
                    }
                    command = rx.recv() => match command {
                        Some(command) => this.handle_command(command).await,
                        None => break,
                    }
                }
                if !this.liveness.is_live() {
                    break;
                }
            }
            println!("[topo] coordinateur arrêté");
        });

        handle
    }

    async fn handle_command(&self, command: Command) {
        match command {
            Command::Refresh { reply } => {
                let _ = reply.send(self.refresh().await);
            }
            Command::SaveLayout { reply } => {
                let _ = reply.send(self.save_layout().await);
            }
            Command::ResetLayout { reply } => {
                let _ = reply.send(self.reset_layout().await);
            }
            Command::NodeMoved { id, position } => self.apply_node_moved(&id, position),
            Command::NodeResized { id, size } => self.apply_node_resized(&id, size),
            Command::EdgeConnected(edge) => self.apply_edge_connected(edge),
            Command::EdgeRemoved(id) => self.apply_edge_removed(&id),
        }
    }

    /// Chargement initial : layout + inventaire en parallèle, puis les
    /// métriques des IPs fraîchement découvertes. Chaque fetch en échec
    /// dégrade seul, l'init ne bloque ni ne plante jamais sur un seul échec.
    async fn initialize(&self) {
        let (layout, inventory) = tokio::join!(self.store.read(), self.inventory.fetch_services());
        let saved = unwrap_layout(layout);
        let services = match inventory {
            Ok(list) => list,
            Err(e) => {
                eprintln!("[topo] fetch inventaire initial en échec: {e}");
                Vec::new()
            }
        };

        let nodes = build_graph(&services, saved.as_ref(), None);
        let edges = saved
            .as_ref()
            .and_then(|layout| layout.edges.clone())
            .unwrap_or_default();

        let metrics_by_ip = match self.metrics.fetch_metrics(&vm_ips(&services)).await {
            Ok(map) => map,
            Err(e) => {
                eprintln!("[topo] fetch métriques initial en échec: {e}");
                MetricsByIp::new()
            }
        };
        let nodes = merge_metrics(&nodes, &metrics_by_ip);

        let node_count = nodes.len();
        self.publish(TopologyState {
            services,
            nodes,
            edges,
            metrics_by_ip,
            last_inventory_sync: Some(now_stamp()),
            last_metrics_sync: Some(now_stamp()),
        });
        println!("[topo] topologie initiale publiée ({node_count} noeuds)");
    }

    /// Tick inventaire : refetch inventaire + layout sauvegardé, reconstruit
    /// le graphe avec les noeuds courants comme source de position, remet le
    /// dernier snapshot de métriques, publie. Les liens en mémoire sont
    /// gardés : seul le reset les remplace.
    async fn inventory_tick(&self) -> Result<()> {
        let (layout, inventory) = tokio::join!(self.store.read(), self.inventory.fetch_services());
        let saved = unwrap_layout(layout);
        let services = match inventory {
            Ok(list) => list,
            Err(e) => {
                eprintln!("[topo] fetch inventaire en échec, graphe précédent conservé: {e}");
                return Err(e).context("inventory fetch failed");
            }
        };

        let (prior_nodes, edges, metrics_by_ip, last_metrics_sync) = {
            let current = self.state.lock();
            (
                current.nodes.clone(),
                current.edges.clone(),
                current.metrics_by_ip.clone(),
                current.last_metrics_sync.clone(),
            )
        };

        let nodes = build_graph(&services, saved.as_ref(), Some(&prior_nodes));
        let nodes = merge_metrics(&nodes, &metrics_by_ip);

        let node_count = nodes.len();
        self.publish(TopologyState {
            services,
            nodes,
            edges,
            metrics_by_ip,
            last_inventory_sync: Some(now_stamp()),
            last_metrics_sync,
        });
        println!("[topo] inventaire synchronisé ({node_count} noeuds)");
        Ok(())
    }

    /// Tick métriques : refetch, remplace le snapshot servi en bloc, merge
    /// dans le graphe courant. Ne touche jamais le layout store.
    async fn metrics_tick(&self) -> Result<()> {
        let ips = {
            let current = self.state.lock();
            vm_ips(&current.services)
        };
        let by_ip = match self.metrics.fetch_metrics(&ips).await {
            Ok(map) => map,
            Err(e) => {
                eprintln!("[metrics] fetch en échec, snapshot précédent conservé: {e}");
                return Err(e).context("metrics fetch failed");
            }
        };

        let count = by_ip.len();
        let next = {
            let current = self.state.lock();
            TopologyState {
                services: current.services.clone(),
                nodes: merge_metrics(&current.nodes, &by_ip),
                edges: current.edges.clone(),
                metrics_by_ip: by_ip,
                last_inventory_sync: current.last_inventory_sync.clone(),
                last_metrics_sync: Some(now_stamp()),
            }
        };
        self.publish(next);
        println!("[metrics] {count} agrégats VM synchronisés");
        Ok(())
    }

    /// Refresh manuel : équivaut à un tick inventaire puis un tick métriques,
    /// dans cet ordre ; le graphe reconstruit est publié avant le merge.
    async fn refresh(&self) -> Result<()> {
        self.inventory_tick().await?;
        self.metrics_tick().await?;
        Ok(())
    }

    /// Save : snapshot des positions courantes (+ tailles de groupes) et des
    /// liens, écrit au store. L'état en mémoire n'est pas modifié.
    async fn save_layout(&self) -> Result<SavedLayout> {
        let layout = {
            let current = self.state.lock();
            snapshot_layout(&current.nodes, &current.edges)
        };
        self.store
            .write(&layout)
            .await
            .context("layout write failed")?;
        println!("[layout] sauvegarde de {} entrées", layout.nodes.len());
        Ok(layout)
    }

    /// Reset : relit le store et applique le document au graphe courant.
    /// Store vide => no-op, pas une erreur.
    async fn reset_layout(&self) -> Result<bool> {
        let saved = match self.store.read().await {
            Ok(Some(layout)) if !layout.is_empty() => layout,
            Ok(_) => {
                println!("[layout] aucun layout sauvegardé, reset sans effet");
                return Ok(false);
            }
            Err(e) => return Err(e).context("layout read failed"),
        };

        let next = {
            let current = self.state.lock();
            let (nodes, edges) = apply_saved_layout(&current.nodes, &current.edges, &saved);
            TopologyState {
                services: current.services.clone(),
                nodes,
                edges,
                metrics_by_ip: current.metrics_by_ip.clone(),
                last_inventory_sync: current.last_inventory_sync.clone(),
                last_metrics_sync: current.last_metrics_sync.clone(),
            }
        };
        self.publish(next);
        println!("[layout] layout sauvegardé appliqué");
        Ok(true)
    }

    // Événements opérateur : seuls les champs que l'opérateur possède
    // (positions, tailles de groupes, liens) sont touchés.
    fn apply_node_moved(&self, id: &str, position: Position) {
        let mut current = self.state.lock();
        if let Some(node) = current.nodes.iter_mut().find(|n| n.id() == id) {
            node.set_position(position);
        }
    }

    fn apply_node_resized(&self, id: &str, size: NodeSize) {
        let mut current = self.state.lock();
        match current.nodes.iter_mut().find(|n| n.id() == id) {
            Some(GraphNode::Group(g)) => g.size = Some(size),
            Some(GraphNode::Service(_)) => {
                eprintln!("[topo] resize ignoré pour le noeud service {id}")
            }
            None => {}
        }
    }

    fn apply_edge_connected(&self, edge: Edge) {
        let mut current = self.state.lock();
        if current.edges.iter().any(|e| e.id == edge.id) {
            return;
        }
        current.edges.push(edge);
    }

    fn apply_edge_removed(&self, id: &str) {
        self.state.lock().edges.retain(|e| e.id != id);
    }

    fn publish(&self, next: TopologyState) {
        if !self.liveness.is_live() {
            eprintln!("[topo] coordinateur arrêté, état calculé jeté");
            return;
        }
        *self.state.lock() = next;
    }
}

/// Toutes les IPs de VM du snapshot, clés de jointure vers les métriques.
pub fn vm_ips(services: &[Service]) -> Vec<String> {
    services
        .iter()
        .flat_map(|service| service.vms.iter())
        .filter(|vm| !vm.ip.is_empty())
        .map(|vm| vm.ip.clone())
        .collect()
}

fn unwrap_layout(result: Result<Option<SavedLayout>, LayoutStoreError>) -> Option<SavedLayout> {
    match result {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("[layout] lecture en échec, traité comme aucun layout: {e}");
            None
        }
    }
}

fn now_stamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
