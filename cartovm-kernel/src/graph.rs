/**
 * GRAPHE DE TOPOLOGIE - Construction du graphe noeuds/liens depuis l'inventaire
 *
 * RÔLE : Dérive les noeuds affichables (groupes par propriétaire métier +
 * services) depuis un snapshot d'inventaire, en réutilisant les positions
 * connues plutôt que de repartir des positions par défaut.
 *
 * FONCTIONNEMENT :
 * - Un GroupNode synthétique "group-<owner>" par propriétaire distinct
 * - Un ServiceNode par service, rattaché au groupe de son propriétaire
 * - Résolution de position à trois niveaux : noeud en mémoire, entrée du
 *   layout sauvegardé, défaut déterministe (grille fixe)
 *
 * INVARIANTS :
 * - Ids uniques sur tout le graphe, stables d'un refresh inventaire à l'autre
 * - Chaque ServiceNode référence un GroupNode existant via parent_id
 */

use crate::models::{Service, Vm};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_OWNER: &str = "default";

// Grille par défaut : groupes sur une rangée, services empilés par deux dans leur groupe
const GROUP_ORIGIN_X: f64 = 40.0;
const GROUP_ORIGIN_Y: f64 = 40.0;
const GROUP_PITCH_X: f64 = 420.0;
const CHILD_ORIGIN_X: f64 = 30.0;
const CHILD_ORIGIN_Y: f64 = 60.0;
const CHILD_PITCH_X: f64 = 180.0;
const CHILD_PITCH_Y: f64 = 130.0;
const CHILDREN_PER_ROW: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Healthy,
    Unhealthy,
}

/// Conteneur synthétique représentant un propriétaire métier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupNode {
    pub id: String,
    pub owner: String,
    #[serde(rename = "childCount")]
    pub child_count: usize,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<NodeSize>,
}

/// Un service rattaché à son groupe ; position relative au parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceNode {
    pub id: String,
    pub owner: String,
    #[serde(rename = "parentId")]
    pub parent_id: String,
    pub position: Position,
    pub vms: Vec<Vm>,
    pub status: ServiceHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraphNode {
    Group(GroupNode),
    Service(ServiceNode),
}

impl GraphNode {
    pub fn id(&self) -> &str {
        match self {
            GraphNode::Group(g) => &g.id,
            GraphNode::Service(s) => &s.id,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            GraphNode::Group(g) => g.position,
            GraphNode::Service(s) => s.position,
        }
    }

    pub fn set_position(&mut self, position: Position) {
        match self {
            GraphNode::Group(g) => g.position = position,
            GraphNode::Service(s) => s.position = position,
        }
    }

    pub fn group_size(&self) -> Option<NodeSize> {
        match self {
            GraphNode::Group(g) => g.size,
            GraphNode::Service(_) => None,
        }
    }
}

/// Lien créé par l'opérateur, jamais dérivé de l'inventaire. Persisté tel quel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Document de layout persisté : positions (+ tailles de groupes) et liens.
/// Un document `{}` est valide et équivaut à un layout vide.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedLayout {
    #[serde(default)]
    pub nodes: Vec<SavedNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<Edge>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNode {
    pub id: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl SavedLayout {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.as_ref().map_or(true, |e| e.is_empty())
    }

    pub fn node(&self, id: &str) -> Option<&SavedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

impl SavedNode {
    /// Taille exploitable seulement si les deux dimensions sont présentes ;
    /// une entrée partielle est ignorée plutôt qu'appliquée asymétriquement.
    pub fn size(&self) -> Option<NodeSize> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(NodeSize { width, height }),
            _ => None,
        }
    }
}

pub fn group_id(owner: &str) -> String {
    format!("group-{owner}")
}

/// Résolution de position partagée entre build et reset.
/// Priorité : noeud en mémoire (les drags non sauvegardés survivent au
/// refresh inventaire), puis entrée du layout sauvegardé (noeuds nouveaux
/// ou premier chargement), puis défaut calculé. Le chemin reset n'alimente
/// pas le niveau mémoire : il restaure la dernière sauvegarde.
pub fn resolve_position(
    in_memory: Option<Position>,
    saved: Option<Position>,
    computed: Position,
) -> Position {
    in_memory.or(saved).unwrap_or(computed)
}

/// Même chaîne de priorité pour la taille d'un groupe ; pas de défaut,
/// l'absence laisse la surface de rendu choisir.
pub fn resolve_group_size(in_memory: Option<NodeSize>, saved: Option<NodeSize>) -> Option<NodeSize> {
    in_memory.or(saved)
}

fn derived_status(vms: &[Vm]) -> ServiceHealth {
    // liste vide => healthy par vérité vacante, comportement voulu
    if vms.iter().all(|vm| vm.status == "running") {
        ServiceHealth::Healthy
    } else {
        ServiceHealth::Unhealthy
    }
}

fn owner_of(service: &Service) -> String {
    let owner = service.business_owner.trim();
    if owner.is_empty() {
        DEFAULT_OWNER.to_string()
    } else {
        owner.to_string()
    }
}

/// Construit le graphe complet depuis un snapshot d'inventaire.
/// Les groupes suivent l'ordre de première apparition des propriétaires ;
/// positions et tailles sont reprises des noeuds courants ou du layout
/// sauvegardé avant de retomber sur la grille par défaut.
pub fn build_graph(
    services: &[Service],
    saved: Option<&SavedLayout>,
    prior: Option<&[GraphNode]>,
) -> Vec<GraphNode> {
    let prior_by_id: HashMap<&str, &GraphNode> = prior
        .unwrap_or(&[])
        .iter()
        .map(|node| (node.id(), node))
        .collect();
    let saved_node = |id: &str| saved.and_then(|layout| layout.node(id));

    // regroupement par propriétaire, ordre de première apparition
    let mut owners: Vec<String> = Vec::new();
    let mut by_owner: HashMap<String, Vec<&Service>> = HashMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for service in services {
        if !seen.insert(service.name.as_str()) {
            eprintln!("[topo] service en doublon '{}' ignoré", service.name);
            continue;
        }
        let owner = owner_of(service);
        if !by_owner.contains_key(&owner) {
            owners.push(owner.clone());
        }
        by_owner.entry(owner).or_default().push(service);
    }

    let mut nodes = Vec::with_capacity(owners.len() + services.len());
    for (group_index, owner) in owners.iter().enumerate() {
        let members = &by_owner[owner];
        let gid = group_id(owner);
        let g_saved = saved_node(&gid);
        let g_prior = prior_by_id.get(gid.as_str()).copied();
        let g_default = Position {
            x: GROUP_ORIGIN_X + group_index as f64 * GROUP_PITCH_X,
            y: GROUP_ORIGIN_Y,
        };
        nodes.push(GraphNode::Group(GroupNode {
            id: gid.clone(),
            owner: owner.clone(),
            child_count: members.len(),
            position: resolve_position(
                g_prior.map(|n| n.position()),
                g_saved.map(|entry| entry.position),
                g_default,
            ),
            size: resolve_group_size(
                g_prior.and_then(|n| n.group_size()),
                g_saved.and_then(SavedNode::size),
            ),
        }));

        for (child_index, service) in members.iter().enumerate() {
            let s_saved = saved_node(&service.name);
            let s_prior = prior_by_id.get(service.name.as_str()).copied();
            let s_default = Position {
                x: CHILD_ORIGIN_X + (child_index % CHILDREN_PER_ROW) as f64 * CHILD_PITCH_X,
                y: CHILD_ORIGIN_Y + (child_index / CHILDREN_PER_ROW) as f64 * CHILD_PITCH_Y,
            };
            nodes.push(GraphNode::Service(ServiceNode {
                id: service.name.clone(),
                owner: owner.clone(),
                parent_id: gid.clone(),
                position: resolve_position(
                    s_prior.map(|n| n.position()),
                    s_saved.map(|entry| entry.position),
                    s_default,
                ),
                vms: service.vms.clone(),
                status: derived_status(&service.vms),
            }));
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(ip: &str, status: &str) -> Vm {
        Vm {
            name: format!("vm-{ip}"),
            ip: ip.into(),
            core_count: 2,
            memory: "4GB".into(),
            os: "ubuntu".into(),
            status: status.into(),
            subscription_id: None,
            resource_group: None,
            metrics: None,
        }
    }

    fn service(name: &str, owner: &str, vms: Vec<Vm>) -> Service {
        Service {
            name: name.into(),
            business_owner: owner.into(),
            resource_group: None,
            location: None,
            vms,
        }
    }

    fn scenario_a() -> Vec<Service> {
        vec![
            service("svc1", "teamA", vec![vm("10.0.0.1", "running")]),
            service("svc2", "teamA", vec![vm("10.0.0.2", "stopped")]),
        ]
    }

    fn find<'a>(nodes: &'a [GraphNode], id: &str) -> &'a GraphNode {
        nodes.iter().find(|n| n.id() == id).unwrap()
    }

    #[test]
    fn test_build_groups_by_owner() {
        let nodes = build_graph(&scenario_a(), None, None);
        assert_eq!(nodes.len(), 3);

        let group = match find(&nodes, "group-teamA") {
            GraphNode::Group(g) => g,
            other => panic!("expected group node, got {other:?}"),
        };
        assert_eq!(group.owner, "teamA");
        assert_eq!(group.child_count, 2);

        match find(&nodes, "svc1") {
            GraphNode::Service(s) => {
                assert_eq!(s.parent_id, "group-teamA");
                assert_eq!(s.status, ServiceHealth::Healthy);
            }
            other => panic!("expected service node, got {other:?}"),
        }
        match find(&nodes, "svc2") {
            GraphNode::Service(s) => assert_eq!(s.status, ServiceHealth::Unhealthy),
            other => panic!("expected service node, got {other:?}"),
        }
    }

    #[test]
    fn test_every_parent_id_resolves() {
        let services = vec![
            service("a", "t1", vec![]),
            service("b", "t2", vec![]),
            service("c", "t1", vec![]),
        ];
        let nodes = build_graph(&services, None, None);
        let group_ids: HashSet<&str> = nodes
            .iter()
            .filter(|n| matches!(n, GraphNode::Group(_)))
            .map(|n| n.id())
            .collect();
        assert_eq!(group_ids.len(), 2);
        for node in &nodes {
            if let GraphNode::Service(s) = node {
                assert!(group_ids.contains(s.parent_id.as_str()));
            }
        }
    }

    #[test]
    fn test_missing_owner_falls_back_to_default_group() {
        let nodes = build_graph(&[service("orphan", "  ", vec![])], None, None);
        match find(&nodes, "group-default") {
            GraphNode::Group(g) => assert_eq!(g.owner, DEFAULT_OWNER),
            other => panic!("expected group node, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_inventory_yields_empty_graph() {
        assert!(build_graph(&[], None, None).is_empty());
    }

    #[test]
    fn test_empty_vm_list_is_vacuously_healthy() {
        let nodes = build_graph(&[service("bare", "teamA", vec![])], None, None);
        match find(&nodes, "bare") {
            GraphNode::Service(s) => assert_eq!(s.status, ServiceHealth::Healthy),
            other => panic!("expected service node, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_service_emits_single_node() {
        let services = vec![
            service("dup", "teamA", vec![]),
            service("dup", "teamB", vec![]),
        ];
        let nodes = build_graph(&services, None, None);
        assert_eq!(nodes.iter().filter(|n| n.id() == "dup").count(), 1);
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id()).collect();
        assert_eq!(ids.len(), nodes.len());
    }

    #[test]
    fn test_default_positions_are_deterministic() {
        let services = scenario_a();
        let first = build_graph(&services, None, None);
        let second = build_graph(&services, None, None);
        assert_eq!(first, second);
        // deux enfants du même groupe ne se superposent pas
        assert_ne!(find(&first, "svc1").position(), find(&first, "svc2").position());
    }

    #[test]
    fn test_resolve_position_priority_tiers() {
        let memory = Position { x: 1.0, y: 1.0 };
        let saved = Position { x: 2.0, y: 2.0 };
        let computed = Position { x: 3.0, y: 3.0 };
        assert_eq!(resolve_position(Some(memory), Some(saved), computed), memory);
        assert_eq!(resolve_position(None, Some(saved), computed), saved);
        assert_eq!(resolve_position(None, None, computed), computed);
    }

    #[test]
    fn test_saved_layout_positions_new_nodes() {
        let saved = SavedLayout {
            nodes: vec![SavedNode {
                id: "svc1".into(),
                position: Position { x: 99.0, y: 88.0 },
                width: None,
                height: None,
            }],
            edges: None,
        };
        let nodes = build_graph(&scenario_a(), Some(&saved), None);
        assert_eq!(find(&nodes, "svc1").position(), Position { x: 99.0, y: 88.0 });
    }

    #[test]
    fn test_prior_in_memory_beats_saved_layout() {
        let services = scenario_a();
        let saved = SavedLayout {
            nodes: vec![SavedNode {
                id: "svc1".into(),
                position: Position { x: 99.0, y: 88.0 },
                width: None,
                height: None,
            }],
            edges: None,
        };
        let mut prior = build_graph(&services, Some(&saved), None);
        // l'opérateur a déplacé svc1 depuis la dernière sauvegarde
        let dragged = Position { x: 400.0, y: 250.0 };
        prior
            .iter_mut()
            .find(|n| n.id() == "svc1")
            .unwrap()
            .set_position(dragged);

        let rebuilt = build_graph(&services, Some(&saved), Some(&prior));
        assert_eq!(find(&rebuilt, "svc1").position(), dragged);
    }

    #[test]
    fn test_partial_saved_size_is_ignored() {
        let saved = SavedLayout {
            nodes: vec![SavedNode {
                id: "group-teamA".into(),
                position: Position { x: 0.0, y: 0.0 },
                width: Some(500.0),
                height: None,
            }],
            edges: None,
        };
        let nodes = build_graph(&scenario_a(), Some(&saved), None);
        assert_eq!(find(&nodes, "group-teamA").group_size(), None);
    }

    #[test]
    fn test_group_size_carried_from_prior() {
        let services = scenario_a();
        let mut prior = build_graph(&services, None, None);
        if let GraphNode::Group(g) = prior.iter_mut().find(|n| n.id() == "group-teamA").unwrap() {
            g.size = Some(NodeSize { width: 640.0, height: 480.0 });
        }
        let rebuilt = build_graph(&services, None, Some(&prior));
        assert_eq!(
            find(&rebuilt, "group-teamA").group_size(),
            Some(NodeSize { width: 640.0, height: 480.0 })
        );
    }

    #[test]
    fn test_empty_saved_layout_document_parses() {
        let layout: SavedLayout = serde_json::from_str("{}").unwrap();
        assert!(layout.is_empty());
    }
}
