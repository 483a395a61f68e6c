use crate::graph::{
    resolve_position, Edge, GraphNode, SavedLayout, SavedNode,
};

/// Application d'un layout sauvegardé au graphe courant (chemin reset).
/// Les positions des noeuds présents dans le document sont écrasées ; la
/// taille d'un groupe ne l'est que si largeur ET hauteur sont présentes.
/// Un noeud absent du document reste tel quel : le reset restaure la
/// dernière sauvegarde, pas les défauts calculés. Les liens sont remplacés
/// en bloc si le document en porte, sinon la liste courante est gardée.
pub fn apply_saved_layout(
    nodes: &[GraphNode],
    edges: &[Edge],
    saved: &SavedLayout,
) -> (Vec<GraphNode>, Vec<Edge>) {
    let next_nodes = nodes
        .iter()
        .map(|node| {
            let entry = saved.node(node.id());
            match node {
                GraphNode::Group(g) => {
                    let mut g = g.clone();
                    g.position = resolve_position(None, entry.map(|e| e.position), g.position);
                    g.size = entry.and_then(SavedNode::size).or(g.size);
                    GraphNode::Group(g)
                }
                GraphNode::Service(s) => {
                    let mut s = s.clone();
                    s.position = resolve_position(None, entry.map(|e| e.position), s.position);
                    GraphNode::Service(s)
                }
            }
        })
        .collect();

    let next_edges = match &saved.edges {
        Some(saved_edges) => saved_edges.clone(),
        None => edges.to_vec(),
    };
    (next_nodes, next_edges)
}

/// Snapshot de l'état courant vers un document persistable (chemin save).
/// Seuls les groupes portent une taille ; les liens sont copiés tels quels.
pub fn snapshot_layout(nodes: &[GraphNode], edges: &[Edge]) -> SavedLayout {
    let saved_nodes = nodes
        .iter()
        .map(|node| match node {
            GraphNode::Group(g) => SavedNode {
                id: g.id.clone(),
                position: g.position,
                width: g.size.map(|s| s.width),
                height: g.size.map(|s| s.height),
            },
            GraphNode::Service(s) => SavedNode {
                id: s.id.clone(),
                position: s.position,
                width: None,
                height: None,
            },
        })
        .collect();
    SavedLayout {
        nodes: saved_nodes,
        edges: Some(edges.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, NodeSize, Position};
    use crate::models::Service;

    fn scenario_a_nodes() -> Vec<GraphNode> {
        let services = vec![
            Service {
                name: "svc1".into(),
                business_owner: "teamA".into(),
                resource_group: None,
                location: None,
                vms: vec![],
            },
            Service {
                name: "svc2".into(),
                business_owner: "teamA".into(),
                resource_group: None,
                location: None,
                vms: vec![],
            },
        ];
        build_graph(&services, None, None)
    }

    fn position_of(nodes: &[GraphNode], id: &str) -> Position {
        nodes.iter().find(|n| n.id() == id).unwrap().position()
    }

    #[test]
    fn test_reset_moves_only_listed_nodes() {
        let nodes = scenario_a_nodes();
        let saved = SavedLayout {
            nodes: vec![SavedNode {
                id: "group-teamA".into(),
                position: Position { x: 10.0, y: 20.0 },
                width: None,
                height: None,
            }],
            edges: None,
        };

        let svc1_before = position_of(&nodes, "svc1");
        let svc2_before = position_of(&nodes, "svc2");
        let (after, _) = apply_saved_layout(&nodes, &[], &saved);

        assert_eq!(position_of(&after, "group-teamA"), Position { x: 10.0, y: 20.0 });
        assert_eq!(position_of(&after, "svc1"), svc1_before);
        assert_eq!(position_of(&after, "svc2"), svc2_before);
    }

    #[test]
    fn test_partial_size_entry_keeps_current_size() {
        let mut nodes = scenario_a_nodes();
        if let GraphNode::Group(g) = nodes.iter_mut().find(|n| n.id() == "group-teamA").unwrap() {
            g.size = Some(NodeSize { width: 300.0, height: 200.0 });
        }
        let saved = SavedLayout {
            nodes: vec![SavedNode {
                id: "group-teamA".into(),
                position: Position { x: 0.0, y: 0.0 },
                width: Some(999.0),
                height: None,
            }],
            edges: None,
        };

        let (after, _) = apply_saved_layout(&nodes, &[], &saved);
        let group = after.iter().find(|n| n.id() == "group-teamA").unwrap();
        assert_eq!(group.group_size(), Some(NodeSize { width: 300.0, height: 200.0 }));
    }

    #[test]
    fn test_complete_size_entry_overwrites() {
        let nodes = scenario_a_nodes();
        let saved = SavedLayout {
            nodes: vec![SavedNode {
                id: "group-teamA".into(),
                position: Position { x: 0.0, y: 0.0 },
                width: Some(800.0),
                height: Some(600.0),
            }],
            edges: None,
        };

        let (after, _) = apply_saved_layout(&nodes, &[], &saved);
        let group = after.iter().find(|n| n.id() == "group-teamA").unwrap();
        assert_eq!(group.group_size(), Some(NodeSize { width: 800.0, height: 600.0 }));
    }

    #[test]
    fn test_edges_replaced_only_when_document_has_some() {
        let nodes = scenario_a_nodes();
        let current = vec![Edge {
            id: "e1".into(),
            source: "svc1".into(),
            target: "svc2".into(),
        }];

        let without_edges = SavedLayout { nodes: vec![], edges: None };
        let (_, kept) = apply_saved_layout(&nodes, &current, &without_edges);
        assert_eq!(kept, current);

        let with_edges = SavedLayout {
            nodes: vec![],
            edges: Some(vec![Edge {
                id: "e2".into(),
                source: "svc2".into(),
                target: "svc1".into(),
            }]),
        };
        let (_, replaced) = apply_saved_layout(&nodes, &current, &with_edges);
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].id, "e2");
    }

    #[test]
    fn test_save_then_reset_is_identity_on_positions() {
        let mut nodes = scenario_a_nodes();
        nodes
            .iter_mut()
            .find(|n| n.id() == "svc1")
            .unwrap()
            .set_position(Position { x: 123.0, y: 456.0 });
        let edges = vec![Edge {
            id: "e1".into(),
            source: "svc1".into(),
            target: "svc2".into(),
        }];

        let saved = snapshot_layout(&nodes, &edges);
        let (restored, restored_edges) = apply_saved_layout(&nodes, &[], &saved);

        for (before, after) in nodes.iter().zip(restored.iter()) {
            assert_eq!(before.position(), after.position());
            assert_eq!(before.group_size(), after.group_size());
        }
        assert_eq!(restored_edges, edges);
    }
}
