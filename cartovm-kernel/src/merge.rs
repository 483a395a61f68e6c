use crate::graph::{GraphNode, ServiceNode};
use crate::models::{MetricsByIp, Vm};

/// Merge pur d'un snapshot de métriques dans le graphe, jointure par IP.
/// Retourne une copie complète : aucune mutation en place, aucun champ
/// position/taille/id modifié. Une VM dont l'IP est absente du snapshot
/// garde ses métriques déjà attachées : un trou de fetch transitoire ne
/// doit pas effacer une valeur connue.
pub fn merge_metrics(nodes: &[GraphNode], by_ip: &MetricsByIp) -> Vec<GraphNode> {
    nodes
        .iter()
        .map(|node| match node {
            GraphNode::Group(g) => GraphNode::Group(g.clone()),
            GraphNode::Service(s) => {
                let vms: Vec<Vm> = s
                    .vms
                    .iter()
                    .map(|vm| match by_ip.get(&vm.ip) {
                        Some(aggregate) => Vm {
                            metrics: Some(aggregate.clone()),
                            ..vm.clone()
                        },
                        None => vm.clone(),
                    })
                    .collect();
                GraphNode::Service(ServiceNode { vms, ..s.clone() })
            }
        })
        .collect()
}
