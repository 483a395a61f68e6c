use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Un service métier tel que remonté par l'inventaire : un propriétaire + ses VMs.
/// L'identité d'un service est son nom (clé "service" sur le fil, héritage Azure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "service")]
    pub name: String,
    #[serde(rename = "businessOwner", default)]
    pub business_owner: String,
    #[serde(rename = "resourceGroup", default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub vms: Vec<Vm>,
}

/// Une VM de l'inventaire. L'IP est la seule clé de corrélation vers les métriques.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(rename = "coreCount", default)]
    pub core_count: u32,
    #[serde(default)]
    pub memory: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "subscriptionId", default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(rename = "resourceGroup", default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    /// Attachées par le merge métriques, jamais présentes dans l'inventaire brut.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsAggregate>,
}

/// Enveloppe de la réponse inventaire : { "services": [...] }
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesPayload {
    #[serde(default)]
    pub services: Vec<Service>,
}

/// Agrégats de métriques d'une VM sur fenêtre glissante de 30 jours.
/// Chaque valeur absente reste null sur le fil : jamais coercée à zéro.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsAggregate {
    #[serde(default)]
    pub cpu: MetricBand,
    #[serde(default)]
    pub memory: MetricBand,
    #[serde(default)]
    pub storage: StorageMetrics,
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBand {
    #[serde(default)]
    pub peak: Option<f64>,
    #[serde(default)]
    pub avg: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageMetrics {
    #[serde(rename = "dataMountUsage", default)]
    pub data_mount_usage: Option<f64>,
}

pub type MetricsByIp = HashMap<String, MetricsAggregate>;
