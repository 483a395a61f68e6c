use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    /// URL de l'énumération de VMs (une requête GET en lecture seule).
    #[serde(default)]
    pub inventory_url: Option<String>,
    /// URL de base de Prometheus ; absente => métriques indisponibles.
    #[serde(default)]
    pub prometheus_url: Option<String>,
    #[serde(default = "default_layout_file")]
    pub layout_file: String,
    #[serde(default = "default_inventory_interval")]
    pub inventory_interval_secs: u64,
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_bind_port() -> u16 {
    5000
}

fn default_layout_file() -> String {
    "./data/layout.json".to_string()
}

fn default_inventory_interval() -> u64 {
    30 * 60
}

fn default_metrics_interval() -> u64 {
    30
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            bind_port: default_bind_port(),
            inventory_url: None,
            prometheus_url: None,
            layout_file: default_layout_file(),
            inventory_interval_secs: default_inventory_interval(),
            metrics_interval_secs: default_metrics_interval(),
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("CARTOVM_CONFIG").unwrap_or_else(|_| "cartovm.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            KernelConfig::default()
        } else {
            serde_yaml::from_str(&txt).unwrap_or_else(|e| {
                eprintln!("[kernel] config invalide: {e}");
                KernelConfig::default()
            })
        }
    } else {
        eprintln!("[kernel] pas de {path}, usage config par défaut");
        KernelConfig::default()
    };

    // surcharges d'environnement, héritées du backend d'origine
    if let Ok(url) = std::env::var("INVENTORY_URL") {
        cfg.inventory_url = Some(url);
    }
    if let Ok(url) = std::env::var("PROMETHEUS_URL") {
        cfg.prometheus_url = Some(url);
    }
    if let Ok(secs) = std::env::var("METRICS_INTERVAL") {
        match secs.parse() {
            Ok(secs) => cfg.metrics_interval_secs = secs,
            Err(_) => eprintln!("[kernel] METRICS_INTERVAL invalide: {secs}"),
        }
    }
    cfg
}
