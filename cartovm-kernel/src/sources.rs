use crate::models::{MetricsByIp, Service, ServicesPayload};
use async_trait::async_trait;

/// Erreurs des collaborateurs externes (inventaire, métriques).
/// Toutes sont transitoires : le tick concerné dégrade, le suivant réessaie.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("source not configured: {0}")]
    NotConfigured(&'static str),
}

/// Source d'inventaire : une requête en lecture seule rendant les services et leurs VMs.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn fetch_services(&self) -> Result<Vec<Service>, SourceError>;
}

/// Source de métriques : une requête en lecture seule rendant les agrégats par IP.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch_metrics(&self, ips: &[String]) -> Result<MetricsByIp, SourceError>;
}

/// Shim HTTP vers l'énumération de VMs ; attend `{"services": [...]}`.
pub struct HttpInventorySource {
    url: Option<String>,
    http: reqwest::Client,
}

impl HttpInventorySource {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl InventorySource for HttpInventorySource {
    async fn fetch_services(&self) -> Result<Vec<Service>, SourceError> {
        let url = self
            .url
            .as_ref()
            .ok_or(SourceError::NotConfigured("INVENTORY_URL"))?;
        let payload: ServicesPayload = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(payload.services)
    }
}
