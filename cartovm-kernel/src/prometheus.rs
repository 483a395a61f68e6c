/**
 * SERVICE PROMETHEUS - Agrégats de métriques VM sur fenêtre glissante 30 jours
 *
 * RÔLE : Interroge l'API d'instant query de Prometheus pour produire, par VM
 * (jointure sur l'IP de l'instance node_exporter), les agrégats peak/avg/low
 * CPU et mémoire plus l'occupation du montage /data.
 *
 * FONCTIONNEMENT :
 * - Une requête PromQL par valeur, premier résultat numérique arrondi à une décimale
 * - URL absente ou requête en échec => valeur absente (null sur le fil), jamais zéro
 * - lastUpdated n'est posé que si au moins un agrégat a répondu
 */

use crate::models::{MetricsAggregate, MetricsByIp};
use crate::sources::{MetricsSource, SourceError};
use async_trait::async_trait;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub struct PrometheusService {
    url: Option<String>,
    http: reqwest::Client,
}

impl PrometheusService {
    pub fn new(url: Option<String>) -> Self {
        if url.is_none() {
            eprintln!("[prom] PROMETHEUS_URL non configurée, les métriques resteront indisponibles");
        }
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Joignable si une requête triviale aboutit, même avec un résultat vide.
    pub async fn is_available(&self) -> bool {
        self.query("up").await.is_ok()
    }

    async fn query(&self, promql: &str) -> Result<Option<f64>, SourceError> {
        let url = self
            .url
            .as_ref()
            .ok_or(SourceError::NotConfigured("PROMETHEUS_URL"))?;
        let response: serde_json::Value = self
            .http
            .get(format!("{}/api/v1/query", url.trim_end_matches('/')))
            .query(&[("query", promql)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(extract_scalar(&response))
    }

    async fn query_scalar(&self, promql: &str) -> Option<f64> {
        match self.query(promql).await {
            Ok(value) => value,
            Err(e) => {
                eprintln!("[prom] requête échouée: {e}");
                None
            }
        }
    }

    /// Agrégats 30 jours pour une VM identifiée par l'IP de son instance.
    pub async fn vm_metrics(&self, ip: &str) -> MetricsAggregate {
        let mut agg = MetricsAggregate::default();
        if self.url.is_none() || ip.is_empty() {
            return agg;
        }

        let cpu_base = format!(
            r#"100 - (avg(rate(node_cpu_seconds_total{{instance=~"{ip}:.*",mode="idle"}}[5m])) * 100)"#
        );
        agg.cpu.peak = self.query_scalar(&format!("max_over_time(({cpu_base})[30d:])")).await;
        agg.cpu.avg = self.query_scalar(&format!("avg_over_time(({cpu_base})[30d:])")).await;
        agg.cpu.low = self.query_scalar(&format!("min_over_time(({cpu_base})[30d:])")).await;

        let mem_base = format!(
            r#"(1 - (node_memory_MemAvailable_bytes{{instance=~"{ip}:.*"}} / node_memory_MemTotal_bytes{{instance=~"{ip}:.*"}})) * 100"#
        );
        agg.memory.peak = self.query_scalar(&format!("max_over_time(({mem_base})[30d:])")).await;
        agg.memory.avg = self.query_scalar(&format!("avg_over_time(({mem_base})[30d:])")).await;
        agg.memory.low = self.query_scalar(&format!("min_over_time(({mem_base})[30d:])")).await;

        let storage = format!(
            r#"100 - ((node_filesystem_avail_bytes{{instance=~"{ip}:.*",mountpoint="/data"}} * 100) / node_filesystem_size_bytes{{instance=~"{ip}:.*",mountpoint="/data"}})"#
        );
        agg.storage.data_mount_usage = self.query_scalar(&storage).await;

        let has_any = agg.cpu.peak.is_some()
            || agg.memory.peak.is_some()
            || agg.storage.data_mount_usage.is_some();
        if has_any {
            agg.last_updated = OffsetDateTime::now_utc().format(&Rfc3339).ok();
        }
        agg
    }
}

#[async_trait]
impl MetricsSource for PrometheusService {
    async fn fetch_metrics(&self, ips: &[String]) -> Result<MetricsByIp, SourceError> {
        self.url
            .as_ref()
            .ok_or(SourceError::NotConfigured("PROMETHEUS_URL"))?;
        let mut by_ip = MetricsByIp::new();
        for ip in ips {
            if ip.is_empty() {
                continue;
            }
            by_ip.insert(ip.clone(), self.vm_metrics(ip).await);
        }
        Ok(by_ip)
    }
}

/// Première valeur numérique d'une réponse d'instant query, arrondie à une décimale.
fn extract_scalar(response: &serde_json::Value) -> Option<f64> {
    let raw = response
        .get("data")?
        .get("result")?
        .get(0)?
        .get("value")?
        .get(1)?;
    let value = match raw {
        serde_json::Value::String(s) => s.parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    Some((value * 10.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_scalar_reads_first_sample() {
        let response = json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {}, "value": [1_700_000_000, "72.34"]},
                    {"metric": {}, "value": [1_700_000_000, "99.9"]}
                ]
            }
        });
        assert_eq!(extract_scalar(&response), Some(72.3));
    }

    #[test]
    fn test_extract_scalar_empty_result_is_absent() {
        let response = json!({"status": "success", "data": {"result": []}});
        assert_eq!(extract_scalar(&response), None);
    }

    #[test]
    fn test_extract_scalar_rejects_non_numeric() {
        let response = json!({"data": {"result": [{"value": [0, "NaN-ish"]}]}});
        assert_eq!(extract_scalar(&response), None);
    }

    #[tokio::test]
    async fn test_unconfigured_service_yields_empty_aggregate() {
        let service = PrometheusService::new(None);
        assert!(!service.is_available().await);
        let agg = service.vm_metrics("10.0.0.1").await;
        assert_eq!(agg, MetricsAggregate::default());
        match service.fetch_metrics(&["10.0.0.1".to_string()]).await {
            Err(SourceError::NotConfigured(_)) => {}
            other => panic!("expected NotConfigured, got {other:?}"),
        }
    }
}
