use std::{env, net::SocketAddr, time::Duration};

use crate::error::{ImportError, Result};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub listen_addr: SocketAddr,
    /// URLs base de los workers a los que se despachan tareas (round-robin)
    pub worker_urls: Vec<String>,
    /// Cada cuánto el sweep reintenta las tareas que siguen en pending
    pub retry_interval: Duration,
    pub dispatch_timeout: Duration,
    pub default_bucket: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            worker_urls: Vec::new(),
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            dispatch_timeout: Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS),
            default_bucket: None,
        }
    }
}

impl CoordinatorConfig {
    /// Lee la configuración de variables de entorno:
    /// - IMPORT_LISTEN_ADDR (default 0.0.0.0:8080)
    /// - IMPORT_WORKER_URLS, separadas por coma (ej: http://worker-1:9000,http://worker-2:9000)
    /// - IMPORT_RETRY_INTERVAL_SECS (default 5)
    /// - IMPORT_DISPATCH_TIMEOUT_SECS (default 10)
    /// - IMPORT_DEFAULT_BUCKET (opcional)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_raw =
            lookup("IMPORT_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_raw.parse::<SocketAddr>().map_err(|e| {
            ImportError::Config(format!("IMPORT_LISTEN_ADDR={listen_raw}: {e}"))
        })?;

        let worker_urls = lookup("IMPORT_WORKER_URLS")
            .map(|raw| parse_worker_urls(&raw))
            .unwrap_or_default();

        let retry_secs = parse_secs(
            &lookup,
            "IMPORT_RETRY_INTERVAL_SECS",
            DEFAULT_RETRY_INTERVAL_SECS,
        )?;
        if retry_secs == 0 {
            return Err(ImportError::Config(
                "IMPORT_RETRY_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        let timeout_secs = parse_secs(
            &lookup,
            "IMPORT_DISPATCH_TIMEOUT_SECS",
            DEFAULT_DISPATCH_TIMEOUT_SECS,
        )?;

        let default_bucket = lookup("IMPORT_DEFAULT_BUCKET").filter(|b| !b.trim().is_empty());

        Ok(Self {
            listen_addr,
            worker_urls,
            retry_interval: Duration::from_secs(retry_secs),
            dispatch_timeout: Duration::from_secs(timeout_secs),
            default_bucket,
        })
    }
}

fn parse_worker_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ImportError::Config(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn sin_variables_usa_defaults() {
        let cfg = CoordinatorConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(cfg.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert!(cfg.worker_urls.is_empty());
        assert_eq!(cfg.retry_interval, Duration::from_secs(5));
        assert_eq!(cfg.dispatch_timeout, Duration::from_secs(10));
        assert!(cfg.default_bucket.is_none());
    }

    #[test]
    fn worker_urls_se_separan_por_coma_y_se_limpian() {
        let cfg = CoordinatorConfig::from_lookup(lookup_from(&[(
            "IMPORT_WORKER_URLS",
            " http://w1:9000/ ,,http://w2:9000",
        )]))
        .unwrap();

        assert_eq!(
            cfg.worker_urls,
            vec!["http://w1:9000".to_string(), "http://w2:9000".to_string()]
        );
    }

    #[test]
    fn intervalo_invalido_es_error_de_config() {
        let err = CoordinatorConfig::from_lookup(lookup_from(&[(
            "IMPORT_RETRY_INTERVAL_SECS",
            "cinco",
        )]))
        .unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));

        let err = CoordinatorConfig::from_lookup(lookup_from(&[(
            "IMPORT_RETRY_INTERVAL_SECS",
            "0",
        )]))
        .unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));
    }

    #[test]
    fn bucket_vacio_se_ignora() {
        let cfg =
            CoordinatorConfig::from_lookup(lookup_from(&[("IMPORT_DEFAULT_BUCKET", "  ")]))
                .unwrap();
        assert!(cfg.default_bucket.is_none());

        let cfg = CoordinatorConfig::from_lookup(lookup_from(&[
            ("IMPORT_DEFAULT_BUCKET", "imports"),
            ("IMPORT_LISTEN_ADDR", "127.0.0.1:9100"),
        ]))
        .unwrap();
        assert_eq!(cfg.default_bucket.as_deref(), Some("imports"));
        assert_eq!(cfg.listen_addr.port(), 9100);
    }
}
