//! Carga y gestión de configuración del cliente (backend del supervisor).

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};
use url::Url;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Configuración completa del cliente.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_base_url: Url,
    pub connect_timeout: Duration,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let base = env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let timeout = env::var("CONNECT_TIMEOUT_SECS").ok();
        Self::from_values(&base, timeout.as_deref())
    }

    fn from_values(base: &str, connect_timeout_secs: Option<&str>) -> Result<Self> {
        let api_base_url = parse_base_url(base)?;

        let connect_timeout = match connect_timeout_secs {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("CONNECT_TIMEOUT_SECS no es un número válido: {raw}"))?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_base_url,
            connect_timeout,
        })
    }
}

/// Valida la URL base del backend. Sólo se admiten URLs absolutas http/https.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| anyhow!("API_BASE_URL inválida ({raw}): {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("Esquema no soportado en API_BASE_URL: {other}")),
    }
}
