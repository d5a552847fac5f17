//! Cliente HTTP tipado para el contrato del backend del supervisor.
//!
//! Endpoints consumidos:
//!   - `POST   /api/ask-supervisor`
//!   - `GET    /api/knowledge`
//!   - `PATCH  /api/knowledge/{query}`
//!   - `DELETE /api/knowledge/{query}`
//!   - `DELETE /api/knowledge`
//!   - `POST   /api/upload-document` (multipart)
//!
//! Cualquier respuesta no-2xx es un fallo, sea cual sea su cuerpo.

use std::path::Path;

use reqwest::{multipart, Response, StatusCode};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::models::{AskPayload, ErrorBody, KnowledgeRecord, SupervisorReply, UpdatePayload};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no se pudo contactar con el backend: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("el backend respondió {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("respuesta del backend mal formada: {0}")]
    Decode(String),
    #[error("no se pudo leer el fichero: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(cfg.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: cfg.api_base_url.clone(),
        }
    }

    /// Construye la URL de un endpoint a partir de segmentos. Cada segmento se
    /// codifica por separado, así una `query` con `/` o espacios no rompe la ruta.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Decode(format!("URL base no jerárquica: {}", self.base_url)))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    pub async fn ask_supervisor(&self, task: &str) -> Result<SupervisorReply, ApiError> {
        let url = self.endpoint(&["api", "ask-supervisor"])?;
        info!("Enviando tarea al supervisor ({} caracteres)", task.chars().count());
        let resp = self.client.post(url).json(&AskPayload { task }).send().await?;
        let resp = ensure_success(resp).await?;
        decode_json(resp).await
    }

    /// Lista el conocimiento. Un elemento que no encaja en ninguna forma conocida
    /// se descarta con un aviso; sólo un cuerpo que no sea un array JSON es error.
    pub async fn list_knowledge(&self) -> Result<Vec<KnowledgeRecord>, ApiError> {
        let url = self.endpoint(&["api", "knowledge"])?;
        let resp = self.client.get(url).send().await?;
        let resp = ensure_success(resp).await?;
        let items: Vec<serde_json::Value> = decode_json(resp).await?;
        Ok(parse_records(items))
    }

    /// Reemplaza el contenido completo del documento identificado por `query`.
    pub async fn update_knowledge(&self, query: &str, content: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "knowledge", query])?;
        let resp = self
            .client
            .patch(url)
            .json(&UpdatePayload { content })
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    pub async fn delete_knowledge(&self, query: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "knowledge", query])?;
        let resp = self.client.delete(url).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }

    pub async fn delete_all_knowledge(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "knowledge"])?;
        let resp = self.client.delete(url).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// Sube un fichero como multipart (campo `file`).
    pub async fn upload_document(&self, path: &Path) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "upload-document"])?;
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.txt".to_string());
        let mime = mime_guess::from_path(path).first_or_text_plain();

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())?;
        let form = multipart::Form::new().part("file", part);

        let resp = self.client.post(url).multipart(form).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

/// Convierte una respuesta no-2xx en `ApiError::Status`, usando el campo
/// `error` del cuerpo cuando existe.
async fn ensure_success(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("error desconocido")
                .to_string()
        });
    error!("Petición rechazada por el backend ({status}): {message}");
    Err(ApiError::Status { status, message })
}

fn parse_records(items: Vec<serde_json::Value>) -> Vec<KnowledgeRecord> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("Registro de conocimiento {position} ignorado: {err}");
                None
            }
        })
        .collect()
}

async fn decode_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_base_url;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{body_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(uri: &str) -> BackendClient {
        BackendClient::from_config(&AppConfig {
            api_base_url: parse_base_url(uri).unwrap(),
            connect_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn ask_supervisor_posts_task_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ask-supervisor"))
            .and(body_json(serde_json::json!({"task": "research: gatos"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"content": "ronronean", "source": "internet"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server.uri()).ask_supervisor("research: gatos").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("ronronean"));
        assert_eq!(reply.source.as_deref(), Some("internet"));
    }

    #[tokio::test]
    async fn non_success_status_uses_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ask-supervisor"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "Missing 'task'"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server.uri()).ask_supervisor("x").await.unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "Missing 'task'");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/knowledge"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server.uri()).list_knowledge().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn unusable_records_are_skipped_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/knowledge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"query": "q1", "content": "x", "chunk_index": 0, "partition_id": "p1"},
                {"query": "q1", "content": "y", "chunk_index": 1, "partition_id": "p1"},
                {"query": "q2", "content": null},
                {"query": "q3"},
                42
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = assert_ok!(client_for(&server.uri()).list_knowledge().await);
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn query_is_percent_encoded_as_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/knowledge/why%20cats%2Fpurr"))
            .and(body_json(serde_json::json!({"content": "nuevo"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/knowledge/why%20cats%2Fpurr"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        assert_ok!(client.update_knowledge("why cats/purr", "nuevo").await);
        assert_ok!(client.delete_knowledge("why cats/purr").await);
    }

    #[tokio::test]
    async fn base_path_prefix_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/backend/api/knowledge"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&format!("{}/backend/", server.uri()));
        assert_ok!(client.delete_all_knowledge().await);
    }

    #[tokio::test]
    async fn upload_sends_multipart_file_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload-document"))
            .and(body_string_contains("name=\"file\"; filename=\"notas.txt\""))
            .and(body_string_contains("contenido de prueba"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notas.txt");
        std::fs::write(&file, "contenido de prueba").unwrap();

        assert_ok!(client_for(&server.uri()).upload_document(&file).await);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Puerto reservado sin servidor escuchando.
        let client = client_for("http://127.0.0.1:9");
        let err = assert_err!(client.list_knowledge().await);
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
