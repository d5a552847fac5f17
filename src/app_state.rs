use std::sync::Arc;

use crate::{
    api::BackendClient,
    chat::ChatSession,
    config::AppConfig,
    knowledge::{KnowledgeCenter, UploadStatus},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub chat: Arc<ChatSession>,
    pub knowledge: Arc<KnowledgeCenter>,
}

/// Resumen para la barra de estado de la consola.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
}

impl AppState {
    pub fn from_config(config: AppConfig) -> Self {
        let client = BackendClient::from_config(&config);
        Self {
            config,
            chat: Arc::new(ChatSession::new(client.clone())),
            knowledge: Arc::new(KnowledgeCenter::new(client)),
        }
    }

    pub fn status(&self) -> Status {
        let upload = self.knowledge.upload_status();
        let is_busy = self.chat.is_pending() || upload.is_uploading();
        let message = match upload {
            UploadStatus::Idle => String::new(),
            UploadStatus::Uploading => "Subiendo y procesando fichero...".to_string(),
            UploadStatus::Succeeded(msg) | UploadStatus::Failed(msg) => msg,
        };
        Status { is_busy, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_base_url;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_for(uri: &str) -> AppState {
        AppState::from_config(AppConfig {
            api_base_url: parse_base_url(uri).unwrap(),
            connect_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn status_is_busy_while_a_task_is_in_flight() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ask-supervisor"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"content": "ok", "source": "supervisor"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let state = state_for(&server.uri());
        assert_eq!(state.status(), Status::default());

        let (_, during) = tokio::join!(state.chat.submit("hola"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            state.status()
        });
        assert!(during.is_busy);
        assert!(!state.status().is_busy);
    }

    #[tokio::test]
    async fn status_message_mirrors_upload_banner() {
        let state = state_for("http://127.0.0.1:9");
        let _ = state.knowledge.upload_document(Path::new("notes.pdf")).await;
        assert_eq!(
            state.status(),
            Status {
                is_busy: false,
                message: "Sólo se admiten ficheros .txt".to_string(),
            }
        );
    }
}
