//! Motor de comandos y mensajes: transcript ordenado, ayuda local y una única
//! petición en vuelo hacia el supervisor.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use crate::api::BackendClient;
use crate::help;
use crate::models::{Message, SupervisorReply, SOURCE_UNKNOWN};
use crate::render::{self, RenderedTranscript};

const NO_RESPONSE: &str = "Sin respuesta del supervisor.";

/// Resultado de un envío, para que la capa de UI sepa qué ha pasado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Entrada vacía: no se hace nada.
    Ignored,
    /// Ya hay una petición en vuelo: no se toca el transcript.
    Busy,
    /// Resuelto localmente con la ayuda estática.
    Help,
    Replied,
    Failed,
}

#[derive(Debug, Default)]
struct ChatState {
    transcript: Vec<Message>,
    pending: bool,
    draft: String,
}

pub struct ChatSession {
    client: BackendClient,
    state: Mutex<ChatState>,
}

/// Libera el indicador `pending` en cualquier salida, incluida la cancelación del future.
struct PendingGuard<'a> {
    state: &'a Mutex<ChatState>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending = false;
    }
}

impl ChatSession {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            state: Mutex::new(ChatState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transcript(&self) -> Vec<Message> {
        self.lock().transcript.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    pub fn draft(&self) -> String {
        self.lock().draft.clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.lock().draft = text.into();
    }

    pub fn render(&self) -> RenderedTranscript {
        render::render(&self.lock().transcript)
    }

    /// Envía una tarea escrita por el usuario.
    ///
    /// La ayuda (`git: help`, `research: help`) se resuelve antes de cualquier E/S.
    /// El resto de tareas se envían al supervisor; la respuesta o el error se
    /// añaden al transcript como un único mensaje.
    pub async fn submit(&self, task: &str) -> SubmitOutcome {
        if task.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        {
            let mut state = self.lock();
            if state.pending {
                warn!("Envío ignorado: ya hay una petición en curso");
                return SubmitOutcome::Busy;
            }
            state.transcript.push(Message::user(task));

            if let Some(entry) = help::match_help(task) {
                info!("Ayuda local para '{}'", entry.namespace);
                state
                    .transcript
                    .push(Message::agent(entry.content, Some(entry.source.to_string())));
                return SubmitOutcome::Help;
            }

            state.draft.clear();
            state.pending = true;
        }

        let guard = PendingGuard { state: &self.state };
        self.dispatch(task, guard).await
    }

    /// Ejecuta el comando de un marcador de fichero. No pasa por la ayuda local
    /// y deja constancia del comando con un mensaje de sistema.
    pub async fn activate_file_link(&self, command: &str) -> SubmitOutcome {
        if command.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        {
            let mut state = self.lock();
            if state.pending {
                warn!("Marcador ignorado: ya hay una petición en curso");
                return SubmitOutcome::Busy;
            }
            state
                .transcript
                .push(Message::system(format!("Ejecutando: {command}")));
            state.pending = true;
        }

        let guard = PendingGuard { state: &self.state };
        self.dispatch(command, guard).await
    }

    async fn dispatch(&self, task: &str, _guard: PendingGuard<'_>) -> SubmitOutcome {
        let (message, outcome) = match self.client.ask_supervisor(task).await {
            Ok(reply) => {
                let message = reply_message(reply);
                info!("Respuesta recibida de '{}'", message.source_tag());
                (message, SubmitOutcome::Replied)
            }
            Err(err) => {
                error!("Error contactando con el supervisor: {err}");
                (
                    Message::error(format!("Error al contactar con el supervisor: {err}")),
                    SubmitOutcome::Failed,
                )
            }
        };

        self.lock().transcript.push(message);
        outcome
    }
}

fn reply_message(reply: SupervisorReply) -> Message {
    let content = reply
        .content
        .filter(|c| !c.is_empty())
        .or(reply.error.filter(|e| !e.is_empty()))
        .unwrap_or_else(|| NO_RESPONSE.to_string());
    let source = reply
        .source
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| SOURCE_UNKNOWN.to_string());
    Message::agent(content, Some(source))
}
