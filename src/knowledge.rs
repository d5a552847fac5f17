//! Motor de reconciliación del conocimiento.
//!
//! Agrupa los registros que devuelve el backend en documentos ordenados por
//! `chunk_index`, mantiene el estado de UI de cada documento (expandido, edición
//! de un chunk) y reconstruye el cuerpo completo antes de guardar. El backend es
//! la fuente de verdad: tras cada mutación aceptada se vuelve a pedir la lista.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::api::{ApiError, BackendClient};
use crate::models::{Chunk, KnowledgeDocument, KnowledgeRecord};

pub const ACCEPTED_EXTENSION: &str = ".txt";

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("sólo se admiten ficheros .txt: {0}")]
    UnsupportedFile(String),
    #[error("documento desconocido: {0}")]
    UnknownDocument(String),
    #[error("el documento no tiene ninguna edición activa")]
    NoActiveEdit,
    #[error("el chunk {0} ya no existe en el documento")]
    StaleChunk(i64),
    #[error("ya se está guardando este documento")]
    SaveInProgress,
    #[error("operación cancelada: se requiere confirmación")]
    NotConfirmed,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Estado del indicador de subida. Nunca éxito y error a la vez.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Succeeded(String),
    Failed(String),
}

impl UploadStatus {
    pub fn is_uploading(&self) -> bool {
        matches!(self, Self::Uploading)
    }
}

/// Cursor de edición de un documento: qué chunk y con qué texto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEdit {
    pub chunk_index: i64,
    pub buffer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentView {
    pub document: KnowledgeDocument,
    pub expanded: bool,
    pub edit: Option<ChunkEdit>,
}

impl DocumentView {
    fn new(document: KnowledgeDocument) -> Self {
        Self {
            document,
            expanded: false,
            edit: None,
        }
    }

    pub fn partition_id(&self) -> &str {
        &self.document.partition_id
    }

    pub fn sorted_chunks(&self) -> Vec<Chunk> {
        sort_chunks(&self.document.chunks)
    }
}

// ---------------------------------------------------------------------
// Funciones puras
// ---------------------------------------------------------------------

/// Ordena por `chunk_index` ascendente. El orden es estable: ante índices
/// repetidos se conserva la posición original.
pub fn sort_chunks(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut sorted = chunks.to_vec();
    sorted.sort_by_key(|chunk| chunk.chunk_index);
    sorted
}

/// Une el contenido de todos los chunks, en orden, separados por `\n`.
pub fn reassemble(chunks: &[Chunk]) -> String {
    sort_chunks(chunks)
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sustituye el contenido del chunk `chunk_index` y devuelve la lista ordenada.
/// `None` si el índice ya no existe.
pub fn apply_edit(chunks: &[Chunk], chunk_index: i64, content: &str) -> Option<Vec<Chunk>> {
    let mut sorted = sort_chunks(chunks);
    let target = sorted.iter_mut().find(|chunk| chunk.chunk_index == chunk_index)?;
    target.content = content.to_string();
    Some(sorted)
}

/// Convierte la respuesta de `GET /api/knowledge` en documentos agrupados.
///
/// - Documentos agrupados: se usan tal cual.
/// - Filas de chunk: se agrupan por `partition_id` en orden de aparición.
/// - Entradas planas: un documento de un solo chunk cuya partición es la `query`.
pub fn group_records(records: Vec<KnowledgeRecord>) -> Vec<KnowledgeDocument> {
    let mut documents: Vec<KnowledgeDocument> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in records {
        let (document, chunks) = match record {
            KnowledgeRecord::Grouped(mut doc) => {
                let chunks = std::mem::take(&mut doc.chunks);
                (doc, chunks)
            }
            KnowledgeRecord::Row(row) => {
                let chunk = Chunk {
                    chunk_index: row.chunk_index,
                    content: row.content,
                };
                let doc = KnowledgeDocument {
                    partition_id: row.partition_id,
                    query: row.query,
                    updated_at: row.updated_at,
                    chunks: Vec::new(),
                    source: row.source,
                };
                (doc, vec![chunk])
            }
            KnowledgeRecord::Entry(entry) => {
                let chunk = Chunk {
                    chunk_index: 0,
                    content: entry.content,
                };
                let doc = KnowledgeDocument {
                    partition_id: entry.query.clone(),
                    query: entry.query,
                    updated_at: entry.updated_at,
                    chunks: Vec::new(),
                    source: None,
                };
                (doc, vec![chunk])
            }
        };

        match positions.get(&document.partition_id).copied() {
            Some(idx) => {
                let existing = &mut documents[idx];
                existing.chunks.extend(chunks);
                if document.updated_at > existing.updated_at {
                    existing.updated_at = document.updated_at;
                }
                if existing.source.is_none() {
                    existing.source = document.source;
                }
            }
            None => {
                positions.insert(document.partition_id.clone(), documents.len());
                documents.push(KnowledgeDocument { chunks, ..document });
            }
        }
    }

    documents
}

/// Conserva el estado de UI de los documentos que siguen existiendo tras un refresco.
fn merge_views(previous: Vec<DocumentView>, documents: Vec<KnowledgeDocument>) -> Vec<DocumentView> {
    let mut previous: HashMap<String, DocumentView> = previous
        .into_iter()
        .map(|view| (view.document.partition_id.clone(), view))
        .collect();

    documents
        .into_iter()
        .map(|document| match previous.remove(&document.partition_id) {
            Some(old) => DocumentView {
                document,
                expanded: old.expanded,
                edit: old.edit,
            },
            None => DocumentView::new(document),
        })
        .collect()
}

// ---------------------------------------------------------------------
// Motor con estado
// ---------------------------------------------------------------------

#[derive(Debug, Default)]
struct KnowledgeState {
    documents: Vec<DocumentView>,
    upload: UploadStatus,
    saving: HashSet<String>,
}

impl KnowledgeState {
    fn view_mut(&mut self, partition_id: &str) -> Result<&mut DocumentView, KnowledgeError> {
        self.documents
            .iter_mut()
            .find(|view| view.document.partition_id == partition_id)
            .ok_or_else(|| KnowledgeError::UnknownDocument(partition_id.to_string()))
    }
}

pub struct KnowledgeCenter {
    client: BackendClient,
    state: Mutex<KnowledgeState>,
}

/// Libera la marca de "guardando" del documento en cualquier salida.
struct SavingGuard<'a> {
    state: &'a Mutex<KnowledgeState>,
    partition_id: String,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .saving
            .remove(&self.partition_id);
    }
}

/// Si la subida se interrumpe sin resolverse, el indicador no se queda en "subiendo".
struct UploadGuard<'a> {
    state: &'a Mutex<KnowledgeState>,
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.upload.is_uploading() {
            state.upload = UploadStatus::Failed("La subida se interrumpió".to_string());
        }
    }
}

impl KnowledgeCenter {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            state: Mutex::new(KnowledgeState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, KnowledgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn documents(&self) -> Vec<DocumentView> {
        self.lock().documents.clone()
    }

    pub fn document(&self, partition_id: &str) -> Option<DocumentView> {
        self.lock()
            .documents
            .iter()
            .find(|view| view.document.partition_id == partition_id)
            .cloned()
    }

    pub fn upload_status(&self) -> UploadStatus {
        self.lock().upload.clone()
    }

    pub fn dismiss_upload_status(&self) {
        let mut state = self.lock();
        if !state.upload.is_uploading() {
            state.upload = UploadStatus::Idle;
        }
    }

    /// Vuelve a pedir la lista completa. Si falla, el estado local no cambia.
    pub async fn refresh(&self) -> Result<usize, KnowledgeError> {
        let records = match self.client.list_knowledge().await {
            Ok(records) => records,
            Err(err) => {
                error!("Error al obtener el conocimiento: {err}");
                return Err(err.into());
            }
        };
        let documents = group_records(records);
        let count = documents.len();

        let mut state = self.lock();
        let previous = std::mem::take(&mut state.documents);
        state.documents = merge_views(previous, documents);
        info!("Lista de conocimiento actualizada: {count} documentos");
        Ok(count)
    }

    pub fn toggle_expand(&self, partition_id: &str) -> Result<bool, KnowledgeError> {
        let mut state = self.lock();
        let view = state.view_mut(partition_id)?;
        view.expanded = !view.expanded;
        Ok(view.expanded)
    }

    /// Pone en edición un chunk. Sólo un chunk por documento: empezar otra
    /// edición en el mismo documento sustituye el cursor; otros documentos no cambian.
    pub fn begin_edit(&self, partition_id: &str, chunk_index: i64) -> Result<(), KnowledgeError> {
        let mut state = self.lock();
        let view = state.view_mut(partition_id)?;
        let chunk = view
            .document
            .chunks
            .iter()
            .find(|chunk| chunk.chunk_index == chunk_index)
            .ok_or(KnowledgeError::StaleChunk(chunk_index))?;
        view.edit = Some(ChunkEdit {
            chunk_index,
            buffer: chunk.content.clone(),
        });
        Ok(())
    }

    pub fn update_edit_buffer(
        &self,
        partition_id: &str,
        text: impl Into<String>,
    ) -> Result<(), KnowledgeError> {
        let mut state = self.lock();
        let view = state.view_mut(partition_id)?;
        let edit = view.edit.as_mut().ok_or(KnowledgeError::NoActiveEdit)?;
        edit.buffer = text.into();
        Ok(())
    }

    pub fn cancel_edit(&self, partition_id: &str) -> Result<(), KnowledgeError> {
        let mut state = self.lock();
        state.view_mut(partition_id)?.edit = None;
        Ok(())
    }

    /// Guarda la edición activa: reemplaza el chunk, reconstruye el documento
    /// completo y lo envía con `PATCH` usando la `query` como clave.
    ///
    /// Si el backend rechaza el cambio, la edición se conserva.
    pub async fn save_edit(&self, partition_id: &str) -> Result<(), KnowledgeError> {
        let (query, merged) = {
            let mut state = self.lock();
            if state.saving.contains(partition_id) {
                return Err(KnowledgeError::SaveInProgress);
            }
            let view = state.view_mut(partition_id)?;
            let edit = view.edit.clone().ok_or(KnowledgeError::NoActiveEdit)?;
            let Some(chunks) = apply_edit(&view.document.chunks, edit.chunk_index, &edit.buffer) else {
                warn!(
                    "El chunk {} ya no existe en '{}'; no se guarda nada",
                    edit.chunk_index, view.document.query
                );
                return Err(KnowledgeError::StaleChunk(edit.chunk_index));
            };
            let query = view.document.query.clone();
            state.saving.insert(partition_id.to_string());
            (query, reassemble(&chunks))
        };

        let guard = SavingGuard {
            state: &self.state,
            partition_id: partition_id.to_string(),
        };

        if let Err(err) = self.client.update_knowledge(&query, &merged).await {
            error!("Error al actualizar '{query}': {err}");
            return Err(err.into());
        }
        info!("Documento '{query}' actualizado");

        if let Ok(view) = self.lock().view_mut(partition_id) {
            view.edit = None;
        }
        drop(guard);

        if let Err(err) = self.refresh().await {
            warn!("El documento se guardó pero no se pudo refrescar la lista: {err}");
        }
        Ok(())
    }

    /// Borra un documento en el backend y, sólo si lo confirma, también en local.
    pub async fn delete_document(&self, partition_id: &str) -> Result<(), KnowledgeError> {
        let query = self.lock().view_mut(partition_id)?.document.query.clone();

        if let Err(err) = self.client.delete_knowledge(&query).await {
            error!("Error al borrar '{query}': {err}");
            return Err(err.into());
        }

        self.lock()
            .documents
            .retain(|view| view.document.partition_id != partition_id);
        info!("Documento '{query}' eliminado");
        Ok(())
    }

    /// Borra todo el conocimiento. `confirm` se consulta antes de cualquier E/S.
    pub async fn delete_all(&self, confirm: impl FnOnce() -> bool) -> Result<(), KnowledgeError> {
        if !confirm() {
            info!("Borrado total cancelado por el usuario");
            return Err(KnowledgeError::NotConfirmed);
        }

        match self.client.delete_all_knowledge().await {
            Ok(()) => {
                let mut state = self.lock();
                state.documents.clear();
                state.upload = UploadStatus::Succeeded("Se han eliminado todos los datos".to_string());
                info!("Todo el conocimiento ha sido eliminado");
                Ok(())
            }
            Err(err) => {
                error!("Error al borrar todo el conocimiento: {err}");
                self.lock().upload =
                    UploadStatus::Failed(format!("No se pudieron eliminar todos los datos: {err}"));
                Err(err.into())
            }
        }
    }

    /// Sube un documento `.txt`. Cualquier otra extensión se rechaza sin E/S.
    pub async fn upload_document(&self, path: &Path) -> Result<(), KnowledgeError> {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if !file_name.ends_with(ACCEPTED_EXTENSION) {
            warn!("Fichero rechazado: {file_name}");
            self.lock().upload =
                UploadStatus::Failed(format!("Sólo se admiten ficheros {ACCEPTED_EXTENSION}"));
            return Err(KnowledgeError::UnsupportedFile(file_name));
        }

        self.lock().upload = UploadStatus::Uploading;
        let guard = UploadGuard { state: &self.state };

        let result = self.client.upload_document(path).await;
        match &result {
            Ok(()) => {
                info!("Fichero '{file_name}' subido");
                self.lock().upload = UploadStatus::Succeeded(format!(
                    "{file_name} se ha subido y procesado correctamente"
                ));
            }
            Err(err) => {
                error!("Error al subir '{file_name}': {err}");
                self.lock().upload = UploadStatus::Failed(format!("Error al subir: {err}"));
            }
        }
        drop(guard);

        result?;
        if let Err(err) = self.refresh().await {
            warn!("Subida completada pero no se pudo refrescar la lista: {err}");
        }
        Ok(())
    }
}
