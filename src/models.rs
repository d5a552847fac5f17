//! Modelos de dominio (mensajes del chat, documentos y chunks de conocimiento)
//! y payloads del contrato HTTP con el backend.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const SOURCE_USER: &str = "user";
pub const SOURCE_SYSTEM: &str = "system";
pub const SOURCE_ERROR: &str = "error";
pub const SOURCE_UNKNOWN: &str = "unknown";

/// Entrada del transcript. Nunca se modifica una vez insertada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: String,
    /// Origen lógico: "user", "supervisor", nombre de agente, "system", "error"...
    /// Ausente equivale a "system".
    pub source: Option<String>,
    pub is_user: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: Some(SOURCE_USER.to_string()),
            is_user: true,
        }
    }

    pub fn agent(content: impl Into<String>, source: Option<String>) -> Self {
        Self {
            content: content.into(),
            source,
            is_user: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::agent(content, Some(SOURCE_SYSTEM.to_string()))
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::agent(content, Some(SOURCE_ERROR.to_string()))
    }

    pub fn source_tag(&self) -> &str {
        self.source.as_deref().unwrap_or(SOURCE_SYSTEM)
    }
}

// --- Payloads del supervisor ---

#[derive(Debug, Serialize)]
pub struct AskPayload<'a> {
    pub task: &'a str,
}

/// Respuesta de `/api/ask-supervisor`. Todos los campos son opcionales:
/// el backend no garantiza ninguno de ellos.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupervisorReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Cuerpo de error genérico (`{"error": "..."}`) que el backend devuelve en fallos.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdatePayload<'a> {
    pub content: &'a str,
}

// --- Conocimiento ---

/// Fragmento ordenado de un documento. `chunk_index` es base cero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(alias = "chunkIndex")]
    pub chunk_index: i64,
    pub content: String,
}

/// Documento agrupado: una partición con sus chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    #[serde(alias = "partitionId")]
    pub partition_id: String,
    /// Etiqueta humana; es el identificador externo para editar y borrar.
    pub query: String,
    #[serde(default, alias = "updatedAt", deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Fila plana de un chunk, tal y como la devuelven algunas versiones del backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChunkRow {
    #[serde(alias = "partitionId")]
    pub partition_id: String,
    pub query: String,
    #[serde(default, alias = "updatedAt", deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(alias = "chunkIndex")]
    pub chunk_index: i64,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Variante simple, sin chunks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KnowledgeEntry {
    pub query: String,
    pub content: String,
    #[serde(default, alias = "updatedAt", deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Cualquiera de las formas que puede tener un elemento de `GET /api/knowledge`.
/// El orden de las variantes importa: una fila de chunk también encaja como entrada plana.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum KnowledgeRecord {
    Grouped(KnowledgeDocument),
    Row(ChunkRow),
    Entry(KnowledgeEntry),
}

/// Acepta RFC 3339, fechas HTTP (RFC 2822, lo que emite el backend en Python)
/// o milisegundos desde epoch. Cualquier otra cosa se trata como desconocida.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| parse_timestamp(&v)))
}

pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .or_else(|_| DateTime::parse_from_rfc2822(s))
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn absent_source_reads_as_system() {
        let msg = Message::agent("hola", None);
        assert_eq!(msg.source_tag(), "system");
        assert!(!msg.is_user);
        assert_eq!(Message::user("x").source_tag(), "user");
    }

    #[test]
    fn detects_each_knowledge_shape() {
        let raw = json!([
            {
                "partition_id": "p1",
                "query": "Gatos",
                "updated_at": "2024-05-01T10:00:00Z",
                "chunks": [{"chunk_index": 1, "content": "b"}, {"chunk_index": 0, "content": "a"}]
            },
            {
                "partitionId": "p2",
                "query": "Perros",
                "updatedAt": "Wed, 01 May 2024 10:00:00 GMT",
                "chunkIndex": 0,
                "content": "guau"
            },
            {"query": "Notas", "content": "texto", "updated_at": 1714557600000i64}
        ]);

        let records: Vec<KnowledgeRecord> = serde_json::from_value(raw).unwrap();
        assert!(matches!(records[0], KnowledgeRecord::Grouped(_)));
        assert!(matches!(records[1], KnowledgeRecord::Row(_)));
        assert!(matches!(records[2], KnowledgeRecord::Entry(_)));

        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        match &records[1] {
            KnowledgeRecord::Row(row) => assert_eq!(row.updated_at, Some(expected)),
            other => panic!("unexpected record {other:?}"),
        }
        match &records[2] {
            KnowledgeRecord::Entry(entry) => assert_eq!(entry.updated_at, Some(expected)),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn unparsable_timestamp_does_not_fail_the_record() {
        let entry: KnowledgeEntry =
            serde_json::from_value(json!({"query": "q", "content": "c", "updated_at": "ayer"})).unwrap();
        assert_eq!(entry.updated_at, None);

        let entry: KnowledgeEntry = serde_json::from_value(json!({"query": "q", "content": "c"})).unwrap();
        assert_eq!(entry.updated_at, None);
    }
}
