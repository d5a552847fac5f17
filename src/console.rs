//! Consola interactiva: hace de capa de UI sobre el chat y el centro de conocimiento.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use crate::{
    app_state::AppState,
    chat::SubmitOutcome,
    help,
    knowledge::{DocumentView, KnowledgeError},
    render::RenderedTranscript,
};

const CONSOLE_HELP: &str = "\
Escribe una tarea para el supervisor (p. ej. `research: why do cats purr?`).
  git: help | research: help   Ayuda de cada agente (local)
  :open <n>                    Ejecuta el marcador de fichero n
  :kb                          Lista los documentos (:kb refresh para recargar)
  :kb expand <doc>             Muestra u oculta los chunks
  :kb edit <doc> <chunk>       Edita un chunk (números tal y como se muestran)
  :kb text <contenido>         Sustituye el texto en edición (\\n = salto de línea)
  :kb save <doc> | :kb cancel <doc>
  :kb rm <doc>                 Borra un documento
  :kb clear                    Borra todo (pide confirmación)
  :kb upload <ruta.txt>        Sube un documento
  :kb dismiss                  Oculta el mensaje de estado
  :help [git|research] | :quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KbCommand {
    List,
    Refresh,
    Expand(usize),
    Edit { doc: usize, chunk: usize },
    Text(String),
    Save(usize),
    Cancel(usize),
    Remove(usize),
    Clear,
    Upload(PathBuf),
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Chat(String),
    Open(usize),
    Kb(KbCommand),
    Help(Option<String>),
    Quit,
}

/// Interpreta una línea de la consola. Todo lo que no empieza por `:` es una tarea.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = trimmed.strip_prefix(':') else {
        return Ok(Command::Chat(trimmed.to_string()));
    };

    let (verb, args) = split_word(rest);
    match verb {
        "help" | "h" if args.is_empty() => Ok(Command::Help(None)),
        "help" | "h" => Ok(Command::Help(Some(args.to_lowercase()))),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        "open" | "o" => Ok(Command::Open(parse_number(args)?)),
        "kb" => parse_kb(args).map(Command::Kb),
        other => Err(format!("Comando desconocido: :{other}")),
    }
}

fn parse_kb(args: &str) -> Result<KbCommand, String> {
    let (sub, rest) = split_word(args);
    match sub {
        "" | "ls" | "list" => Ok(KbCommand::List),
        "refresh" => Ok(KbCommand::Refresh),
        "expand" => Ok(KbCommand::Expand(parse_number(rest)?)),
        "edit" => {
            let (doc, chunk) = split_word(rest);
            Ok(KbCommand::Edit {
                doc: parse_number(doc)?,
                chunk: parse_number(chunk)?,
            })
        }
        "text" => Ok(KbCommand::Text(rest.replace("\\n", "\n"))),
        "save" => Ok(KbCommand::Save(parse_number(rest)?)),
        "cancel" => Ok(KbCommand::Cancel(parse_number(rest)?)),
        "rm" | "delete" => Ok(KbCommand::Remove(parse_number(rest)?)),
        "clear" => Ok(KbCommand::Clear),
        "upload" if !rest.is_empty() => Ok(KbCommand::Upload(PathBuf::from(rest))),
        "upload" => Err("Falta la ruta del fichero".to_string()),
        "dismiss" => Ok(KbCommand::Dismiss),
        other => Err(format!("Subcomando desconocido: :kb {other}")),
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (input, ""),
    }
}

/// Números base 1, tal y como se muestran en pantalla.
fn parse_number(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("Se esperaba un número mayor que cero: '{}'", raw.trim())),
    }
}

/// Listado de documentos para la consola.
pub fn format_documents(views: &[DocumentView]) -> String {
    if views.is_empty() {
        return "No hay documentos subidos.\n".to_string();
    }

    let mut out = String::new();
    for (i, view) in views.iter().enumerate() {
        let doc = &view.document;
        let updated = doc
            .updated_at
            .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "desconocida".to_string());
        let marker = if view.expanded { "-" } else { "+" };
        out.push_str(&format!(
            "{marker} [{}] {} · actualizado: {updated} · chunks: {}",
            i + 1,
            doc.query,
            doc.chunks.len()
        ));
        if let Some(source) = &doc.source {
            out.push_str(&format!(" · fuente: {source}"));
        }
        out.push('\n');

        if !view.expanded {
            continue;
        }
        // Numeración por posición (base 1), la misma que usa `:kb edit`, no por `chunk_index`.
        for (position, chunk) in view.sorted_chunks().iter().enumerate() {
            let editing = view
                .edit
                .as_ref()
                .filter(|edit| edit.chunk_index == chunk.chunk_index);
            let (label, text) = match editing {
                Some(edit) => ("editando", edit.buffer.as_str()),
                None => ("", chunk.content.as_str()),
            };
            out.push_str(&format!("    Chunk {} {label}\n", position + 1));
            for line in text.lines() {
                out.push_str(&format!("      {line}\n"));
            }
        }
    }
    out
}

struct Console {
    state: AppState,
    last_render: RenderedTranscript,
    editing: Option<String>,
    input: Lines<BufReader<Stdin>>,
}

pub async fn run(state: AppState) -> Result<()> {
    let mut console = Console {
        state,
        last_render: RenderedTranscript::default(),
        editing: None,
        input: BufReader::new(tokio::io::stdin()).lines(),
    };

    println!("Conectado a {}", console.state.config.api_base_url);
    println!("{CONSOLE_HELP}\n");
    if let Err(err) = console.state.knowledge.refresh().await {
        println!("No se pudo cargar el conocimiento: {err}");
    }

    loop {
        console.prompt()?;
        let Some(line) = console.input.next_line().await? else {
            break;
        };
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => console.execute(command).await?,
            Err(message) => println!("{message}"),
        }
    }

    info!("Consola cerrada");
    Ok(())
}

impl Console {
    fn prompt(&self) -> Result<()> {
        let status = self.state.status();
        if !status.message.is_empty() {
            println!("({})", status.message);
        }
        if status.is_busy {
            print!("[ocupado] ");
        }
        print!("> ");
        std::io::stdout().flush()?;
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Empty | Command::Quit => {}
            Command::Help(None) => println!("{CONSOLE_HELP}"),
            Command::Help(Some(namespace)) => match help::entry(&namespace) {
                Some(entry) => println!("{}", entry.content),
                None => println!("No hay ayuda para '{namespace}' (prueba con git o research)"),
            },
            Command::Chat(task) => {
                let before = self.state.chat.transcript().len();
                self.state.chat.set_draft(task.clone());
                let outcome = self.state.chat.submit(&task).await;
                self.show_transcript_since(before, outcome);
            }
            Command::Open(number) => {
                let Some(command) = self.last_render.link_command(number).map(str::to_string) else {
                    println!("No existe el marcador {number}");
                    return Ok(());
                };
                let before = self.state.chat.transcript().len();
                let outcome = self.state.chat.activate_file_link(&command).await;
                self.show_transcript_since(before, outcome);
            }
            Command::Kb(kb) => self.execute_kb(kb).await?,
        }
        Ok(())
    }

    fn show_transcript_since(&mut self, before: usize, outcome: SubmitOutcome) {
        if outcome == SubmitOutcome::Busy {
            println!(
                "Espera a que termine la petición en curso (borrador: {}).",
                self.state.chat.draft()
            );
            return;
        }
        // Cada render sustituye al anterior, y con él todos los marcadores.
        self.last_render = self.state.chat.render();
        print!("{}", self.last_render.to_terminal_from(before));
        if outcome == SubmitOutcome::Replied && self.last_render.link_count() > 0 {
            println!("(usa :open <n> para pedir la explicación de un fichero)");
        }
    }

    fn partition_at(&self, number: usize) -> Option<String> {
        self.state
            .knowledge
            .documents()
            .get(number - 1)
            .map(|view| view.partition_id().to_string())
    }

    async fn execute_kb(&mut self, command: KbCommand) -> Result<()> {
        let knowledge = self.state.knowledge.clone();
        let result: Result<(), KnowledgeError> = match command {
            KbCommand::List => Ok(()),
            KbCommand::Refresh => knowledge.refresh().await.map(|_| ()),
            KbCommand::Expand(doc) => match self.partition_at(doc) {
                Some(id) => knowledge.toggle_expand(&id).map(|_| ()),
                None => Err(KnowledgeError::UnknownDocument(doc.to_string())),
            },
            KbCommand::Edit { doc, chunk } => match self.partition_at(doc) {
                Some(id) => {
                    let view = knowledge.document(&id);
                    let index = view
                        .and_then(|v| v.sorted_chunks().get(chunk - 1).map(|c| c.chunk_index));
                    match index {
                        Some(index) => {
                            let started = knowledge.begin_edit(&id, index);
                            if started.is_ok() {
                                if !knowledge.document(&id).is_some_and(|v| v.expanded) {
                                    knowledge.toggle_expand(&id)?;
                                }
                                self.editing = Some(id);
                            }
                            started
                        }
                        None => Err(KnowledgeError::StaleChunk(chunk as i64 - 1)),
                    }
                }
                None => Err(KnowledgeError::UnknownDocument(doc.to_string())),
            },
            KbCommand::Text(text) => match &self.editing {
                Some(id) => knowledge.update_edit_buffer(id, text),
                None => Err(KnowledgeError::NoActiveEdit),
            },
            KbCommand::Save(doc) => match self.partition_at(doc) {
                Some(id) => knowledge.save_edit(&id).await,
                None => Err(KnowledgeError::UnknownDocument(doc.to_string())),
            },
            KbCommand::Cancel(doc) => match self.partition_at(doc) {
                Some(id) => knowledge.cancel_edit(&id),
                None => Err(KnowledgeError::UnknownDocument(doc.to_string())),
            },
            KbCommand::Remove(doc) => match self.partition_at(doc) {
                Some(id) => knowledge.delete_document(&id).await,
                None => Err(KnowledgeError::UnknownDocument(doc.to_string())),
            },
            KbCommand::Clear => {
                print!("¿Seguro que quieres borrar todos los datos? No se puede deshacer. [s/N] ");
                std::io::stdout().flush()?;
                let answer = self.input.next_line().await?.unwrap_or_default();
                let confirmed = matches!(answer.trim().to_lowercase().as_str(), "s" | "si" | "sí" | "y" | "yes");
                knowledge.delete_all(|| confirmed).await
            }
            KbCommand::Upload(path) => {
                println!("Subiendo {}...", path.display());
                knowledge.upload_document(&path).await
            }
            KbCommand::Dismiss => {
                knowledge.dismiss_upload_status();
                Ok(())
            }
        };

        match result {
            Ok(()) => print!("{}", format_documents(&knowledge.documents())),
            Err(KnowledgeError::NotConfirmed) => println!("Borrado cancelado."),
            Err(err) => println!("Error: {err}"),
        }
        Ok(())
    }
}
