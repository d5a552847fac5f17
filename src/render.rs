//! Proyección pura del transcript a una vista presentable.
//!
//! Cada pasada de render construye su propio registro de marcadores: el
//! marcador `n` sólo existe en la vista en la que se numeró, así que no quedan
//! enlaces colgando de renders anteriores.

use std::fmt::Write as _;

use crate::links::{self, Span};
use crate::models::Message;

/// Categoría de presentación de un mensaje. La función desde `source` es total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceCategory {
    User,
    Supervisor,
    Git,
    Research,
    Database,
    Internet,
    System,
    Error,
}

impl SourceCategory {
    pub fn from_source(source: Option<&str>) -> Self {
        let Some(source) = source else {
            return Self::System;
        };
        match source.trim().to_lowercase().as_str() {
            "user" => Self::User,
            "supervisor" | "supervisoragent" => Self::Supervisor,
            "git" | "gitagent" => Self::Git,
            "research" | "researchagent" => Self::Research,
            "database" => Self::Database,
            "internet" => Self::Internet,
            "error" => Self::Error,
            _ => Self::System,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::User => "tú",
            Self::Supervisor => "supervisor",
            Self::Git => "git",
            Self::Research => "research",
            Self::Database => "database",
            Self::Internet => "internet",
            Self::System => "system",
            Self::Error => "error",
        }
    }

    /// Sólo las respuestas de agentes se reescriben con marcadores.
    fn carries_file_links(self) -> bool {
        !matches!(self, Self::User | Self::System | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub category: SourceCategory,
    pub is_user: bool,
    pub lines: Vec<Vec<Span>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedTranscript {
    pub messages: Vec<RenderedMessage>,
    link_commands: Vec<String>,
}

impl RenderedTranscript {
    /// Comando del marcador `number` (base 1) de esta pasada de render.
    pub fn link_command(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.link_commands.get(idx))
            .map(String::as_str)
    }

    pub fn link_count(&self) -> usize {
        self.link_commands.len()
    }

    /// Texto para la consola a partir del mensaje `skip`. Cada marcador se muestra
    /// como `etiqueta[n]`, con la numeración de la vista completa.
    pub fn to_terminal_from(&self, skip: usize) -> String {
        let mut out = String::new();
        let mut next_link = 1;
        for (position, message) in self.messages.iter().enumerate() {
            if position < skip {
                next_link += message
                    .lines
                    .iter()
                    .map(|line| links::links(line).count())
                    .sum::<usize>();
                continue;
            }
            let prefix = if message.is_user {
                "> ".to_string()
            } else {
                format!("[{}] ", message.category.label())
            };
            for (i, line) in message.lines.iter().enumerate() {
                if i == 0 {
                    out.push_str(&prefix);
                } else {
                    out.push_str(&" ".repeat(prefix.chars().count()));
                }
                for span in line {
                    match span {
                        Span::Text(text) => out.push_str(text),
                        Span::Link(link) => {
                            let _ = write!(out, "{}[{}]", link.label, next_link);
                            next_link += 1;
                        }
                    }
                }
                out.push('\n');
            }
        }
        out
    }
}

pub fn render(transcript: &[Message]) -> RenderedTranscript {
    let mut link_commands = Vec::new();
    let messages = transcript
        .iter()
        .map(|message| {
            let category = if message.is_user {
                SourceCategory::User
            } else {
                SourceCategory::from_source(message.source.as_deref())
            };

            let lines: Vec<Vec<Span>> = if !message.is_user && category.carries_file_links() {
                links::rewrite_content(&message.content)
            } else {
                message
                    .content
                    .split('\n')
                    .map(|line| vec![Span::Text(line.to_string())])
                    .collect()
            };

            for line in &lines {
                link_commands.extend(links::links(line).map(|link| link.command.clone()));
            }

            RenderedMessage {
                category,
                is_user: message.is_user,
                lines,
            }
        })
        .collect();

    RenderedTranscript {
        messages,
        link_commands,
    }
}
