//! Reescritura heurística de referencias a ficheros en las respuestas de los agentes.
//!
//! Cada línea se procesa por separado: si contiene un nombre de fichero con una
//! extensión conocida, el nombre se sustituye por un marcador que lleva el comando
//! `git: explain <ruta>`. La ruta es la última secuencia sin espacios ni caracteres
//! de dibujo de árbol (`├──`, `└──`, `│`) de la línea. No es un parser: nunca falla
//! y las líneas sin coincidencia se devuelven intactas.

use std::sync::LazyLock;

use regex_lite::Regex;

pub const FILE_EXTENSIONS: &[&str] = &[
    "tsx", "ts", "jsx", "js", "json", "py", "rs", "md", "css", "html", "txt", "toml", "yaml", "yml",
];

static FILE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"[A-Za-z0-9_\-.]+\.(?:{})\b", FILE_EXTENSIONS.join("|"));
    Regex::new(&pattern).expect("file regex must compile")
});

// Rango U+2500..U+257F (Box Drawing). `\s` de regex-lite es sólo ASCII, así que
// el espacio duro (U+00A0) se excluye aparte.
static TRAILING_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[^\\s\u{a0}─-╿]+$").expect("trailing path regex must compile")
});

/// Marcador interactivo: inerte hasta que la capa de UI lo activa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLink {
    pub label: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Text(String),
    Link(FileLink),
}

pub fn explain_command(full_path: &str) -> String {
    format!("git: explain {full_path}")
}

/// Reescribe una línea. Concatenar el texto y las etiquetas del resultado
/// reproduce siempre la línea original.
pub fn rewrite_line(line: &str) -> Vec<Span> {
    let Some(file_match) = FILE_REGEX.find(line) else {
        return vec![Span::Text(line.to_string())];
    };
    let Some(full_path) = TRAILING_PATH_REGEX.find(line.trim_end()) else {
        return vec![Span::Text(line.to_string())];
    };

    let mut spans = Vec::with_capacity(3);
    let before = &line[..file_match.start()];
    let after = &line[file_match.end()..];
    if !before.is_empty() {
        spans.push(Span::Text(before.to_string()));
    }
    spans.push(Span::Link(FileLink {
        label: file_match.as_str().to_string(),
        command: explain_command(full_path.as_str()),
    }));
    if !after.is_empty() {
        spans.push(Span::Text(after.to_string()));
    }
    spans
}

/// Reescribe un contenido completo, línea a línea y en orden.
pub fn rewrite_content(content: &str) -> Vec<Vec<Span>> {
    content.split('\n').map(rewrite_line).collect()
}

pub fn links(spans: &[Span]) -> impl Iterator<Item = &FileLink> {
    spans.iter().filter_map(|span| match span {
        Span::Link(link) => Some(link),
        Span::Text(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn plain_text(spans: &[Span]) -> String {
        spans
            .iter()
            .map(|span| match span {
                Span::Text(text) => text.as_str(),
                Span::Link(link) => link.label.as_str(),
            })
            .collect()
    }

    #[test]
    fn tree_line_becomes_explain_marker() {
        let spans = rewrite_line("└── main.tsx");
        assert_eq!(
            spans,
            vec![
                Span::Text("└── ".to_string()),
                Span::Link(FileLink {
                    label: "main.tsx".to_string(),
                    command: "git: explain main.tsx".to_string(),
                }),
            ]
        );
    }

    #[test]
    fn line_without_extension_is_untouched() {
        let line = "│   ├── components   (carpeta) ";
        assert_eq!(rewrite_line(line), vec![Span::Text(line.to_string())]);
        assert_eq!(rewrite_line(""), vec![Span::Text(String::new())]);
    }

    #[test]
    fn nested_path_carries_full_path_in_command() {
        let spans = rewrite_line("│   └── src/components/ChatInterface.tsx");
        let found: Vec<_> = links(&spans).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "ChatInterface.tsx");
        assert_eq!(found[0].command, "git: explain src/components/ChatInterface.tsx");
    }

    #[test]
    fn longer_extension_wins_over_prefix() {
        let spans = rewrite_line("├── package.json");
        assert_eq!(links(&spans).next().unwrap().label, "package.json");

        let spans = rewrite_line("├── index.ts");
        assert_eq!(links(&spans).next().unwrap().command, "git: explain index.ts");
    }

    #[test]
    fn rewriting_preserves_text_and_line_order() {
        let content = "Estructura:\n├── app.py\n│   └── utils/chunking.py\nsin ficheros aquí\n";
        let lines = rewrite_content(content);
        assert_eq!(lines.len(), 5);

        let rebuilt: Vec<String> = lines.iter().map(|l| plain_text(l)).collect();
        assert_eq!(rebuilt.join("\n"), content);

        let commands: Vec<String> = lines
            .iter()
            .flat_map(|l| links(l).map(|link| link.command.clone()).collect::<Vec<_>>())
            .collect();
        assert_eq!(commands, vec!["git: explain app.py", "git: explain utils/chunking.py"]);
    }

    #[test]
    fn trailing_whitespace_is_ignored_when_extracting_path() {
        let spans = rewrite_line("└── README.md   ");
        assert_eq!(links(&spans).next().unwrap().command, "git: explain README.md");
        assert_eq!(plain_text(&spans), "└── README.md   ");
    }

    #[test]
    fn non_breaking_space_separates_the_path() {
        let spans = rewrite_line("a\u{a0}main.rs");
        assert_eq!(links(&spans).next().unwrap().command, "git: explain main.rs");
        assert_eq!(plain_text(&spans), "a\u{a0}main.rs");
    }
}
