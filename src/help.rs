//! Ayuda local por espacio de comandos. Se resuelve sin red.

/// Plantilla estática de ayuda para un espacio de comandos (`git`, `research`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelpEntry {
    pub namespace: &'static str,
    pub trigger: &'static str,
    pub source: &'static str,
    pub content: &'static str,
}

pub const HELP_ENTRIES: &[HelpEntry] = &[
    HelpEntry {
        namespace: "git",
        trigger: "git: help",
        source: "GitAgent",
        content: "\
GitAgent: comandos disponibles
  git: explain <fichero>      Explica qué hace un fichero del repositorio
  git: visa filen <nombre>    Localiza un fichero y lo explica
  git: review PR #<número>    Revisa una pull request y publica el comentario
  git: <pregunta>             Analiza el código del repositorio

Consejo: los nombres de fichero en las respuestas se pueden abrir con :open <n>.",
    },
    HelpEntry {
        namespace: "research",
        trigger: "research: help",
        source: "ResearchAgent",
        content: "\
ResearchAgent: comandos disponibles
  research: <pregunta>        Busca primero en la base de conocimiento y,
                              si no basta, en internet
La respuesta indica su origen: database (conocimiento local) o internet.
Los resultados se guardan y se pueden revisar en el centro de conocimiento (:kb).",
    },
];

/// Devuelve la entrada de ayuda cuyo disparador aparece en `task`,
/// sin distinguir mayúsculas y en cualquier posición del texto.
pub fn match_help(task: &str) -> Option<&'static HelpEntry> {
    let lowered = task.to_lowercase();
    HELP_ENTRIES
        .iter()
        .find(|entry| lowered.contains(entry.trigger))
}

pub fn entry(namespace: &str) -> Option<&'static HelpEntry> {
    HELP_ENTRIES.iter().find(|entry| entry.namespace == namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_match_case_insensitively_anywhere() {
        assert_eq!(match_help("GIT: HELP").map(|e| e.namespace), Some("git"));
        assert_eq!(match_help("please, git: Help me").map(|e| e.namespace), Some("git"));
        assert_eq!(match_help("Research: help").map(|e| e.namespace), Some("research"));
    }

    #[test]
    fn ordinary_tasks_do_not_match() {
        assert!(match_help("git: explain main.tsx").is_none());
        assert!(match_help("help").is_none());
        assert!(match_help("git:help").is_none());
    }

    #[test]
    fn every_namespace_has_content() {
        for ns in ["git", "research"] {
            let e = entry(ns).unwrap();
            assert!(e.content.lines().count() > 1);
            assert!(!e.source.is_empty());
        }
        assert!(entry("docker").is_none());
    }
}
