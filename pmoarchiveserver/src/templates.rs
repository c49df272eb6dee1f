//! Gabarits HTML
//!
//! Les pages sont assemblées depuis des fragments HTML chargés une fois au
//! démarrage : chaque fichier `*.html` du répertoire de gabarits devient un
//! gabarit nommé par son nom de fichier sans extension. La substitution est
//! textuelle, `{CLÉ}` remplacée par sa valeur ; l'échappement HTML est à la
//! charge de l'appelant, certaines valeurs (pieds de page) sont du HTML brut
//! volontairement.

use crate::error::ServerError;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub struct TemplateManager {
    templates: HashMap<String, String>,
}

impl TemplateManager {
    /// Charge tous les gabarits `*.html` du répertoire.
    pub fn load(dir: &Path) -> Result<TemplateManager, ServerError> {
        let mut templates = HashMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            templates.insert(name, std::fs::read_to_string(&path)?);
        }
        info!(count = templates.len(), dir = %dir.display(), "templates loaded");
        Ok(TemplateManager { templates })
    }

    /// Rend un gabarit en remplaçant chaque `{CLÉ}`.
    pub fn render(&self, name: &str, values: &[(&str, &str)]) -> Result<String, ServerError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| ServerError::MissingTemplate(name.to_string()))?;
        let mut output = template.clone();
        for (key, value) in values {
            output = output.replace(&format!("{{{key}}}"), value);
        }
        Ok(output)
    }

    pub fn has(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

/// Échappement HTML minimal pour les valeurs interpolées.
pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
