//! Analyse de l'en-tête `Range`
//!
//! Une seule plage d'octets est servie ; un en-tête multi-plages ou
//! malformé est ignoré et la réponse repasse en 200 complet. Les bornes
//! sont inclusives, comme sur le fil.

/// Plage d'octets demandée, bornes inclusives et validées contre la taille.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Valeur d'en-tête `Content-Range` pour cette plage.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Parse un en-tête `Range: bytes=...` contre la taille courante du fichier.
///
/// Formes acceptées : `a-b`, `a-` (jusqu'à la fin) et `-n` (les `n`
/// derniers octets). Tout le reste vaut `None`.
pub fn parse_range(header: &str, total: u64) -> Option<ByteRange> {
    if total == 0 {
        return None;
    }
    let spec = header.strip_prefix("bytes=")?;
    if spec.contains(',') {
        // Multi-plages : non géré, réponse complète.
        return None;
    }
    let (start_text, end_text) = spec.split_once('-')?;

    if start_text.is_empty() {
        // Suffixe : les n derniers octets.
        let n: u64 = end_text.parse().ok()?;
        if n == 0 {
            return None;
        }
        let start = total.saturating_sub(n);
        return Some(ByteRange {
            start,
            end: total - 1,
        });
    }

    let start: u64 = start_text.parse().ok()?;
    if start >= total {
        return None;
    }
    let end = if end_text.is_empty() {
        total - 1
    } else {
        let end: u64 = end_text.parse().ok()?;
        if end < start {
            return None;
        }
        end.min(total - 1)
    };
    Some(ByteRange { start, end })
}
