//! Parked-domain detection on the home page
//!
//! Registrar placeholders and "domain for sale" pages waste the whole
//! pipeline; they are classified before link discovery runs.

use once_cell::sync::Lazy;
use regex::Regex;

static PARKING_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bdomain\s+(?:is\s+)?for\s+sale\b",
        r"(?i)\bthis\s+domain\s+(?:has\s+been|was)\s+registered\b",
        r"(?i)\bdiese\s+domain\s+(?:steht\s+zum\s+verkauf|wurde\s+registriert)\b",
        r"(?i)\bdomain\s+kaufen\b",
        r"(?i)\bparked\s+(?:free|courtesy|domain)\b",
        r"(?i)\bdomain\s+parking\b",
        r"(?i)sedoparking|sedo\.com|parkingcrew|bodis\.com|dan\.com|afternic",
        r"(?i)\bbuy\s+this\s+domain\b",
        r"(?i)\bwebsite\s+coming\s+soon\b.{0,200}\bregister",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TAG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());

/// Heuristic: marker phrases, or a near-empty page naming only the domain.
pub fn is_parked(html: &str, domain: &str) -> bool {
    if PARKING_MARKERS.iter().any(|re| re.is_match(html)) {
        return true;
    }

    // Near-empty body that repeats the bare domain is a placeholder
    let text =
        crate::extraction::section_isolator::normalise_lines(&TAG_STRIP.replace_all(html, "\n"));
    let visible_len: usize = text.split_whitespace().map(str::len).sum();
    visible_len < 80 && text.to_lowercase().contains(&domain.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sale_pages_are_parked() {
        assert!(is_parked("<html><body>This domain is for sale!</body></html>", "x.de"));
        assert!(is_parked("<body>Diese Domain steht zum Verkauf.</body>", "x.de"));
        assert!(is_parked("<script src='https://sedoparking.com/x.js'></script>", "x.de"));
    }

    #[test]
    fn near_empty_placeholder_is_parked() {
        assert!(is_parked("<html><body><h1>beispiel.de</h1></body></html>", "beispiel.de"));
    }

    #[test]
    fn real_content_is_not_parked() {
        let html = "<html><body><h1>Beispiel GmbH</h1><p>Wir liefern seit 1987 \
            Maschinenbau-Komponenten in ganz Europa. Besuchen Sie unseren Katalog \
            mit über 4.000 Artikeln und fordern Sie ein Angebot an.</p></body></html>";
        assert!(!is_parked(html, "beispiel.de"));
    }
}
