//! Shared contact and person helpers for the pattern extractors

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static PHONE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:tel(?:efon)?|fon|phone|tél(?:éphone)?|telefono|teléfono)\s*\.?\s*:?\s*([+0(][\d\s\-/().]{6,20}\d)")
        .unwrap()
});

static FAX_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:tele)?fax\s*\.?\s*:?\s*([+0(][\d\s\-/().]{6,20}\d)").unwrap()
});

/// Honorifics and academic titles stripped off person names.
const TITLES: &[&str] = &[
    "herr", "frau", "dr.", "dr", "prof.", "prof", "dipl.-ing.", "dipl.-kfm.", "mag.", "ing.",
    "mr.", "mr", "mrs.", "ms.", "m.", "mme", "sig.", "dott.",
];

/// All email addresses in the text, in order of first appearance.
pub fn find_emails(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for hit in EMAIL_RE.find_iter(text) {
        let email = hit.as_str().to_lowercase();
        // image names like logo@2x.png match the shape but are not addresses
        if email.ends_with(".png") || email.ends_with(".jpg") || email.ends_with(".svg") {
            continue;
        }
        if !out.contains(&email) {
            out.push(email);
        }
    }
    out
}

/// Phone numbers that follow an explicit label (Tel:, Phone:, …).
pub fn find_labeled_phones(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for capture in PHONE_LABEL_RE.captures_iter(text) {
        let phone = capture[1].trim().to_string();
        if !out.contains(&phone) {
            out.push(phone);
        }
    }
    out
}

pub fn find_labeled_fax(text: &str) -> Option<String> {
    FAX_LABEL_RE.captures(text).map(|c| c[1].trim().to_string())
}

/// Split a director list on the usual delimiters, clean each name.
/// `"Max Mustermann, Dr. Erika Beispiel und Hans Huber"` → three names.
pub fn split_person_list(raw: &str) -> Vec<String> {
    let normalised = raw
        .replace(" und ", ",")
        .replace(" and ", ",")
        .replace(" et ", ",")
        .replace(" y ", ",")
        .replace(" e ", ",")
        .replace('&', ",")
        .replace(';', ",");
    normalised
        .split(',')
        .filter_map(|part| clean_person_name(part))
        .take(5)
        .collect()
}

/// Strip titles and punctuation; require the 2–4 token shape of a real name.
pub fn clean_person_name(raw: &str) -> Option<String> {
    let mut name = raw.trim().trim_end_matches(['.', ',', ':', ';']).trim().to_string();

    loop {
        let lower = name.to_lowercase();
        let Some(title) = TITLES.iter().find(|t| {
            lower.starts_with(*t)
                && lower[t.len()..].chars().next().map(|c| c == ' ').unwrap_or(false)
        }) else {
            break;
        };
        name = name[title.len()..].trim_start().to_string();
    }

    let tokens: Vec<&str> = name.split_whitespace().collect();
    if !(2..=4).contains(&tokens.len()) {
        return None;
    }
    if name.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if !name.chars().next().map(char::is_uppercase).unwrap_or(false) {
        return None;
    }
    Some(tokens.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_and_dedupes_emails() {
        let text = "Mail: Info@Example.DE oder info@example.de, logo@2x.png";
        assert_eq!(find_emails(text), vec!["info@example.de".to_string()]);
    }

    #[test]
    fn labeled_phone_and_fax() {
        let text = "Tel.: +49 30 1234567\nTelefax: +49 30 1234568";
        assert_eq!(find_labeled_phones(text), vec!["+49 30 1234567".to_string()]);
        assert_eq!(find_labeled_fax(text), Some("+49 30 1234568".to_string()));
    }

    #[test]
    fn person_list_splitting_and_title_stripping() {
        let names = split_person_list("Dr. Max Mustermann, Erika Beispiel und Prof. Hans Huber");
        assert_eq!(
            names,
            vec![
                "Max Mustermann".to_string(),
                "Erika Beispiel".to_string(),
                "Hans Huber".to_string()
            ]
        );
    }

    #[test]
    fn rejects_non_names() {
        assert_eq!(clean_person_name("Mustermann"), None); // single token
        assert_eq!(clean_person_name("Max Mustermann 42"), None); // digits
        assert_eq!(clean_person_name("siehe unten"), None); // lowercase
        assert_eq!(clean_person_name("Herr Max Mustermann"), Some("Max Mustermann".to_string()));
    }
}
