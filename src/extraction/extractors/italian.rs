//! Italian pattern set: Registro Imprese, P.IVA, S.r.l./S.p.A. forms

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extraction::anchor;
use crate::extraction::candidates::{ExtractionContext, FieldCandidates};
use crate::extraction::contact;

static PARTITA_IVA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:p(?:artita)?\.?\s*iva|c(?:odice)?\.?\s*fiscale\s+e\s+p\.?\s*iva|vat)\s*(?:n\.?|no\.?)?\s*[.:]?\s*((?:IT\s?)?\d{11})")
        .unwrap()
});

static REGISTRO_IMPRESE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)registro\s+(?:delle\s+)?imprese\s+(?:di\s+)?([A-Z][\wàèéìòù]+)?").unwrap()
});

static REA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bREA\s*(?:n\.?|no\.?)?\s*[.:]?\s*([A-Z]{2}[-\s]?\d{4,7})").unwrap());

static REPRESENTATIVES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*amministratore\s*(?:unico|delegato)?\s*[:：]\s*(.+)$").unwrap()
});

static NAME_WITH_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([A-Z][\w0-9À-ù .&'-]{1,78}?)\s+(S\.?r\.?l\.?|S\.?p\.?A\.?|S\.?a\.?s\.?|S\.?n\.?c\.?)\s*$")
        .unwrap()
});

static FORM_TOKEN: Lazy<Regex> = Lazy::new(|| {
    // Dotted forms cannot end on \b, so they come first as bare alternatives
    Regex::new(r"(?:S\.r\.l\.|S\.p\.A\.|S\.a\.s\.|S\.n\.c\.|\b(?:Srl|SpA|Sas|Snc)\b)").unwrap()
});

pub fn extract(text: &str, ctx: &ExtractionContext) -> FieldCandidates {
    let mut fields = FieldCandidates::default();
    if text.trim().is_empty() {
        return fields;
    }

    if let Some(c) = PARTITA_IVA.captures(text) {
        let digits: String = c[1].chars().filter(char::is_ascii_digit).collect();
        fields.vat_id = Some(format!("IT{digits}"));
    }

    if REGISTRO_IMPRESE.is_match(text) || REA.is_match(text) {
        fields.register_type = Some("Registro Imprese".to_string());
        if let Some(c) = REGISTRO_IMPRESE.captures(text) {
            fields.register_court = Some(match c.get(1) {
                Some(city) => format!("Registro Imprese di {}", city.as_str()),
                None => "Registro Imprese".to_string(),
            });
        }
        if let Some(c) = REA.captures(text) {
            fields.registration_number = Some(format!("REA {}", c[1].to_uppercase()));
        } else if let Some(vat) = &fields.vat_id {
            // The P.IVA doubles as the register number on most pages
            fields.registration_number = Some(vat.clone());
        }
    }

    if let Some(c) = REPRESENTATIVES.captures(text) {
        let names = contact::split_person_list(&c[1]);
        if let Some(first) = names.first() {
            fields.ceo = Some(first.clone());
        }
        fields.directors = names;
    }

    let lines: Vec<&str> = text.lines().collect();
    if let Some(hit) = anchor::anchor_and_expand(&lines, ctx) {
        fields.postal_code = Some(hit.postal_code);
        fields.city = hit.city;
        fields.street = hit.street;
        fields.legal_name = hit.legal_name;
    }

    if fields.legal_name.is_none() {
        if let Some(c) = NAME_WITH_FORM.captures(text) {
            fields.legal_name = Some(format!("{} {}", c[1].trim(), c[2].trim()));
        }
    }

    let form_haystack = fields.legal_name.as_deref().unwrap_or(text);
    if let Some(m) = FORM_TOKEN.find(form_haystack).or_else(|| FORM_TOKEN.find(text)) {
        fields.legal_form = Some(m.as_str().to_string());
    }

    fields.emails = contact::find_emails(text);
    fields.phones = contact::find_labeled_phones(text);
    fields.fax = contact::find_labeled_fax(text);
    if !fields.is_empty() {
        fields.country = Some("Italy".to_string());
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::country::Country;

    fn ctx() -> ExtractionContext {
        ExtractionContext::new("esempio.it", Country::Italy, false)
    }

    const NOTE_LEGALI: &str = "Note legali\n\nEsempio S.r.l.\nVia Roma 10\n20121 Milano\n\n\
        P.IVA: IT01234567890\nRegistro Imprese di Milano, REA MI-1234567\n\
        Amministratore unico: Mario Rossi\nTel: +39 02 1234567";

    #[test]
    fn full_note_legali() {
        let fields = extract(NOTE_LEGALI, &ctx());
        assert_eq!(fields.legal_name.as_deref(), Some("Esempio S.r.l."));
        assert_eq!(fields.legal_form.as_deref(), Some("S.r.l."));
        assert_eq!(fields.vat_id.as_deref(), Some("IT01234567890"));
        assert_eq!(fields.register_court.as_deref(), Some("Registro Imprese di Milano"));
        assert_eq!(fields.registration_number.as_deref(), Some("REA MI-1234567"));
        assert_eq!(fields.ceo.as_deref(), Some("Mario Rossi"));
        assert_eq!(fields.postal_code.as_deref(), Some("20121"));
        assert_eq!(fields.city.as_deref(), Some("Milano"));
    }

    #[test]
    fn piva_without_it_prefix() {
        let fields = extract("Partita IVA 01234567890", &ctx());
        assert_eq!(fields.vat_id.as_deref(), Some("IT01234567890"));
    }
}
