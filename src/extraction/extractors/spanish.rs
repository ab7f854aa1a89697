//! Spanish pattern set: Registro Mercantil, CIF/NIF, S.L./S.A. forms

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extraction::anchor;
use crate::extraction::candidates::{ExtractionContext, FieldCandidates};
use crate::extraction::contact;

static REGISTRO_MERCANTIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)registro\s+mercantil\s+de\s+([A-ZÁÉÍÓÚÑ][\wáéíóúñ]+)").unwrap()
});

/// Tomo/Folio/Hoja reference following a Registro Mercantil mention
static HOJA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)hoja\s*(?:n[º°]?\.?\s*)?([A-Z]{1,2}[-\s]?\d{3,7})").unwrap());

static CIF_NIF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:c\.?i\.?f\.?|n\.?i\.?f\.?)\s*(?:n[º°]?\.?)?\s*[.:]?\s*((?:ES\s?)?[A-Z]\s?\d{7}[A-Z0-9])")
        .unwrap()
});

static REPRESENTATIVES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*administrador(?:a)?\s*(?:[úu]nico)?\s*[:：]\s*(.+)$").unwrap()
});

static NAME_WITH_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([A-ZÁÉÍÓÚÑ][\w0-9Á-ú .&'-]{1,78}?)\s+(S\.?L\.?L\.?|S\.?L\.?|S\.?A\.?|S\.?C\.?)\s*$")
        .unwrap()
});

static FORM_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:S\.L\.L\.|S\.L\.|S\.A\.|S\.C\.|\b(?:SLL|SL|SA)\b)").unwrap()
});

pub fn extract(text: &str, ctx: &ExtractionContext) -> FieldCandidates {
    let mut fields = FieldCandidates::default();
    if text.trim().is_empty() {
        return fields;
    }

    if let Some(c) = REGISTRO_MERCANTIL.captures(text) {
        fields.register_court = Some(format!("Registro Mercantil de {}", &c[1]));
        fields.register_type = Some("Registro Mercantil".to_string());
        if let Some(h) = HOJA.captures(text) {
            fields.registration_number = Some(format!("Hoja {}", h[1].to_uppercase()));
        }
    }

    if let Some(c) = CIF_NIF.captures(text) {
        let compact: String = c[1].chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact.to_uppercase();
        fields.vat_id = Some(if compact.starts_with("ES") { compact } else { format!("ES{compact}") });
        // CIF doubles as register number when no Hoja reference exists
        if fields.register_court.is_some() && fields.registration_number.is_none() {
            fields.registration_number = fields.vat_id.clone();
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
        fields.country = Some("Spain".to_string());
    }

    fields
}
