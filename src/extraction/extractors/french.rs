//! French pattern set: RCS/SIREN/SIRET registrations, SARL/SA/SAS forms

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extraction::anchor;
use crate::extraction::candidates::{ExtractionContext, FieldCandidates};
use crate::extraction::contact;

/// "RCS Paris 123 456 789" or "RCS Paris B 123 456 789"
static RCS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bRCS\s+([A-ZÀ-Ü][\wàâçéèêëîïôûü-]+)\s+(?:[A-Z]\s+)?(\d{3}[ .]?\d{3}[ .]?\d{3})")
        .unwrap()
});

static SIRET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bSIRET\s*(?:no\.?|n°)?\s*[.:]?\s*(\d{3}[ .]?\d{3}[ .]?\d{3}[ .]?\d{5})").unwrap()
});

static SIREN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bSIREN\s*(?:no\.?|n°)?\s*[.:]?\s*(\d{3}[ .]?\d{3}[ .]?\d{3})").unwrap()
});

static VAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:TVA\s+intracommunautaire|n°\s*TVA|TVA|VAT)\s*[.:]?\s*(FR\s?[A-Z0-9]{2}\s?\d{9})")
        .unwrap()
});

static REPRESENTATIVES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:g[ée]rant(?:e)?|pr[ée]sident(?:e)?|directeur\s+de\s+la\s+publication|responsable\s+de\s+la\s+publication)\s*[:：]\s*(.+)$",
    )
    .unwrap()
});

static NAME_WITH_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([A-ZÀ-Ü][\w0-9À-ü .&'-]{1,78}?)\s+(SARL|SASU|SAS|SA|EURL|SNC|SCS|SCA)\s*$")
        .unwrap()
});

static FORM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(SARL|SASU|SAS|EURL|SNC|SCS|SCA|SA)\b").unwrap());

pub fn extract(text: &str, ctx: &ExtractionContext) -> FieldCandidates {
    let mut fields = FieldCandidates::default();
    if text.trim().is_empty() {
        return fields;
    }

    if let Some(c) = RCS.captures(text) {
        fields.register_court = Some(format!("RCS {}", capitalise(&c[1])));
        fields.register_type = Some("RCS".to_string());
        fields.registration_number = Some(compact_digits(&c[2]));
    }
    // SIRET (14 digits) is more specific than SIREN and wins when present
    if let Some(c) = SIRET.captures(text) {
        fields.registration_number = Some(compact_digits(&c[1]));
        fields.register_type.get_or_insert_with(|| "SIRET".to_string());
    } else if fields.registration_number.is_none() {
        if let Some(c) = SIREN.captures(text) {
            fields.registration_number = Some(compact_digits(&c[1]));
            fields.register_type.get_or_insert_with(|| "SIREN".to_string());
        }
    }

    if let Some(c) = VAT.captures(text) {
        fields.vat_id =
            Some(c[1].chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase());
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
        fields.country = Some("France".to_string());
    }

    fields
}

fn compact_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn capitalise(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::country::Country;

    fn ctx() -> ExtractionContext {
        ExtractionContext::new("maison.fr", Country::France, false)
    }

    const MENTIONS: &str = "Mentions légales\n\nMaison Exemple SARL\n12 rue de la Paix\n75002 Paris\n\n\
        RCS Paris 123 456 789\nSIRET : 123 456 789 00012\n\
        TVA intracommunautaire : FR12 123456789\nGérant : Pierre Dupont\nTél : +33 1 42 60 30 30";

    #[test]
    fn full_mentions_legales() {
        let fields = extract(MENTIONS, &ctx());
        assert_eq!(fields.legal_name.as_deref(), Some("Maison Exemple SARL"));
        assert_eq!(fields.legal_form.as_deref(), Some("SARL"));
        assert_eq!(fields.register_court.as_deref(), Some("RCS Paris"));
        // SIRET is the more specific identifier
        assert_eq!(fields.registration_number.as_deref(), Some("12345678900012"));
        assert_eq!(fields.vat_id.as_deref(), Some("FR12123456789"));
        assert_eq!(fields.ceo.as_deref(), Some("Pierre Dupont"));
        assert_eq!(fields.postal_code.as_deref(), Some("75002"));
        assert_eq!(fields.city.as_deref(), Some("Paris"));
        assert_eq!(fields.street.as_deref(), Some("12 rue de la Paix"));
    }

    #[test]
    fn siren_only() {
        let fields = extract("SIREN: 123 456 789", &ctx());
        assert_eq!(fields.registration_number.as_deref(), Some("123456789"));
        assert_eq!(fields.register_type.as_deref(), Some("SIREN"));
    }
}
