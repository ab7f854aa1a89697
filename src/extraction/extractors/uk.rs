//! UK pattern set: Companies House registrations, Ltd/PLC/LLP forms

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extraction::anchor;
use crate::extraction::candidates::{ExtractionContext, FieldCandidates};
use crate::extraction::contact;

/// "Company number 01234567", "Registered in England and Wales No. 1234567"
static COMPANY_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:company\s+(?:registration\s+)?(?:no\.?|number)|registered\s+in\s+(?:england(?:\s+and\s+wales)?|scotland|northern\s+ireland)[^\n]{0,60}?(?:no\.?|number)?)\s*[.:]?\s*(\d{7,8})",
    )
    .unwrap()
});

static REGISTERED_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)registered\s+in\s+(england(?:\s+and\s+wales)?|scotland|northern\s+ireland)")
        .unwrap()
});

static VAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)VAT\s*(?:reg(?:istration)?\.?\s*)?(?:no\.?|number)?\s*[.:]?\s*(GB\s?\d{9}(?:\d{3})?)")
        .unwrap()
});

static DIRECTORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*directors?\s*[:：]\s*(.+)$").unwrap());

static NAME_WITH_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([A-Z][\w0-9 .&'-]{1,78}?)\s+(Limited|Ltd\.?|PLC|LLP|CIC)\s*$").unwrap()
});

static FORM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(Limited|Ltd\.?|PLC|LLP|CIC)\b").unwrap());

pub fn extract(text: &str, ctx: &ExtractionContext) -> FieldCandidates {
    let mut fields = FieldCandidates::default();
    if text.trim().is_empty() {
        return fields;
    }

    if let Some(c) = COMPANY_NUMBER.captures(text) {
        let number = c[1].to_string();
        fields.registration_number = Some(format!("{:0>8}", number));
        fields.register_type = Some("Companies House".to_string());
        // The registering authority doubles as the court-equivalent
        fields.register_court = Some(match REGISTERED_IN.captures(text) {
            Some(m) => format!("Companies House ({})", title_case(&m[1])),
            None => "Companies House".to_string(),
        });
    }

    if let Some(c) = VAT.captures(text) {
        fields.vat_id = Some(c[1].chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase());
    }

    if let Some(c) = DIRECTORS.captures(text) {
        let names = contact::split_person_list(&c[1]);
        if let Some(first) = names.first() {
            fields.ceo = Some(first.clone());
        }
        fields.directors = names;
    }

    let lines: Vec<&str> = text.lines().collect();
    if let Some(hit) = anchor::anchor_and_expand(&lines, ctx) {
        fields.postal_code = Some(hit.postal_code.to_uppercase());
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
        fields.country = Some("United Kingdom".to_string());
    }

    fields
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) if word.len() > 3 || word.eq_ignore_ascii_case("wales") => {
                    first.to_uppercase().collect::<String>() + chars.as_str()
                }
                _ => lower,
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::country::Country;

    fn ctx() -> ExtractionContext {
        ExtractionContext::new("acme.co.uk", Country::UnitedKingdom, false)
    }

    const LEGAL_PAGE: &str = "Acme Widgets Ltd\n10 Downing Street\nLondon\nSW1A 2AA\n\n\
        Registered in England and Wales. Company number 01234567.\n\
        VAT No: GB123456789\nDirectors: John Smith, Jane Doe\nTel: +44 20 7946 0958";

    #[test]
    fn companies_house_extraction() {
        let fields = extract(LEGAL_PAGE, &ctx());
        assert_eq!(fields.registration_number.as_deref(), Some("01234567"));
        assert_eq!(fields.register_type.as_deref(), Some("Companies House"));
        assert_eq!(
            fields.register_court.as_deref(),
            Some("Companies House (England and Wales)")
        );
        assert_eq!(fields.vat_id.as_deref(), Some("GB123456789"));
        assert_eq!(fields.ceo.as_deref(), Some("John Smith"));
        assert_eq!(fields.directors, vec!["John Smith".to_string(), "Jane Doe".to_string()]);
        assert_eq!(fields.postal_code.as_deref(), Some("SW1A 2AA"));
        assert_eq!(fields.country.as_deref(), Some("United Kingdom"));
    }

    #[test]
    fn seven_digit_numbers_are_zero_padded() {
        let fields = extract("Company No. 1234567", &ctx());
        assert_eq!(fields.registration_number.as_deref(), Some("01234567"));
    }

    #[test]
    fn name_line_with_form() {
        let fields = extract("Acme Widgets Ltd\nSome other text", &ctx());
        assert_eq!(fields.legal_name.as_deref(), Some("Acme Widgets Ltd"));
        assert_eq!(fields.legal_form.as_deref(), Some("Ltd"));
    }
}
