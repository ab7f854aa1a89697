//! Generic fallback pattern set
//!
//! Used when no country-specific extractor applies, and always run as the
//! lowest-priority pass. The legal-form list is user-extensible through the
//! `country_pattern_set` configuration.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extraction::anchor::{self, fuzzy_matches_domain};
use crate::extraction::candidates::{ExtractionContext, FieldCandidates};
use crate::extraction::contact;

static CEO_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:CEO|Managing\s+Director|Founder|Owner|Director)\s*[:：]\s*(.+)$")
        .unwrap()
});

/// Any international-format number, labelled or not
static INTL_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+\d{1,3}[\d\s\-/().]{5,18}\d").unwrap());

static DEFAULT_FORMS: &[&str] =
    &["Inc.", "Inc", "LLC", "Corp.", "Corp", "Ltd.", "Ltd", "Limited", "GmbH", "AG", "BV", "B.V."];

pub fn extract(text: &str, ctx: &ExtractionContext) -> FieldCandidates {
    let mut fields = FieldCandidates::default();
    if text.trim().is_empty() {
        return fields;
    }

    let lines: Vec<&str> = text.lines().collect();
    if let Some(hit) = anchor::anchor_and_expand(&lines, ctx) {
        fields.postal_code = Some(hit.postal_code);
        fields.city = hit.city;
        fields.street = hit.street;
        fields.legal_name = hit.legal_name;
    }

    // Name fallback: a line carrying a known or configured form token, or
    // one that resembles the domain label
    if fields.legal_name.is_none() {
        let forms: Vec<&str> = DEFAULT_FORMS
            .iter()
            .copied()
            .chain(ctx.extra_legal_forms.iter().map(String::as_str))
            .collect();
        fields.legal_name = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| (3..=120).contains(&l.len()))
            .find(|line| {
                forms.iter().any(|form| line_has_token(line, form))
                    || fuzzy_matches_domain(line, &ctx.sld)
            })
            .map(str::to_string);
    }

    if let Some(name) = &fields.legal_name {
        let forms: Vec<&str> = DEFAULT_FORMS
            .iter()
            .copied()
            .chain(ctx.extra_legal_forms.iter().map(String::as_str))
            .collect();
        fields.legal_form = forms
            .iter()
            .find(|form| line_has_token(name, form))
            .map(|form| form.to_string());
    }

    if let Some(c) = CEO_LABEL.captures(text) {
        let names = contact::split_person_list(&c[1]);
        if let Some(first) = names.first() {
            fields.ceo = Some(first.clone());
        }
        fields.directors = names;
    }

    fields.emails = contact::find_emails(text);
    fields.phones = contact::find_labeled_phones(text);
    if fields.phones.is_empty() {
        fields.phones = INTL_PHONE
            .find_iter(text)
            .map(|m| m.as_str().trim().to_string())
            .take(3)
            .collect();
    }
    fields.fax = contact::find_labeled_fax(text);

    fields
}

fn line_has_token(line: &str, token: &str) -> bool {
    let line_lower = line.to_lowercase();
    let token_lower = token.to_lowercase();
    line_lower
        .split(|c: char| c.is_whitespace() || c == ',')
        .any(|word| word == token_lower || word.trim_end_matches('.') == token_lower.trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::country::Country;

    fn ctx() -> ExtractionContext {
        ExtractionContext::new("acme.com", Country::Unknown, false)
    }

    #[test]
    fn generic_extraction_with_inc() {
        let text = "Acme Holdings Inc.\n500 Main Street\n94105 San Francisco\n\
                    CEO: Ada Lovelace\ninfo@acme.com\n+1 415 555 0100";
        let fields = extract(text, &ctx());
        assert_eq!(fields.legal_name.as_deref(), Some("Acme Holdings Inc."));
        assert_eq!(fields.legal_form.as_deref(), Some("Inc."));
        assert_eq!(fields.ceo.as_deref(), Some("Ada Lovelace"));
        assert_eq!(fields.emails, vec!["info@acme.com".to_string()]);
        assert_eq!(fields.phones, vec!["+1 415 555 0100".to_string()]);
    }

    #[test]
    fn configured_forms_extend_the_lexicon() {
        let mut ctx = ctx();
        ctx.extra_legal_forms.push("ApS".to_string());
        let text = "Eksempel ApS\nHovedgade 1";
        let fields = extract(text, &ctx);
        assert_eq!(fields.legal_name.as_deref(), Some("Eksempel ApS"));
        assert_eq!(fields.legal_form.as_deref(), Some("ApS"));
    }

    #[test]
    fn unlabeled_international_phone() {
        let fields = extract("Call us: +44 20 7946 0958", &ctx());
        assert_eq!(fields.phones, vec!["+44 20 7946 0958".to_string()]);
    }
}
