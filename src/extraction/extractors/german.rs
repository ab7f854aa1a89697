//! Germanic pattern set: Germany, Austria, Switzerland
//!
//! Handles HRB/HRA and Firmenbuch registrations, Geschäftsführer and
//! Vorstand listings, USt-IdNr/ATU/CHE VAT ids and the DACH legal forms.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extraction::anchor;
use crate::extraction::candidates::{ExtractionContext, FieldCandidates};
use crate::extraction::contact;
use crate::extraction::country::Country;

/// "Amtsgericht München, HRB 12345" (court first)
static REG_COURT_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(Amtsgericht|Registergericht|Handelsgericht|Landesgericht|Handelsregisteramt)[ \t]+([A-ZÄÖÜ][\wäöüß.-]*(?:[ \t]+[A-ZÄÖÜ][\wäöüß.-]*)?)[ \t]*[,:]?\s*(?:unter[ \t]+)?(HRB|HRA|FN|GnR|VR|PR)[ \t]*[.:]?[ \t]*(\d{1,6})[ \t]*([a-zA-Z]\b)?",
    )
    .unwrap()
});

/// "HRB 12345 Amtsgericht München" (number first, court optional)
static REG_NUMBER_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(HRB|HRA|FN|GnR|VR|PR)[ \t]*[.:]?[ \t]*(\d{1,6})[ \t]*([a-zA-Z]\b)?(?:[ \t]*[,·]?[ \t]*(Amtsgericht|Registergericht|Handelsgericht|Landesgericht)[ \t]+([A-ZÄÖÜ][\wäöüß.-]*(?:[ \t]+[A-ZÄÖÜ][\wäöüß.-]*)?))?",
    )
    .unwrap()
});

/// Representative lines: "Geschäftsführer: Max Mustermann, Erika Beispiel"
static REPRESENTATIVES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:vertreten durch\s*(?:die|den)?\s*)?(?:geschäftsführer(?:in)?|geschäftsführung|geschäftsleitung|vorstand|inhaber(?:in)?|vertretungsberechtigte?r?)\s*[:：]?\s*(.+)$",
    )
    .unwrap()
});

/// USt-IdNr / UID labels followed by a DACH VAT id
static VAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:USt\.?[-\s]?Id(?:ent)?\.?[-\s]?Nr\.?|Umsatzsteuer[-\s]?Identifikationsnummer|UID(?:-Nr\.?)?|MwSt\.?[-\s]?Nr\.?|VAT)\s*[.:]?\s*(DE\s?\d{9}|ATU\s?\d{8}|CHE[-.\s]?\d{3}[.\s]?\d{3}[.\s]?\d{3}(?:\s?(?:MWST|TVA|IVA))?)",
    )
    .unwrap()
});

/// "Name GmbH"-shaped line, used when anchor & expand finds no name
static NAME_WITH_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([A-ZÄÖÜ][\wäöüßÄÖÜ0-9 .&-]{1,78}?)\s+(GmbH\s*&\s*Co\.?\s*KG|GmbH|gGmbH|AG|UG \(haftungsbeschränkt\)|UG|KGaA|OHG|KG|e\.K\.|eG|e\.V\.|SE|Sàrl|Sarl|Sagl)\s*$",
    )
    .unwrap()
});

static FORM_TOKEN: Lazy<Regex> = Lazy::new(|| {
    // Forms ending in "." or ")" cannot carry a trailing \b, so they sit in
    // their own alternatives ahead of the word-shaped tokens.
    Regex::new(
        r"(?:\bUG\s*\(haftungsbeschränkt\)|e\.K\.|e\.U\.|e\.V\.|\b(?:GmbH\s*&\s*Co\.?\s*KG|gGmbH|GmbH|KGaA|AG|OHG|OG|KG|UG|eG|SE|Sàrl|Sarl|Sagl|GesbR|GbR)\b)",
    )
    .unwrap()
});

/// Extract germanic legal data from isolated impressum text.
pub fn extract(text: &str, ctx: &ExtractionContext) -> FieldCandidates {
    let mut fields = FieldCandidates::default();
    if text.trim().is_empty() {
        return fields;
    }

    // Registration: court-first wins, number-first is the fallback
    if let Some(c) = REG_COURT_FIRST.captures(text) {
        let court_kind = title_case_court(&c[1]);
        let reg_type = c[3].to_uppercase();
        let number = c[4].to_string();
        let suffix = c.get(5).map(|m| m.as_str().to_uppercase()).unwrap_or_default();
        fields.register_court = Some(format!("{} {}", court_kind, c[2].trim()));
        fields.register_type = Some(reg_type.clone());
        fields.registration_number = Some(join_registration(&reg_type, &number, &suffix));
    } else if let Some(c) = REG_NUMBER_FIRST.captures(text) {
        let reg_type = c[1].to_uppercase();
        let number = c[2].to_string();
        let suffix = c.get(3).map(|m| m.as_str().to_uppercase()).unwrap_or_default();
        fields.register_type = Some(reg_type.clone());
        fields.registration_number = Some(join_registration(&reg_type, &number, &suffix));
        if let (Some(kind), Some(city)) = (c.get(4), c.get(5)) {
            fields.register_court =
                Some(format!("{} {}", title_case_court(kind.as_str()), city.as_str().trim()));
        }
    }

    // Representatives: first line hit provides CEO + directors
    if let Some(c) = REPRESENTATIVES.captures(text) {
        let names = contact::split_person_list(&c[1]);
        if let Some(first) = names.first() {
            fields.ceo = Some(first.clone());
        }
        fields.directors = names;
    }

    if let Some(c) = VAT.captures(text) {
        fields.vat_id = Some(normalise_vat(&c[1]));
    }

    // Address + name via the shared anchor heuristic
    let lines: Vec<&str> = text.lines().collect();
    if let Some(hit) = anchor::anchor_and_expand(&lines, ctx) {
        fields.postal_code = Some(hit.postal_code);
        fields.city = hit.city;
        fields.street = hit.street;
        fields.legal_name = hit.legal_name;
    }

    // Fallback name: any "… GmbH" line that is not an address
    if fields.legal_name.is_none() {
        if let Some(c) = NAME_WITH_FORM.captures(text) {
            fields.legal_name = Some(format!("{} {}", c[1].trim(), c[2].trim()));
        }
    }

    // Legal form from the name first, from the text second
    let form_haystack = fields.legal_name.as_deref().unwrap_or(text);
    if let Some(m) = FORM_TOKEN.find(form_haystack).or_else(|| FORM_TOKEN.find(text)) {
        fields.legal_form = Some(m.as_str().to_string());
    }

    fields.emails = contact::find_emails(text);
    fields.phones = contact::find_labeled_phones(text);
    fields.fax = contact::find_labeled_fax(text);

    // Country only accompanies actual findings; a bare country candidate
    // would outlive validation and taint otherwise empty passes.
    if !fields.is_empty() {
        fields.country = match ctx.country {
            Country::Unknown => None,
            country => country.display_name().map(str::to_string),
        };
    }

    fields
}

fn join_registration(reg_type: &str, number: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        format!("{reg_type} {number}")
    } else {
        format!("{reg_type} {number} {suffix}")
    }
}

/// Court keywords appear in arbitrary case on real pages.
fn title_case_court(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => lower,
    }
}

fn normalise_vat(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase()
}
