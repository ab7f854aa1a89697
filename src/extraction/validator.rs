//! Field-level validation and normalisation
//!
//! Every field passes through its own rule; a failing field is dropped, not
//! coerced. A record without a validated legal name is worthless and the
//! domain ends as FAILED_EXTRACTION.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::domain::entities::{CrawlResult, ExtractedField};
use crate::extraction::anchor::fuzzy_matches_domain;
use crate::extraction::candidates::ExtractionContext;
use crate::extraction::contact;
use crate::extraction::country::Country;
use crate::infrastructure::preflight::DomainResolver;

static EMAIL_FULL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").unwrap());

/// firstname.lastname@… looks personal and is excluded off legal pages
static PERSONAL_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zàâçéèêëîïôûüäöüß]{2,}\.[a-zàâçéèêëîïôûüäöüß]{2,}@").unwrap());

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{5,}").unwrap());

/// VAT shapes by country prefix (the checksum is extra for DE).
static VAT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^DE\d{9}$",
        r"^ATU\d{8}$",
        r"^CHE\d{9}(MWST|TVA|IVA)?$",
        r"^GB\d{9}(\d{3})?$",
        r"^FR[A-Z0-9]{2}\d{9}$",
        r"^IT\d{11}$",
        r"^ES[A-Z0-9]\d{7}[A-Z0-9]$",
        r"^NL\d{9}B\d{2}$",
        r"^BE0\d{9}$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Noise words that indicate a navigation capture rather than entity data.
const NOISE_WORDS: &[&str] = &[
    "navigation", "menu", "menü", "cookie", "newsletter", "login", "anmelden", "suche", "search",
    "warenkorb", "cart", "account", "registrieren", "subscribe", "footer", "header", "sidebar",
    "widget", "banner", "popup", "javascript", "undefined", "loading", "datenschutz", "impressum",
    "legal notice", "privacy policy", "kontakt",
];

const STREET_NOISE: &[&str] = &["postfach", "p.o. box", "po box", "download", "telefon", "siehe"];

pub struct Validator {
    mx_check: bool,
    resolver: Option<Arc<dyn DomainResolver>>,
    extra_legal_forms: Vec<String>,
}

impl Validator {
    pub fn new(
        mx_check: bool,
        resolver: Option<Arc<dyn DomainResolver>>,
        extra_legal_forms: Vec<String>,
    ) -> Self {
        Self { mx_check, resolver, extra_legal_forms }
    }

    /// Validate a freshly assembled record in place, dropping every field
    /// that fails its rule, then recompute the overall confidence.
    ///
    /// `on_legal_page` relaxes the personal-email exclusion because a
    /// person named in an Impressum is disclosure, not leakage.
    pub async fn validate(
        &self,
        result: &mut CrawlResult,
        ctx: &ExtractionContext,
        on_legal_page: bool,
    ) {
        retain(&mut result.legal_name, |v| self.valid_legal_name(v, ctx), "legal_name");
        retain(&mut result.legal_form, |v| self.valid_legal_form(v, ctx), "legal_form");

        // Postal code first: country inference hangs off it
        retain(&mut result.postal_code, |v| ctx.country.postal_is_valid(v), "postal_code");
        if result.postal_code.is_some() && result.country.is_none() {
            if let Some(name) = ctx.country.display_name() {
                let source = result.postal_code.as_ref().map(|f| f.source);
                let confidence = result.postal_code.as_ref().map(|f| f.confidence).unwrap_or(0.0);
                result.country = source.map(|s| ExtractedField::new(name, s, confidence));
            }
        }
        if let Some(mut country) = result.country.take() {
            match Country::normalise_country_name(&country.value) {
                Some(canonical) => {
                    country.value = canonical.to_string();
                    result.country = Some(country);
                }
                // Unknown names stay as found; single letters are noise
                None if country.value.trim().len() >= 2 => result.country = Some(country),
                None => {}
            }
        }

        retain(&mut result.street, |v| valid_street(v), "street");
        retain(&mut result.city, |v| valid_city(v), "city");
        retain(&mut result.vat_id, |v| valid_vat(v), "vat_id");

        // Registration data must co-occur with a register authority
        if result.register_court.is_none() {
            if result.registration_number.is_some() {
                debug!("Dropping registration_number without register court");
                result.registration_number = None;
            }
        } else {
            retain(
                &mut result.registration_number,
                |v| (3..=30).contains(&v.len()) && v.chars().any(|c| c.is_ascii_digit()),
                "registration_number",
            );
        }
        if result.registration_number.is_none() {
            result.register_type = None;
        }

        // People
        retain(&mut result.ceo, |v| self.valid_person(v, ctx), "ceo");
        result.directors = result
            .directors
            .iter()
            .filter_map(|name| contact::clean_person_name(name))
            .filter(|name| self.valid_person(name, ctx))
            .collect();

        // Phones: normalise to international form, drop the rest
        if let Some(phones) = &mut result.phones {
            let normalised: Vec<String> = phones
                .values
                .iter()
                .filter_map(|p| normalise_phone(p, ctx.country))
                .collect();
            phones.values = normalised;
            phones.values.sort();
            phones.values.dedup();
            if phones.values.is_empty() {
                result.phones = None;
            }
        }
        if let Some(fax) = result.fax.take() {
            if let Some(normalised) = normalise_phone(&fax.value, ctx.country) {
                result.fax = Some(ExtractedField { value: normalised, ..fax });
            }
        }

        // Emails: structure, personal-pattern exclusion, optional MX probe
        if let Some(emails) = &mut result.emails {
            let mut kept = Vec::new();
            for email in &emails.values {
                let email = email.trim().to_lowercase();
                if !EMAIL_FULL.is_match(&email) {
                    continue;
                }
                if ["example.com", "test.com", "domain.com", "email.com"]
                    .iter()
                    .any(|fake| email.ends_with(fake))
                {
                    continue;
                }
                if !on_legal_page && PERSONAL_EMAIL.is_match(&email) {
                    debug!("Excluding personal-looking email off legal page: {}", email);
                    continue;
                }
                if self.mx_check && !self.mail_domain_resolves(&email).await {
                    debug!("Excluding email with unresolvable domain: {}", email);
                    continue;
                }
                kept.push(email);
            }
            emails.values = kept;
            emails.values.sort();
            emails.values.dedup();
            if emails.values.is_empty() {
                result.emails = None;
            }
        }

        result.recompute_confidence();
    }

    fn valid_legal_name(&self, name: &str, ctx: &ExtractionContext) -> bool {
        let len = name.chars().count();
        if !(3..=120).contains(&len) {
            return false;
        }
        if DIGIT_RUN.is_match(name) {
            return false;
        }
        let lower = name.to_lowercase();
        if NOISE_WORDS.iter().any(|noise| lower.contains(noise)) {
            return false;
        }
        self.has_any_form_token(name, ctx) || fuzzy_matches_domain(name, &ctx.sld)
    }

    fn valid_legal_form(&self, form: &str, ctx: &ExtractionContext) -> bool {
        ctx.country
            .legal_forms()
            .iter()
            .map(|f| *f)
            .chain(self.extra_legal_forms.iter().map(String::as_str))
            .any(|known| known.eq_ignore_ascii_case(form))
    }

    fn has_any_form_token(&self, name: &str, ctx: &ExtractionContext) -> bool {
        let lower = name.to_lowercase();
        ctx.country
            .legal_forms()
            .iter()
            .map(|f| *f)
            .chain(self.extra_legal_forms.iter().map(String::as_str))
            .any(|form| lower.contains(&form.to_lowercase()))
    }

    fn valid_person(&self, name: &str, ctx: &ExtractionContext) -> bool {
        let tokens: Vec<&str> = name.split_whitespace().collect();
        if !(2..=4).contains(&tokens.len()) {
            return false;
        }
        if name.chars().any(|c| c.is_ascii_digit()) {
            return false;
        }
        let lower = name.to_lowercase();
        if NOISE_WORDS.iter().any(|noise| lower.contains(noise)) {
            return false;
        }
        // A "name" carrying a legal-form token is a company, not a person
        !self.has_any_form_token(name, ctx)
    }

    async fn mail_domain_resolves(&self, email: &str) -> bool {
        let Some(resolver) = &self.resolver else { return true };
        let Some(domain) = email.rsplit('@').next() else { return false };
        resolver.resolve(domain).await.is_ok()
    }
}

fn retain<F: Fn(&str) -> bool>(field: &mut Option<ExtractedField>, rule: F, label: &str) {
    if let Some(current) = field {
        if !rule(&current.value) {
            debug!("Validation dropped {}: {:?}", label, current.value);
            *field = None;
        }
    }
}

fn valid_street(street: &str) -> bool {
    let len = street.chars().count();
    if !(3..=150).contains(&len) {
        return false;
    }
    if !street.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let lower = street.to_lowercase();
    !STREET_NOISE.iter().any(|noise| lower.contains(noise))
}

fn valid_city(city: &str) -> bool {
    let len = city.chars().count();
    if len < 2 || len > 60 {
        return false;
    }
    let letters = city.chars().filter(|c| c.is_alphabetic() || *c == ' ' || *c == '-').count();
    letters * 10 >= len * 7
}

fn valid_vat(vat: &str) -> bool {
    let compact: String =
        vat.chars().filter(|c| !c.is_whitespace() && *c != '.' && *c != '-').collect();
    let compact = compact.to_uppercase();
    if !VAT_PATTERNS.iter().any(|p| p.is_match(&compact)) {
        return false;
    }
    if let Some(digits) = compact.strip_prefix("DE") {
        return de_vat_checksum_ok(digits);
    }
    true
}

/// German USt-IdNr check digit (ISO 7064 MOD 11,10).
fn de_vat_checksum_ok(digits: &str) -> bool {
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 9 {
        return false;
    }
    let mut product = 10u32;
    for &d in &digits[..8] {
        let mut sum = (d + product) % 10;
        if sum == 0 {
            sum = 10;
        }
        product = (2 * sum) % 11;
    }
    let check = match 11 - product {
        10 => 0,
        c => c,
    };
    check == digits[8]
}

/// Normalise a phone number to international form. Keeps the grouping the
/// page used; only the prefix is rewritten.
pub fn normalise_phone(raw: &str, country: Country) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '/' | '(' | ')'))
        .collect();
    let cleaned = cleaned.trim().to_string();

    let international = if let Some(rest) = cleaned.strip_prefix("00") {
        format!("+{rest}")
    } else if cleaned.starts_with('+') {
        cleaned
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        let code = country.calling_code()?;
        format!("+{code} {}", rest.trim_start_matches([' ', '-', '/']))
    } else {
        return None;
    };

    // Separators become spaces; runs collapse
    let spaced = international.replace(['-', '/', '(', ')'], " ");
    let spaced = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    let digits = spaced.chars().filter(|c| c.is_ascii_digit()).count();
    if !(8..=15).contains(&digits) {
        return None;
    }
    Some(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ContactSet, FieldSource};

    fn ctx() -> ExtractionContext {
        ExtractionContext::new("beispiel.de", Country::Germany, false)
    }

    fn validator() -> Validator {
        Validator::new(false, None, Vec::new())
    }

    fn field(value: &str) -> Option<ExtractedField> {
        Some(ExtractedField::new(value, FieldSource::Pattern, 0.8))
    }

    #[tokio::test]
    async fn garbage_name_is_dropped() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.legal_name = field("Kontakt · Menü · Warenkorb (0)");
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.legal_name.is_none());
    }

    #[tokio::test]
    async fn name_with_form_or_domain_match_survives() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.legal_name = field("Beispiel GmbH");
        validator().validate(&mut result, &ctx(), true).await;
        assert_eq!(result.legal_name.as_ref().map(|f| f.value.as_str()), Some("Beispiel GmbH"));

        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.legal_name = field("Beispiel Software");
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.legal_name.is_some());

        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.legal_name = field("Völlig Anderes Unternehmen");
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.legal_name.is_none());
    }

    #[tokio::test]
    async fn digit_runs_disqualify_names() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.legal_name = field("Beispiel GmbH 123456");
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.legal_name.is_none());
    }

    #[tokio::test]
    async fn postal_code_rules_and_country_inference() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.postal_code = field("80333");
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.postal_code.is_some());
        assert_eq!(result.country.as_ref().map(|f| f.value.as_str()), Some("Germany"));

        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.postal_code = field("8033"); // four digits are not a German PLZ
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.postal_code.is_none());
        assert!(result.country.is_none());
    }

    #[tokio::test]
    async fn registration_number_requires_court() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.registration_number = field("HRB 12345");
        result.register_type = field("HRB");
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.registration_number.is_none());
        assert!(result.register_type.is_none());

        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.registration_number = field("HRB 12345");
        result.register_court = field("Amtsgericht München");
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.registration_number.is_some());
    }

    #[tokio::test]
    async fn phones_are_normalised_and_invalid_dropped() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.phones = Some(ContactSet::new(
            vec!["089/123456".into(), "+49 30 1234567".into(), "12".into()],
            FieldSource::Pattern,
            0.8,
        ));
        validator().validate(&mut result, &ctx(), true).await;
        let phones = result.phones.unwrap();
        assert_eq!(
            phones.values,
            vec!["+49 30 1234567".to_string(), "+49 89 123456".to_string()]
        );
    }

    #[tokio::test]
    async fn personal_emails_excluded_off_legal_pages_only() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/", "r");
        result.emails = Some(ContactSet::new(
            vec!["max.mustermann@beispiel.de".into(), "info@beispiel.de".into()],
            FieldSource::Pattern,
            0.8,
        ));
        validator().validate(&mut result, &ctx(), false).await;
        assert_eq!(result.emails.unwrap().values, vec!["info@beispiel.de".to_string()]);

        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.emails = Some(ContactSet::new(
            vec!["max.mustermann@beispiel.de".into()],
            FieldSource::Pattern,
            0.8,
        ));
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.emails.is_some());
    }

    #[test]
    fn de_vat_checksum() {
        assert!(valid_vat("DE136695976"));
        assert!(!valid_vat("DE123456789")); // bad check digit
        assert!(valid_vat("ATU12345678"));
        assert!(!valid_vat("XX123"));
    }

    #[test]
    fn phone_normalisation_forms() {
        assert_eq!(
            normalise_phone("+49 30 1234567", Country::Germany),
            Some("+49 30 1234567".to_string())
        );
        assert_eq!(
            normalise_phone("089/123456", Country::Germany),
            Some("+49 89 123456".to_string())
        );
        assert_eq!(
            normalise_phone("0043 1 5877766", Country::Austria),
            Some("+43 1 5877766".to_string())
        );
        assert_eq!(normalise_phone("12", Country::Germany), None);
        assert_eq!(normalise_phone("1234567", Country::Unknown), None);
    }

    #[tokio::test]
    async fn street_and_city_rules() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.street = field("Musterweg 7");
        result.city = field("München");
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.street.is_some());
        assert!(result.city.is_some());

        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "r");
        result.street = field("Musterweg"); // no house number
        result.city = field("M");
        validator().validate(&mut result, &ctx(), true).await;
        assert!(result.street.is_none());
        assert!(result.city.is_none());
    }
}
