//! Shared "anchor & expand" heuristic
//!
//! The postal-code line is the most reliable landmark in a legal notice.
//! Once found, the street is on the same line or the line above, and the
//! legal name sits within three lines above that.

use crate::extraction::candidates::ExtractionContext;

/// Street-suffix tokens across the supported jurisdictions.
const STREET_TOKENS: &[&str] = &[
    "straße", "strasse", "str.", "weg", "platz", "allee", "gasse", "ring", "damm", "ufer",
    "chaussee", "promenade", "road", "street", "lane", "avenue", "drive", "court", "rue",
    "boulevard", "via", "viale", "piazza", "corso", "calle", "avenida", "plaza", "paseo",
];

/// Label words that disqualify a line as a company name.
const NAME_DENYLIST: &[&str] = &[
    "kontakt", "anschrift", "adresse", "home", "menü", "menu", "impressum", "imprint",
    "datenschutz", "warenkorb", "telefon", "standort", "öffnungszeiten", "navigation",
    "angaben gemäß", "contact", "address",
];

/// Trailing noise stripped off the city capture.
const CITY_TRAILERS: &[&str] = &[
    "deutschland", "germany", "österreich", "austria", "schweiz", "switzerland", "france",
    "italia", "italy", "españa", "spain", "united kingdom", "tel", "fax", "e-mail", "email",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorExpansion {
    pub postal_code: String,
    pub city: Option<String>,
    pub street: Option<String>,
    pub legal_name: Option<String>,
}

/// Locate the postal anchor and expand to street and legal name.
///
/// Lines must be the isolator's output: trimmed, whitespace-collapsed, in
/// document order.
pub fn anchor_and_expand(lines: &[&str], ctx: &ExtractionContext) -> Option<AnchorExpansion> {
    let postal_re = ctx.country.postal_regex();

    let mut fallback: Option<AnchorExpansion> = None;
    for (idx, line) in lines.iter().enumerate() {
        let Some(capture) = postal_re.captures(line) else { continue };
        let postal_code = capture.get(1).map(|m| m.as_str().to_string())?;

        let city = city_after_code(line, &postal_code);
        let (street, street_idx) = street_near(lines, idx);
        let legal_name = name_above(lines, street_idx.unwrap_or(idx), ctx);

        let expansion = AnchorExpansion { postal_code, city, street, legal_name };

        // Prefer an anchor that actually expands; remember the first bare
        // hit in case nothing better shows up.
        if expansion.street.is_some() || expansion.legal_name.is_some() {
            return Some(expansion);
        }
        if fallback.is_none() {
            fallback = Some(expansion);
        }
    }
    fallback
}

/// City = text following the postal code on the anchor line, cleaned of
/// country names and contact labels.
fn city_after_code(line: &str, postal_code: &str) -> Option<String> {
    let after = line.split(postal_code).nth(1)?.trim();
    let mut city = after.trim_start_matches([',', '-', '·']).trim().to_string();
    if city.is_empty() {
        return None;
    }

    let lower = city.to_lowercase();
    for trailer in CITY_TRAILERS {
        if let Some(pos) = lower.find(trailer) {
            city.truncate(pos);
            break;
        }
    }
    let city = city.trim().trim_end_matches([',', '.', '·', '-']).trim().to_string();
    if city.len() >= 2 {
        Some(city)
    } else {
        None
    }
}

/// Street candidate: the anchor line itself, or the line immediately above,
/// whichever carries a street-suffix token and a number.
fn street_near<'a>(lines: &[&'a str], anchor_idx: usize) -> (Option<String>, Option<usize>) {
    if looks_like_street(lines[anchor_idx]) {
        // Address on one line: "Musterweg 7, 80333 München"
        if let Some(street) = street_prefix(lines[anchor_idx]) {
            return (Some(street), Some(anchor_idx));
        }
    }
    if anchor_idx > 0 && looks_like_street(lines[anchor_idx - 1]) {
        return (Some(lines[anchor_idx - 1].trim().to_string()), Some(anchor_idx - 1));
    }
    (None, None)
}

fn looks_like_street(line: &str) -> bool {
    let lower = line.to_lowercase();
    line.chars().any(|c| c.is_ascii_digit()) && STREET_TOKENS.iter().any(|t| lower.contains(t))
}

/// Cut a one-line address down to its street part (before the postal code).
fn street_prefix(line: &str) -> Option<String> {
    let before = line.split(|c: char| c == ',').next()?.trim();
    if looks_like_street(before) && before.len() < line.len() {
        Some(before.to_string())
    } else {
        None
    }
}

/// Legal-name candidate: nearest non-empty line within three lines above
/// that carries a legal-form token or fuzzy-matches the domain label, and is
/// not a navigation label.
fn name_above(lines: &[&str], below_idx: usize, ctx: &ExtractionContext) -> Option<String> {
    let mut inspected = 0;
    for idx in (0..below_idx).rev() {
        let line = lines[idx].trim();
        if line.is_empty() {
            continue;
        }
        inspected += 1;
        if inspected > 3 {
            break;
        }

        if is_denylisted(line) {
            continue;
        }
        if has_legal_form_token(line, ctx) || fuzzy_matches_domain(line, &ctx.sld) {
            return Some(line.to_string());
        }
    }
    None
}

fn is_denylisted(line: &str) -> bool {
    let lower = line.to_lowercase();
    NAME_DENYLIST.iter().any(|word| lower.contains(word))
}

fn has_legal_form_token(line: &str, ctx: &ExtractionContext) -> bool {
    let forms = ctx.country.legal_forms();
    forms
        .iter()
        .map(|f| *f)
        .chain(ctx.extra_legal_forms.iter().map(String::as_str))
        .any(|form| contains_token(line, form))
}

/// Token-boundary containment, so "AG" does not match inside "Magazin".
fn contains_token(line: &str, token: &str) -> bool {
    let line_lower = line.to_lowercase();
    let token_lower = token.to_lowercase();
    let mut start = 0;
    while let Some(pos) = line_lower[start..].find(&token_lower) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !line_lower[..abs].chars().next_back().map(char::is_alphanumeric).unwrap_or(false);
        let after = abs + token_lower.len();
        let after_ok = after >= line_lower.len()
            || !line_lower[after..].chars().next().map(char::is_alphanumeric).unwrap_or(false);
        if before_ok && after_ok {
            return true;
        }
        start = abs + token_lower.len();
    }
    false
}

/// Similarity between a candidate line and the domain's second-level label,
/// ratio ≥ 0.6 counts as a match.
pub fn fuzzy_matches_domain(line: &str, sld: &str) -> bool {
    if sld.len() < 3 {
        return false;
    }
    let compact: String = line
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if compact.is_empty() {
        return false;
    }
    if compact.contains(sld) {
        return true;
    }
    strsim::normalized_levenshtein(&compact, sld) >= 0.6
}
