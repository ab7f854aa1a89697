//! Jurisdiction detection and country-specific constants
//!
//! Country is decided by ccTLD first, then by content markers in the
//! isolated legal text. Everything downstream (postal patterns, legal
//! forms, VAT shapes, phone prefixes) keys off this.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Country {
    Germany,
    Austria,
    Switzerland,
    UnitedKingdom,
    France,
    Italy,
    Spain,
    Unknown,
}

static DE_POSTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{5})\b").unwrap());
static AT_CH_POSTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").unwrap());
static UK_POSTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{1,2}\d[A-Z\d]?\s*\d[A-Z]{2})\b").unwrap());
static GENERIC_POSTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4,6})\b").unwrap());

static DE_POSTAL_FULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").unwrap());
static AT_CH_POSTAL_FULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").unwrap());
static UK_POSTAL_FULL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{1,2}\d[A-Z\d]?\s*\d[A-Z]{2}$").unwrap());
static GENERIC_POSTAL_FULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4,6}$").unwrap());

impl Country {
    /// ccTLD suffix → country (priority signal a).
    pub fn from_tld(domain: &str) -> Self {
        match domain.rsplit('.').next().unwrap_or("") {
            "de" => Self::Germany,
            "at" => Self::Austria,
            "ch" => Self::Switzerland,
            "uk" | "gb" => Self::UnitedKingdom,
            "fr" => Self::France,
            "it" => Self::Italy,
            "es" => Self::Spain,
            _ => Self::Unknown,
        }
    }

    /// Content markers → country (priority signal b, used when the TLD is
    /// not conclusive, e.g. .com sites of European companies).
    pub fn from_markers(text: &str) -> Self {
        let lower = text.to_lowercase();
        let scores: [(Self, usize); 7] = [
            (Self::Germany, count_any(&lower, &["amtsgericht", "handelsregister", "hrb", "hra", "geschäftsführer", "ust-idnr"])),
            (Self::Austria, count_any(&lower, &["firmenbuch", "landesgericht", "atu", "handelsgericht wien", "firmenbuchnummer"])),
            (Self::Switzerland, count_any(&lower, &["handelsregisteramt", "che-", "mwst", "uid:"])),
            (Self::UnitedKingdom, count_any(&lower, &["companies house", "registered in england", "company number", "registered office"])),
            (Self::France, count_any(&lower, &["rcs", "siret", "siren", "mentions légales", "capital social"])),
            (Self::Italy, count_any(&lower, &["registro imprese", "partita iva", "p.iva", "codice fiscale", "rea"])),
            (Self::Spain, count_any(&lower, &["registro mercantil", "aviso legal", "c.i.f", "cif:", "nif:"])),
        ];
        scores
            .into_iter()
            .filter(|(_, score)| *score >= 2)
            .max_by_key(|(_, score)| *score)
            .map(|(country, _)| country)
            .unwrap_or(Self::Unknown)
    }

    /// Combined detection: ccTLD wins, markers break the tie.
    pub fn detect(domain: &str, text: &str) -> Self {
        match Self::from_tld(domain) {
            Self::Unknown => Self::from_markers(text),
            country => country,
        }
    }

    /// Pattern the postal code must match in this jurisdiction.
    pub fn postal_regex(&self) -> &'static Regex {
        match self {
            Self::Germany => &DE_POSTAL,
            Self::Austria | Self::Switzerland => &AT_CH_POSTAL,
            Self::UnitedKingdom => &UK_POSTAL,
            Self::France | Self::Italy | Self::Spain => &DE_POSTAL, // 5 digits
            Self::Unknown => &GENERIC_POSTAL,
        }
    }

    /// Whole-string postal validation (the validator's rule; Austria gets
    /// the DE pattern relaxation for 4–5 digits per the jurisdiction table).
    pub fn postal_is_valid(&self, code: &str) -> bool {
        let code = code.trim();
        match self {
            Self::Germany => DE_POSTAL_FULL.is_match(code),
            Self::Austria => AT_CH_POSTAL_FULL.is_match(code) || DE_POSTAL_FULL.is_match(code),
            Self::Switzerland => AT_CH_POSTAL_FULL.is_match(code),
            Self::UnitedKingdom => UK_POSTAL_FULL.is_match(&code.to_uppercase()),
            Self::France | Self::Italy | Self::Spain => DE_POSTAL_FULL.is_match(code),
            Self::Unknown => GENERIC_POSTAL_FULL.is_match(code),
        }
    }

    /// Known legal forms for the jurisdiction (validator membership check).
    pub fn legal_forms(&self) -> &'static [&'static str] {
        match self {
            Self::Germany => &[
                "GmbH & Co. KG", "GmbH & Co KG", "GmbH", "AG", "KG", "OHG", "UG (haftungsbeschränkt)",
                "UG", "e.K.", "eG", "e.V.", "KGaA", "GbR", "SE", "PartG",
            ],
            Self::Austria => &["GmbH", "AG", "KG", "OG", "GesbR", "e.U.", "SE"],
            Self::Switzerland => &["AG", "GmbH", "S.A.", "SA", "Sàrl", "Sarl", "Sagl", "KlG"],
            Self::UnitedKingdom => &["Ltd", "Ltd.", "Limited", "PLC", "LLP", "CIC"],
            Self::France => &["SARL", "SA", "SAS", "SASU", "EURL", "SNC", "SCS", "SCA"],
            Self::Italy => &["S.r.l.", "Srl", "S.p.A.", "SpA", "S.a.s.", "S.n.c."],
            Self::Spain => &["S.L.", "SL", "S.A.", "SA", "S.L.L.", "S.C."],
            Self::Unknown => &["Inc.", "Inc", "LLC", "Corp.", "Ltd", "Ltd.", "Limited", "GmbH", "AG"],
        }
    }

    /// Country calling code for phone normalisation.
    pub fn calling_code(&self) -> Option<&'static str> {
        match self {
            Self::Germany => Some("49"),
            Self::Austria => Some("43"),
            Self::Switzerland => Some("41"),
            Self::UnitedKingdom => Some("44"),
            Self::France => Some("33"),
            Self::Italy => Some("39"),
            Self::Spain => Some("34"),
            Self::Unknown => None,
        }
    }

    /// Canonical English country name for the address block.
    pub fn display_name(&self) -> Option<&'static str> {
        match self {
            Self::Germany => Some("Germany"),
            Self::Austria => Some("Austria"),
            Self::Switzerland => Some("Switzerland"),
            Self::UnitedKingdom => Some("United Kingdom"),
            Self::France => Some("France"),
            Self::Italy => Some("Italy"),
            Self::Spain => Some("Spain"),
            Self::Unknown => None,
        }
    }

    /// Map free-text country mentions onto the canonical name.
    pub fn normalise_country_name(raw: &str) -> Option<&'static str> {
        match raw.trim().to_lowercase().as_str() {
            "deutschland" | "germany" | "de" => Some("Germany"),
            "österreich" | "oesterreich" | "austria" | "at" => Some("Austria"),
            "schweiz" | "suisse" | "svizzera" | "switzerland" | "ch" => Some("Switzerland"),
            "united kingdom" | "uk" | "gb" | "england" | "great britain" => Some("United Kingdom"),
            "france" | "fr" => Some("France"),
            "italia" | "italy" | "it" => Some("Italy"),
            "españa" | "espana" | "spain" | "es" => Some("Spain"),
            _ => None,
        }
    }
}

fn count_any(haystack: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|n| haystack.contains(*n)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tld_detection() {
        assert_eq!(Country::from_tld("example.de"), Country::Germany);
        assert_eq!(Country::from_tld("shop.co.uk"), Country::UnitedKingdom);
        assert_eq!(Country::from_tld("maison.fr"), Country::France);
        assert_eq!(Country::from_tld("example.com"), Country::Unknown);
    }

    #[test]
    fn marker_detection_needs_two_signals() {
        let german = "Handelsregister: Amtsgericht München, HRB 12345";
        assert_eq!(Country::from_markers(german), Country::Germany);

        let weak = "Our company number is on file.";
        assert_eq!(Country::from_markers(weak), Country::Unknown);

        let uk = "Registered in England and Wales. Company number 01234567, Companies House.";
        assert_eq!(Country::from_markers(uk), Country::UnitedKingdom);
    }

    #[test]
    fn tld_wins_over_markers() {
        let text = "Registered in England and Wales, Companies House number 01234567";
        assert_eq!(Country::detect("example.de", text), Country::Germany);
        assert_eq!(Country::detect("example.com", text), Country::UnitedKingdom);
    }

    #[test]
    fn postal_patterns() {
        assert!(Country::Germany.postal_regex().is_match("10115"));
        assert!(Country::Austria.postal_regex().is_match("Wien 1010"));
        assert!(Country::UnitedKingdom.postal_regex().is_match("SW1A 1AA"));
        assert!(!Country::UnitedKingdom.postal_regex().is_match("10115"));
    }

    #[test]
    fn country_name_normalisation() {
        assert_eq!(Country::normalise_country_name("Deutschland"), Some("Germany"));
        assert_eq!(Country::normalise_country_name("Schweiz"), Some("Switzerland"));
        assert_eq!(Country::normalise_country_name("Atlantis"), None);
    }
}
