//! Candidate values produced by extraction passes
//!
//! Passes are pure functions over page content; they emit candidates only.
//! Merging, validation and persistence happen elsewhere, so no pass ever
//! holds a reference back into the crawler.

use crate::domain::entities::FieldSource;
use crate::extraction::country::Country;

/// Raw candidate values for one pass. All strings are as found on the page;
/// validation happens after assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCandidates {
    pub legal_name: Option<String>,
    pub legal_form: Option<String>,
    pub registration_number: Option<String>,
    pub register_court: Option<String>,
    pub register_type: Option<String>,
    pub vat_id: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub ceo: Option<String>,
    pub directors: Vec<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub fax: Option<String>,
}

impl FieldCandidates {
    /// Number of populated fields; used to pick between competing
    /// structured annotations.
    pub fn populated_count(&self) -> usize {
        let options = [
            &self.legal_name,
            &self.legal_form,
            &self.registration_number,
            &self.register_court,
            &self.register_type,
            &self.vat_id,
            &self.street,
            &self.postal_code,
            &self.city,
            &self.country,
            &self.ceo,
            &self.fax,
        ];
        options.iter().filter(|o| o.is_some()).count()
            + usize::from(!self.directors.is_empty())
            + usize::from(!self.emails.is_empty())
            + usize::from(!self.phones.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.populated_count() == 0
    }

    /// Fill missing fields from `other`, never overwriting present ones.
    pub fn fill_from(&mut self, other: &FieldCandidates) {
        macro_rules! take {
            ($field:ident) => {
                if self.$field.is_none() {
                    self.$field = other.$field.clone();
                }
            };
        }
        take!(legal_name);
        take!(legal_form);
        take!(registration_number);
        take!(register_court);
        take!(register_type);
        take!(vat_id);
        take!(street);
        take!(postal_code);
        take!(city);
        take!(country);
        take!(ceo);
        take!(fax);
        if self.directors.is_empty() {
            self.directors = other.directors.clone();
        }
        for email in &other.emails {
            if !self.emails.contains(email) {
                self.emails.push(email.clone());
            }
        }
        for phone in &other.phones {
            if !self.phones.contains(phone) {
                self.phones.push(phone.clone());
            }
        }
    }
}

/// One completed extraction pass with its provenance tag and the base
/// confidence every candidate of the pass carries into assembly.
#[derive(Debug, Clone)]
pub struct ExtractionPass {
    pub source: FieldSource,
    pub base_confidence: f64,
    pub fields: FieldCandidates,
}

impl ExtractionPass {
    pub fn structured(fields: FieldCandidates) -> Self {
        Self { source: FieldSource::Structured, base_confidence: 1.0, fields }
    }

    pub fn pattern(fields: FieldCandidates) -> Self {
        Self { source: FieldSource::Pattern, base_confidence: 0.8, fields }
    }

    pub fn generic(fields: FieldCandidates) -> Self {
        Self { source: FieldSource::Generic, base_confidence: 0.7, fields }
    }
}

/// Context handed to every pass: what we know about the page before looking
/// at its content.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    /// Domain being processed (queue key)
    pub domain: String,
    /// Second-level label for fuzzy name matching
    pub sld: String,
    pub country: Country,
    /// Page came from the archive tier: confidence multiplier applies
    pub from_archive: bool,
    /// Extra legal-form tokens from configuration
    pub extra_legal_forms: Vec<String>,
}

impl ExtractionContext {
    pub fn new(domain: &str, country: Country, from_archive: bool) -> Self {
        Self {
            domain: domain.to_string(),
            sld: crate::domain::entities::second_level_label(domain).to_string(),
            country,
            from_archive,
            extra_legal_forms: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populated_count_counts_sets_once() {
        let mut fields = FieldCandidates::default();
        assert_eq!(fields.populated_count(), 0);
        fields.legal_name = Some("Example GmbH".into());
        fields.emails = vec!["a@example.de".into(), "b@example.de".into()];
        assert_eq!(fields.populated_count(), 2);
    }

    #[test]
    fn fill_from_never_overwrites() {
        let mut primary = FieldCandidates {
            legal_name: Some("Primary GmbH".into()),
            ..Default::default()
        };
        let secondary = FieldCandidates {
            legal_name: Some("Secondary GmbH".into()),
            city: Some("Berlin".into()),
            ..Default::default()
        };
        primary.fill_from(&secondary);
        assert_eq!(primary.legal_name.as_deref(), Some("Primary GmbH"));
        assert_eq!(primary.city.as_deref(), Some("Berlin"));
    }
}
