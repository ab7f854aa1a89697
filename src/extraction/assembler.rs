//! Result assembly: merging extraction passes into one record
//!
//! Per-field priority Structured > Pattern > Generic; equal priority keeps
//! the higher confidence, then the earlier pass. Archive pages multiply
//! every confidence by 0.9 before the record goes to validation.

use crate::domain::entities::{ContactSet, CrawlResult, ExtractedField, FieldSource};
use crate::extraction::candidates::{ExtractionContext, ExtractionPass};

const ARCHIVE_MULTIPLIER: f64 = 0.9;

/// Merge passes (in configuration order) into a draft record. The caller
/// validates afterwards; confidences already include the archive penalty.
pub fn assemble(
    domain: &str,
    legal_source_url: &str,
    run_id: &str,
    passes: &[ExtractionPass],
    ctx: &ExtractionContext,
) -> CrawlResult {
    let mut result = CrawlResult::new(domain, legal_source_url, run_id);

    let multiplier = if ctx.from_archive { ARCHIVE_MULTIPLIER } else { 1.0 };

    merge_field(&mut result.legal_name, passes, multiplier, |f| f.legal_name.as_ref());
    merge_field(&mut result.legal_form, passes, multiplier, |f| f.legal_form.as_ref());
    merge_field(&mut result.registration_number, passes, multiplier, |f| {
        f.registration_number.as_ref()
    });
    merge_field(&mut result.register_court, passes, multiplier, |f| f.register_court.as_ref());
    merge_field(&mut result.register_type, passes, multiplier, |f| f.register_type.as_ref());
    merge_field(&mut result.vat_id, passes, multiplier, |f| f.vat_id.as_ref());
    merge_field(&mut result.street, passes, multiplier, |f| f.street.as_ref());
    merge_field(&mut result.postal_code, passes, multiplier, |f| f.postal_code.as_ref());
    merge_field(&mut result.city, passes, multiplier, |f| f.city.as_ref());
    merge_field(&mut result.country, passes, multiplier, |f| f.country.as_ref());
    merge_field(&mut result.ceo, passes, multiplier, |f| f.ceo.as_ref());
    merge_field(&mut result.fax, passes, multiplier, |f| f.fax.as_ref());

    // Directors: ordered list from the best pass that has one
    if let Some(pass) = best_pass(passes, |f| !f.directors.is_empty()) {
        result.directors = pass.fields.directors.clone();
    }

    // Contact sets: values union across passes, provenance from the best one
    result.emails = merge_contact_set(passes, multiplier, |f| &f.emails);
    result.phones = merge_contact_set(passes, multiplier, |f| &f.phones);

    // A name like "Example GmbH" implies its legal form even when no pass
    // emitted the form separately (structured annotations rarely do).
    if result.legal_form.is_none() {
        if let Some(name) = &result.legal_name {
            if let Some(form) = form_suffix_of(&name.value, ctx) {
                result.legal_form =
                    Some(ExtractedField::new(form, name.source, name.confidence));
            }
        }
    }

    result.recompute_confidence();
    result
}

/// The legal-form token the name ends with, if any.
fn form_suffix_of(name: &str, ctx: &ExtractionContext) -> Option<String> {
    let name_lower = name.to_lowercase();
    ctx.country
        .legal_forms()
        .iter()
        .map(|f| *f)
        .chain(ctx.extra_legal_forms.iter().map(String::as_str))
        .find(|form| {
            let form_lower = form.to_lowercase();
            name_lower.ends_with(&form_lower)
                && name_lower
                    .strip_suffix(&form_lower)
                    .map(|prefix| prefix.ends_with(' ') || prefix.ends_with('('))
                    .unwrap_or(false)
        })
        .map(str::to_string)
}

/// The winning pass for a predicate under the priority rules.
fn best_pass<'a, P: Fn(&crate::extraction::candidates::FieldCandidates) -> bool>(
    passes: &'a [ExtractionPass],
    has: P,
) -> Option<&'a ExtractionPass> {
    passes
        .iter()
        .enumerate()
        .filter(|(_, pass)| has(&pass.fields))
        .min_by(|(ia, a), (ib, b)| {
            a.source
                .priority()
                .cmp(&b.source.priority())
                .then(b.base_confidence.partial_cmp(&a.base_confidence).unwrap_or(std::cmp::Ordering::Equal))
                .then(ia.cmp(ib))
        })
        .map(|(_, pass)| pass)
}

fn merge_field<'a, G: Fn(&'a crate::extraction::candidates::FieldCandidates) -> Option<&'a String>>(
    slot: &mut Option<ExtractedField>,
    passes: &'a [ExtractionPass],
    multiplier: f64,
    get: G,
) {
    let winner = passes
        .iter()
        .enumerate()
        .filter_map(|(idx, pass)| get(&pass.fields).map(|value| (idx, pass, value)))
        .min_by(|(ia, a, _), (ib, b, _)| {
            a.source
                .priority()
                .cmp(&b.source.priority())
                .then(b.base_confidence.partial_cmp(&a.base_confidence).unwrap_or(std::cmp::Ordering::Equal))
                .then(ia.cmp(ib))
        });

    if let Some((_, pass, value)) = winner {
        *slot = Some(ExtractedField::new(
            value.clone(),
            pass.source,
            pass.base_confidence * multiplier,
        ));
    }
}

fn merge_contact_set<G: Fn(&crate::extraction::candidates::FieldCandidates) -> &Vec<String>>(
    passes: &[ExtractionPass],
    multiplier: f64,
    get: G,
) -> Option<ContactSet> {
    let best = best_pass(passes, |f| !get(f).is_empty())?;

    let mut values = Vec::new();
    for pass in passes {
        for value in get(&pass.fields) {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
    }

    Some(ContactSet::new(values, best.source, best.base_confidence * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::candidates::FieldCandidates;
    use crate::extraction::country::Country;

    fn ctx(from_archive: bool) -> ExtractionContext {
        ExtractionContext::new("beispiel.de", Country::Germany, from_archive)
    }

    fn pattern_pass() -> ExtractionPass {
        ExtractionPass::pattern(FieldCandidates {
            legal_name: Some("Beispiel GmbH".into()),
            street: Some("Musterweg 7".into()),
            emails: vec!["info@beispiel.de".into()],
            ..Default::default()
        })
    }

    fn structured_pass() -> ExtractionPass {
        ExtractionPass::structured(FieldCandidates {
            legal_name: Some("Beispiel Gesellschaft mbH".into()),
            emails: vec!["kontakt@beispiel.de".into()],
            ..Default::default()
        })
    }

    #[test]
    fn structured_beats_pattern_on_conflict() {
        let passes = vec![pattern_pass(), structured_pass()];
        let result = assemble("beispiel.de", "https://beispiel.de/impressum", "r", &passes, &ctx(false));

        let name = result.legal_name.unwrap();
        assert_eq!(name.value, "Beispiel Gesellschaft mbH");
        assert_eq!(name.source, FieldSource::Structured);
        assert_eq!(name.confidence, 1.0);

        // Pattern-only field still comes through
        let street = result.street.unwrap();
        assert_eq!(street.value, "Musterweg 7");
        assert_eq!(street.source, FieldSource::Pattern);
    }

    #[test]
    fn contact_sets_union_values() {
        let passes = vec![pattern_pass(), structured_pass()];
        let result = assemble("beispiel.de", "https://beispiel.de/impressum", "r", &passes, &ctx(false));
        let emails = result.emails.unwrap();
        assert_eq!(emails.source, FieldSource::Structured);
        assert_eq!(
            emails.values,
            vec!["info@beispiel.de".to_string(), "kontakt@beispiel.de".to_string()]
        );
    }

    #[test]
    fn archive_pages_reduce_confidence() {
        let passes = vec![pattern_pass()];
        let result = assemble("beispiel.de", "https://beispiel.de/impressum", "r", &passes, &ctx(true));
        let name = result.legal_name.unwrap();
        assert!((name.confidence - 0.8 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn legal_form_derived_from_name_suffix() {
        let structured = ExtractionPass::structured(FieldCandidates {
            legal_name: Some("Example GmbH".into()),
            ..Default::default()
        });
        let result =
            assemble("example.de", "https://example.de/", "r", &[structured], &ctx(false));
        let form = result.legal_form.unwrap();
        assert_eq!(form.value, "GmbH");
        assert_eq!(form.source, FieldSource::Structured);
        assert_eq!(form.confidence, 1.0);
    }

    #[test]
    fn generic_fills_gaps_only() {
        let generic = ExtractionPass::generic(FieldCandidates {
            legal_name: Some("beispiel.de webshop".into()),
            city: Some("München".into()),
            ..Default::default()
        });
        let passes = vec![pattern_pass(), generic];
        let result = assemble("beispiel.de", "https://beispiel.de/impressum", "r", &passes, &ctx(false));
        assert_eq!(result.legal_name.unwrap().value, "Beispiel GmbH");
        let city = result.city.unwrap();
        assert_eq!(city.value, "München");
        assert_eq!(city.source, FieldSource::Generic);
    }
}
