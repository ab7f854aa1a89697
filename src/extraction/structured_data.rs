//! Structured-data pass: JSON-LD annotations
//!
//! Reads `<script type="application/ld+json">` blocks and keeps
//! Organization-like nodes. Multiple annotations are merged with the most
//! populated one in front; fields it lacks are filled from the others.

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::extraction::candidates::{ExtractionPass, FieldCandidates};

const ORG_TYPES: &[&str] = &["Organization", "Corporation", "LocalBusiness"];

/// Run the structured pass over raw page HTML. Returns None when no usable
/// annotation exists.
pub fn extract(html: &str) -> Option<ExtractionPass> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    let mut candidates: Vec<FieldCandidates> = Vec::new();
    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            debug!("Skipping unparseable JSON-LD block");
            continue;
        };
        for node in organization_nodes(&value) {
            let fields = fields_from_node(node);
            if !fields.is_empty() {
                candidates.push(fields);
            }
        }
    }

    if candidates.is_empty() {
        return None;
    }

    // Conflict rule: the annotation with the most populated fields wins,
    // the rest only fill gaps.
    candidates.sort_by_key(|c| std::cmp::Reverse(c.populated_count()));
    let mut merged = candidates.remove(0);
    for other in &candidates {
        merged.fill_from(other);
    }

    Some(ExtractionPass::structured(merged))
}

/// Flatten top-level values, arrays and @graph containers into the list of
/// Organization-like nodes.
fn organization_nodes(value: &Value) -> Vec<&Value> {
    let mut nodes = Vec::new();
    collect_nodes(value, &mut nodes);
    nodes.into_iter().filter(|n| is_organization(n)).collect()
}

fn collect_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_nodes(item, out);
            }
        }
        Value::Object(map) => {
            out.push(value);
            if let Some(graph) = map.get("@graph") {
                collect_nodes(graph, out);
            }
        }
        _ => {}
    }
}

fn is_organization(node: &Value) -> bool {
    match node.get("@type") {
        Some(Value::String(t)) => ORG_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| ORG_TYPES.contains(&t)),
        _ => false,
    }
}

fn fields_from_node(node: &Value) -> FieldCandidates {
    let mut fields = FieldCandidates::default();

    fields.legal_name = string_field(node, "legalName").or_else(|| string_field(node, "name"));
    fields.vat_id = string_field(node, "vatID").or_else(|| string_field(node, "taxID"));

    if let Some(address) = node.get("address") {
        // address may be a single PostalAddress or an array of them
        let address = match address {
            Value::Array(items) => items.first(),
            other => Some(other),
        };
        if let Some(address) = address {
            fields.street = string_field(address, "streetAddress");
            fields.postal_code = string_field(address, "postalCode");
            fields.city = string_field(address, "addressLocality");
            fields.country = string_field(address, "addressCountry");
        }
    }

    if let Some(email) = string_field(node, "email") {
        fields.emails.push(email.trim_start_matches("mailto:").to_string());
    }
    if let Some(phone) = string_field(node, "telephone") {
        fields.phones.push(phone);
    }
    if let Some(fax) = string_field(node, "faxNumber") {
        fields.fax = Some(fax);
    }

    // contactPoint entries: telephone/email per point
    if let Some(points) = node.get("contactPoint") {
        let points: Vec<&Value> = match points {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for point in points {
            if let Some(phone) = string_field(point, "telephone") {
                if !fields.phones.contains(&phone) {
                    fields.phones.push(phone);
                }
            }
            if let Some(email) = string_field(point, "email") {
                let email = email.trim_start_matches("mailto:").to_string();
                if !fields.emails.contains(&email) {
                    fields.emails.push(email);
                }
            }
        }
    }

    fields
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // JSON-LD occasionally wraps single values in arrays
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::FieldSource;

    const ORGANIZATION_PAGE: &str = r#"
    <html><head>
    <script type="application/ld+json">
    {
      "@context": "https://schema.org",
      "@type": "Organization",
      "legalName": "Example GmbH",
      "vatID": "DE123456789",
      "telephone": "+49 30 1234567",
      "address": {
        "@type": "PostalAddress",
        "streetAddress": "Musterstr. 1",
        "postalCode": "10115",
        "addressLocality": "Berlin",
        "addressCountry": "DE"
      }
    }
    </script>
    </head><body></body></html>
    "#;

    #[test]
    fn extracts_organization_annotation() {
        let pass = extract(ORGANIZATION_PAGE).unwrap();
        assert_eq!(pass.source, FieldSource::Structured);
        assert_eq!(pass.base_confidence, 1.0);
        assert_eq!(pass.fields.legal_name.as_deref(), Some("Example GmbH"));
        assert_eq!(pass.fields.vat_id.as_deref(), Some("DE123456789"));
        assert_eq!(pass.fields.street.as_deref(), Some("Musterstr. 1"));
        assert_eq!(pass.fields.postal_code.as_deref(), Some("10115"));
        assert_eq!(pass.fields.city.as_deref(), Some("Berlin"));
        assert_eq!(pass.fields.phones, vec!["+49 30 1234567".to_string()]);
    }

    #[test]
    fn graph_container_and_type_arrays() {
        let html = r#"
        <script type="application/ld+json">
        {"@graph": [
          {"@type": "WebSite", "name": "irrelevant"},
          {"@type": ["LocalBusiness", "Thing"], "name": "Café Muster",
           "email": "mailto:info@muster.at"}
        ]}
        </script>
        "#;
        let pass = extract(html).unwrap();
        assert_eq!(pass.fields.legal_name.as_deref(), Some("Café Muster"));
        assert_eq!(pass.fields.emails, vec!["info@muster.at".to_string()]);
    }

    #[test]
    fn most_populated_annotation_wins_conflicts() {
        let html = r#"
        <script type="application/ld+json">
        {"@type": "Organization", "name": "Thin Corp"}
        </script>
        <script type="application/ld+json">
        {"@type": "Organization", "name": "Full Corp GmbH", "vatID": "DE999999999",
         "address": {"postalCode": "10115", "addressLocality": "Berlin"}}
        </script>
        "#;
        let pass = extract(html).unwrap();
        assert_eq!(pass.fields.legal_name.as_deref(), Some("Full Corp GmbH"));
    }

    #[test]
    fn no_annotation_means_no_pass() {
        assert!(extract("<html><body>plain page</body></html>").is_none());
        assert!(extract(r#"<script type="application/ld+json">{"@type": "BreadcrumbList"}</script>"#).is_none());
    }
}
