//! Legal-page link discovery from the home-page DOM
//!
//! Scores anchors by label lexicon, path tokens and footer proximity;
//! nofollow and external links are excluded. Returns at most K candidates,
//! best first; the caller falls back to the home URL when empty.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Multilingual legal-page labels with a priority rank (lower = better).
/// Rank breaks ties between equally scored signals, so an "Impressum" link
/// beats a "Datenschutz" link found in the same footer.
const LABELS: &[(&str, u8)] = &[
    ("impressum", 0),
    ("imprint", 0),
    ("mentions légales", 0),
    ("mentions legales", 0),
    ("aviso legal", 0),
    ("note legali", 0),
    ("legal notice", 0),
    ("legal-notice", 0),
    ("rechtliche hinweise", 1),
    ("legal", 1),
    ("company information", 1),
    ("datenschutz", 2),
    ("kontakt", 2),
    ("contact", 2),
];

const PATH_TOKENS: &[(&str, u8)] = &[
    ("impressum", 0),
    ("imprint", 0),
    ("mentions-legales", 0),
    ("mentions_legales", 0),
    ("aviso-legal", 0),
    ("note-legali", 0),
    ("legal-notice", 0),
    ("legal", 1),
    ("datenschutz", 2),
    ("kontakt", 2),
    ("contact", 2),
];

#[derive(Debug, Clone)]
struct Candidate {
    url: String,
    score: u32,
    rank: u8,
    depth: usize,
}

/// Discover candidate legal URLs, best first, at most `limit`.
pub fn discover(html: &str, base_url: &str, limit: usize) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else { return Vec::new() };
    let document = Html::parse_document(html);

    let all_selector = Selector::parse("*").unwrap();
    let anchor_selector = Selector::parse("a[href]").unwrap();

    // Document position of every element, for the bottom-20% footer signal
    let positions: Vec<_> = document.select(&all_selector).map(|el| el.id()).collect();
    let total = positions.len().max(1);
    let position_of = |el: &ElementRef| -> usize {
        positions.iter().position(|id| *id == el.id()).unwrap_or(0)
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for anchor in document.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else { continue };
        let href_trimmed = href.trim();
        if href_trimmed.is_empty()
            || href_trimmed.starts_with('#')
            || href_trimmed.to_lowercase().starts_with("javascript:")
            || href_trimmed.to_lowercase().starts_with("mailto:")
            || href_trimmed.to_lowercase().starts_with("tel:")
        {
            continue;
        }
        if anchor
            .value()
            .attr("rel")
            .map(|rel| rel.to_lowercase().contains("nofollow"))
            .unwrap_or(false)
        {
            continue;
        }

        let Ok(resolved) = base.join(href_trimmed) else { continue };
        if !same_host(&base, &resolved) {
            continue;
        }

        let text = anchor.text().collect::<String>().to_lowercase();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let path = resolved.path().to_lowercase();

        let mut score = 0u32;
        let mut rank = u8::MAX;

        if let Some((_, r)) = LABELS.iter().find(|(label, _)| text.contains(label)) {
            score += 100;
            rank = rank.min(*r);
        }
        if let Some((_, r)) = PATH_TOKENS.iter().find(|(token, _)| path.contains(token)) {
            score += 50;
            rank = rank.min(*r);
        }
        if in_footer(&anchor) || position_of(&anchor) * 5 >= total * 4 {
            score += 10;
        }

        if score == 0 {
            continue;
        }

        let mut url = resolved;
        url.set_fragment(None);
        let url = url.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }

        let depth = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).count();
        candidates.push(Candidate { url, score, rank, depth });
    }

    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.rank.cmp(&b.rank))
            .then(a.depth.cmp(&b.depth))
            .then(a.url.cmp(&b.url))
    });

    candidates.into_iter().take(limit).map(|c| c.url).collect()
}

/// Hosts are compared ignoring a www. prefix so apex and www count as the
/// same site.
fn same_host(base: &Url, other: &Url) -> bool {
    match (base.host_str(), other.host_str()) {
        (Some(a), Some(b)) => {
            crate::domain::entities::registered_domain(a)
                == crate::domain::entities::registered_domain(b)
        }
        _ => false,
    }
}

fn in_footer(anchor: &ElementRef) -> bool {
    for ancestor in anchor.ancestors() {
        let Some(el) = ElementRef::wrap(ancestor) else { continue };
        let tag = el.value().name();
        if tag == "footer" {
            return true;
        }
        let classes = el.value().attr("class").unwrap_or("").to_lowercase();
        let id = el.value().attr("id").unwrap_or("").to_lowercase();
        if classes.contains("footer") || id.contains("footer") {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: &str = r#"
    <html><body>
      <nav><a href="/">Home</a><a href="/shop">Shop</a></nav>
      <main><p>Welcome</p><a href="/products/all">Products</a></main>
      <footer>
        <a href="/impressum">Impressum</a>
        <a href="/datenschutz">Datenschutz</a>
        <a href="https://facebook.com/page" rel="nofollow">Facebook</a>
        <a href="https://other-host.de/impressum">Partner Impressum</a>
      </footer>
    </body></html>
    "#;

    #[test]
    fn impressum_ranks_first_and_externals_are_dropped() {
        let urls = discover(HOME, "https://example.de/", 3);
        assert_eq!(urls.first().map(String::as_str), Some("https://example.de/impressum"));
        assert!(urls.iter().all(|u| !u.contains("facebook")));
        assert!(urls.iter().all(|u| !u.contains("other-host")));
        assert!(urls.len() <= 3);
    }

    #[test]
    fn path_token_match_without_label() {
        let html = r#"<a href="/de/legal-notice.html">Here</a>"#;
        let urls = discover(html, "https://example.co.uk/", 3);
        assert_eq!(urls, vec!["https://example.co.uk/de/legal-notice.html".to_string()]);
    }

    #[test]
    fn shallower_path_wins_ties() {
        let html = r#"
        <a href="/a/b/impressum">Impressum</a>
        <a href="/impressum">Impressum</a>
        "#;
        let urls = discover(html, "https://example.de/", 3);
        assert_eq!(urls[0], "https://example.de/impressum");
    }

    #[test]
    fn www_variant_is_internal() {
        let html = r#"<a href="https://www.example.de/impressum">Impressum</a>"#;
        let urls = discover(html, "https://example.de/", 3);
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn no_candidates_yields_empty() {
        let urls = discover("<a href='/shop'>Shop</a>", "https://example.de/", 3);
        assert!(urls.is_empty());
    }
}
