//! Boilerplate removal and legal-section isolation
//!
//! Strips chrome (navigation, cookie banners, scripts) and returns the
//! densest text region as plain text. Line breaks are preserved because the
//! country patterns downstream are line-sensitive.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

/// Tags removed wholesale.
const SKIP_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "form", "iframe", "svg",
    "select", "button", "template",
];

/// Block-level tags that force a line break around their content.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th", "table",
    "section", "article", "address", "blockquote", "dt", "dd", "main",
];

/// Class/id fragments that mark chrome regions (cookie banners, menus, …).
static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)cookie|consent|banner|navbar|nav-|menu|sidebar|breadcrumb|social|share|popup|modal|widget|newsletter|search|cart|slider|carousel",
    )
    .unwrap()
});

/// Isolate the main legal content of a page as normalised plain text.
/// Returns an empty string when nothing survives.
pub fn isolate(html: &str) -> String {
    let document = Html::parse_document(html);

    let root = densest_region(&document);
    let mut raw = String::new();
    if let Some(root) = root {
        collect_text(root, &mut raw);
    }

    normalise_lines(&raw)
}

/// Choose the candidate container with the highest text density:
/// text length weighted down by the share of link text.
fn densest_region(document: &Html) -> Option<ElementRef<'_>> {
    let candidate_selector =
        Selector::parse("main, article, [role=\"main\"], #content, .content, body").unwrap();

    let mut best: Option<(f64, ElementRef)> = None;
    for candidate in document.select(&candidate_selector) {
        if should_skip(&candidate) {
            continue;
        }
        let text_len = visible_text_len(candidate);
        if text_len < 40 {
            continue;
        }
        let link_len = link_text_len(candidate);
        let density = text_len as f64 * (1.0 - (link_len as f64 / text_len.max(1) as f64));
        // Prefer tighter containers on equal density (body always matches)
        let is_body = candidate.value().name() == "body";
        let score = if is_body { density * 0.9 } else { density };
        if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, el)| el)
}

fn visible_text_len(el: ElementRef) -> usize {
    let mut out = String::new();
    collect_text(el, &mut out);
    out.split_whitespace().map(str::len).sum()
}

fn link_text_len(el: ElementRef) -> usize {
    let anchor_selector = Selector::parse("a").unwrap();
    el.select(&anchor_selector)
        .map(|a| a.text().collect::<String>().split_whitespace().map(str::len).sum::<usize>())
        .sum()
}

fn should_skip(el: &ElementRef) -> bool {
    let tag = el.value().name();
    if SKIP_TAGS.contains(&tag) {
        return true;
    }
    let classes = el.value().attr("class").unwrap_or("");
    let id = el.value().attr("id").unwrap_or("");
    let role = el.value().attr("role").unwrap_or("");
    if matches!(role, "navigation" | "banner" | "contentinfo" | "search") {
        return true;
    }
    NOISE_RE.is_match(classes) || NOISE_RE.is_match(id)
}

/// Depth-first text collection with block-boundary line breaks.
fn collect_text(el: ElementRef, out: &mut String) {
    let tag = el.value().name();
    let is_block = BLOCK_TAGS.contains(&tag);
    if is_block && !out.ends_with('\n') {
        out.push('\n');
    }

    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                if element.name() == "br" {
                    out.push('\n');
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !should_skip(&child_el) {
                        collect_text(child_el, out);
                    }
                }
            }
            _ => {}
        }
    }

    if is_block && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Collapse whitespace runs per line and keep at most one blank line
/// between logical blocks.
pub fn normalise_lines(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut last_blank = true; // swallow leading blanks
    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !last_blank {
                lines.push(String::new());
                last_blank = true;
            }
        } else {
            lines.push(collapsed);
            last_blank = false;
        }
    }
    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMPRESSUM_PAGE: &str = r#"
    <html><body>
      <nav class="main-nav"><a href="/">Home</a><a href="/shop">Shop</a></nav>
      <div class="cookie-consent">We use cookies! <button>Accept</button></div>
      <main>
        <h1>Impressum</h1>
        <p>Beispiel GmbH<br>Musterweg 7<br>80333 München</p>
        <p>Geschäftsführer: Max Mustermann</p>
        <p>HRB 12345 Amtsgericht München</p>
      </main>
      <footer><a href="/datenschutz">Datenschutz</a></footer>
    </body></html>
    "#;

    #[test]
    fn strips_chrome_and_keeps_legal_lines() {
        let text = isolate(IMPRESSUM_PAGE);
        assert!(text.contains("Beispiel GmbH"));
        assert!(text.contains("Musterweg 7"));
        assert!(text.contains("80333 München"));
        assert!(text.contains("Geschäftsführer: Max Mustermann"));
        assert!(!text.contains("Shop"));
        assert!(!text.contains("cookies"));
        assert!(!text.contains("Datenschutz"));
    }

    #[test]
    fn br_tags_preserve_address_lines() {
        let text = isolate(IMPRESSUM_PAGE);
        let lines: Vec<&str> = text.lines().collect();
        let street_idx = lines.iter().position(|l| *l == "Musterweg 7").unwrap();
        assert_eq!(lines[street_idx + 1], "80333 München");
        assert_eq!(lines[street_idx - 1], "Beispiel GmbH");
    }

    #[test]
    fn whitespace_runs_collapse() {
        let normalised = normalise_lines("a   b\n\n\n\nc\t\td\n");
        assert_eq!(normalised, "a b\n\nc d");
    }

    #[test]
    fn falls_back_to_body_without_main() {
        let html = "<html><body><p>Muster AG</p><p>Hauptplatz 1</p><p>1010 Wien \
                    und weiterer ausführlicher rechtlicher Text zur Offenlegung</p></body></html>";
        let text = isolate(html);
        assert!(text.contains("Muster AG"));
        assert!(text.contains("1010 Wien"));
    }

    #[test]
    fn empty_page_yields_empty_text() {
        assert_eq!(isolate("<html><body></body></html>"), "");
    }
}
