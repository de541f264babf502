//! Heading-anchored sections.
//!
//! Listing pages have no section schema: a section is whatever follows a
//! heading whose wording matches one of several known phrasings. Finding it is
//! two independent steps, [`locate_heading`] then [`collect_after`], composed by
//! [`locate_and_collect`].

use crate::utils::norm_spaces;
use ego_tree::{iter::Edge, NodeId, NodeRef};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Node, Selector};

/// Budget for sections that hold a single field (fees, languages).
pub const FIELD_BUDGET: usize = 400;
/// Budget for free-text sections (criteria, outcomes, contacts...).
pub const SECTION_BUDGET: usize = 4000;

const TITLE_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];
const EMPHASIS_TAGS: [&str; 2] = ["strong", "b"];
const CONTENT_TAGS: [&str; 7] = ["p", "li", "div", "span", "dd", "td", "th"];
const SILENT_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];
const BLOCK_TAGS: [&str; 3] = ["p", "li", "div"];

const E: &str = "Invalid selector";
lazy_static! {
    static ref HEADING: Selector = Selector::parse("h1, h2, h3, h4, h5, h6, strong, b").expect(E);
}

/// Compiles heading phrasings as case-insensitive regexes.
pub fn heading_patterns(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("Invalid heading pattern")
        })
        .collect()
}

/// Whitespace-collapsed text of an element.
pub fn element_text(el: &ElementRef<'_>) -> String {
    norm_spaces(&el.text().collect::<Vec<_>>().join(" "))
}

/// First heading-level node, in document order, whose text matches any pattern.
pub fn locate_heading<'a>(doc: &'a Html, patterns: &[Regex]) -> Option<ElementRef<'a>> {
    doc.select(&HEADING).find(|el| {
        let text = element_text(el);
        !text.is_empty() && patterns.iter().any(|p| p.is_match(&text))
    })
}

/// Bold text that is the whole content of its nearest `p`/`li`/`div`.
fn is_standalone_emphasis(node: NodeRef<'_, Node>) -> bool {
    let own = match ElementRef::wrap(node) {
        Some(el) => element_text(&el),
        None => return false,
    };
    !own.is_empty()
        && node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| BLOCK_TAGS.contains(&el.value().name()))
            .map_or(false, |block| element_text(&block) == own)
}

fn is_boundary(node: NodeRef<'_, Node>, name: &str, inside_unit: bool) -> bool {
    TITLE_TAGS.contains(&name)
        || (EMPHASIS_TAGS.contains(&name) && (!inside_unit || is_standalone_emphasis(node)))
}

fn push_chunk(chunks: &mut Vec<String>, length: &mut usize, raw: &str) {
    let text = norm_spaces(raw);
    if text.is_empty() {
        return;
    }
    if !chunks.is_empty() {
        *length += 1;
    }
    *length += text.chars().count();
    chunks.push(text);
}

/// Text of the content units following `heading`, up to the next heading or
/// until more than `budget` chars have been gathered.
///
/// Nodes inside the heading itself are not part of the section. A content unit
/// is the outermost `p`/`li`/`div`/`span`/`dd`/`td`/`th` met after the heading.
/// `strong`/`b` is a heading outside a unit, or inside one when it fills its
/// nearest `p`/`li`/`div` on its own; otherwise it is inline emphasis.
/// A unit cut by a boundary keeps only the text seen before the boundary.
pub fn collect_after(doc: &Html, heading: ElementRef<'_>, budget: usize) -> String {
    let heading_id = heading.id();
    let mut after_heading = false;
    let mut silent = 0usize;
    let mut unit: Option<(NodeId, String)> = None;
    let mut chunks: Vec<String> = vec![];
    let mut length = 0usize;

    for edge in doc.tree.root().traverse() {
        match edge {
            Edge::Close(node) if !after_heading => {
                after_heading = node.id() == heading_id;
            }
            Edge::Open(_) if !after_heading => {}
            Edge::Open(node) => match node.value() {
                Node::Element(el) => {
                    let name = el.name();
                    if SILENT_TAGS.contains(&name) {
                        silent += 1;
                    } else if is_boundary(node, name, unit.is_some()) {
                        break;
                    } else if unit.is_none() && CONTENT_TAGS.contains(&name) {
                        unit = Some((node.id(), String::new()));
                    }
                }
                Node::Text(text) if silent == 0 => {
                    if let Some((_, buffer)) = unit.as_mut() {
                        buffer.push_str(text);
                        buffer.push(' ');
                    }
                }
                _ => {}
            },
            Edge::Close(node) => {
                if let Node::Element(el) = node.value() {
                    if SILENT_TAGS.contains(&el.name()) {
                        silent = silent.saturating_sub(1);
                        continue;
                    }
                }
                match unit.take() {
                    Some((id, buffer)) if id == node.id() => {
                        push_chunk(&mut chunks, &mut length, &buffer);
                        if length > budget {
                            break;
                        }
                    }
                    other => unit = other,
                }
            }
        }
    }

    if let Some((_, buffer)) = unit {
        push_chunk(&mut chunks, &mut length, &buffer);
    }

    norm_spaces(&chunks.join(" "))
}

/// [`locate_heading`] then [`collect_after`]; empty when no heading matches.
pub fn locate_and_collect(doc: &Html, patterns: &[Regex], budget: usize) -> String {
    locate_heading(doc, patterns)
        .map(|heading| collect_after(doc, heading, budget))
        .unwrap_or_default()
}

/// Every visible text node of the page, trimmed, one per line.
pub fn page_text(doc: &Html) -> String {
    let mut silent = 0usize;
    let mut lines = vec![];

    for edge in doc.tree.root().traverse() {
        match edge {
            Edge::Open(node) => match node.value() {
                Node::Element(el) if SILENT_TAGS.contains(&el.name()) => silent += 1,
                Node::Text(text) if silent == 0 => {
                    let text = text.trim();
                    if !text.is_empty() {
                        lines.push(text.to_string());
                    }
                }
                _ => {}
            },
            Edge::Close(node) => {
                if let Node::Element(el) = node.value() {
                    if SILENT_TAGS.contains(&el.name()) {
                        silent = silent.saturating_sub(1);
                    }
                }
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{}</body></html>", body))
    }

    #[test]
    fn test_locate_first_match_in_document_order() {
        let html = doc(
            "<h2>Débouchés</h2><p>a</p><h2>Frais de scolarité</h2><p>b</p><h3>Frais de scolarité</h3>",
        );
        let patterns = heading_patterns(&[r"Frais\s+de\s+scolarit", r"D[eé]bouch"]);

        let first = locate_heading(&html, &patterns).expect("heading");
        assert_eq!(element_text(&first), "Débouchés");

        let again = locate_heading(&html, &patterns).expect("heading");
        assert_eq!(first.id(), again.id());
    }

    #[test]
    fn test_locate_bold_heading_case_insensitive() {
        let html = doc("<p><strong>LANGUES ET OPTIONS</strong></p><p>Anglais</p>");
        let patterns = heading_patterns(&[r"Langues?\s+et\s+options"]);
        let heading = locate_heading(&html, &patterns).expect("heading");
        assert_eq!(heading.value().name(), "strong");
    }

    #[test]
    fn test_locate_absent() {
        let html = doc("<h2>Autre chose</h2><p>x</p>");
        let patterns = heading_patterns(&[r"Contact"]);
        assert!(locate_heading(&html, &patterns).is_none());
        assert_eq!(locate_and_collect(&html, &patterns, SECTION_BUDGET), "");
    }

    #[test]
    fn test_collect_stops_at_next_heading() {
        let html = doc(
            "<h2>Frais</h2><p>one</p><div><p>two</p><h3>Next</h3><p>after</p></div><p>later</p>",
        );
        let patterns = heading_patterns(&["Frais"]);
        assert_eq!(locate_and_collect(&html, &patterns, SECTION_BUDGET), "one two");
    }

    #[test]
    fn test_collect_stops_at_standalone_bold() {
        let html = doc(
            "<h2>Frais de scolarité</h2><p>Par année : <strong>170 €</strong></p><strong>Autre</strong><p>x</p>",
        );
        let patterns = heading_patterns(&["Frais de scolarit"]);
        assert_eq!(
            locate_and_collect(&html, &patterns, FIELD_BUDGET),
            "Par année : 170 €"
        );
    }

    #[test]
    fn test_collect_stops_at_bold_heading_inside_wrapper() {
        let html = doc(
            "<h2>Frais de scolarité</h2><div><p>Par année : 170 €</p>\
             <p><strong>Langues et options</strong></p><p>Langue vivante 1 : Anglais</p></div>",
        );
        let patterns = heading_patterns(&["Frais de scolarit"]);
        assert_eq!(
            locate_and_collect(&html, &patterns, FIELD_BUDGET),
            "Par année : 170 €"
        );
    }

    #[test]
    fn test_collect_keeps_inline_bold_inside_wrapper() {
        let html = doc(
            "<h2>Frais de scolarité</h2><div><p>Par année : <b>170 €</b></p><p>Boursiers : 0 €</p></div>",
        );
        let patterns = heading_patterns(&["Frais de scolarit"]);
        assert_eq!(
            locate_and_collect(&html, &patterns, FIELD_BUDGET),
            "Par année : 170 € Boursiers : 0 €"
        );
    }

    #[test]
    fn test_collect_skips_heading_own_content() {
        let html = doc("<h2><strong>Langues</strong> et options</h2><ul><li>LV1</li><li>LV2</li></ul>");
        let patterns = heading_patterns(&[r"Langues?\s+et\s+options"]);
        assert_eq!(locate_and_collect(&html, &patterns, FIELD_BUDGET), "LV1 LV2");
    }

    #[test]
    fn test_collect_budget_cap() {
        let paragraphs = (0..10)
            .map(|i| format!("<p>aaaaaaaaa{}</p>", i))
            .collect::<String>();
        let html = doc(&format!("<h2>Section</h2>{}", paragraphs));
        let patterns = heading_patterns(&["Section"]);

        let text = locate_and_collect(&html, &patterns, 25);
        assert_eq!(text, "aaaaaaaaa0 aaaaaaaaa1 aaaaaaaaa2");
        assert!(text.chars().count() <= 25 + 1 + 10);
    }

    #[test]
    fn test_collect_ignores_scripts() {
        let html = doc("<h2>Contact</h2><div>mail<script>var x = 1;</script> us</div>");
        let patterns = heading_patterns(&["Contact"]);
        assert_eq!(locate_and_collect(&html, &patterns, SECTION_BUDGET), "mail us");
    }

    #[test]
    fn test_collect_empty_section() {
        let html = doc("<h2>Contact</h2><h2>Suite</h2><p>x</p>");
        let patterns = heading_patterns(&["Contact"]);
        assert_eq!(locate_and_collect(&html, &patterns, SECTION_BUDGET), "");
    }

    #[test]
    fn test_page_text() {
        let html = doc("<h1> Titre </h1><script>ignored()</script><p>a<br>b</p>");
        assert_eq!(page_text(&html), "Titre\na\nb");
    }
}
