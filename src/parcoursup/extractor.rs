use super::FormationPage;
use crate::section::{
    element_text, heading_patterns, locate_and_collect, page_text, FIELD_BUDGET, SECTION_BUDGET,
};
use crate::utils::{non_empty, norm_spaces, parse_count};
use itertools::Itertools;
use lazy_regex::regex;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

const E: &str = "Invalid selector";
lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect(E);
    static ref H1: Selector = Selector::parse("h1").expect(E);
    static ref HTML_LANG: Selector = Selector::parse("html[lang]").expect(E);
    static ref META_HTTP_EQUIV: Selector = Selector::parse("meta[http-equiv]").expect(E);
    static ref LINK: Selector = Selector::parse("link[rel][href]").expect(E);
    static ref A: Selector = Selector::parse("a[href]").expect(E);

    static ref FEES: Vec<Regex> = heading_patterns(&[r"Frais\s+de\s+scolarit[ée]"]);
    static ref LANGUAGES: Vec<Regex> = heading_patterns(&[r"Langues?\s+et\s+options"]);
    static ref CRITERIA: Vec<Regex> = heading_patterns(&[
        r"Comprendre\s+les\s+crit[eè]res\s+d[’'ʼ]?\s*analyse\s+des\s+candidatures",
        r"Crit[eè]res\s+d[’'ʼ]?\s*analyse\s+des\s+candidatures",
    ]);
    static ref ACCESS_FIGURES: Vec<Regex> = heading_patterns(&[
        r"Consulter\s+les\s+chiffres\s+d[’'ʼ]\s*acc[eè]s?\s+\w*\s+la\s+formation",
        r"Chiffres\s+d[’'ʼ]\s*acc[eè]s?\s+\w*\s+la\s+formation",
        r"Les\s+chiffres\s+globaux\s+d[’'ʼ]\s*acc[eè]s",
    ]);
    static ref FURTHER_STUDIES: Vec<Regex> = heading_patterns(&[
        r"Poursuivre\s+ses\s+[eé]tudes",
        r"Poursuites?\s+d[’'ʼ]?\s*[eé]tudes",
    ]);
    static ref OUTCOMES: Vec<Regex> = heading_patterns(&[
        r"conna[iî]tre\s+les\s+d[eé]bouch[ée]s",
        r"D[eé]bouch[ée]s",
    ]);
    static ref CONTACTS: Vec<Regex> = heading_patterns(&[
        r"Contacter\s+et\s+[eé]changer\s+avec\s+l[’'ʼ]?\s*[eé]tablissement",
        r"Contacts?\s+et\s+[eé]changes?",
        r"Contact",
    ]);
}

/// Parses `html` and extracts every field of the listing.
pub fn parse(html: &str) -> FormationPage {
    let doc = Html::parse_document(html);
    extract(&doc)
}

pub fn extract(doc: &Html) -> FormationPage {
    let text = page_text(doc);
    let (annual_fee, scholarship_fee) = tuition_fees(doc, &text);
    let (lv1, lv2, french_level) = languages(doc);
    let (onisep_url, catalogue_url) = directory_links(doc);

    FormationPage {
        title: doc.select(&TITLE).next().map(|el| element_text(&el)).and_then(non_empty),
        heading: doc.select(&H1).next().map(|el| element_text(&el)).and_then(non_empty),
        lang: page_lang(doc),
        canonical_url: canonical_url(doc),
        places: places(&text),
        confirmed_wishes: confirmed_wishes(&text),
        applicants: applicants(&text),
        offers: offers(&text),
        enrolled: enrolled(&text),
        annual_fee,
        scholarship_fee,
        lv1,
        lv2,
        french_level,
        onisep_url,
        catalogue_url,
        emails: emails(&text),
        criteria: non_empty(locate_and_collect(doc, &CRITERIA, SECTION_BUDGET)),
        access_figures: non_empty(locate_and_collect(doc, &ACCESS_FIGURES, SECTION_BUDGET)),
        further_studies: non_empty(locate_and_collect(doc, &FURTHER_STUDIES, SECTION_BUDGET)),
        outcomes: non_empty(locate_and_collect(doc, &OUTCOMES, SECTION_BUDGET)),
        contacts: non_empty(locate_and_collect(doc, &CONTACTS, SECTION_BUDGET)),
    }
}

/// Annual fee and scholarship-holder fee, read from the fees section or, when
/// the page has no such heading, from the lines mentioning fees.
fn tuition_fees(doc: &Html, text: &str) -> (Option<String>, Option<String>) {
    let mut block = locate_and_collect(doc, &FEES, FIELD_BUDGET);
    if block.is_empty() {
        block = text
            .lines()
            .filter(|l| l.contains("Frais de scolarité") || l.contains("Par année"))
            .join("\n");
    }
    (annual_fee(&block), scholarship_fee(&block))
}

pub fn annual_fee(block: &str) -> Option<String> {
    let caps = regex!(
        r"(?i)Par\s+ann[ée]e\s*:?[\s\-]*(\d[\d\s.,\x{A0}\x{202F}]*(?:€|euros?)?)"
    )
    .captures(block)?;
    let amount = regex!(r"(?i)\s*euros?").replace_all(&caps[1], " €");
    non_empty(norm_spaces(&amount).trim_end_matches(&['.', ','][..]))
}

/// Fee for scholarship holders. The value runs from its label to the next
/// label, the end of the sentence or the end of the line.
pub fn scholarship_fee(block: &str) -> Option<String> {
    let labels = regex!(r"(?i)(non[\s\-]+)?boursiers?\b\s*[:\-]?\s*")
        .captures_iter(block)
        .filter_map(|caps| Some((caps.get(1).is_some(), caps.get(0)?)))
        .collect::<Vec<_>>();

    for (i, (negated, label)) in labels.iter().enumerate() {
        if *negated {
            continue;
        }
        let end = labels.get(i + 1).map_or(block.len(), |(_, next)| next.start());
        let value = block[label.end()..end]
            .split(&['.', '\n'][..])
            .next()
            .unwrap_or_default();
        if let Some(value) = non_empty(value) {
            return Some(value);
        }
    }
    None
}

/// LV1, LV2 and the required French level from the languages section.
fn languages(doc: &Html) -> (Option<String>, Option<String>, Option<String>) {
    let block = locate_and_collect(doc, &LANGUAGES, FIELD_BUDGET);
    if block.is_empty() {
        return (None, None, None);
    }
    let lv1 = regex!(
        r"(?i)Langue\s+vivante\s+1\s*:\s*(.+?)\s*(?:Langue\s+vivante|Niveau\s+de|Options?\s*:|\s{2,}|$)"
    )
    .captures(&block)
    .and_then(|caps| language_name(&caps[1]));
    let lv2 = regex!(
        r"(?i)Langue\s+vivante\s+2\s*:\s*(.+?)\s*(?:Langue\s+vivante|Niveau\s+de|Options?\s*:|\s{2,}|$)"
    )
    .captures(&block)
    .and_then(|caps| language_name(&caps[1]));
    (lv1, lv2, french_level(&block))
}

fn language_name(raw: &str) -> Option<String> {
    non_empty(raw.trim_matches(&[' ', '.', ';'][..]))
}

/// Level on the A1..C2 scale, uppercased.
pub fn french_level(block: &str) -> Option<String> {
    regex!(r"(?i)Niveau\s+de\s+fran[çc]ais\s+requis.*?:\s*([A-C][12])\b")
        .captures(block)
        .map(|caps| caps[1].to_uppercase())
}

fn count(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text).and_then(|caps| parse_count(&caps[1]))
}

pub fn places(text: &str) -> Option<u64> {
    count(
        regex!(r"(?i)\b(\d{1,3}(?:[ \x{A0}\x{202F}]\d{3})+|\d+)\s+places?\s+en\s+\d{4}"),
        text,
    )
}

pub fn confirmed_wishes(text: &str) -> Option<u64> {
    count(
        regex!(
            r"(?i)\b(\d{1,3}(?:[ \x{A0}\x{202F}]\d{3})+|\d+)\s+v(?:œ|oe|o)ux\s+confirm[ée]s?\s+en\s+\d{4}"
        ),
        text,
    )
}

pub fn applicants(text: &str) -> Option<u64> {
    count(
        regex!(r"(?i)\b(\d{1,3}(?:[ \x{A0}\x{202F}]\d{3})+|\d+)\s+candidats?\s+ont\s+postul[ée]"),
        text,
    )
}

pub fn offers(text: &str) -> Option<u64> {
    count(
        regex!(
            r"(?i)\b(\d{1,3}(?:[ \x{A0}\x{202F}]\d{3})+|\d+)\s+candidats?\s+ont\s+pu\s+recevoir\s+une\s+proposition"
        ),
        text,
    )
}

pub fn enrolled(text: &str) -> Option<u64> {
    count(
        regex!(
            r"(?i)\b(\d{1,3}(?:[ \x{A0}\x{202F}]\d{3})+|\d+)\s+candidats?\s+ont\s+choisi\s+d[’'ʼ]\s*int[ée]grer"
        ),
        text,
    )
}

/// Every address in `text`, lowercased, deduplicated and sorted.
pub fn emails(text: &str) -> Vec<String> {
    regex!(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}")
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .sorted()
        .dedup()
        .collect()
}

/// ONISEP and catalogue links. The last matching anchor wins for each kind and
/// one anchor may count for both.
pub fn directory_links(doc: &Html) -> (Option<String>, Option<String>) {
    let mut onisep = None;
    let mut catalogue = None;

    for a in doc.select(&A) {
        let href = match a.value().attr("href").map(str::trim) {
            Some(href) if !href.is_empty() => href,
            _ => continue,
        };
        let lower_href = href.to_lowercase();
        let label = element_text(&a).to_lowercase();

        if lower_href.contains("onisep") || label.contains("onisep") {
            onisep = Some(href.to_string());
        }
        if lower_href.contains("catalogue")
            || label.contains("catalogue")
            || lower_href.contains("formations.u-")
        {
            catalogue = Some(href.to_string());
        }
    }

    (onisep, catalogue)
}

pub fn canonical_url(doc: &Html) -> Option<String> {
    doc.select(&LINK)
        .find(|el| {
            el.value()
                .attr("rel")
                .map_or(false, |rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
        })
        .and_then(|el| el.value().attr("href"))
        .and_then(non_empty)
}

fn page_lang(doc: &Html) -> Option<String> {
    doc.select(&HTML_LANG)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .and_then(non_empty)
        .or_else(|| {
            doc.select(&META_HTTP_EQUIV)
                .find(|el| {
                    el.value()
                        .attr("http-equiv")
                        .map_or(false, |v| v.eq_ignore_ascii_case("content-language"))
                })
                .and_then(|el| el.value().attr("content"))
                .and_then(non_empty)
        })
}
