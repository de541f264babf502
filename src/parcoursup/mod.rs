mod extractor;
pub mod opendata;

pub use extractor::{extract, parse};
pub use opendata::{AuthoritativeRecord, Lookup, OpenDataClient};

use std::fmt;

/// Fields read from a live listing page. Every field may be missing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormationPage {
    pub title: Option<String>,
    pub heading: Option<String>,
    pub lang: Option<String>,
    pub canonical_url: Option<String>,
    pub places: Option<u64>,
    pub confirmed_wishes: Option<u64>,
    pub applicants: Option<u64>,
    pub offers: Option<u64>,
    pub enrolled: Option<u64>,
    pub annual_fee: Option<String>,
    pub scholarship_fee: Option<String>,
    pub lv1: Option<String>,
    pub lv2: Option<String>,
    pub french_level: Option<String>,
    pub onisep_url: Option<String>,
    pub catalogue_url: Option<String>,
    pub emails: Vec<String>,
    pub criteria: Option<String>,
    pub access_figures: Option<String>,
    pub further_studies: Option<String>,
    pub outcomes: Option<String>,
    pub contacts: Option<String>,
}

fn line<T: fmt::Display>(f: &mut fmt::Formatter<'_>, label: &str, value: Option<T>) -> fmt::Result {
    match value {
        Some(v) => writeln!(f, "{:<18}: {}", label, v),
        None => writeln!(f, "{:<18}: None", label),
    }
}

impl fmt::Display for FormationPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        line(f, "Title", self.title.as_ref())?;
        line(f, "Heading", self.heading.as_ref())?;
        line(f, "Lang", self.lang.as_ref())?;
        line(f, "Canonical", self.canonical_url.as_ref())?;
        line(f, "Places", self.places)?;
        line(f, "Confirmed wishes", self.confirmed_wishes)?;
        line(f, "Applicants", self.applicants)?;
        line(f, "Offers", self.offers)?;
        line(f, "Enrolled", self.enrolled)?;
        line(f, "Annual fee", self.annual_fee.as_ref())?;
        line(f, "Scholarship fee", self.scholarship_fee.as_ref())?;
        line(f, "LV1", self.lv1.as_ref())?;
        line(f, "LV2", self.lv2.as_ref())?;
        line(f, "French level", self.french_level.as_ref())?;
        line(f, "Onisep", self.onisep_url.as_ref())?;
        line(f, "Catalogue", self.catalogue_url.as_ref())?;
        writeln!(f, "{:<18}: {}", "Emails", self.emails.join(", "))?;

        for (label, section) in [
            ("Criteria", &self.criteria),
            ("Access figures", &self.access_figures),
            ("Further studies", &self.further_studies),
            ("Outcomes", &self.outcomes),
            ("Contacts", &self.contacts),
        ] {
            writeln!(f, "{}:", label)?;
            writeln!(f, "> {}", section.as_deref().unwrap_or("None"))?;
        }

        Ok(())
    }
}

/// `g_ta_cod` query value of a listing URL. Malformed links sometimes carry
/// the parameter as `g_ta_cod=`, which is accepted too.
pub fn record_key(url: &str) -> Option<String> {
    let url = reqwest::Url::parse(url).ok()?;
    let find = |name: &str| {
        url.query_pairs()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.trim().to_string())
            .find(|v| !v.is_empty())
    };
    find("g_ta_cod").or_else(|| find("g_ta_cod="))
}
