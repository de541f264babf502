use crate::{
    parcoursup::{FormationPage, Lookup},
    utils::{get_now, non_empty},
};
use serde::Serialize;

/// Bumped whenever [`COLUMNS`] changes; resuming onto another layout is refused.
pub const SCHEMA_VERSION: u32 = 2;

pub const COLUMNS: [&str; 36] = [
    "source_url",
    "g_ta_cod",
    "libelle_formation",
    "libelle_etablissement",
    "diplome",
    "secteur",
    "academie",
    "departement",
    "commune",
    "code_postal",
    "uai",
    "titre_bloc",
    "places",
    "voeux_confirmes",
    "candidats_postules",
    "propositions",
    "integres",
    "frais_annee",
    "frais_boursiers",
    "lv1",
    "lv2",
    "niveau_francais",
    "onisep_url",
    "catalogue_url",
    "canonical_url",
    "emails_contact",
    "criteres_analyse",
    "chiffres_acces",
    "poursuites_etudes",
    "debouches",
    "contacter_etablissement",
    "final_url",
    "page_lang",
    "http_status",
    "error",
    "harvested_at",
];

/// One output line. Field order is the column order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub source_url: String,
    pub g_ta_cod: Option<String>,
    pub libelle_formation: Option<String>,
    pub libelle_etablissement: Option<String>,
    pub diplome: Option<String>,
    pub secteur: Option<String>,
    pub academie: Option<String>,
    pub departement: Option<String>,
    pub commune: Option<String>,
    pub code_postal: Option<String>,
    pub uai: Option<String>,
    pub titre_bloc: Option<String>,
    pub places: Option<u64>,
    pub voeux_confirmes: Option<u64>,
    pub candidats_postules: Option<u64>,
    pub propositions: Option<u64>,
    pub integres: Option<u64>,
    pub frais_annee: Option<String>,
    pub frais_boursiers: Option<String>,
    pub lv1: Option<String>,
    pub lv2: Option<String>,
    pub niveau_francais: Option<String>,
    pub onisep_url: Option<String>,
    pub catalogue_url: Option<String>,
    pub canonical_url: Option<String>,
    pub emails_contact: Option<String>,
    pub criteres_analyse: Option<String>,
    pub chiffres_acces: Option<String>,
    pub poursuites_etudes: Option<String>,
    pub debouches: Option<String>,
    pub contacter_etablissement: Option<String>,
    pub final_url: Option<String>,
    pub page_lang: Option<String>,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub harvested_at: String,
}

/// Authoritative value when it is non-blank, the extracted one otherwise.
pub fn prefer(authoritative: Option<&String>, extracted: Option<&String>) -> Option<String> {
    authoritative
        .and_then(non_empty)
        .or_else(|| extracted.and_then(non_empty))
}

/// Builds the row of `source_url` from both sources. Fetch metadata
/// (`final_url`, `http_status`, `error`) is left to the caller.
pub fn merge(
    source_url: &str,
    key: Option<&str>,
    lookup: &Lookup,
    page: &FormationPage,
) -> OutputRow {
    let record = lookup.record().cloned().unwrap_or_default();

    OutputRow {
        source_url: source_url.to_string(),
        g_ta_cod: key.and_then(non_empty),
        libelle_formation: prefer(record.libelle_formation.as_ref(), page.heading.as_ref()),
        libelle_etablissement: record.libelle_etablissement,
        diplome: record.diplome,
        secteur: record.secteur,
        academie: record.academie,
        departement: record.departement,
        commune: record.commune,
        code_postal: record.code_postal,
        uai: record.uai,
        titre_bloc: page.title.clone(),
        places: page.places,
        voeux_confirmes: page.confirmed_wishes,
        candidats_postules: page.applicants,
        propositions: page.offers,
        integres: page.enrolled,
        frais_annee: page.annual_fee.clone(),
        frais_boursiers: page.scholarship_fee.clone(),
        lv1: page.lv1.clone(),
        lv2: page.lv2.clone(),
        niveau_francais: page.french_level.clone(),
        onisep_url: page.onisep_url.clone(),
        catalogue_url: page.catalogue_url.clone(),
        canonical_url: page.canonical_url.clone(),
        emails_contact: non_empty(page.emails.join(";")),
        criteres_analyse: page.criteria.clone(),
        chiffres_acces: page.access_figures.clone(),
        poursuites_etudes: page.further_studies.clone(),
        debouches: page.outcomes.clone(),
        contacter_etablissement: page.contacts.clone(),
        final_url: None,
        page_lang: page.lang.clone(),
        http_status: None,
        error: None,
        harvested_at: get_now(),
    }
}
