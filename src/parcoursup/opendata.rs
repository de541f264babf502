use crate::{utils::non_empty, RecordLookup};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::time::Duration;
use tracing::{debug, warn};

pub const OPENDATA_URL: &str = "https://data.enseignementsup-recherche.gouv.fr/api/explore/v2.1/catalog/datasets/fr-esr-cartographie_formations_parcoursup/records";
const TIMEOUT: Duration = Duration::from_secs(20);

/// Program description published by the ministry's open-data portal.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthoritativeRecord {
    pub libelle_formation: Option<String>,
    pub libelle_etablissement: Option<String>,
    pub diplome: Option<String>,
    pub secteur: Option<String>,
    pub academie: Option<String>,
    pub departement: Option<String>,
    pub commune: Option<String>,
    pub code_postal: Option<String>,
    pub uai: Option<String>,
}

fn field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

impl AuthoritativeRecord {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            libelle_formation: field(fields, &["libelle_formation", "libelle_long"]),
            libelle_etablissement: field(fields, &["libelle_etablissement", "etablissement"]),
            diplome: field(fields, &["type_de_formation", "diplome"]),
            secteur: field(fields, &["secteur"]),
            academie: field(fields, &["academie", "nom_academie"]),
            departement: field(fields, &["departement", "nom_departement"]),
            commune: field(fields, &["commune"]),
            code_postal: field(fields, &["code_postal"]),
            uai: field(fields, &["uai"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(AuthoritativeRecord),
    NotFound,
    /// The portal could not be queried; the reason is only logged.
    Unavailable(String),
}

impl Lookup {
    pub fn record(&self) -> Option<&AuthoritativeRecord> {
        match self {
            Lookup::Found(record) => Some(record),
            Lookup::NotFound | Lookup::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordsPage {
    #[serde(default)]
    results: Vec<Map<String, Value>>,
}

impl From<RecordsPage> for Lookup {
    fn from(page: RecordsPage) -> Self {
        match page.results.first() {
            Some(fields) => Lookup::Found(AuthoritativeRecord::from_fields(fields)),
            None => Lookup::NotFound,
        }
    }
}

pub struct OpenDataClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenDataClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn query(&self, key: &str) -> Result<RecordsPage, reqwest::Error> {
        let filter = format!("g_ta_cod={}", key);
        self.client
            .get(&self.endpoint)
            .query(&[
                ("limit", "1"),
                ("where", filter.as_str()),
                ("order_by", "annee DESC"),
            ])
            .timeout(TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json::<RecordsPage>()
            .await
    }
}

#[async_trait::async_trait]
impl RecordLookup for OpenDataClient {
    async fn lookup(&self, key: &str) -> Lookup {
        match self.query(key).await {
            Ok(page) => {
                let lookup = Lookup::from(page);
                if lookup == Lookup::NotFound {
                    debug!("No open-data record for g_ta_cod={}", key);
                }
                lookup
            }
            Err(e) => {
                warn!("Open-data lookup failed for g_ta_cod={}: {}", key, e);
                Lookup::Unavailable(e.to_string())
            }
        }
    }
}
