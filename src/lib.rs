use parcoursup::{record_key, FormationPage, Lookup};
use record::{merge, OutputRow};
use scraper::Html;
use tokio::time::Duration;
use tracing::{debug, info, instrument, warn};

pub mod error;
pub mod input;
pub mod net;
pub mod parcoursup;
pub mod record;
pub mod section;

mod data;
mod utils;

pub use data::OutputTable;
pub use error::{FetchError, HarvestError};

const PROGRESS_EVERY: usize = 25;
const BLOCKED_BY_ROBOTS: &str = "Blocked by robots.txt";

/// A successfully fetched HTML page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub final_url: String,
    pub body: String,
}

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

#[async_trait::async_trait]
pub trait RecordLookup: Send + Sync {
    /// Never fails: problems on the remote side become [`Lookup::Unavailable`].
    async fn lookup(&self, key: &str) -> Lookup;
}

#[async_trait::async_trait]
pub trait Politeness: Send {
    async fn is_allowed(&mut self, url: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Parsed,
    Blocked,
    HttpError,
    NetworkError,
    ParseError,
}

impl From<&FetchError> for Outcome {
    fn from(e: &FetchError) -> Self {
        match e {
            FetchError::Timeout | FetchError::Network(_) => Outcome::NetworkError,
            FetchError::Status(_) | FetchError::NotHtml { .. } => Outcome::HttpError,
            FetchError::Parse { .. } => Outcome::ParseError,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub total: usize,
    pub skipped: usize,
    pub parsed: usize,
    pub blocked: usize,
    pub http_errors: usize,
    pub network_errors: usize,
    pub parse_errors: usize,
}

impl HarvestStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Parsed => self.parsed += 1,
            Outcome::Blocked => self.blocked += 1,
            Outcome::HttpError => self.http_errors += 1,
            Outcome::NetworkError => self.network_errors += 1,
            Outcome::ParseError => self.parse_errors += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.parsed + self.blocked + self.http_errors + self.network_errors + self.parse_errors
    }
}

/// Sequential harvest loop: one URL is resolved, fetched and written before
/// the next one starts.
pub struct Harvester<F, L, P> {
    fetcher: F,
    lookup: L,
    politeness: P,
    delay: Duration,
}

impl<F, L, P> Harvester<F, L, P>
where
    F: PageFetcher,
    L: RecordLookup,
    P: Politeness,
{
    pub fn new(fetcher: F, lookup: L, politeness: P, delay: Duration) -> Self {
        Self {
            fetcher,
            lookup,
            politeness,
            delay,
        }
    }

    /// Appends exactly one row per URL not already in `table`. Only output
    /// I/O failures stop the run.
    pub async fn run(
        &mut self,
        urls: &[String],
        table: &mut OutputTable,
    ) -> Result<HarvestStats, HarvestError> {
        let mut stats = HarvestStats {
            total: urls.len(),
            ..Default::default()
        };
        info!("Harvesting {} URL(s)", urls.len());

        for (i, url) in urls.iter().enumerate() {
            if table.is_processed(url) {
                debug!("Skip already processed {}", url);
                stats.skipped += 1;
            } else {
                let (row, outcome) = self.harvest_one(url).await;
                table.append(&row)?;
                stats.record(outcome);

                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
            }

            if (i + 1) % PROGRESS_EVERY == 0 {
                info!(
                    "[{}/{}] parsed: {}, errors: {}, skipped: {}",
                    i + 1,
                    stats.total,
                    stats.parsed,
                    stats.processed() - stats.parsed,
                    stats.skipped
                );
            }
        }

        Ok(stats)
    }

    #[instrument(skip(self))]
    async fn harvest_one(&mut self, url: &str) -> (OutputRow, Outcome) {
        let key = record_key(url);
        let lookup = match key.as_deref() {
            Some(key) => self.lookup.lookup(key).await,
            None => {
                debug!("No g_ta_cod in URL");
                Lookup::NotFound
            }
        };

        if !self.politeness.is_allowed(url).await {
            warn!("{}", BLOCKED_BY_ROBOTS);
            let mut row = merge(url, key.as_deref(), &lookup, &FormationPage::default());
            row.error = Some(BLOCKED_BY_ROBOTS.to_string());
            return (row, Outcome::Blocked);
        }

        match self.fetcher.fetch(url).await {
            Ok(page) => {
                let fields = {
                    let doc = Html::parse_document(&page.body);
                    parcoursup::extract(&doc)
                };
                let mut row = merge(url, key.as_deref(), &lookup, &fields);
                row.final_url = Some(page.final_url);
                row.http_status = Some(page.status);
                (row, Outcome::Parsed)
            }
            Err(e) => {
                warn!("{}", e);
                let mut row = merge(url, key.as_deref(), &lookup, &FormationPage::default());
                row.http_status = e.status();
                row.error = Some(e.to_string());
                (row, Outcome::from(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parcoursup::AuthoritativeRecord;
    use pretty_assertions::assert_eq;
    use std::{
        collections::HashMap,
        fs,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    const PAGE: &str = r#"<html lang="fr"><head><title>Fiche</title></head><body>
        <h1>Licence - Droit</h1><p>120 places en 2025</p>
        <h2>Connaître les débouchés</h2><p>Avocat.</p>
        </body></html>"#;

    struct StaticFetcher {
        pages: HashMap<String, Result<FetchedPage, FetchError>>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticFetcher {
        fn new(pages: Vec<(&str, Result<FetchedPage, FetchError>)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(url, page)| (url.to_string(), page))
                    .collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Status(404)))
        }
    }

    struct StaticLookup(HashMap<String, AuthoritativeRecord>);

    #[async_trait::async_trait]
    impl RecordLookup for StaticLookup {
        async fn lookup(&self, key: &str) -> Lookup {
            match self.0.get(key) {
                Some(record) => Lookup::Found(record.clone()),
                None => Lookup::NotFound,
            }
        }
    }

    struct Deny(&'static str);

    #[async_trait::async_trait]
    impl Politeness for Deny {
        async fn is_allowed(&mut self, url: &str) -> bool {
            !url.contains(self.0)
        }
    }

    fn ok_page(url: &str) -> Result<FetchedPage, FetchError> {
        Ok(FetchedPage {
            status: 200,
            final_url: url.to_string(),
            body: PAGE.to_string(),
        })
    }

    fn read_rows(path: &std::path::Path) -> Vec<HashMap<String, String>> {
        let mut reader = csv::Reader::from_path(path).expect("open output");
        reader
            .deserialize::<HashMap<String, String>>()
            .map(|r| r.expect("row"))
            .collect()
    }

    fn harvester(
        fetcher: StaticFetcher,
        records: Vec<(&str, AuthoritativeRecord)>,
    ) -> Harvester<StaticFetcher, StaticLookup, Deny> {
        let lookup = StaticLookup(
            records
                .into_iter()
                .map(|(k, r)| (k.to_string(), r))
                .collect(),
        );
        Harvester::new(fetcher, lookup, Deny("/private/"), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_the_run() {
        let urls = vec![
            "https://x/fiche?g_ta_cod=1".to_string(),
            "https://x/fiche?g_ta_cod=2".to_string(),
            "https://x/fiche?g_ta_cod=3".to_string(),
            "https://x/fiche?g_ta_cod=4".to_string(),
        ];
        let fetcher = StaticFetcher::new(vec![
            (urls[0].as_str(), Err(FetchError::Timeout)),
            (urls[1].as_str(), Err(FetchError::Status(500))),
            (
                urls[2].as_str(),
                Err(FetchError::NotHtml {
                    status: 200,
                    content_type: "application/pdf".to_string(),
                }),
            ),
            (urls[3].as_str(), ok_page(&urls[3])),
        ]);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let mut table = OutputTable::open(&path, false).expect("open");

        let stats = harvester(fetcher, vec![])
            .run(&urls, &mut table)
            .await
            .expect("run");

        assert_eq!(
            stats,
            HarvestStats {
                total: 4,
                parsed: 1,
                http_errors: 2,
                network_errors: 1,
                ..Default::default()
            }
        );

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["error"], "Timeout");
        assert_eq!(rows[0]["http_status"], "");
        assert_eq!(rows[1]["error"], "HTTP 500");
        assert_eq!(rows[1]["http_status"], "500");
        assert_eq!(rows[2]["error"], "Non-HTML content type: application/pdf");
        for row in &rows[..3] {
            assert_eq!(row["places"], "");
            assert_eq!(row["debouches"], "");
            assert_eq!(row["titre_bloc"], "");
        }
        assert_eq!(rows[3]["error"], "");
        assert_eq!(rows[3]["places"], "120");
        assert_eq!(rows[3]["debouches"], "Avocat.");
        assert_eq!(rows[3]["libelle_formation"], "Licence - Droit");
        assert_eq!(rows[3]["g_ta_cod"], "4");
    }

    #[tokio::test]
    async fn test_resume_does_not_duplicate_rows() {
        let urls = (1..=4)
            .map(|i| format!("https://x/fiche?g_ta_cod={}", i))
            .collect::<Vec<_>>();
        let pages = || {
            StaticFetcher::new(urls.iter().map(|u| (u.as_str(), ok_page(u))).collect())
        };

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");

        {
            let mut table = OutputTable::open(&path, false).expect("open");
            harvester(pages(), vec![])
                .run(&urls[..2], &mut table)
                .await
                .expect("first run");
        }

        let fetcher = pages();
        let calls = fetcher.calls.clone();
        let mut table = OutputTable::open(&path, true).expect("reopen");
        let stats = harvester(fetcher, vec![])
            .run(&urls, &mut table)
            .await
            .expect("second run");

        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.parsed, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let sources = read_rows(&path)
            .into_iter()
            .map(|row| row["source_url"].clone())
            .collect::<Vec<_>>();
        assert_eq!(sources, urls);
    }

    #[tokio::test]
    async fn test_blocked_url_is_not_fetched() {
        let url = "https://x/private/fiche?g_ta_cod=9".to_string();
        let fetcher = StaticFetcher::new(vec![(url.as_str(), ok_page(&url))]);
        let calls = fetcher.calls.clone();
        let record = AuthoritativeRecord {
            libelle_etablissement: Some("Université de Nantes".to_string()),
            ..Default::default()
        };

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let mut table = OutputTable::open(&path, false).expect("open");
        let stats = harvester(fetcher, vec![("9", record)])
            .run(&[url], &mut table)
            .await
            .expect("run");

        assert_eq!(stats.blocked, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let rows = read_rows(&path);
        assert_eq!(rows[0]["error"], "Blocked by robots.txt");
        assert_eq!(rows[0]["libelle_etablissement"], "Université de Nantes");
    }

    #[tokio::test]
    async fn test_authoritative_fields_merged_into_parsed_row() {
        let url = "https://x/fiche?g_ta_cod=32522".to_string();
        let html = fs::read_to_string("tests/htmls/formation.html").expect("Invalid file url");
        let fetcher = StaticFetcher::new(vec![(
            url.as_str(),
            Ok(FetchedPage {
                status: 200,
                final_url: "https://x/fiche?g_ta_cod=32522&redirected=1".to_string(),
                body: html,
            }),
        )]);
        let record = AuthoritativeRecord {
            libelle_formation: Some("BUT - Informatique (open data)".to_string()),
            academie: Some("Rennes".to_string()),
            ..Default::default()
        };

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let mut table = OutputTable::open(&path, false).expect("open");
        harvester(fetcher, vec![("32522", record)])
            .run(&[url], &mut table)
            .await
            .expect("run");

        let rows = read_rows(&path);
        assert_eq!(rows[0]["libelle_formation"], "BUT - Informatique (open data)");
        assert_eq!(rows[0]["academie"], "Rennes");
        assert_eq!(rows[0]["titre_bloc"], "Parcoursup - BUT Informatique - IUT de Lannion");
        assert_eq!(
            rows[0]["emails_contact"],
            "direction.etudes@iut-lannion.fr;scolarite-info@iut-lannion.fr"
        );
        assert_eq!(rows[0]["final_url"], "https://x/fiche?g_ta_cod=32522&redirected=1");
        assert_eq!(rows[0]["http_status"], "200");
        assert_eq!(rows[0]["page_lang"], "fr");
    }
}
