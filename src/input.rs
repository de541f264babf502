use crate::{error::HarvestError, utils::non_empty};
use calamine::{open_workbook_auto, Reader};
use itertools::Itertools;
use std::{convert::Infallible, fmt, path::Path, str::FromStr};
use tracing::{debug, info};

/// Worksheet selector: a zero-based index or a sheet name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sheet {
    Index(usize),
    Name(String),
}

impl Default for Sheet {
    fn default() -> Self {
        Sheet::Index(0)
    }
}

impl FromStr for Sheet {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<usize>() {
            Ok(index) => Sheet::Index(index),
            Err(_) => Sheet::Name(s.to_string()),
        })
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sheet::Index(index) => write!(f, "{}", index),
            Sheet::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Reads the distinct, non-blank URLs of `column`, in input order.
///
/// `.csv` files are read directly; anything else goes through the
/// spreadsheet reader. The first row is the header.
pub fn load_urls<P: AsRef<Path>>(
    path: P,
    sheet: &Sheet,
    column: &str,
) -> Result<Vec<String>, HarvestError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(HarvestError::InputNotFound(path.to_path_buf()));
    }

    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
    let rows = if is_csv {
        read_csv(path)?
    } else {
        read_sheet(path, sheet)?
    };

    let mut rows = rows.into_iter();
    let header = rows.next().unwrap_or_default();
    let index = header
        .iter()
        .position(|name| name.trim() == column.trim())
        .ok_or_else(|| HarvestError::MissingColumn {
            column: column.to_string(),
            available: header.iter().map(|name| name.trim().to_string()).collect(),
        })?;

    let urls = rows
        .filter_map(|row| row.get(index).and_then(non_empty))
        .unique()
        .collect::<Vec<_>>();

    if urls.is_empty() {
        return Err(HarvestError::NoUrls);
    }
    info!("Loaded {} URL(s) from {}", urls.len(), path.display());
    Ok(urls)
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, HarvestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = vec![];
    for record in reader.records() {
        rows.push(record?.iter().map(ToString::to_string).collect());
    }
    Ok(rows)
}

fn read_sheet(path: &Path, sheet: &Sheet) -> Result<Vec<Vec<String>>, HarvestError> {
    let mut workbook = open_workbook_auto(path)?;
    debug!("Sheets in {}: {:?}", path.display(), workbook.sheet_names());

    let range = match sheet {
        Sheet::Index(index) => workbook
            .worksheet_range_at(*index)
            .ok_or_else(|| HarvestError::SheetNotFound(sheet.to_string()))??,
        Sheet::Name(name) => {
            if !workbook.sheet_names().iter().any(|n| n == name) {
                return Err(HarvestError::SheetNotFound(name.clone()));
            }
            workbook.worksheet_range(name)?
        }
    };

    Ok(range
        .rows()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect())
}
