//! Catalog loading.
//!
//! The catalog is the fixed, ordered list of items a shopper is asked about,
//! each with the largest quantity that may be ordered. It is read once at
//! startup from a two-column table with the headers `Item` and `Number`.
//! Row order is presentation order.

use std::fmt;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};

/// Header of the column holding item names.
pub const ITEM_HEADER: &str = "Item";

/// Header of the column holding maximum quantities.
pub const NUMBER_HEADER: &str = "Number";

/// Worksheet read from spreadsheet catalogs when none is configured.
pub const DEFAULT_SHEET: &str = "Sheet1";

/// A single purchasable item and the largest quantity the picker offers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub max_quantity: u32,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, max_quantity: u32) -> Self {
        Self {
            name: name.into(),
            max_quantity,
        }
    }

    /// Quantities offered for this entry: `1..=max_quantity`.
    pub fn options(&self) -> Vec<u32> {
        (1..=self.max_quantity).collect()
    }

    pub fn allows(&self, quantity: u32) -> bool {
        (1..=self.max_quantity).contains(&quantity)
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Max: {})", self.name, self.max_quantity)
    }
}

/// Immutable, cheaply cloneable catalog in source order.
///
/// Duplicate names are kept; they simply show up twice in the review queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog(Arc<[CatalogEntry]>);

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self(entries.into())
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.0
    }
}

impl Deref for Catalog {
    type Target = [CatalogEntry];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Why a catalog file could not be loaded.
///
/// Row numbers are 1-based and count the header row, so they match what a
/// spreadsheet program shows.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse CSV catalog: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read spreadsheet catalog: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("catalog is missing the `{0}` column")]
    MissingColumn(&'static str),
    #[error("row {row}: item name is empty")]
    EmptyName { row: usize },
    #[error("row {row}: `{value}` is not a positive whole number")]
    InvalidQuantity { row: usize, value: String },
    #[error("unsupported catalog format `{0}` (expected csv, xlsx, xls or ods)")]
    UnsupportedFormat(String),
}

/// Load a catalog, choosing the reader from the file extension.
///
/// `sheet` is only consulted for spreadsheet formats.
pub fn load_catalog(path: &Path, sheet: &str) -> Result<Catalog, CatalogError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv(std::fs::File::open(path)?),
        "xlsx" | "xlsm" | "xls" | "ods" => read_spreadsheet(path, sheet),
        other => Err(CatalogError::UnsupportedFormat(other.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Item")]
    item: String,
    #[serde(rename = "Number")]
    number: String,
}

/// Parse a CSV catalog from any reader.
pub fn read_csv<R: Read>(reader: R) -> Result<Catalog, CatalogError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = reader.headers()?.clone();
    for required in [ITEM_HEADER, NUMBER_HEADER] {
        if !headers.iter().any(|h| h == required) {
            return Err(CatalogError::MissingColumn(required));
        }
    }

    let mut entries = Vec::new();
    for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row = index + 2;
        let record = record?;
        let max_quantity = parse_quantity(&record.number)
            .ok_or_else(|| CatalogError::InvalidQuantity {
                row,
                value: record.number.clone(),
            })?;
        entries.push(entry_for_row(row, record.item, max_quantity)?);
    }

    Ok(Catalog::new(entries))
}

/// Read a catalog from a worksheet of an xlsx/xls/ods workbook.
pub fn read_spreadsheet(path: &Path, sheet: &str) -> Result<Catalog, CatalogError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range(sheet)?;

    let mut rows = range.rows();
    let header = rows.next().ok_or(CatalogError::MissingColumn(ITEM_HEADER))?;
    let column = |name: &'static str| {
        header
            .iter()
            .position(|cell| cell_text(cell).as_deref() == Some(name))
            .ok_or(CatalogError::MissingColumn(name))
    };
    let item_col = column(ITEM_HEADER)?;
    let number_col = column(NUMBER_HEADER)?;

    let mut entries = Vec::new();
    for (index, cells) in rows.enumerate() {
        let row = index + 2;
        let item = cells.get(item_col).unwrap_or(&Data::Empty);
        let number = cells.get(number_col).unwrap_or(&Data::Empty);

        // Trailing blank rows are common in hand-edited sheets.
        if is_blank(item) && is_blank(number) {
            continue;
        }

        let max_quantity =
            cell_quantity(number).ok_or_else(|| CatalogError::InvalidQuantity {
                row,
                value: cell_text(number).unwrap_or_default(),
            })?;
        entries.push(entry_for_row(
            row,
            cell_text(item).unwrap_or_default(),
            max_quantity,
        )?);
    }

    Ok(Catalog::new(entries))
}

fn entry_for_row(
    row: usize,
    name: String,
    max_quantity: u32,
) -> Result<CatalogEntry, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::EmptyName { row });
    }
    Ok(CatalogEntry::new(name, max_quantity))
}

/// Parse a positive whole number, accepting integral decimals such as `2.0`.
fn parse_quantity(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u32>() {
        return (n > 0).then_some(n);
    }
    raw.parse::<f64>().ok().and_then(float_quantity)
}

fn float_quantity(value: f64) -> Option<u32> {
    if value.fract() == 0.0 && value >= 1.0 && value <= f64::from(u32::MAX) {
        Some(value as u32)
    } else {
        None
    }
}

fn cell_quantity(cell: &Data) -> Option<u32> {
    match cell {
        Data::Int(n) => u32::try_from(*n).ok().filter(|n| *n > 0),
        Data::Float(f) => float_quantity(*f),
        Data::String(s) => parse_quantity(s),
        _ => None,
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => Some(s.trim().to_string()),
        Data::Int(n) => Some(n.to_string()),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::Empty => None,
        other => Some(format!("{other:?}")),
    }
}
