use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::biome::Biome;
use crate::coords::format_coordinate;
use crate::error::KiraError;

/// Literal written to the ledger for any unresolved field.
pub const SENTINEL: &str = "Unknown";

/// Number of columns in a ledger row.
pub const ROW_WIDTH: usize = 18;

/// Number of columns produced by the genome summary pipeline.
pub const SUMMARY_WIDTH: usize = 13;

pub const LEDGER_COLUMNS: [&str; ROW_WIDTH] = [
    "Assembly Accession",
    "Organism Name",
    "Organism Common Name",
    "Organism Tax ID",
    "Lineage",
    "Assembly Level",
    "BioProject Accession",
    "BioSample Accession",
    "GC Percent",
    "Total Sequence Length",
    "Sequencing Technology",
    "Release Date",
    "Collection Date",
    "BioSample Description",
    "Location",
    "BiomeDistribution",
    "Latitude",
    "Longitude",
];

pub fn ledger_header() -> String {
    LEDGER_COLUMNS.join("\t")
}

/// True for the ledger/summary header line, matched on content rather than
/// position.
pub fn is_ledger_header(line: &str) -> bool {
    line.trim_start()
        .to_lowercase()
        .starts_with("assembly accession")
}

/// `Unknown` and blank values both count as unresolved.
pub fn is_unresolved(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == SENTINEL
}

/// Free text made safe for one TSV cell: tabs and line breaks become spaces.
pub fn tsv_field(value: &str) -> String {
    value.replace(['\t', '\r', '\n'], " ")
}

pub fn or_sentinel(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => tsv_field(value),
        _ => SENTINEL.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(KiraError::InvalidAccession(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Positive NCBI taxonomy identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxId(u64);

impl TaxId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(KiraError::InvalidTaxId(value.to_string()));
        }
        match trimmed.parse::<u64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(KiraError::InvalidTaxId(value.to_string())),
        }
    }
}

/// Field groups the healing pass may touch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HealColumn {
    Lineage,
    Location,
    Biome,
    Latlon,
}

impl HealColumn {
    pub const ALL: [HealColumn; 4] = [
        HealColumn::Lineage,
        HealColumn::Location,
        HealColumn::Biome,
        HealColumn::Latlon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealColumn::Lineage => "lineage",
            HealColumn::Location => "location",
            HealColumn::Biome => "biome",
            HealColumn::Latlon => "latlon",
        }
    }

    pub fn needs_biosample(&self) -> bool {
        !matches!(self, HealColumn::Lineage)
    }
}

impl fmt::Display for HealColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of the `datasets | dataformat` summary, fields kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRecord {
    fields: Vec<String>,
}

impl SummaryRecord {
    /// Accepts a tab-split line; `None` when it is narrower than the summary
    /// schema. Columns past the schema width are dropped.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Option<Self> {
        if fields.len() < SUMMARY_WIDTH {
            return None;
        }
        Some(Self {
            fields: fields[..SUMMARY_WIDTH]
                .iter()
                .map(|field| field.as_ref().to_string())
                .collect(),
        })
    }

    pub fn accession(&self) -> &str {
        &self.fields[0]
    }

    pub fn tax_id(&self) -> Option<TaxId> {
        self.fields[3].parse().ok()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// A fully assembled ledger row ready to be appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub summary: SummaryRecord,
    pub lineage: Option<String>,
    pub location: Option<String>,
    pub biome: Biome,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Row {
    pub fn accession(&self) -> &str {
        self.summary.accession()
    }

    pub fn to_tsv_line(&self) -> String {
        let summary = self.summary.fields();
        let mut columns: Vec<String> = Vec::with_capacity(ROW_WIDTH);
        columns.extend(summary[..4].iter().map(|field| tsv_field(field)));
        columns.push(or_sentinel(self.lineage.as_deref()));
        columns.extend(summary[4..].iter().map(|field| tsv_field(field)));
        columns.push(or_sentinel(self.location.as_deref()));
        columns.push(self.biome.to_string());
        columns.push(coordinate_or_sentinel(self.latitude));
        columns.push(coordinate_or_sentinel(self.longitude));
        columns.join("\t")
    }
}

fn coordinate_or_sentinel(value: Option<f64>) -> String {
    value
        .map(format_coordinate)
        .unwrap_or_else(|| SENTINEL.to_string())
}

/// Enrichment columns addressed inside an existing ledger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerColumn {
    TaxId,
    Lineage,
    Location,
    Biome,
    Latitude,
    Longitude,
}

/// A ledger line split into its columns. Enrichment columns are located from
/// the end of the line so rows carrying extra trailing summary columns keep
/// their layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    fields: Vec<String>,
}

impl LedgerRecord {
    /// `None` for lines narrower than the ledger schema.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<String> = line
            .trim_end_matches(['\n', '\r'])
            .split('\t')
            .map(str::to_string)
            .collect();
        if fields.len() < ROW_WIDTH {
            return None;
        }
        Some(Self { fields })
    }

    fn index(&self, column: LedgerColumn) -> usize {
        let len = self.fields.len();
        match column {
            LedgerColumn::TaxId => 3,
            LedgerColumn::Lineage => 4,
            LedgerColumn::Location => len - 4,
            LedgerColumn::Biome => len - 3,
            LedgerColumn::Latitude => len - 2,
            LedgerColumn::Longitude => len - 1,
        }
    }

    pub fn accession(&self) -> &str {
        self.fields[0].trim()
    }

    pub fn get(&self, column: LedgerColumn) -> &str {
        &self.fields[self.index(column)]
    }

    pub fn set(&mut self, column: LedgerColumn, value: String) {
        let idx = self.index(column);
        self.fields[idx] = tsv_field(&value);
    }

    pub fn is_unresolved(&self, column: LedgerColumn) -> bool {
        is_unresolved(self.get(column))
    }

    pub fn tax_id(&self) -> Option<TaxId> {
        self.get(LedgerColumn::TaxId).parse().ok()
    }

    pub fn column_unresolved(&self, column: HealColumn) -> bool {
        match column {
            HealColumn::Lineage => self.is_unresolved(LedgerColumn::Lineage),
            HealColumn::Location => self.is_unresolved(LedgerColumn::Location),
            HealColumn::Biome => self.is_unresolved(LedgerColumn::Biome),
            HealColumn::Latlon => {
                self.is_unresolved(LedgerColumn::Latitude)
                    || self.is_unresolved(LedgerColumn::Longitude)
            }
        }
    }

    /// Biome, latitude and longitude all resolved.
    pub fn is_geolocated(&self) -> bool {
        !self.is_unresolved(LedgerColumn::Biome)
            && !self.is_unresolved(LedgerColumn::Latitude)
            && !self.is_unresolved(LedgerColumn::Longitude)
    }

    pub fn to_tsv_line(&self) -> String {
        self.fields.join("\t")
    }
}
