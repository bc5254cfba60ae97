use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::biome::{Biome, classify};
use crate::config::PipelineConfig;
use crate::coords::{LatLon, parse_lat_lon};
use crate::entrez::{EntrezClient, unescape_xml};
use crate::error::KiraError;

static ATTRIBUTE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Attribute\b([^>]*)>").expect("attribute tag pattern"));
static ATTRIBUTE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"attribute_name\s*=\s*"([^"]*)""#).expect("attribute name pattern")
});

/// Sample context for one assembly. Every part is optional; a failed lookup
/// yields [`BiosampleMetadata::default`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiosampleMetadata {
    pub location: Option<String>,
    pub biome: Biome,
    pub coordinates: LatLon,
    /// Whether an isolation source or environmental flag was present at all.
    pub has_biome_description: bool,
}

impl Default for BiosampleMetadata {
    fn default() -> Self {
        Self {
            location: None,
            biome: Biome::Unknown,
            coordinates: LatLon::unavailable(),
            has_biome_description: false,
        }
    }
}

pub trait BiosampleClient: Send + Sync {
    fn fetch(&self, accession: &str) -> BiosampleMetadata;
}

/// Assembly → BioSample lookup via esearch, elink and efetch.
pub struct BiosampleHttpClient {
    entrez: EntrezClient,
}

impl BiosampleHttpClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, KiraError> {
        Ok(Self::with_entrez(EntrezClient::new(config)?))
    }

    pub fn with_entrez(entrez: EntrezClient) -> Self {
        Self { entrez }
    }

    fn try_fetch(&self, accession: &str) -> Result<Option<BiosampleMetadata>, KiraError> {
        let assembly_ids = self
            .entrez
            .esearch("assembly", &format!("{accession}[Assembly Accession]"))?;
        let Some(assembly_uid) = assembly_ids.first() else {
            debug!(accession, "assembly not found in Entrez");
            return Ok(None);
        };
        let biosample_ids = self.entrez.elink("assembly", "biosample", assembly_uid)?;
        let Some(biosample_uid) = biosample_ids.first() else {
            debug!(accession, assembly_uid, "no biosample linked");
            return Ok(None);
        };
        let xml = self.entrez.efetch_xml("biosample", biosample_uid)?;
        Ok(Some(metadata_from_biosample_xml(&xml)))
    }
}

impl BiosampleClient for BiosampleHttpClient {
    fn fetch(&self, accession: &str) -> BiosampleMetadata {
        match self.try_fetch(accession) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => BiosampleMetadata::default(),
            Err(err) => {
                warn!(accession, error = %err, "failed to fetch BioSample");
                BiosampleMetadata::default()
            }
        }
    }
}

/// The four attributes the ledger cares about, by `attribute_name`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BiosampleAttributes {
    pub lat_lon: Option<String>,
    pub environmental_sample: Option<String>,
    pub isolation_source: Option<String>,
    pub geo_loc_name: Option<String>,
}

impl BiosampleAttributes {
    /// Isolation source first, then the environmental-sample flag.
    pub fn biome_description(&self) -> Option<String> {
        self.isolation_source.clone().or_else(|| {
            self.environmental_sample.as_ref().map(|flag| {
                if flag.eq_ignore_ascii_case("true") {
                    "Environmental sample".to_string()
                } else {
                    flag.clone()
                }
            })
        })
    }
}

/// Pulls attributes out of an efetch BioSample document. Names compare
/// case-insensitively; a later duplicate replaces an earlier one.
pub fn extract_attributes(xml: &str) -> BiosampleAttributes {
    let mut attributes = BiosampleAttributes::default();
    for open in ATTRIBUTE_OPEN.captures_iter(xml) {
        let (Some(whole), Some(attrs)) = (open.get(0), open.get(1)) else {
            continue;
        };
        if attrs.as_str().trim_end().ends_with('/') {
            continue;
        }
        let Some(name) = ATTRIBUTE_NAME
            .captures(attrs.as_str())
            .and_then(|caps| caps.get(1))
            .map(|name| name.as_str().to_lowercase())
        else {
            continue;
        };
        let body = &xml[whole.end()..];
        let Some(close) = body.find("</Attribute>") else {
            continue;
        };
        let value = unescape_xml(body[..close].trim());
        let value = (!value.is_empty()).then_some(value);
        match name.as_str() {
            "lat_lon" => attributes.lat_lon = value,
            "environmental_sample" => attributes.environmental_sample = value,
            "isolation_source" => attributes.isolation_source = value,
            "geo_loc_name" => attributes.geo_loc_name = value,
            _ => {}
        }
    }
    attributes
}

pub fn metadata_from_biosample_xml(xml: &str) -> BiosampleMetadata {
    let attributes = extract_attributes(xml);
    let description = attributes.biome_description();
    BiosampleMetadata {
        location: attributes.geo_loc_name.clone(),
        biome: classify(description.as_deref()),
        coordinates: attributes
            .lat_lon
            .as_deref()
            .map(parse_lat_lon)
            .unwrap_or_default(),
        has_biome_description: description.is_some(),
    }
}
