use std::collections::HashMap;
use std::sync::Mutex;

use tracing::warn;

use crate::config::PipelineConfig;
use crate::domain::TaxId;
use crate::entrez::{EntrezClient, first_element_text};
use crate::error::KiraError;

/// Resolves a taxonomy id to its root-to-taxon ancestry, `; `-separated.
///
/// Implementations never fail: anything that goes wrong is `None`.
pub trait LineageResolver: Send + Sync {
    fn resolve(&self, tax_id: TaxId) -> Option<String>;
}

/// NCBI Taxonomy over E-utilities, memoized per id.
pub struct TaxonomyHttpClient {
    entrez: EntrezClient,
    cache: Mutex<HashMap<TaxId, Option<String>>>,
}

impl TaxonomyHttpClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, KiraError> {
        Ok(Self::with_entrez(EntrezClient::new(config)?))
    }

    pub fn with_entrez(entrez: EntrezClient) -> Self {
        Self {
            entrez,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn fetch_lineage(&self, tax_id: TaxId) -> Result<Option<String>, KiraError> {
        let xml = self.entrez.efetch_xml("taxonomy", &tax_id.to_string())?;
        Ok(lineage_from_taxonomy_xml(&xml))
    }
}

impl LineageResolver for TaxonomyHttpClient {
    fn resolve(&self, tax_id: TaxId) -> Option<String> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&tax_id) {
                return hit.clone();
            }
        }
        let lineage = match self.fetch_lineage(tax_id) {
            Ok(Some(lineage)) => Some(lineage),
            Ok(None) => {
                warn!(%tax_id, "no lineage in taxonomy record");
                None
            }
            Err(err) => {
                warn!(%tax_id, error = %err, "failed to get lineage");
                // transient failures are not cached so a later row can retry
                return None;
            }
        };
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(tax_id, lineage.clone());
        }
        lineage
    }
}

/// Builds `root; <Lineage>; <ScientificName>` from an efetch taxonomy record.
pub fn lineage_from_taxonomy_xml(xml: &str) -> Option<String> {
    let taxon_start = xml.find("<Taxon>")?;
    let taxon = &xml[taxon_start..];
    let name = first_element_text(taxon, "ScientificName")?;
    let lineage = first_element_text(taxon, "Lineage").unwrap_or_default();

    let mut parts = vec!["root".to_string()];
    parts.extend(
        lineage
            .split(';')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string),
    );
    if parts.last() != Some(&name) {
        parts.push(name);
    }
    Some(parts.join("; "))
}
