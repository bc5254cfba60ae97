use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse environment buckets derived from BioSample free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    Terrestrial,
    Marine,
    Freshwater,
    Wastewater,
    HostAssociated,
    ExtremeHypersaline,
    ExtremeThermal,
    ExtremeAcidicAlkaline,
    Reef,
    EnvironmentalSample,
    Other,
    Unknown,
}

// Order matters: the first group with a matching keyword wins.
const KEYWORD_GROUPS: &[(Biome, &[&str])] = &[
    (Biome::Terrestrial, &["soil", "forest", "desert", "savanna"]),
    (Biome::Marine, &["marine", "sea", "ocean", "coastal"]),
    (Biome::Freshwater, &["lake", "freshwater", "river", "pond"]),
    (Biome::Wastewater, &["waste", "wastewater", "sewage"]),
    (Biome::HostAssociated, &["host", "symbiont", "root", "nodule"]),
    (Biome::ExtremeHypersaline, &["hypersaline"]),
    (Biome::ExtremeThermal, &["hot spring", "thermal"]),
    (Biome::ExtremeAcidicAlkaline, &["acidic", "alkaline"]),
    (Biome::Reef, &["reef", "coral"]),
    (Biome::EnvironmentalSample, &["environmental sample"]),
];

impl Biome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Biome::Terrestrial => "Terrestrial",
            Biome::Marine => "Marine",
            Biome::Freshwater => "Freshwater",
            Biome::Wastewater => "Wastewater",
            Biome::HostAssociated => "Host-Associated",
            Biome::ExtremeHypersaline => "Extreme - Hypersaline",
            Biome::ExtremeThermal => "Extreme - Thermal",
            Biome::ExtremeAcidicAlkaline => "Extreme - Acidic/Alkaline",
            Biome::Reef => "Reef",
            Biome::EnvironmentalSample => "Environmental Sample",
            Biome::Other => "Other",
            Biome::Unknown => "Unknown",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Biome::Unknown)
    }
}

impl fmt::Display for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an environmental description to a [`Biome`].
///
/// A missing or blank description is `Unknown`; text that matches no
/// keyword group is `Other`.
pub fn classify(description: Option<&str>) -> Biome {
    let Some(description) = description else {
        return Biome::Unknown;
    };
    if description.trim().is_empty() {
        return Biome::Unknown;
    }
    let lowered = description.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(biome, _)| *biome)
        .unwrap_or(Biome::Other)
}
