use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;

/// Reference genome selection for the counting stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Mouse,
    Human,
}

impl Species {
    pub const ALL: [Species; 2] = [Species::Mouse, Species::Human];

    /// Name of the cellranger-arc reference package for this species.
    pub fn reference(&self) -> &'static str {
        match self {
            Species::Mouse => "refdata-cellranger-arc-mm10-2020-A-2.0.0",
            Species::Human => "refdata-cellranger-arc-GRCh38-2020-A-2.0.0",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Species::Mouse => "mouse",
            Species::Human => "human",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_mapping() {
        assert_eq!(
            Species::Mouse.reference(),
            "refdata-cellranger-arc-mm10-2020-A-2.0.0"
        );
        assert_eq!(
            Species::Human.reference(),
            "refdata-cellranger-arc-GRCh38-2020-A-2.0.0"
        );
    }

    #[test]
    fn test_value_enum_round_trip() {
        for species in Species::ALL {
            let parsed = Species::from_str(species.name(), true).unwrap();
            assert_eq!(parsed, species);
        }
        assert!(Species::from_str("zebrafish", true).is_err());
    }
}
