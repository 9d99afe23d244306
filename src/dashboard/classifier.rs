use serde::{Deserialize, Serialize};

use crate::config::thresholds_for;
use crate::normalizer::normalize_parameter;

// ---------------------------------------------------------------------------
// Five-band air quality index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexQuality {
    #[serde(rename = "BOA")]
    Boa,
    #[serde(rename = "MODERADA")]
    Moderada,
    #[serde(rename = "RUIM")]
    Ruim,
    #[serde(rename = "MUITO RUIM")]
    MuitoRuim,
    #[serde(rename = "PÉSSIMA")]
    Pessima,
    /// No index result for the day.
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl std::fmt::Display for IndexQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexQuality::Boa => "BOA",
            IndexQuality::Moderada => "MODERADA",
            IndexQuality::Ruim => "RUIM",
            IndexQuality::MuitoRuim => "MUITO RUIM",
            IndexQuality::Pessima => "PÉSSIMA",
            IndexQuality::NotAvailable => "N/A",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexColor {
    Green,
    Yellow,
    Orange,
    Red,
    Purple,
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexBand {
    pub quality: IndexQuality,
    pub color: IndexColor,
}

/// Five-band classification used by the station dashboard. Bounds are
/// inclusive upper limits.
pub fn classify_index(value: i32) -> IndexBand {
    use crate::config::index_bands::*;
    let (quality, color) = if value <= BOA_MAX {
        (IndexQuality::Boa, IndexColor::Green)
    } else if value <= MODERADA_MAX {
        (IndexQuality::Moderada, IndexColor::Yellow)
    } else if value <= RUIM_MAX {
        (IndexQuality::Ruim, IndexColor::Orange)
    } else if value <= MUITO_RUIM_MAX {
        (IndexQuality::MuitoRuim, IndexColor::Red)
    } else {
        (IndexQuality::Pessima, IndexColor::Purple)
    };
    IndexBand { quality, color }
}

// ---------------------------------------------------------------------------
// Three-band index level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexLevel {
    Good,
    Moderate,
    Critical,
}

/// Coarse three-band level for summary views. Not interchangeable with
/// `classify_index`: everything above 100 is already critical here.
pub fn classify_index_level(value: i32) -> IndexLevel {
    use crate::config::index_levels::*;
    if value <= GOOD_MAX {
        IndexLevel::Good
    } else if value <= MODERATE_MAX {
        IndexLevel::Moderate
    } else {
        IndexLevel::Critical
    }
}

// ---------------------------------------------------------------------------
// Per-parameter alert status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterStatus {
    Normal,
    Alert,
    Critical,
}

impl std::fmt::Display for ParameterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterStatus::Normal => write!(f, "normal"),
            ParameterStatus::Alert => write!(f, "alert"),
            ParameterStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Alert status of a measured value. Parameters without thresholds are
/// always normal.
pub fn classify_parameter(parameter: &str, value: f64) -> ParameterStatus {
    let Some((alert, critical)) = thresholds_for(&normalize_parameter(parameter)) else {
        return ParameterStatus::Normal;
    };
    if value >= critical {
        ParameterStatus::Critical
    } else if value >= alert {
        ParameterStatus::Alert
    } else {
        ParameterStatus::Normal
    }
}
