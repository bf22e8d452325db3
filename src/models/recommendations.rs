//! Clinical recommendation lookup keyed by (risk type, risk level)

use crate::error::{EngineError, EngineResult};
use crate::types::prediction::{RiskLevel, RiskType};

/// Guidance texts shipped with the engine
pub const STANDARD_RECOMMENDATIONS: [(RiskType, RiskLevel, &str); 12] = [
    (
        RiskType::Sepsis,
        RiskLevel::High,
        "URGENT: Immediate evaluation. Intensive monitoring of vital signs and infection markers. Consider prophylactic antibiotics.",
    ),
    (
        RiskType::Sepsis,
        RiskLevel::Moderate,
        "Close surveillance for signs of infection. Temperature check every 4 hours. Educate on warning signs.",
    ),
    (
        RiskType::Sepsis,
        RiskLevel::Low,
        "Standard follow-up. Adequate hygiene. Educate on signs of infection.",
    ),
    (
        RiskType::Sepsis,
        RiskLevel::VeryLow,
        "Routine prenatal follow-up. Standard preventive measures.",
    ),
    (
        RiskType::GestationalHypertension,
        RiskLevel::High,
        "URGENT: Continuous blood pressure monitoring. Evaluate for preeclampsia. Possible hospitalization. Check urine protein.",
    ),
    (
        RiskType::GestationalHypertension,
        RiskLevel::Moderate,
        "Frequent blood pressure monitoring (every 2-3 days). Check for edema. Restrict salt. Educate on warning signs.",
    ),
    (
        RiskType::GestationalHypertension,
        RiskLevel::Low,
        "Regular prenatal care with blood pressure monitoring. Balanced low-sodium diet.",
    ),
    (
        RiskType::GestationalHypertension,
        RiskLevel::VeryLow,
        "Standard prenatal follow-up. Maintain a healthy lifestyle.",
    ),
    (
        RiskType::PostpartumHemorrhage,
        RiskLevel::High,
        "URGENT: Plan delivery at a facility with a blood bank. Uterotonics available. Surgical team on alert.",
    ),
    (
        RiskType::PostpartumHemorrhage,
        RiskLevel::Moderate,
        "Hospital delivery. Blood products available. Close monitoring of the third stage of labor and the immediate postpartum period.",
    ),
    (
        RiskType::PostpartumHemorrhage,
        RiskLevel::Low,
        "Standard follow-up. Ensure active management of the third stage of labor. Postpartum monitoring.",
    ),
    (
        RiskType::PostpartumHemorrhage,
        RiskLevel::VeryLow,
        "Routine prenatal follow-up. Delivery with active management of the third stage of labor.",
    ),
];

/// Complete (risk type, risk level) -> recommendation table.
///
/// Completeness is checked when the table is built, so lookups cannot fail.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationTable {
    entries: [[String; 4]; 3],
}

impl RecommendationTable {
    /// The shipped guidance texts
    pub fn standard() -> EngineResult<Self> {
        Self::from_entries(STANDARD_RECOMMENDATIONS)
    }

    /// Build a table from entries; every combination must be covered.
    /// A repeated combination keeps its last text.
    pub fn from_entries<I, S>(entries: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (RiskType, RiskLevel, S)>,
        S: Into<String>,
    {
        let mut slots: [[Option<String>; 4]; 3] = Default::default();
        for (risk_type, level, text) in entries {
            slots[risk_type.index()][level.index()] = Some(text.into());
        }

        let mut table: [[String; 4]; 3] = Default::default();
        for risk_type in RiskType::ALL {
            for level in RiskLevel::ALL {
                let text = slots[risk_type.index()][level.index()]
                    .take()
                    .ok_or(EngineError::RecommendationMissing { risk_type, level })?;
                table[risk_type.index()][level.index()] = text;
            }
        }

        Ok(Self { entries: table })
    }

    pub fn lookup(&self, risk_type: RiskType, level: RiskLevel) -> &str {
        &self.entries[risk_type.index()][level.index()]
    }
}
