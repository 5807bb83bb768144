//! Groundwater nitrate-leaching risk.
//!
//! Excess soil nitrogen under wet conditions is the main driver of nitrate
//! reaching groundwater.  The thresholds are in ppm soil nitrogen and %
//! volumetric moisture.

use serde::Serialize;

/// Drinking-water reference shown next to every assessment.
pub const GUIDELINE_NOTE: &str = "Guideline: 10 mg/L nitrate-nitrogen (NO3-N) in groundwater";

const HIGH_TIPS: &[&str] = &[
    "Reduce nitrogen application rate immediately",
    "Schedule irrigation in shorter, targeted cycles to minimize leaching",
    "Incorporate cover crops or organic matter to improve retention",
];

const MODERATE_TIPS: &[&str] = &[
    "Split nitrogen applications (spoon feeding)",
    "Irrigate in the early morning/evening to lower evaporation",
    "Monitor forecast: postpone irrigation before heavy rain",
];

const LOW_TIPS: &[&str] = &[
    "Maintain current fertilization plan",
    "Monitor moisture to avoid over-irrigation",
    "Periodic soil testing to validate nitrate levels",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn mitigation_tips(self) -> &'static [&'static str] {
        match self {
            Self::High => HIGH_TIPS,
            Self::Moderate => MODERATE_TIPS,
            Self::Low => LOW_TIPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NitrateRisk {
    pub level: RiskLevel,
    pub mitigation_tips: &'static [&'static str],
    pub guideline_note: &'static str,
}

/// Classify leaching risk from soil nitrogen (ppm) and moisture (%).
pub fn assess(nitrogen: f64, moisture: f64) -> NitrateRisk {
    let level = if (nitrogen >= 100.0 && moisture >= 50.0) || (nitrogen >= 80.0 && moisture >= 70.0)
    {
        RiskLevel::High
    } else if (nitrogen >= 60.0 && moisture >= 45.0) || nitrogen >= 80.0 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    };

    NitrateRisk {
        level,
        mitigation_tips: level.mitigation_tips(),
        guideline_note: GUIDELINE_NOTE,
    }
}
