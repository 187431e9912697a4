//! Static hardware profiles.
//!
//! Profiles are compile-time constants looked up by case-insensitive model
//! name. Unknown or empty names resolve to [`DEFAULT_MODEL`].

use serde::Serialize;
use tracing::info;

/// Model used when none is requested or the requested one is unknown.
pub const DEFAULT_MODEL: &str = "minikit2";

/// Physical characteristics of one plotter model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceProfile {
    /// Model identifier.
    pub model_id: &'static str,
    /// Usable paper width (mm).
    pub paper_w_mm: f64,
    /// Usable paper height (mm).
    pub paper_h_mm: f64,
    /// Nominal travel speed (mm/s).
    pub speed_mm_s: f64,
    /// Nominal acceleration (mm/s²).
    pub accel_mm_s2: f64,
    /// Linear distance to motor steps conversion.
    pub steps_per_mm: f64,
}

/// Known models.
pub static PROFILES: &[DeviceProfile] = &[
    DeviceProfile {
        model_id: "minikit2",
        paper_w_mm: 160.0,
        paper_h_mm: 101.0,
        speed_mm_s: 254.0,
        accel_mm_s2: 200.0,
        steps_per_mm: 80.0,
    },
    DeviceProfile {
        model_id: "axidraw_v3",
        paper_w_mm: 300.0,
        paper_h_mm: 218.0,
        speed_mm_s: 381.0,
        accel_mm_s2: 250.0,
        steps_per_mm: 80.0,
    },
];

/// Exact (case-insensitive) lookup.
pub fn find_profile(model: &str) -> Option<&'static DeviceProfile> {
    if model.is_empty() {
        return None;
    }
    PROFILES
        .iter()
        .find(|p| p.model_id.eq_ignore_ascii_case(model))
}

/// Profile of [`DEFAULT_MODEL`].
pub fn default_profile() -> &'static DeviceProfile {
    find_profile(DEFAULT_MODEL).unwrap_or(&PROFILES[0])
}

/// Lookup with fallback to the default profile.
pub fn profile_for_model(model: Option<&str>) -> &'static DeviceProfile {
    match model {
        Some(name) if !name.is_empty() => find_profile(name).unwrap_or_else(|| {
            let fallback = default_profile();
            info!(
                "Unknown device model '{name}', using '{}'",
                fallback.model_id
            );
            fallback
        }),
        _ => default_profile(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let p = find_profile("AxiDraw_V3").unwrap();
        assert_eq!(p.model_id, "axidraw_v3");
        assert_eq!(p.paper_w_mm, 300.0);
        assert_eq!(p.speed_mm_s, 381.0);
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        assert_eq!(profile_for_model(Some("plotter9000")).model_id, DEFAULT_MODEL);
        assert_eq!(profile_for_model(Some("")).model_id, DEFAULT_MODEL);
        assert_eq!(profile_for_model(None).model_id, DEFAULT_MODEL);
        assert!(find_profile("").is_none());
    }

    #[test]
    fn every_profile_has_positive_steps_per_mm() {
        for p in PROFILES {
            assert!(p.steps_per_mm > 0.0, "{}", p.model_id);
            assert!(p.speed_mm_s > 0.0 && p.accel_mm_s2 > 0.0);
        }
    }
}
