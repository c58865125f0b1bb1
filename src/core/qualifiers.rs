//! Hard qualifiers: deterministic pass/fail eligibility rules for a pair.
//!
//! Every qualifier is a pure function of `(config, a, b)`. The chain runs all
//! of them unconditionally and records each one's telemetry and failure in a
//! [`QualifierReport`], so a single report can show several failures at once.

use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::core::distance::{haversine_distance, resolve_radius, RadiusTier};
use crate::models::{Gender, MatchConfig, QualifierEntry, QualifierFailure, QualifierReport, User};

pub const AGE: &str = "age";
pub const DATING_PREFERENCE: &str = "dating_preference";
pub const HEIGHT: &str = "height";
pub const DISTANCE: &str = "distance";

/// Typed hard-qualifier failures; recorded in reports, never propagated
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QualifierError {
    #[error("missing required attributes: {}", .fields.join(", "))]
    MissingAttribute { fields: Vec<String> },

    #[error("male is {gap} years older, limit is {allowed}")]
    MaleExceedsAgeGap { gap: u8, allowed: u8 },

    #[error("female is {gap} years older, limit is {allowed}")]
    FemaleExceedsAgeGap { gap: u8, allowed: u8 },

    #[error("age gap of {gap} years exceeds the same-sex limit of {allowed}")]
    SameSexExceedsAgeGap { gap: u8, allowed: u8 },

    #[error("dating preferences not satisfied for {} user(s)", .rejected_by.len())]
    PreferenceMismatch { rejected_by: Vec<Uuid> },

    #[error("male height {male_cm}cm must be at least {required_cm}cm above female height {female_cm}cm")]
    HeightRequirement { male_cm: u16, female_cm: u16, required_cm: i16 },

    #[error("distance {distance_km:.1}km exceeds the largest radius {max_radius_km:.1}km")]
    OutsideRadius { distance_km: f64, max_radius_km: f64 },
}

impl QualifierError {
    /// Stable machine-readable code stored in reports
    pub fn code(&self) -> &'static str {
        match self {
            QualifierError::MissingAttribute { .. } => "validation.missing_attribute",
            QualifierError::MaleExceedsAgeGap { .. } => "age.male_exceeds",
            QualifierError::FemaleExceedsAgeGap { .. } => "age.female_exceeds",
            QualifierError::SameSexExceedsAgeGap { .. } => "age.same_sex_exceeds",
            QualifierError::PreferenceMismatch { .. } => "dating_preference.mismatch",
            QualifierError::HeightRequirement { .. } => "height.requirement",
            QualifierError::OutsideRadius { .. } => "distance.outside_radius",
        }
    }

    pub fn to_failure(&self) -> QualifierFailure {
        QualifierFailure {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Output of a single qualifier
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub telemetry: serde_json::Value,
    pub error: Option<QualifierError>,
}

impl Evaluation {
    fn pass(telemetry: serde_json::Value) -> Self {
        Self { telemetry, error: None }
    }

    fn fail(telemetry: serde_json::Value, error: QualifierError) -> Self {
        Self {
            telemetry,
            error: Some(error),
        }
    }

    fn missing(fields: Vec<String>) -> Self {
        Self::fail(
            json!({ "missing": fields }),
            QualifierError::MissingAttribute { fields },
        )
    }
}

/// A hard qualifier
pub trait Qualifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, config: &MatchConfig, a: &User, b: &User) -> Evaluation;
}

/// Collect `user.field` labels for every absent attribute
fn missing_fields(checks: &[(&User, &'static str, bool)]) -> Vec<String> {
    checks
        .iter()
        .filter(|(_, _, present)| !present)
        .map(|(user, field, _)| format!("{}.{}", user.id, field))
        .collect()
}

/// Male and female member of a mixed-gender pair, if it is one
fn hetero_roles<'a>(a: &'a User, b: &'a User) -> Option<(&'a User, &'a User)> {
    match (a.gender?, b.gender?) {
        (Gender::Male, Gender::Female) => Some((a, b)),
        (Gender::Female, Gender::Male) => Some((b, a)),
        _ => None,
    }
}

/// Age window by pairing type
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeQualifier;

impl Qualifier for AgeQualifier {
    fn name(&self) -> &'static str {
        AGE
    }

    fn evaluate(&self, config: &MatchConfig, a: &User, b: &User) -> Evaluation {
        let missing = missing_fields(&[
            (a, "age", a.age.is_some()),
            (a, "gender", a.gender.is_some()),
            (b, "age", b.age.is_some()),
            (b, "gender", b.gender.is_some()),
        ]);
        if !missing.is_empty() {
            return Evaluation::missing(missing);
        }

        let (age_a, age_b) = (a.age.unwrap_or_default(), b.age.unwrap_or_default());
        let gap = age_a.abs_diff(age_b);

        if gap == 0 {
            return Evaluation::pass(json!({ "age_a": age_a, "age_b": age_b, "gap": 0 }));
        }

        match hetero_roles(a, b) {
            Some((male, female)) => {
                let male_age = male.age.unwrap_or_default();
                let female_age = female.age.unwrap_or_default();
                let (older, allowed) = if male_age > female_age {
                    ("male", config.age_range_man_older_by)
                } else {
                    ("female", config.age_range_woman_older_by)
                };
                let telemetry = json!({
                    "pairing": "hetero",
                    "age_a": age_a,
                    "age_b": age_b,
                    "gap": gap,
                    "older": older,
                    "allowed_gap": allowed,
                });

                if gap <= allowed {
                    Evaluation::pass(telemetry)
                } else if older == "male" {
                    Evaluation::fail(telemetry, QualifierError::MaleExceedsAgeGap { gap, allowed })
                } else {
                    Evaluation::fail(telemetry, QualifierError::FemaleExceedsAgeGap { gap, allowed })
                }
            }
            None => {
                let allowed = config.age_range_end;
                let telemetry = json!({
                    "pairing": "other",
                    "age_a": age_a,
                    "age_b": age_b,
                    "gap": gap,
                    "allowed_gap": allowed,
                });

                if gap <= allowed {
                    Evaluation::pass(telemetry)
                } else {
                    Evaluation::fail(telemetry, QualifierError::SameSexExceedsAgeGap { gap, allowed })
                }
            }
        }
    }
}

/// Each user must accept the other's gender, checked both ways
#[derive(Debug, Clone, Copy, Default)]
pub struct DatingPreferenceQualifier;

impl Qualifier for DatingPreferenceQualifier {
    fn name(&self) -> &'static str {
        DATING_PREFERENCE
    }

    fn evaluate(&self, _config: &MatchConfig, a: &User, b: &User) -> Evaluation {
        let (gender_a, gender_b) = match (a.gender, b.gender) {
            (Some(ga), Some(gb)) => (ga, gb),
            _ => {
                return Evaluation::missing(missing_fields(&[
                    (a, "gender", a.gender.is_some()),
                    (b, "gender", b.gender.is_some()),
                ]))
            }
        };

        let a_accepts_b = a.accepts(gender_b);
        let b_accepts_a = b.accepts(gender_a);
        let telemetry = json!({
            "a_accepts_b": a_accepts_b,
            "b_accepts_a": b_accepts_a,
        });

        let rejected_by: Vec<Uuid> = [(a_accepts_b, a.id), (b_accepts_a, b.id)]
            .into_iter()
            .filter(|(accepts, _)| !accepts)
            .map(|(_, id)| id)
            .collect();

        if rejected_by.is_empty() {
            Evaluation::pass(telemetry)
        } else {
            Evaluation::fail(telemetry, QualifierError::PreferenceMismatch { rejected_by })
        }
    }
}

/// Male must be taller by the configured margin in mixed-gender pairs
#[derive(Debug, Clone, Copy, Default)]
pub struct HeightQualifier;

impl Qualifier for HeightQualifier {
    fn name(&self) -> &'static str {
        HEIGHT
    }

    fn evaluate(&self, config: &MatchConfig, a: &User, b: &User) -> Evaluation {
        let (gender_a, gender_b) = match (a.gender, b.gender) {
            (Some(ga), Some(gb)) => (ga, gb),
            _ => {
                return Evaluation::missing(missing_fields(&[
                    (a, "gender", a.gender.is_some()),
                    (b, "gender", b.gender.is_some()),
                ]))
            }
        };

        if gender_a == Gender::NonBinary || gender_b == Gender::NonBinary || gender_a == gender_b {
            return Evaluation::pass(json!({ "applies": false }));
        }

        let Some((male, female)) = hetero_roles(a, b) else {
            return Evaluation::pass(json!({ "applies": false }));
        };

        let (male_cm, female_cm) = match (male.height_cm, female.height_cm) {
            (Some(m), Some(f)) => (m, f),
            _ => {
                return Evaluation::missing(missing_fields(&[
                    (male, "height_cm", male.height_cm.is_some()),
                    (female, "height_cm", female.height_cm.is_some()),
                ]))
            }
        };

        let required_cm = config.height_male_greater_by_cm;
        let telemetry = json!({
            "applies": true,
            "male_cm": male_cm,
            "female_cm": female_cm,
            "required_difference_cm": required_cm,
        });

        if i32::from(male_cm) >= i32::from(female_cm) + i32::from(required_cm) {
            Evaluation::pass(telemetry)
        } else {
            Evaluation::fail(
                telemetry,
                QualifierError::HeightRequirement {
                    male_cm,
                    female_cm,
                    required_cm,
                },
            )
        }
    }
}

/// Great-circle distance against the base radius, then each adaptive radius
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceQualifier;

impl Qualifier for DistanceQualifier {
    fn name(&self) -> &'static str {
        DISTANCE
    }

    fn evaluate(&self, config: &MatchConfig, a: &User, b: &User) -> Evaluation {
        let (Some((lat_a, lon_a)), Some((lat_b, lon_b))) = (a.coordinates(), b.coordinates()) else {
            return Evaluation::missing(missing_fields(&[
                (a, "latitude", a.latitude.is_some()),
                (a, "longitude", a.longitude.is_some()),
                (b, "latitude", b.latitude.is_some()),
                (b, "longitude", b.longitude.is_some()),
            ]));
        };

        let distance_km = haversine_distance(lat_a, lon_a, lat_b, lon_b);
        let radii = config.adaptive_radii();

        match resolve_radius(distance_km, config.location_radius_km, &radii) {
            Some(tier) => {
                let tier_index = match tier {
                    RadiusTier::Base(_) => None,
                    RadiusTier::Adaptive(idx, _) => Some(idx),
                };
                Evaluation::pass(json!({
                    "distance_km": distance_km,
                    "base_radius_km": config.location_radius_km,
                    "radius_used_km": tier.radius_km(),
                    "adaptive_tier": tier_index,
                }))
            }
            None => {
                let max_radius_km = radii
                    .last()
                    .copied()
                    .unwrap_or(config.location_radius_km)
                    .max(config.location_radius_km);
                Evaluation::fail(
                    json!({
                        "distance_km": distance_km,
                        "base_radius_km": config.location_radius_km,
                        "adaptive_radii_km": radii,
                    }),
                    QualifierError::OutsideRadius {
                        distance_km,
                        max_radius_km,
                    },
                )
            }
        }
    }
}

/// Ordered set of qualifiers run against every pair
pub struct QualifierChain {
    qualifiers: Vec<Box<dyn Qualifier>>,
}

impl QualifierChain {
    pub fn empty() -> Self {
        Self { qualifiers: Vec::new() }
    }

    /// Age, dating preference, height and distance
    pub fn standard() -> Self {
        Self::empty()
            .with(AgeQualifier)
            .with(DatingPreferenceQualifier)
            .with(HeightQualifier)
            .with(DistanceQualifier)
    }

    pub fn with<Q: Qualifier + 'static>(mut self, qualifier: Q) -> Self {
        self.qualifiers.push(Box::new(qualifier));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.qualifiers.iter().map(|q| q.name()).collect()
    }

    /// Run every qualifier; failures never stop the chain
    pub fn run(&self, config: &MatchConfig, a: &User, b: &User) -> QualifierReport {
        let mut report = QualifierReport::new(config.version);

        for qualifier in &self.qualifiers {
            let evaluation = qualifier.evaluate(config, a, b);
            if let Some(err) = &evaluation.error {
                tracing::trace!("Qualifier {} failed for {} / {}: {}", qualifier.name(), a.id, b.id, err);
            }
            report.insert(QualifierEntry {
                name: qualifier.name().to_string(),
                telemetry: evaluation.telemetry,
                error: evaluation.error.as_ref().map(QualifierError::to_failure),
            });
        }

        report
    }
}

impl Default for QualifierChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for QualifierChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualifierChain")
            .field("qualifiers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> MatchConfig {
        MatchConfig {
            id: Uuid::new_v4(),
            version: 1,
            is_active: true,
            age_range_end: 8,
            age_range_man_older_by: 10,
            age_range_woman_older_by: 5,
            height_male_greater_by_cm: 5,
            location_radius_km: 50.0,
            location_adaptive_expansion: vec![100.0, 200.0],
            match_expiration_hours: None,
            match_drop_hours: None,
            compatibility_score_threshold: None,
            created_at: Utc::now(),
        }
    }

    fn user(gender: Gender, age: u8, height_cm: u16, accepts: &[Gender]) -> User {
        User {
            id: Uuid::new_v4(),
            age: Some(age),
            gender: Some(gender),
            height_cm: Some(height_cm),
            latitude: Some(52.52),
            longitude: Some(13.405),
            dating_preferences: accepts.to_vec(),
            is_test_user: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_equal_ages_always_pass() {
        let mut cfg = config();
        cfg.age_range_end = 0;
        let a = user(Gender::Female, 30, 170, &[Gender::Female]);
        let b = user(Gender::Female, 30, 170, &[Gender::Female]);

        assert!(AgeQualifier.evaluate(&cfg, &a, &b).error.is_none());
    }

    #[test]
    fn test_woman_older_uses_woman_limit() {
        let man = user(Gender::Male, 30, 180, &[Gender::Female]);
        let woman = user(Gender::Female, 36, 165, &[Gender::Male]);

        let eval = AgeQualifier.evaluate(&config(), &man, &woman);
        assert_eq!(eval.error, Some(QualifierError::FemaleExceedsAgeGap { gap: 6, allowed: 5 }));
    }

    #[test]
    fn test_same_sex_uses_range_end() {
        let a = user(Gender::Male, 25, 180, &[Gender::Male]);
        let b = user(Gender::Male, 34, 178, &[Gender::Male]);

        let eval = AgeQualifier.evaluate(&config(), &a, &b);
        assert_eq!(eval.error, Some(QualifierError::SameSexExceedsAgeGap { gap: 9, allowed: 8 }));
    }

    #[test]
    fn test_non_binary_uses_range_end() {
        let a = user(Gender::NonBinary, 25, 170, &[Gender::Male]);
        let b = user(Gender::Male, 33, 180, &[Gender::NonBinary]);

        assert!(AgeQualifier.evaluate(&config(), &a, &b).error.is_none());
    }

    #[test]
    fn test_missing_age_is_validation_failure() {
        let mut a = user(Gender::Male, 25, 180, &[Gender::Female]);
        a.age = None;
        let b = user(Gender::Female, 25, 165, &[Gender::Male]);

        let eval = AgeQualifier.evaluate(&config(), &a, &b);
        match eval.error {
            Some(QualifierError::MissingAttribute { fields }) => {
                assert_eq!(fields, vec![format!("{}.age", a.id)]);
            }
            other => panic!("expected missing attribute, got {:?}", other),
        }
    }

    #[test]
    fn test_preference_checked_both_ways() {
        let a = user(Gender::Male, 30, 180, &[Gender::Female]);
        let b = user(Gender::Female, 30, 165, &[Gender::Female]);

        let eval = DatingPreferenceQualifier.evaluate(&config(), &a, &b);
        assert_eq!(
            eval.error,
            Some(QualifierError::PreferenceMismatch { rejected_by: vec![b.id] })
        );
        assert_eq!(eval.telemetry["a_accepts_b"], true);
        assert_eq!(eval.telemetry["b_accepts_a"], false);
    }

    #[test]
    fn test_height_skipped_for_same_gender_and_non_binary() {
        let a = user(Gender::Female, 30, 190, &[Gender::Female]);
        let b = user(Gender::Female, 30, 150, &[Gender::Female]);
        assert!(HeightQualifier.evaluate(&config(), &a, &b).error.is_none());

        let c = user(Gender::NonBinary, 30, 150, &[Gender::Male]);
        let d = user(Gender::Male, 30, 150, &[Gender::NonBinary]);
        assert!(HeightQualifier.evaluate(&config(), &c, &d).error.is_none());
    }

    #[test]
    fn test_height_margin_enforced() {
        let man = user(Gender::Male, 30, 172, &[Gender::Female]);
        let woman = user(Gender::Female, 30, 168, &[Gender::Male]);

        let eval = HeightQualifier.evaluate(&config(), &woman, &man);
        assert_eq!(
            eval.error,
            Some(QualifierError::HeightRequirement {
                male_cm: 172,
                female_cm: 168,
                required_cm: 5
            })
        );

        let taller = user(Gender::Male, 30, 173, &[Gender::Female]);
        assert!(HeightQualifier.evaluate(&config(), &taller, &woman).error.is_none());
    }

    #[test]
    fn test_chain_never_short_circuits() {
        let mut man = user(Gender::Male, 50, 160, &[Gender::Male]);
        man.latitude = Some(48.1351);
        man.longitude = Some(11.582);
        let woman = user(Gender::Female, 25, 175, &[Gender::Female]);

        let report = QualifierChain::standard().run(&config(), &man, &woman);

        assert_eq!(report.qualifiers.len(), 4);
        assert!(!report.passed());
        assert_eq!(report.failures().count(), 4);
        assert_eq!(report.get(AGE).unwrap().error.as_ref().unwrap().code, "age.male_exceeds");
        assert_eq!(report.get(DISTANCE).unwrap().error.as_ref().unwrap().code, "distance.outside_radius");
    }

    #[test]
    fn test_chain_passes_compatible_pair() {
        let man = user(Gender::Male, 32, 182, &[Gender::Female]);
        let woman = user(Gender::Female, 29, 168, &[Gender::Male]);

        let report = QualifierChain::standard().run(&config(), &man, &woman);
        assert!(report.passed(), "report: {:?}", report);
        assert_eq!(report.config_version, Some(1));
    }

    #[test]
    fn test_chain_accepts_custom_qualifier() {
        struct AlwaysFails;
        impl Qualifier for AlwaysFails {
            fn name(&self) -> &'static str {
                "always_fails"
            }
            fn evaluate(&self, _: &MatchConfig, _: &User, _: &User) -> Evaluation {
                Evaluation::fail(json!({}), QualifierError::MissingAttribute { fields: vec![] })
            }
        }

        let chain = QualifierChain::standard().with(AlwaysFails);
        assert_eq!(chain.names().len(), 5);

        let man = user(Gender::Male, 32, 182, &[Gender::Female]);
        let woman = user(Gender::Female, 29, 168, &[Gender::Male]);
        assert!(!chain.run(&config(), &man, &woman).passed());
    }
}
