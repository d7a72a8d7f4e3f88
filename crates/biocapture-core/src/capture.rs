use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::features::{FeatureVector, EAR_DIM, FACE_DIM};
use crate::fusion::{aggregate_confidence, merge_ear_vectors, CONFIDENCE_CEILING, CONFIDENCE_FLOOR};
use crate::scan::{ScanStep, StepOutcomes};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("scan sequence not finished (current step: {step})")]
    Incomplete { step: ScanStep },
    #[error("invalid {field} dimension: {got} (expected {expected})")]
    InvalidDimension {
        field: &'static str,
        got: usize,
        expected: usize,
    },
    #[error("invalid {field} value (NaN/Inf)")]
    NonFiniteValue { field: &'static str },
    #[error("confidence {0} outside [0.5, 0.99]")]
    ConfidenceOutOfRange(f32),
}

/// Which biometric the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationKind {
    Face,
    Ear,
    Both,
}

impl std::str::FromStr for VerificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "face" => Ok(Self::Face),
            "ear" => Ok(Self::Ear),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown verification type '{other}'")),
        }
    }
}

/// The finished biometric signature of one scan session.
///
/// Serializes to the enrollment/verification request body. There is no way to
/// build one except by finishing a [`ScanMachine`](crate::ScanMachine), and no
/// way to change it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiometricCapture {
    face_features: FeatureVector,
    ear_features: FeatureVector,
    ear_left_features: FeatureVector,
    ear_right_features: FeatureVector,
    confidence: f32,
    #[serde(serialize_with = "iso8601")]
    timestamp: DateTime<Utc>,
    verification_type: VerificationKind,
}

fn iso8601<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl BiometricCapture {
    pub(crate) fn assemble(
        face: FeatureVector,
        ear_left: FeatureVector,
        ear_right: FeatureVector,
        outcomes: &StepOutcomes,
        kind: VerificationKind,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, CaptureError> {
        let ear_features = merge_ear_vectors(ear_left.as_slice(), ear_right.as_slice());
        let capture = Self {
            face_features: face,
            ear_features,
            ear_left_features: ear_left,
            ear_right_features: ear_right,
            confidence: aggregate_confidence(outcomes),
            timestamp,
            verification_type: kind,
        };
        capture.validate()?;
        Ok(capture)
    }

    /// Check the shape the enrollment endpoint accepts: fixed vector lengths,
    /// finite values, confidence within the reporting band.
    pub fn validate(&self) -> Result<(), CaptureError> {
        let fields = [
            ("face_features", &self.face_features, FACE_DIM),
            ("ear_features", &self.ear_features, EAR_DIM),
            ("ear_left_features", &self.ear_left_features, EAR_DIM),
            ("ear_right_features", &self.ear_right_features, EAR_DIM),
        ];
        for (field, vector, expected) in fields {
            if vector.len() != expected {
                return Err(CaptureError::InvalidDimension {
                    field,
                    got: vector.len(),
                    expected,
                });
            }
            if vector.as_slice().iter().any(|v| !v.is_finite()) {
                return Err(CaptureError::NonFiniteValue { field });
            }
        }
        if !(CONFIDENCE_FLOOR..=CONFIDENCE_CEILING).contains(&self.confidence) {
            return Err(CaptureError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }

    pub fn face_features(&self) -> &[f32] {
        self.face_features.as_slice()
    }

    pub fn ear_features(&self) -> &[f32] {
        self.ear_features.as_slice()
    }

    pub fn ear_left_features(&self) -> &[f32] {
        self.ear_left_features.as_slice()
    }

    pub fn ear_right_features(&self) -> &[f32] {
        self.ear_right_features.as_slice()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn verification_type(&self) -> VerificationKind {
        self.verification_type
    }
}
