use crate::error::{EngineError, EngineResult};
use crate::newton::IterationResult;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Which attractor a sample point was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Label {
    /// Index into the known-root set, in registration order.
    Root(usize),
    Unclassified,
}

impl Label {
    pub fn index(self) -> Option<usize> {
        match self {
            Label::Root(index) => Some(index),
            Label::Unclassified => None,
        }
    }
}

/// Nearest-known-root assignment over a fixed, ordered root set.
#[derive(Debug, Clone)]
pub struct RootClassifier {
    roots: Vec<Complex64>,
}

impl RootClassifier {
    pub fn new(roots: Vec<Complex64>) -> EngineResult<Self> {
        if roots.is_empty() {
            return Err(EngineError::InvalidSettings(
                "known-root set must not be empty.".into(),
            ));
        }
        if let Some(bad) = roots.iter().find(|r| !r.is_finite()) {
            return Err(EngineError::InvalidSettings(format!(
                "known root {bad} is not finite."
            )));
        }
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[Complex64] {
        &self.roots
    }

    /// Index of the closest root. Exact distance ties go to the root
    /// registered first.
    pub fn classify(&self, value: Complex64) -> Label {
        let mut best: Option<(usize, f64)> = None;
        for (index, root) in self.roots.iter().enumerate() {
            let distance = (*root - value).norm();
            if distance.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, min)| distance < min) {
                best = Some((index, distance));
            }
        }
        best.map_or(Label::Unclassified, |(index, _)| Label::Root(index))
    }

    /// Label for a finished root search; non-converged searches are never
    /// passed to [`classify`](Self::classify).
    pub fn label_for(&self, result: &IterationResult) -> Label {
        if result.converged {
            self.classify(result.value)
        } else {
            Label::Unclassified
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::cube_roots_of_unity;

    #[test]
    fn rejects_empty_root_set() {
        let err = RootClassifier::new(Vec::new()).expect_err("empty set should fail");
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn picks_nearest_root() {
        let classifier = RootClassifier::new(cube_roots_of_unity().to_vec()).expect("valid roots");
        assert_eq!(classifier.classify(Complex64::new(0.9, 0.05)), Label::Root(0));
        assert_eq!(classifier.classify(Complex64::new(-0.5, 0.8)), Label::Root(1));
        assert_eq!(classifier.classify(Complex64::new(-0.5, -0.8)), Label::Root(2));
    }

    #[test]
    fn exact_ties_go_to_first_registered() {
        let classifier = RootClassifier::new(vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(-1.0, 0.0),
        ])
        .expect("valid roots");
        assert_eq!(classifier.classify(Complex64::new(0.0, 3.0)), Label::Root(0));

        let reversed = RootClassifier::new(vec![
            Complex64::new(-1.0, 0.0),
            Complex64::new(1.0, 0.0),
        ])
        .expect("valid roots");
        assert_eq!(reversed.classify(Complex64::new(0.0, 3.0)), Label::Root(0));
    }

    #[test]
    fn non_converged_results_are_unclassified() {
        let classifier = RootClassifier::new(vec![Complex64::new(1.0, 0.0)]).expect("valid roots");
        let failed = IterationResult {
            converged: false,
            value: Complex64::new(1.0, 0.0),
            iterations: 1000,
        };
        assert_eq!(classifier.label_for(&failed), Label::Unclassified);
        assert_eq!(
            classifier.classify(Complex64::new(f64::NAN, 0.0)),
            Label::Unclassified
        );
    }

    #[test]
    fn label_serializes_with_tag() {
        let json = serde_json::to_string(&Label::Root(2)).expect("serialize");
        assert_eq!(json, r#"{"kind":"root","index":2}"#);
        let json = serde_json::to_string(&Label::Unclassified).expect("serialize");
        assert_eq!(json, r#"{"kind":"unclassified"}"#);
    }
}
