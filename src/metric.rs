use serde::{Deserialize, Serialize};

/// Largest value [`Metric::Cosine`] can return.
pub const MAX_COSINE_DISTANCE: f32 = 2.0;

/// Distance function used by the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// `1 - cos(a, b)`, in `[0, 2]`.
    #[default]
    Cosine,
}

impl Metric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_distance(a, b),
        }
    }
}

/// Calculates the cosine distance between two float vectors.
///
/// A zero-magnitude vector has no direction, so anything compared against it
/// sits at the maximum distance.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        return MAX_COSINE_DISTANCE;
    }

    let similarity = dot / (a_norm.sqrt() * b_norm.sqrt());
    if !similarity.is_finite() {
        return MAX_COSINE_DISTANCE;
    }

    (1.0 - similarity).clamp(0.0, MAX_COSINE_DISTANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance() {
        let metric = Metric::Cosine;

        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        assert!((metric.distance(&a, &b) - 1.0).abs() < 1e-6);

        let c = [1.0, 2.0, 3.0];
        let d = [2.0, 4.0, 6.0];
        assert!(metric.distance(&c, &d) < 1e-6);

        let e = [1.0, 0.0];
        let f = [-1.0, 0.0];
        assert!((metric.distance(&e, &f) - 2.0).abs() < 1e-6);

        let g = [1.0, 1.0];
        let h = [1.0, 0.0];
        let expected = 1.0 - std::f32::consts::FRAC_1_SQRT_2;
        assert!((metric.distance(&g, &h) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_maximally_distant() {
        let zero = [0.0, 0.0, 0.0];
        let a = [0.3, 0.1, 0.0];

        assert_eq!(cosine_distance(&zero, &a), MAX_COSINE_DISTANCE);
        assert_eq!(cosine_distance(&a, &zero), MAX_COSINE_DISTANCE);
        assert_eq!(cosine_distance(&zero, &zero), MAX_COSINE_DISTANCE);
    }

    #[test]
    fn test_metric_serializes_lowercase() {
        let json = serde_json::to_string(&Metric::Cosine).unwrap();
        assert_eq!(json, "\"cosine\"");
    }
}
