use rand::Rng;
use rand::rngs::OsRng;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};

/// Noisy counts strictly below this value are released as 0.0
pub const LOW_COUNT_THRESHOLD: f64 = 10.0;

/// Source of uniformly distributed samples in `[0, 1)`.
///
/// Implementations are shared between concurrently running checks, so they
/// must be usable through `&self` from many threads at once.
pub trait UniformSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// Operating-system CSPRNG. Stateless, so concurrent use needs no locking.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsUniformSource;

impl UniformSource for OsUniformSource {
    fn next_unit(&self) -> f64 {
        OsRng.gen_range(0.0..1.0)
    }
}

/// Laplace mechanism with low-count suppression
#[derive(Clone)]
pub struct NoiseMechanism {
    source: Arc<dyn UniformSource>,
}

impl Default for NoiseMechanism {
    fn default() -> Self {
        Self::new(Arc::new(OsUniformSource))
    }
}

impl std::fmt::Debug for NoiseMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseMechanism").finish_non_exhaustive()
    }
}

impl NoiseMechanism {
    pub fn new(source: Arc<dyn UniformSource>) -> Self {
        Self { source }
    }

    /// Release `count` under `epsilon`-differential privacy.
    ///
    /// Returns the clamped noisy count, or exactly 0.0 when that value is below
    /// [`LOW_COUNT_THRESHOLD`]. Every call draws fresh randomness.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidParameter`] when `epsilon` or `sensitivity` is not
    /// strictly positive. Validation happens before any randomness is drawn.
    pub fn add_noise(&self, count: u64, epsilon: f64, sensitivity: f64) -> EngineResult<f64> {
        let noisy = self.noisy_count(count, epsilon, sensitivity)?;
        Ok(suppress_low_count(noisy))
    }

    /// Clamped noisy count before suppression is applied.
    pub fn noisy_count(&self, count: u64, epsilon: f64, sensitivity: f64) -> EngineResult<f64> {
        validate_positive("epsilon", epsilon)?;
        validate_positive("sensitivity", sensitivity)?;

        let scale = sensitivity / epsilon;
        let noise = self.laplace(scale);
        Ok((count as f64 + noise).max(0.0))
    }

    /// Inverse-transform sample from Laplace(0, scale).
    fn laplace(&self, scale: f64) -> f64 {
        // u must lie in the open interval (-0.5, 0.5); u == -0.5 would yield ln(0)
        let u = loop {
            let sample = self.source.next_unit();
            if sample > 0.0 && sample < 1.0 {
                break sample - 0.5;
            }
        };
        -scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
    }
}

fn validate_positive(name: &'static str, value: f64) -> EngineResult<()> {
    // `!(value > 0.0)` also rejects NaN
    if !(value > 0.0) {
        return Err(EngineError::InvalidParameter { name, value });
    }
    Ok(())
}

fn suppress_low_count(noisy: f64) -> f64 {
    if noisy < LOW_COUNT_THRESHOLD { 0.0 } else { noisy }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed list of uniform samples, then repeats 0.5 (zero noise).
    struct ScriptedSource(Mutex<VecDeque<f64>>);

    impl ScriptedSource {
        fn new(values: &[f64]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(values.iter().copied().collect())))
        }
    }

    impl UniformSource for ScriptedSource {
        fn next_unit(&self) -> f64 {
            self.0.lock().unwrap().pop_front().unwrap_or(0.5)
        }
    }

    fn scripted(values: &[f64]) -> NoiseMechanism {
        NoiseMechanism::new(ScriptedSource::new(values))
    }

    #[test]
    fn test_rejects_non_positive_epsilon() {
        let mechanism = NoiseMechanism::default();
        for epsilon in [0.0, -1.0, f64::NAN] {
            let err = mechanism.add_noise(100, epsilon, 1.0).unwrap_err();
            assert!(matches!(err, EngineError::InvalidParameter { name: "epsilon", .. }));
        }
    }

    #[test]
    fn test_rejects_non_positive_sensitivity() {
        let mechanism = NoiseMechanism::default();
        for sensitivity in [0.0, -0.5] {
            let err = mechanism.add_noise(0, 1.0, sensitivity).unwrap_err();
            assert!(matches!(err, EngineError::InvalidParameter { name: "sensitivity", .. }));
            assert!(err.to_string().contains("sensitivity must be positive"));
        }
    }

    #[test]
    fn test_validation_happens_before_sampling() {
        let source = ScriptedSource::new(&[0.9]);
        let mechanism = NoiseMechanism::new(source.clone());
        assert!(mechanism.add_noise(50, 0.0, 1.0).is_err());
        assert_eq!(source.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_midpoint_sample_adds_no_noise() {
        let mechanism = scripted(&[0.5]);
        assert_eq!(mechanism.add_noise(50, 1.0, 1.0).unwrap(), 50.0);
    }

    #[test]
    fn test_inverse_transform_matches_closed_form() {
        // u = 0.25 -> noise = -scale * ln(0.5) = scale * ln 2
        let mechanism = scripted(&[0.75]);
        let scale = 2.0;
        let noisy = mechanism.noisy_count(100, 0.5, 1.0).unwrap();
        assert!((noisy - (100.0 + scale * 2f64.ln())).abs() < 1e-9);

        // u = -0.25 mirrors it
        let mechanism = scripted(&[0.25]);
        let noisy = mechanism.noisy_count(100, 0.5, 1.0).unwrap();
        assert!((noisy - (100.0 - scale * 2f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn test_boundary_sample_is_redrawn() {
        // 0.0 would map to u = -0.5 and ln(0); the mechanism must draw again
        let mechanism = scripted(&[0.0, 0.5]);
        assert_eq!(mechanism.noisy_count(42, 1.0, 1.0).unwrap(), 42.0);
    }

    #[test]
    fn test_negative_noise_is_clamped_to_zero() {
        let mechanism = scripted(&[1e-12]);
        assert_eq!(mechanism.noisy_count(3, 1.0, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_low_counts_are_suppressed() {
        let mechanism = scripted(&[0.5, 0.5, 0.5]);
        assert_eq!(mechanism.add_noise(9, 1.0, 1.0).unwrap(), 0.0);
        assert_eq!(mechanism.add_noise(0, 1.0, 1.0).unwrap(), 0.0);
        // exactly at the threshold is released
        assert_eq!(mechanism.add_noise(10, 1.0, 1.0).unwrap(), 10.0);
    }

    #[test]
    fn test_suppression_applies_after_noise() {
        // a true count of 12 pushed below the threshold is released as 0.0
        let mechanism = scripted(&[0.01]);
        let noisy = scripted(&[0.01]).noisy_count(12, 1.0, 1.0).unwrap();
        assert!(noisy < LOW_COUNT_THRESHOLD);
        assert_eq!(mechanism.add_noise(12, 1.0, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_output_is_never_negative_and_respects_threshold() {
        let mechanism = NoiseMechanism::default();
        for count in [0u64, 1, 5, 9, 10, 11, 50, 1_000] {
            for _ in 0..200 {
                let value = mechanism.add_noise(count, 0.1, 1.0).unwrap();
                assert!(value >= 0.0);
                assert!(value == 0.0 || value >= LOW_COUNT_THRESHOLD);
            }
        }
    }

    #[test]
    fn test_os_noise_is_not_deterministic() {
        let mechanism = NoiseMechanism::default();
        let samples: Vec<f64> = (0..20)
            .map(|_| mechanism.add_noise(1_000, 1.0, 1.0).unwrap())
            .collect();
        assert!(samples.windows(2).any(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn test_os_source_stays_in_unit_interval() {
        let source = OsUniformSource;
        for _ in 0..1_000 {
            let value = source.next_unit();
            assert!((0.0..1.0).contains(&value));
        }
    }
}
