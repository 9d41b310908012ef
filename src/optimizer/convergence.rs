//! Plateau detection over a run's score sequence.

/// Declares convergence when the last `window_size` scores span less
/// than `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceDetector {
    pub window_size: usize,
    pub threshold: f64,
}

impl Default for ConvergenceDetector {
    fn default() -> Self {
        Self {
            window_size: 3,
            threshold: 0.02,
        }
    }
}

impl ConvergenceDetector {
    pub fn new(window_size: usize, threshold: f64) -> Self {
        Self {
            window_size: window_size.max(1),
            threshold,
        }
    }

    /// False until at least `window_size` scores exist. Scores before the
    /// window are ignored, so early volatility does not delay convergence.
    pub fn has_converged(&self, scores: &[f64]) -> bool {
        if scores.len() < self.window_size {
            return false;
        }

        let window = &scores[scores.len() - self.window_size..];
        let (min, max) = window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });
        max - min < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_few_scores() {
        let detector = ConvergenceDetector::default();
        assert!(!detector.has_converged(&[]));
        assert!(!detector.has_converged(&[0.5]));
        assert!(!detector.has_converged(&[0.5, 0.5]));
    }

    #[test]
    fn test_plateau_after_volatility() {
        let detector = ConvergenceDetector::default();
        assert!(detector.has_converged(&[0.5, 0.6, 0.75, 0.76, 0.76, 0.77]));
    }

    #[test]
    fn test_still_improving() {
        let detector = ConvergenceDetector::default();
        assert!(!detector.has_converged(&[0.5, 0.6, 0.7, 0.8, 0.9]));
    }

    #[test]
    fn test_flat_low_scores_converge() {
        let detector = ConvergenceDetector::default();
        assert!(detector.has_converged(&[0.2, 0.2, 0.2]));
    }

    #[test]
    fn test_custom_window() {
        let detector = ConvergenceDetector::new(4, 0.05);
        assert!(!detector.has_converged(&[0.7, 0.71, 0.72]));
        assert!(detector.has_converged(&[0.7, 0.71, 0.72, 0.74]));
        assert!(!detector.has_converged(&[0.6, 0.71, 0.72, 0.74]));
    }
}
