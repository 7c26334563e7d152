use candle_core::{DType, Tensor};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("action values must be one-dimensional, got rank {0}")]
    NotOneDimensional(usize),
    #[error("action values are empty")]
    Empty,
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PolicyConfig {
    Boltzmann,
    EpsBoltzmann { eps: f64 },
    Greedy,
    EpsGreedy { eps: f64 },
}

pub trait QPolicy {
    fn select_action(&mut self, q_values: &Tensor) -> Result<usize, PolicyError>;
    fn config(&self) -> PolicyConfig;
}

impl<P: QPolicy + ?Sized> QPolicy for Box<P> {
    fn select_action(&mut self, q_values: &Tensor) -> Result<usize, PolicyError> {
        (**self).select_action(q_values)
    }

    fn config(&self) -> PolicyConfig {
        (**self).config()
    }
}

fn action_values(q_values: &Tensor) -> Result<Vec<f64>, PolicyError> {
    let rank = q_values.rank();
    if rank != 1 {
        return Err(PolicyError::NotOneDimensional(rank));
    }
    let values = q_values.to_dtype(DType::F64)?.to_vec1::<f64>()?;
    if values.is_empty() {
        return Err(PolicyError::Empty);
    }
    Ok(values)
}

// Subtracts the maximum first, so adding a constant changes nothing.
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

fn sample_softmax<R: Rng>(values: &[f64], rng: &mut R) -> usize {
    let probs = softmax(values);
    match WeightedIndex::new(&probs) {
        Ok(dist) => dist.sample(rng),
        Err(err) => {
            tracing::warn!(
                "softmax of {:?} is not a distribution ({}), sampling uniformly",
                values,
                err
            );
            rng.gen_range(0..values.len())
        }
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] || values[best].is_nan() {
            best = i;
        }
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QExtrema {
    pub min: f64,
    pub max: f64,
}

impl Default for QExtrema {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl QExtrema {
    fn observe(&mut self, values: &[f64]) -> bool {
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut changed = false;
        if lo < self.min {
            self.min = lo;
            changed = true;
        }
        if hi > self.max {
            self.max = hi;
            changed = true;
        }
        changed
    }
}

/// Samples actions from the softmax of the action values.
pub struct BoltzmannQPolicy {
    extrema: QExtrema,
    rng: StdRng,
}

impl BoltzmannQPolicy {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            extrema: QExtrema::default(),
            rng,
        }
    }

    pub fn extrema(&self) -> QExtrema {
        self.extrema
    }
}

impl Default for BoltzmannQPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl QPolicy for BoltzmannQPolicy {
    fn select_action(&mut self, q_values: &Tensor) -> Result<usize, PolicyError> {
        let values = action_values(q_values)?;
        if values.iter().any(|v| v.is_nan()) {
            tracing::warn!("NaN in action values: {:?}", values);
        }
        if self.extrema.observe(&values) {
            tracing::debug!(min = self.extrema.min, max = self.extrema.max, "q range");
        }
        Ok(sample_softmax(&values, &mut self.rng))
    }

    fn config(&self) -> PolicyConfig {
        PolicyConfig::Boltzmann
    }
}

/// Softmax sampling mixed with uniform exploration: with probability `eps`
/// the action values are ignored.
pub struct EpsBoltzmannQPolicy {
    eps: f64,
    rng: StdRng,
}

impl EpsBoltzmannQPolicy {
    pub fn new(eps: f64) -> Self {
        Self {
            eps,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(eps: f64, seed: u64) -> Self {
        Self {
            eps,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }
}

impl Default for EpsBoltzmannQPolicy {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl QPolicy for EpsBoltzmannQPolicy {
    fn select_action(&mut self, q_values: &Tensor) -> Result<usize, PolicyError> {
        let values = action_values(q_values)?;
        if self.rng.gen::<f64>() < self.eps {
            Ok(self.rng.gen_range(0..values.len()))
        } else {
            Ok(sample_softmax(&values, &mut self.rng))
        }
    }

    fn config(&self) -> PolicyConfig {
        PolicyConfig::EpsBoltzmann { eps: self.eps }
    }
}

/// Always the highest-valued action. Ties go to the lowest index.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyQPolicy;

impl QPolicy for GreedyQPolicy {
    fn select_action(&mut self, q_values: &Tensor) -> Result<usize, PolicyError> {
        Ok(argmax(&action_values(q_values)?))
    }

    fn config(&self) -> PolicyConfig {
        PolicyConfig::Greedy
    }
}

pub struct EpsGreedyQPolicy {
    eps: f64,
    rng: StdRng,
}

impl EpsGreedyQPolicy {
    pub fn new(eps: f64) -> Self {
        Self {
            eps,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(eps: f64, seed: u64) -> Self {
        Self {
            eps,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl QPolicy for EpsGreedyQPolicy {
    fn select_action(&mut self, q_values: &Tensor) -> Result<usize, PolicyError> {
        let values = action_values(q_values)?;
        if self.rng.gen::<f64>() < self.eps {
            Ok(self.rng.gen_range(0..values.len()))
        } else {
            Ok(argmax(&values))
        }
    }

    fn config(&self) -> PolicyConfig {
        PolicyConfig::EpsGreedy { eps: self.eps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    const TRIALS: usize = 20_000;

    fn q(values: &[f64]) -> Tensor {
        Tensor::new(values, &Device::Cpu).unwrap()
    }

    fn frequencies(policy: &mut dyn QPolicy, values: &[f64]) -> Vec<f64> {
        let t = q(values);
        let mut counts = vec![0usize; values.len()];
        for _ in 0..TRIALS {
            counts[policy.select_action(&t).unwrap()] += 1;
        }
        counts.iter().map(|&c| c as f64 / TRIALS as f64).collect()
    }

    #[test]
    fn test_actions_in_range() {
        let values = [0.3, -1.2, 4.0, 2.5, 0.0];
        let t = q(&values);
        let mut policies: Vec<Box<dyn QPolicy>> = vec![
            Box::new(BoltzmannQPolicy::with_seed(1)),
            Box::new(EpsBoltzmannQPolicy::with_seed(0.5, 2)),
            Box::new(GreedyQPolicy),
            Box::new(EpsGreedyQPolicy::with_seed(0.5, 3)),
        ];
        for policy in policies.iter_mut() {
            for _ in 0..500 {
                let a = policy.select_action(&t).unwrap();
                assert!(a < values.len());
            }
        }
    }

    #[test]
    fn test_softmax_shift_invariant() {
        let values = [1.0, 2.0, -3.0, 0.5];
        let shifted: Vec<f64> = values.iter().map(|v| v + 1000.0).collect();
        let p = softmax(&values);
        let p_shifted = softmax(&shifted);
        for (a, b) in p.iter().zip(&p_shifted) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_softmax_large_values_do_not_overflow() {
        let p = softmax(&[1000.0, 1000.0]);
        assert_eq!(p, vec![0.5, 0.5]);
    }

    #[test]
    fn test_boltzmann_matches_softmax() {
        // softmax([0, ln 3]) = [0.25, 0.75]
        let mut policy = BoltzmannQPolicy::with_seed(7);
        let freq = frequencies(&mut policy, &[0.0, 3f64.ln()]);
        assert!((freq[1] - 0.75).abs() < 0.02, "{:?}", freq);
    }

    #[test]
    fn test_eps_boltzmann_mixes_uniform_and_softmax() {
        let eps = 0.3;
        let mut policy = EpsBoltzmannQPolicy::with_seed(eps, 11);
        let freq = frequencies(&mut policy, &[0.0, 3f64.ln()]);
        let expected = eps * 0.5 + (1.0 - eps) * 0.75;
        assert!((freq[1] - expected).abs() < 0.02, "{:?}", freq);

        // Softmax puts no mass on actions 0 and 2, so they only come from
        // the uniform branch.
        let mut policy = EpsBoltzmannQPolicy::with_seed(eps, 12);
        let freq = frequencies(&mut policy, &[0.0, 100.0, 0.0]);
        assert!((freq[0] - eps / 3.0).abs() < 0.015, "{:?}", freq);
        assert!((freq[2] - eps / 3.0).abs() < 0.015, "{:?}", freq);
    }

    #[test]
    fn test_eps_zero_is_plain_softmax() {
        let mut policy = EpsBoltzmannQPolicy::with_seed(0.0, 5);
        let freq = frequencies(&mut policy, &[0.0, 100.0]);
        assert_eq!(freq[1], 1.0);
    }

    #[test]
    fn test_extrema_monotonic() {
        let mut policy = BoltzmannQPolicy::with_seed(3);
        let inputs: [&[f64]; 5] = [
            &[0.0, 1.0],
            &[-2.0, 0.5],
            &[0.1, 0.2],
            &[5.0, -1.0],
            &[f64::NAN, 0.0],
        ];
        let mut prev = policy.extrema();
        for values in inputs {
            policy.select_action(&q(values)).unwrap();
            let cur = policy.extrema();
            assert!(cur.min <= prev.min);
            assert!(cur.max >= prev.max);
            prev = cur;
        }
        assert_eq!(prev, QExtrema { min: -2.0, max: 5.0 });
    }

    #[test]
    fn test_nan_values_fall_back_to_uniform() {
        let mut policy = BoltzmannQPolicy::with_seed(9);
        let a = policy.select_action(&q(&[f64::NAN, 1.0, 2.0])).unwrap();
        assert!(a < 3);
    }

    #[test]
    fn test_rejects_non_vector() {
        let t = Tensor::new(&[[1.0f64, 2.0], [3.0, 4.0]], &Device::Cpu).unwrap();
        let mut a = BoltzmannQPolicy::with_seed(0);
        let mut b = EpsBoltzmannQPolicy::with_seed(0.1, 0);
        assert!(matches!(
            a.select_action(&t),
            Err(PolicyError::NotOneDimensional(2))
        ));
        assert!(matches!(
            b.select_action(&t),
            Err(PolicyError::NotOneDimensional(2))
        ));
    }

    #[test]
    fn test_rejects_empty() {
        let t = Tensor::new(&[] as &[f64], &Device::Cpu).unwrap();
        let mut policy = BoltzmannQPolicy::with_seed(0);
        assert!(matches!(policy.select_action(&t), Err(PolicyError::Empty)));
    }

    #[test]
    fn test_f32_values_are_accepted() {
        let t = Tensor::new(&[1.0f32, 9.0], &Device::Cpu).unwrap();
        assert_eq!(GreedyQPolicy.select_action(&t).unwrap(), 1);
    }

    #[test]
    fn test_config() {
        assert_eq!(
            EpsBoltzmannQPolicy::default().config(),
            PolicyConfig::EpsBoltzmann { eps: 0.1 }
        );
        assert_eq!(BoltzmannQPolicy::new().config(), PolicyConfig::Boltzmann);
        assert_eq!(EpsBoltzmannQPolicy::with_seed(0.25, 0).eps(), 0.25);
    }
}
