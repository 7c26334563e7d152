use crate::env::{EnvError, EnvResult, EnvSpec, Environment, Step};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Constants for Physics (Standard CartPole)
const GRAVITY: f64 = 9.8;
const MASSCART: f64 = 1.0;
const MASSPOLE: f64 = 0.1;
const TOTAL_MASS: f64 = MASSCART + MASSPOLE;
const LENGTH: f64 = 0.5; // actually half the pole's length
const POLEMASS_LENGTH: f64 = MASSPOLE * LENGTH;
const FORCE_MAG: f64 = 10.0;
const TAU: f64 = 0.02; // seconds between state updates

const THETA_THRESHOLD: f64 = 12.0 * std::f64::consts::PI / 180.0;
const X_THRESHOLD: f64 = 2.4;

#[derive(Debug, Clone, Default)]
pub struct CartPoleState {
    pub x: f64,
    pub x_dot: f64,
    pub theta: f64,
    pub theta_dot: f64,
}

impl CartPoleState {
    fn to_vec(&self) -> Vec<f64> {
        vec![self.x, self.x_dot, self.theta, self.theta_dot]
    }
}

/// Classic cart-pole balancing task. Action 0 pushes left, 1 pushes right;
/// every step the pole stays up pays 1.0.
pub struct CartPole {
    state: CartPoleState,
    max_steps: usize,
    current_step: usize,
    ready: bool,
    rng: StdRng,
}

impl CartPole {
    pub fn new(max_steps: usize) -> Self {
        CartPole {
            state: CartPoleState::default(),
            max_steps,
            current_step: 0,
            ready: false,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn state(&self) -> &CartPoleState {
        &self.state
    }
}

impl Environment for CartPole {
    type Observation = Vec<f64>;
    type Action = usize;

    fn reset(&mut self) -> EnvResult<Self::Observation> {
        let mut perturb = || self.rng.gen_range(-0.05..0.05);
        self.state = CartPoleState {
            x: perturb(),
            x_dot: perturb(),
            theta: perturb(),
            theta_dot: perturb(),
        };
        self.current_step = 0;
        self.ready = true;
        Ok(self.state.to_vec())
    }

    fn step(&mut self, action: Self::Action) -> EnvResult<Step<Self::Observation>> {
        if !self.ready {
            return Err(EnvError::NotReset);
        }
        let force = match action {
            0 => -FORCE_MAG,
            1 => FORCE_MAG,
            other => {
                return Err(EnvError::InvalidAction(format!(
                    "cart-pole takes 0 or 1, got {}",
                    other
                )))
            }
        };
        self.current_step += 1;

        let cos_theta = self.state.theta.cos();
        let sin_theta = self.state.theta.sin();

        // Equations of Motion
        let temp =
            (force + POLEMASS_LENGTH * self.state.theta_dot.powi(2) * sin_theta) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (LENGTH * (4.0 / 3.0 - MASSPOLE * cos_theta.powi(2) / TOTAL_MASS));
        let x_acc = temp - POLEMASS_LENGTH * theta_acc * cos_theta / TOTAL_MASS;

        // Euler Integration
        self.state.x += TAU * self.state.x_dot;
        self.state.x_dot += TAU * x_acc;
        self.state.theta += TAU * self.state.theta_dot;
        self.state.theta_dot += TAU * theta_acc;

        let reason = if self.state.theta.abs() > THETA_THRESHOLD {
            Some("pole_fell")
        } else if self.state.x.abs() > X_THRESHOLD {
            Some("out_of_bounds")
        } else if self.current_step >= self.max_steps {
            Some("time_limit")
        } else {
            None
        };

        let step = Step::new(self.state.to_vec(), 1.0, reason.is_some())
            .with_info("x", self.state.x);
        Ok(match reason {
            Some(reason) => step.with_info("reason", reason),
            None => step,
        })
    }

    fn sample_action(&mut self) -> Self::Action {
        self.rng.gen_range(0..2)
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn render(&mut self) -> EnvResult<()> {
        tracing::info!(
            step = self.current_step,
            x = self.state.x,
            theta = self.state.theta,
            "cart-pole"
        );
        Ok(())
    }

    fn spec(&self) -> EnvSpec {
        EnvSpec {
            name: "cart-pole".to_string(),
            nb_actions: Some(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_is_seeded() {
        let mut a = CartPole::new(10);
        let mut b = CartPole::new(10);
        a.seed(3);
        b.seed(3);
        let obs = a.reset().unwrap();
        assert_eq!(obs, b.reset().unwrap());
        assert!(obs.iter().all(|v| v.abs() < 0.05));
        assert_eq!(a.state().theta, obs[2]);
    }

    #[test]
    fn test_pushing_one_way_topples_pole() {
        let mut env = CartPole::new(500);
        env.seed(0);
        env.reset().unwrap();
        let mut steps = 0;
        loop {
            let step = env.step(1).unwrap();
            steps += 1;
            if step.done {
                assert!(step.info.contains_key("reason"));
                break;
            }
        }
        assert!(steps < 100);
    }

    #[test]
    fn test_time_limit() {
        let mut env = CartPole::new(1);
        env.seed(0);
        env.reset().unwrap();
        let step = env.step(0).unwrap();
        assert!(step.done);
        assert_eq!(step.reward, 1.0);
    }

    #[test]
    fn test_step_before_reset() {
        let mut env = CartPole::new(10);
        assert!(matches!(env.step(0), Err(EnvError::NotReset)));
        env.reset().unwrap();
        assert!(env.step(0).is_ok());
    }

    #[test]
    fn test_invalid_action() {
        let mut env = CartPole::new(10);
        env.reset().unwrap();
        assert!(matches!(env.step(2), Err(EnvError::InvalidAction(_))));
    }
}
