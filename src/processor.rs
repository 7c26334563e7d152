use crate::env::{Info, Step};

/// Hook between the environment and the agent.
pub trait Processor<O, A> {
    fn process_observation(&mut self, obs: O) -> O {
        obs
    }

    fn process_action(&mut self, action: A) -> A {
        action
    }

    fn process_reward(&mut self, reward: f64) -> f64 {
        reward
    }

    fn process_info(&mut self, info: Info) -> Info {
        info
    }

    fn process_step(&mut self, step: Step<O>) -> Step<O> {
        Step {
            obs: self.process_observation(step.obs),
            reward: self.process_reward(step.reward),
            done: step.done,
            info: self.process_info(step.info),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProcessor;

impl<O, A> Processor<O, A> for NoProcessor {}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClipReward;

    impl Processor<f64, usize> for ClipReward {
        fn process_reward(&mut self, reward: f64) -> f64 {
            reward.clamp(-1.0, 1.0)
        }
    }

    #[test]
    fn test_process_step_routes_through_hooks() {
        let mut p = ClipReward;
        let step = p.process_step(Step::new(2.0, 10.0, true));
        assert_eq!(step.obs, 2.0);
        assert_eq!(step.reward, 1.0);
        assert!(step.done);
    }

    #[test]
    fn test_no_processor_is_identity() {
        let mut p = NoProcessor;
        let action = Processor::<f64, usize>::process_action(&mut p, 3);
        assert_eq!(action, 3);
    }
}
