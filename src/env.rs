use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("environment must be reset before stepping")]
    NotReset,
}

pub type EnvResult<T> = Result<T, EnvError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    Scalar(f64),
    Vector(Vec<f64>),
    Text(String),
}

impl InfoValue {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, InfoValue::Text(_))
    }
}

impl From<f64> for InfoValue {
    fn from(v: f64) -> Self {
        InfoValue::Scalar(v)
    }
}

impl From<Vec<f64>> for InfoValue {
    fn from(v: Vec<f64>) -> Self {
        InfoValue::Vector(v)
    }
}

impl From<&str> for InfoValue {
    fn from(v: &str) -> Self {
        InfoValue::Text(v.to_string())
    }
}

pub type Info = HashMap<String, InfoValue>;

/// Merges the numeric entries of `info` into `acc`, summing element-wise.
pub fn accumulate_info(acc: &mut Info, info: &Info) {
    for (key, value) in info {
        if !value.is_numeric() {
            continue;
        }
        match acc.get_mut(key) {
            None => {
                acc.insert(key.clone(), value.clone());
            }
            Some(InfoValue::Scalar(total)) => match value {
                InfoValue::Scalar(v) => *total += v,
                _ => tracing::warn!("info entry `{}` changed shape, skipping", key),
            },
            Some(InfoValue::Vector(total)) => match value {
                InfoValue::Vector(v) if v.len() == total.len() => {
                    for (t, x) in total.iter_mut().zip(v) {
                        *t += x;
                    }
                }
                _ => tracing::warn!("info entry `{}` changed shape, skipping", key),
            },
            Some(InfoValue::Text(_)) => {}
        }
    }
}

//Step struct returned by every environment transition
#[derive(Debug, Clone)]
pub struct Step<O> {
    pub obs: O,
    pub done: bool,
    pub reward: f64,
    pub info: Info,
}

impl<O> Step<O> {
    pub fn new(obs: O, reward: f64, done: bool) -> Self {
        Self {
            obs,
            done,
            reward,
            info: Info::new(),
        }
    }

    pub fn with_info(mut self, key: &str, value: impl Into<InfoValue>) -> Self {
        self.info.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvSpec {
    pub name: String,
    pub nb_actions: Option<usize>,
}

pub trait Environment {
    type Observation;
    type Action;

    fn reset(&mut self) -> EnvResult<Self::Observation>;
    fn step(&mut self, action: Self::Action) -> EnvResult<Step<Self::Observation>>;

    fn sample_action(&mut self) -> Self::Action;

    fn seed(&mut self, _seed: u64) {}

    fn render(&mut self) -> EnvResult<()> {
        Ok(())
    }

    fn spec(&self) -> EnvSpec;
}
