#[derive(Debug, Clone)]
pub struct Batch<O, A> {
    pub obs: Vec<O>,
    pub act: Vec<A>,
    pub rew: Vec<f64>,
    pub done: Vec<bool>,
    pub obs_next: Vec<O>,
}

impl<O, A> Batch<O, A> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            obs: Vec::with_capacity(capacity),
            act: Vec::with_capacity(capacity),
            rew: Vec::with_capacity(capacity),
            done: Vec::with_capacity(capacity),
            obs_next: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, obs: O, act: A, rew: f64, done: bool, obs_next: O) {
        self.obs.push(obs);
        self.act.push(act);
        self.rew.push(rew);
        self.done.push(done);
        self.obs_next.push(obs_next);
    }

    pub fn len(&self) -> usize {
        self.obs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obs.is_empty()
    }
}
