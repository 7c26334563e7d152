use crate::batch::Batch;
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone)]
struct Entry<O, A> {
    obs: O,
    act: A,
    rew: f64,
    terminal: bool,
}

/// Bounded replay memory that stores one entry per agent step, in order.
///
/// A transition is rebuilt from two consecutive entries: the observation,
/// action, reward and terminal flag of entry `i`, and the observation of
/// entry `i + 1`. The entry following a terminal one belongs to the
/// episode's closing forward/backward pair and never starts a transition.
/// Once the ring has wrapped, the oldest entry's predecessor is gone, so it
/// never starts one either.
#[derive(Debug)]
pub struct SequentialMemory<O, A> {
    entries: Vec<Entry<O, A>>,
    capacity: usize,
    index: usize, // Current write position
}

impl<O: Clone, A: Clone> SequentialMemory<O, A> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            index: 0,
        }
    }

    pub fn append(&mut self, obs: O, act: A, rew: f64, terminal: bool) {
        let entry = Entry {
            obs,
            act,
            rew,
            terminal,
        };
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else {
            // Overwrite oldest
            self.entries[self.index] = entry;
        }
        self.index = (self.index + 1) % self.capacity;
    }

    // Entries in insertion order, oldest first.
    fn get(&self, i: usize) -> &Entry<O, A> {
        let start = if self.entries.len() < self.capacity {
            0
        } else {
            self.index
        };
        &self.entries[(start + i) % self.capacity]
    }

    pub fn sample<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Option<Batch<O, A>> {
        let size = self.entries.len();
        if size < 2 {
            return None;
        }
        let wrapped = size == self.capacity;
        let candidates: Vec<usize> = (0..size - 1)
            .filter(|&i| match i {
                0 => !wrapped,
                _ => !self.get(i - 1).terminal,
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let mut batch = Batch::with_capacity(batch_size);
        for _ in 0..batch_size {
            let &i = candidates.choose(rng)?;
            let entry = self.get(i);
            batch.push(
                entry.obs.clone(),
                entry.act.clone(),
                entry.rew,
                entry.terminal,
                self.get(i + 1).obs.clone(),
            );
        }
        Some(batch)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_links_consecutive_entries() {
        let mut memory = SequentialMemory::new(10);
        memory.append(0.0, 0usize, 1.0, false);
        memory.append(1.0, 1, 2.0, false);
        memory.append(2.0, 0, 3.0, false);

        let mut rng = StdRng::seed_from_u64(0);
        let batch = memory.sample(50, &mut rng).unwrap();

        assert_eq!(batch.len(), 50);
        for i in 0..batch.len() {
            assert_eq!(batch.obs_next[i], batch.obs[i] + 1.0);
            assert_eq!(batch.rew[i], batch.obs[i] + 1.0);
            assert!(batch.obs[i] < 2.0);
        }
    }

    #[test]
    fn test_skips_entry_after_terminal() {
        let mut memory = SequentialMemory::new(10);
        memory.append(0.0, 0usize, 1.0, true);
        // closing pair of the episode
        memory.append(1.0, 0, 0.0, false);
        memory.append(10.0, 0, 1.0, false);

        let mut rng = StdRng::seed_from_u64(1);
        let batch = memory.sample(100, &mut rng).unwrap();

        assert!(batch.obs.iter().all(|&o| o == 0.0));
        assert!(batch.done.iter().all(|&d| d));
        assert!(batch.obs_next.iter().all(|&o| o == 1.0));
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut memory = SequentialMemory::new(3);
        for i in 0..5 {
            memory.append(i as f64, 0usize, 0.0, false);
        }
        assert_eq!(memory.len(), 3);

        let mut rng = StdRng::seed_from_u64(2);
        let batch = memory.sample(100, &mut rng).unwrap();
        assert!(batch.obs.iter().all(|&o| o == 3.0));
        for i in 0..batch.len() {
            assert_eq!(batch.obs_next[i], batch.obs[i] + 1.0);
        }
    }

    #[test]
    fn test_wrapped_ring_skips_oldest_entry() {
        let mut memory = SequentialMemory::new(3);
        memory.append(0.0, 0usize, 1.0, true);
        memory.append(1.0, 0, 0.0, false);
        memory.append(10.0, 0, 1.0, false);
        // evicts the terminal entry, the closing pair becomes the oldest
        memory.append(11.0, 0, 1.0, false);
        assert_eq!(memory.len(), memory.capacity());

        let mut rng = StdRng::seed_from_u64(4);
        let batch = memory.sample(200, &mut rng).unwrap();

        assert!(batch.obs.iter().all(|&o| o == 10.0));
        assert!(batch.obs_next.iter().all(|&o| o == 11.0));
    }

    #[test]
    fn test_capacity_has_floor_of_two() {
        let memory: SequentialMemory<f64, usize> = SequentialMemory::new(0);
        assert_eq!(memory.capacity(), 2);
    }

    #[test]
    fn test_sample_needs_two_entries() {
        let mut memory: SequentialMemory<f64, usize> = SequentialMemory::new(4);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(memory.sample(4, &mut rng).is_none());
        memory.append(0.0, 0, 0.0, false);
        assert!(memory.sample(4, &mut rng).is_none());
        assert!(!memory.is_empty());
    }
}
