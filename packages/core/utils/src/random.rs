use std::sync::Arc;

use parking_lot::Mutex;
use rand::{distributions::Standard, prelude::Distribution};

pub trait Random<T>: Send + Sync {
    fn random(&self) -> T;
}

pub struct RealRandom();

impl<T> Random<T> for RealRandom
where
    Standard: Distribution<T>,
{
    fn random(&self) -> T {
        rand::random()
    }
}

pub struct MockRandom<T>(Arc<Mutex<T>>);

impl<T> Default for MockRandom<T>
where
    T: Default,
{
    fn default() -> Self {
        Self(Default::default())
    }
}

impl<T> MockRandom<T>
where
    T: Clone + Copy + Default,
{
    pub fn fake(&self, value: T) {
        *self.0.lock() = value;
    }
}

impl<T> Random<T> for MockRandom<T>
where
    T: Clone + Copy + Send,
{
    fn random(&self) -> T {
        *self.0.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::{MockRandom, Random};

    #[test]
    fn mock_random_should_return_faked_value() {
        let random = MockRandom::<u16>::default();
        assert_eq!(random.random(), 0);
        random.fake(42);
        assert_eq!(random.random(), 42);
    }
}
