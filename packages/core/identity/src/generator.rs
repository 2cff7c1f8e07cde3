use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use remrpc_utils::{
    random::{RealRandom, Random},
    Timer,
};

use crate::{CorrelationId, EPOCH_MS, MAX_SALT, MAX_SEQUENCE, TIMESTAMP_BITS};

const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;

#[derive(Default)]
struct GeneratorState {
    last_ms: u64,
    sequence: u64,
}

/// Issues [`CorrelationId`]s which strictly increase as long as the clock does not go backward.
///
/// A clock moving backward is not detected, ids issued after that may repeat earlier ones.
pub struct UniqueIdGenerator {
    timer: Arc<dyn Timer>,
    salt: u16,
    state: Mutex<GeneratorState>,
}

impl UniqueIdGenerator {
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        Self::with_random(timer, &RealRandom())
    }

    pub fn with_random(timer: Arc<dyn Timer>, random: &dyn Random<u16>) -> Self {
        Self::with_salt(timer, random.random())
    }

    pub fn with_salt(timer: Arc<dyn Timer>, salt: u16) -> Self {
        Self {
            timer,
            salt: salt & MAX_SALT,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    pub fn salt(&self) -> u16 {
        self.salt
    }

    pub fn next(&self) -> CorrelationId {
        let mut state = self.state.lock();
        let mut now_ms = self.timer.now_ms();

        if now_ms == state.last_ms {
            state.sequence += 1;
            if state.sequence > MAX_SEQUENCE {
                log::debug!("[UniqueIdGenerator] sequence exhausted at {}, waiting next millisecond", now_ms);
                now_ms = self.wait_next_ms(state.last_ms);
                state.sequence = 0;
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now_ms;
        let timestamp = now_ms.saturating_sub(EPOCH_MS) & TIMESTAMP_MASK;
        CorrelationId::compose(timestamp, self.salt, state.sequence)
    }

    fn wait_next_ms(&self, last_ms: u64) -> u64 {
        loop {
            std::thread::sleep(Duration::from_millis(1));
            let now_ms = self.timer.now_ms();
            if now_ms != last_ms {
                return now_ms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use remrpc_utils::{random::MockRandom, MockTimer, SystemTimer};

    use super::UniqueIdGenerator;
    use crate::{CorrelationId, EPOCH_MS};

    #[test]
    fn should_embed_timestamp_and_salt() {
        let timer = Arc::new(MockTimer::default());
        timer.fake(EPOCH_MS + 1000);
        let gen = UniqueIdGenerator::with_salt(timer.clone(), 77);

        let id = gen.next();
        assert_eq!(id.timestamp(), 1000);
        assert_eq!(id.unix_ms(), EPOCH_MS + 1000);
        assert_eq!(id.salt(), 77);
        assert_eq!(id.sequence(), 0);
    }

    #[test]
    fn should_mask_salt_from_random() {
        let timer = Arc::new(MockTimer::default());
        let random = MockRandom::<u16>::default();
        random.fake(0xFFFF);
        let gen = UniqueIdGenerator::with_random(timer, &random);
        assert_eq!(gen.salt(), 0x1FFF);
    }

    #[test]
    fn should_increase_sequence_in_same_ms() {
        let timer = Arc::new(MockTimer::default());
        timer.fake(EPOCH_MS + 5);
        let gen = UniqueIdGenerator::with_salt(timer.clone(), 1);

        let ids: Vec<CorrelationId> = (0..100).map(|_| gen.next()).collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(id.sequence(), i as u64);
            assert_eq!(id.timestamp(), 5);
        }
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn should_reset_sequence_on_new_ms() {
        let timer = Arc::new(MockTimer::default());
        timer.fake(EPOCH_MS + 5);
        let gen = UniqueIdGenerator::with_salt(timer.clone(), 1);

        gen.next();
        let second = gen.next();
        assert_eq!(second.sequence(), 1);

        timer.forward(1);
        let third = gen.next();
        assert_eq!(third.sequence(), 0);
        assert_eq!(third.timestamp(), 6);
        assert!(second < third);
    }

    #[test]
    fn should_stay_unique_when_sequence_exhausted() {
        let gen = UniqueIdGenerator::with_salt(Arc::new(SystemTimer()), 3);
        let ids: Vec<CorrelationId> = (0..5000).map(|_| gen.next()).collect();

        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn should_render_parseable_strings() {
        let gen = UniqueIdGenerator::new(Arc::new(SystemTimer()));
        let id = gen.next();
        assert_eq!(id.to_string().parse::<CorrelationId>(), Ok(id));
    }
}
