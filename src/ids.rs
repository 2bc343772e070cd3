//! Snowflake-style batch id generation.
//!
//! Layout (63 bits used): 41-bit millisecond timestamp since a fixed epoch,
//! 10-bit node id, 12-bit per-millisecond sequence. Ids generated by one node
//! are strictly increasing; ids from distinct nodes never collide. The engine
//! tags every committed batch with one of these, and recovery uses the id to
//! group a batch's records until its finish marker is seen.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

// 2024-01-01T00:00:00Z
const EPOCH_MS: u64 = 1_704_067_200_000;

const NODE_BITS: u32 = 10;
const SEQ_BITS: u32 = 12;
const NODE_MAX: u64 = (1 << NODE_BITS) - 1;
const SEQ_MASK: u64 = (1 << SEQ_BITS) - 1;

pub struct BatchIdGenerator {
    node: u64,
    state: Mutex<GenState>,
}

struct GenState {
    last_ms: u64,
    seq: u64,
}

impl BatchIdGenerator {
    /// Panics when `node` exceeds the 10-bit range; node ids are a
    /// construction-time constant, not runtime input.
    pub fn new(node: u64) -> Self {
        assert!(node <= NODE_MAX, "node id out of range: {}", node);
        Self {
            node,
            state: Mutex::new(GenState { last_ms: 0, seq: 0 }),
        }
    }

    /// Next unique id. Blocks (spins on the clock) for at most one
    /// millisecond when a single millisecond overflows its sequence space.
    pub fn next_id(&self) -> u64 {
        let mut st = self.state.lock().unwrap();
        let mut now = Self::millis();
        if now < st.last_ms {
            // clock went backwards; stick to the last observed millisecond
            now = st.last_ms;
        }
        if now == st.last_ms {
            st.seq = (st.seq + 1) & SEQ_MASK;
            if st.seq == 0 {
                while now <= st.last_ms {
                    now = Self::millis();
                }
            }
        } else {
            st.seq = 0;
        }
        st.last_ms = now;
        ((now - EPOCH_MS.min(now)) << (NODE_BITS + SEQ_BITS)) | (self.node << SEQ_BITS) | st.seq
    }

    #[inline]
    fn millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let gen = BatchIdGenerator::new(1);
        let mut prev = 0u64;
        for _ in 0..10_000 {
            let id = gen.next_id();
            assert!(id > prev, "id {} not greater than {}", id, prev);
            prev = id;
        }
    }

    #[test]
    #[should_panic]
    fn node_id_out_of_range_panics() {
        let _ = BatchIdGenerator::new(NODE_MAX + 1);
    }
}
