//! Deterministic per-agent jitter (§4.6 step 2, invariant 10 in §8).
//!
//! A stable hash of the agent id is mapped into `[-10_000, 10_000]` so
//! ticks desynchronize across the fleet without needing to persist a
//! per-agent random seed. The same hash construction (truncated SHA-256,
//! grounded on the checksum use in `fleet-migration`) also derives the
//! burst-absorption delay for immediate ticks (§4.6 "a jittered delay of
//! 1-5s"), so neither needs a nondeterministic RNG dependency the teacher
//! workspace does not otherwise carry.

use sha2::{Digest, Sha256};

const JITTER_BOUND_MS: i64 = 10_000;

fn stable_u64(parts: &[&str]) -> u64 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_be_bytes(bytes)
}

/// Deterministic per-agent jitter in `[-10_000, 10_000]` ms.
pub fn jitter_ms(agent_id: &str) -> i64 {
    let span = (2 * JITTER_BOUND_MS + 1) as u64;
    (stable_u64(&[agent_id]) % span) as i64 - JITTER_BOUND_MS
}

/// `nextTickAt` for an agent last ticked at `last_tick_at` (§4.6 step 2).
pub fn next_tick_at(last_tick_at: i64, tick_interval_ms: i64, agent_id: &str) -> i64 {
    last_tick_at + tick_interval_ms + jitter_ms(agent_id)
}

/// Alias read at call sites as "the instant this agent becomes due".
pub fn due_at(last_tick_at: i64, tick_interval_ms: i64, agent_id: &str) -> i64 {
    next_tick_at(last_tick_at, tick_interval_ms, agent_id)
}

/// Deterministic burst-absorption delay in `[min_ms, max_ms]` for a given
/// `(agent_id, channel_id, seq)` triple, so repeated calls for the same
/// mention land on the same delay rather than a fresh random draw each time.
pub fn absorb_delay_ms(agent_id: &str, channel_id: &str, seq: u64, min_ms: u64, max_ms: u64) -> u64 {
    let span = max_ms - min_ms + 1;
    let seq_str = seq.to_string();
    min_ms + (stable_u64(&[agent_id, channel_id, &seq_str]) % span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_deterministic_and_bounded() {
        let a = jitter_ms("alice");
        let b = jitter_ms("alice");
        assert_eq!(a, b);
        assert!(a >= -JITTER_BOUND_MS && a <= JITTER_BOUND_MS);
    }

    #[test]
    fn different_agents_typically_differ() {
        assert_ne!(jitter_ms("alice"), jitter_ms("bob"));
    }

    #[test]
    fn absorb_delay_stays_in_range() {
        for seq in 0..20 {
            let d = absorb_delay_ms("alice", "proj", seq, 1_000, 5_000);
            assert!(d >= 1_000 && d <= 5_000);
        }
    }
}
