//! Per-session question order.
//!
//! Each session sees the questions in its own shuffled order, and the same
//! order every time it asks. Scoring never depends on this order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over the bytes of the session id. Stable across runs and builds.
pub fn session_seed(session_id: &str) -> u64 {
    session_id.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Shuffle `question_numbers` with a generator seeded from the session id.
pub fn question_order(session_id: &str, question_numbers: &[u32]) -> Vec<u32> {
    let mut order = question_numbers.to_vec();
    let mut rng = StdRng::seed_from_u64(session_seed(session_id));
    order.shuffle(&mut rng);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions() -> Vec<u32> {
        (1..=200).collect()
    }

    #[test]
    fn same_session_same_order() {
        assert_eq!(
            question_order("session-42", &questions()),
            question_order("session-42", &questions())
        );
    }

    #[test]
    fn order_is_a_permutation() {
        let mut order = question_order("abc", &questions());
        assert_ne!(order, questions());
        order.sort_unstable();
        assert_eq!(order, questions());
    }

    #[test]
    fn different_sessions_differ() {
        assert_ne!(
            question_order("session-1", &questions()),
            question_order("session-2", &questions())
        );
    }

    #[test]
    fn seed_is_fnv1a() {
        assert_eq!(session_seed(""), FNV_OFFSET);
        assert_eq!(session_seed("a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn empty_and_single_inputs() {
        assert!(question_order("x", &[]).is_empty());
        assert_eq!(question_order("x", &[7]), vec![7]);
    }
}
