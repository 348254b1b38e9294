use rand::seq::SliceRandom;
use rand::Rng;

use crate::state::Participant;

/// Draws `min(requested, participants.len())` distinct participants, each with
/// equal probability, without replacement. No participants, no winners.
pub fn select_winners<R: Rng + ?Sized>(
    participants: &[Participant],
    requested: i64,
    rng: &mut R,
) -> Vec<Participant> {
    let count = usize::try_from(requested)
        .unwrap_or(0)
        .min(participants.len());
    participants.choose_multiple(rng, count).cloned().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn pool(n: i64) -> Vec<Participant> {
        (1..=n)
            .map(|user_id| Participant {
                id: user_id,
                user_id,
                display_name: None,
                drawing_id: 1,
            })
            .collect()
    }

    #[test]
    fn size_is_min_of_requested_and_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(select_winners(&pool(5), 2, &mut rng).len(), 2);
        assert_eq!(select_winners(&pool(3), 10, &mut rng).len(), 3);
        assert!(select_winners(&pool(0), 3, &mut rng).is_empty());
    }

    #[test]
    fn winners_are_distinct_members_of_the_pool() {
        let mut rng = StdRng::seed_from_u64(11);
        let participants = pool(20);
        for _ in 0..200 {
            let winners = select_winners(&participants, 7, &mut rng);
            let ids: HashSet<_> = winners.iter().map(|w| w.user_id).collect();
            assert_eq!(ids.len(), 7);
            assert!(ids.iter().all(|id| (1..=20).contains(id)));
        }
    }

    #[test]
    fn selection_frequency_converges_to_k_over_n() {
        const TRIALS: usize = 20_000;
        let (n, k) = (5_i64, 2_i64);
        let participants = pool(n);
        let mut rng = StdRng::seed_from_u64(2024);
        let mut hits = vec![0_usize; n as usize];

        for _ in 0..TRIALS {
            for winner in select_winners(&participants, k, &mut rng) {
                hits[(winner.user_id - 1) as usize] += 1;
            }
        }

        let expected = k as f64 / n as f64;
        for (index, count) in hits.iter().enumerate() {
            let observed = *count as f64 / TRIALS as f64;
            assert!(
                (observed - expected).abs() < 0.02,
                "participant {} selected with frequency {observed}, expected {expected}",
                index + 1
            );
        }
    }
}
