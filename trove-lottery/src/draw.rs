//! Weighted payout-order draw.
//!
//! Every entrant is expanded into as many tickets as their slot weight and
//! the resulting multiset is shuffled with Fisher-Yates, so each ticket is
//! equally likely to land in any position. The first ticket wins the round.

use crate::{LotteryError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use trove_core::GroupMember;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    pub member_id: String,
    pub weight: u32,
}

impl Entrant {
    pub fn new(member_id: impl Into<String>, weight: u32) -> Self {
        Self {
            member_id: member_id.into(),
            weight: weight.max(1),
        }
    }
}

impl From<&GroupMember> for Entrant {
    fn from(member: &GroupMember) -> Self {
        Entrant::new(member.member_id.clone(), member.weight())
    }
}

/// Entrants for confirmed members, weighted by their current slots.
/// Members who left the roster since confirming keep a single ticket.
pub fn confirmed_entrants(confirmed: &[String], roster: &[GroupMember]) -> Vec<Entrant> {
    confirmed
        .iter()
        .map(|id| {
            let weight = roster
                .iter()
                .find(|m| &m.member_id == id)
                .map(GroupMember::weight)
                .unwrap_or(1);
            Entrant::new(id.clone(), weight)
        })
        .collect()
}

pub fn weighted_draw(entrants: &[Entrant]) -> Result<Vec<String>> {
    weighted_draw_with(entrants, &mut rand::thread_rng())
}

pub fn weighted_draw_with<R: Rng + ?Sized>(entrants: &[Entrant], rng: &mut R) -> Result<Vec<String>> {
    if entrants.is_empty() {
        return Err(LotteryError::NoConfirmedMembers);
    }

    let mut pool: Vec<String> = entrants
        .iter()
        .flat_map(|e| std::iter::repeat(e.member_id.clone()).take(e.weight as usize))
        .collect();

    pool.shuffle(rng);
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn counts(order: &[String]) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for id in order {
            *counts.entry(id.as_str()).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_each_member_appears_weight_times() {
        let entrants = vec![
            Entrant::new("a", 2),
            Entrant::new("b", 1),
            Entrant::new("c", 1),
        ];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let order = weighted_draw_with(&entrants, &mut rng).unwrap();
            assert_eq!(order.len(), 4);
            let counts = counts(&order);
            assert_eq!(counts["a"], 2);
            assert_eq!(counts["b"], 1);
            assert_eq!(counts["c"], 1);
        }
    }

    #[test]
    fn test_single_member_gets_all_tickets() {
        let order = weighted_draw(&[Entrant::new("solo", 3)]).unwrap();
        assert_eq!(order, vec!["solo", "solo", "solo"]);
    }

    #[test]
    fn test_empty_draw_rejected() {
        assert!(matches!(
            weighted_draw(&[]),
            Err(LotteryError::NoConfirmedMembers)
        ));
    }

    #[test]
    fn test_zero_weight_counts_as_one() {
        assert_eq!(Entrant::new("a", 0).weight, 1);
    }

    #[test]
    fn test_winner_frequency_tracks_weight() {
        // a holds half the tickets, so it should win roughly half the draws
        let entrants = vec![
            Entrant::new("a", 2),
            Entrant::new("b", 1),
            Entrant::new("c", 1),
        ];
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 4000;
        let mut wins = 0;
        for _ in 0..trials {
            if weighted_draw_with(&entrants, &mut rng).unwrap()[0] == "a" {
                wins += 1;
            }
        }
        let share = wins as f64 / trials as f64;
        assert!((0.45..0.55).contains(&share), "share was {}", share);
    }

    #[test]
    fn test_confirmed_entrants_uses_roster_weights() {
        let roster = vec![
            GroupMember {
                member_id: "a".into(),
                display_name: None,
                slots: Some(2),
            },
            GroupMember {
                member_id: "b".into(),
                display_name: None,
                slots: None,
            },
        ];
        let confirmed = vec!["a".to_string(), "gone".to_string()];

        let entrants = confirmed_entrants(&confirmed, &roster);
        assert_eq!(entrants, vec![Entrant::new("a", 2), Entrant::new("gone", 1)]);
    }
}
