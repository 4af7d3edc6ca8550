//! Reward policy: pure mapping from a task's priority to a reward/penalty
//! magnitude, plus the user-attribute arithmetic shared by the scoring engine
//! and the sweeper.

use crate::model::Priority;

/// Base reward/penalty magnitude for a priority level. Penalties use the
/// same table (symmetric).
pub fn magnitude(priority: Priority) -> i64 {
    match priority {
        Priority::Trivial => 1,
        Priority::Easy => 2,
        Priority::Medium => 5,
        Priority::Hard => 10,
    }
}

/// Coin share of a positive reward: floor(reward / 2).
pub fn coin_share(reward: i64) -> i64 {
    reward / 2
}

/// Health after applying a signed delta, clamped to [0, max_health].
pub fn clamped_health(current: i64, delta: i64, max_health: i64) -> i64 {
    (current + delta).clamp(0, max_health)
}

/// Level derived from accumulated experience.
pub fn level_for(experience: i64) -> i64 {
    1 + experience / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_table() {
        assert_eq!(magnitude(Priority::Trivial), 1);
        assert_eq!(magnitude(Priority::Easy), 2);
        assert_eq!(magnitude(Priority::Medium), 5);
        assert_eq!(magnitude(Priority::Hard), 10);
    }

    #[test]
    fn coin_share_floors() {
        assert_eq!(coin_share(5), 2);
        assert_eq!(coin_share(10), 5);
        assert_eq!(coin_share(1), 0);
    }

    #[test]
    fn health_clamps_at_both_ends() {
        assert_eq!(clamped_health(3, -10, 50), 0);
        assert_eq!(clamped_health(48, 10, 50), 50);
        assert_eq!(clamped_health(25, -5, 50), 20);
    }

    #[test]
    fn level_increases_with_experience() {
        assert_eq!(level_for(0), 1);
        assert_eq!(level_for(99), 1);
        assert_eq!(level_for(100), 2);
        assert_eq!(level_for(1050), 11);
    }
}
