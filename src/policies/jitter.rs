//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] randomizes backoff delays so that workers failing together (a device
//! dropping off the bus, a shared driver restarting) do not retry in lockstep.
//!
//! Every policy maps the nominal delay of a retry to an inclusive window, and the actual sleep
//! is drawn uniformly from it:
//!
//! | Policy         | Window                                   |
//! |----------------|------------------------------------------|
//! | `None`         | `[nominal, nominal]`                     |
//! | `Full`         | `[0, nominal]`                           |
//! | `Equal`        | `[nominal / 2, nominal]`                 |
//! | `Decorrelated` | `[floor, min(nominal × 3, cap)]`         |

use std::time::Duration;

use rand::Rng;

/// Policy controlling randomization of retry delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Sleep exactly the backoff delay.
    #[default]
    None,

    /// Anywhere between no wait and the backoff delay.
    Full,

    /// At least half the backoff delay; keeps roughly three quarters of it on average.
    Equal,

    /// Between the policy floor and three times the backoff delay, capped.
    Decorrelated,
}

impl JitterPolicy {
    /// Inclusive bounds of the sleep before a retry whose backoff delay is `nominal`.
    ///
    /// `floor` and `cap` only bound the `Decorrelated` window.
    pub fn window(
        self,
        nominal: Duration,
        floor: Duration,
        cap: Duration,
    ) -> (Duration, Duration) {
        match self {
            JitterPolicy::None => (nominal, nominal),
            JitterPolicy::Full => (Duration::ZERO, nominal),
            JitterPolicy::Equal => (nominal / 2, nominal),
            JitterPolicy::Decorrelated => {
                let upper = nominal.saturating_mul(3).min(cap).max(floor);
                (floor, upper)
            }
        }
    }

    /// Draws the sleep before a retry from [`window`](Self::window).
    pub fn sample<R>(
        self,
        nominal: Duration,
        floor: Duration,
        cap: Duration,
        rng: &mut R,
    ) -> Duration
    where
        R: Rng + ?Sized,
    {
        let (lower, upper) = self.window(nominal, floor, cap);
        if lower >= upper {
            return upper;
        }
        rng.random_range(lower..=upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const FLOOR: Duration = Duration::from_millis(100);
    const CAP: Duration = Duration::from_secs(30);

    #[test]
    fn test_windows() {
        let d = Duration::from_millis(800);
        assert_eq!(JitterPolicy::None.window(d, FLOOR, CAP), (d, d));
        assert_eq!(JitterPolicy::Full.window(d, FLOOR, CAP), (Duration::ZERO, d));
        assert_eq!(
            JitterPolicy::Equal.window(d, FLOOR, CAP),
            (Duration::from_millis(400), d)
        );
        assert_eq!(
            JitterPolicy::Decorrelated.window(d, FLOOR, CAP),
            (FLOOR, Duration::from_millis(2_400))
        );
        assert_eq!(
            JitterPolicy::Decorrelated.window(Duration::from_secs(20), FLOOR, CAP),
            (FLOOR, CAP)
        );
    }

    #[test]
    fn test_degenerate_windows_return_the_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            JitterPolicy::Full.sample(Duration::ZERO, FLOOR, CAP, &mut rng),
            Duration::ZERO
        );
        assert_eq!(
            JitterPolicy::Decorrelated.sample(Duration::ZERO, FLOOR, CAP, &mut rng),
            FLOOR
        );
    }

    #[test]
    fn test_samples_stay_in_window() {
        let mut rng = StdRng::seed_from_u64(42);
        let nominal = Duration::from_millis(250);
        for policy in [
            JitterPolicy::None,
            JitterPolicy::Full,
            JitterPolicy::Equal,
            JitterPolicy::Decorrelated,
        ] {
            let (lower, upper) = policy.window(nominal, FLOOR, CAP);
            for _ in 0..200 {
                let d = policy.sample(nominal, FLOOR, CAP, &mut rng);
                assert!(lower <= d && d <= upper, "{policy:?}: {d:?}");
            }
        }
    }
}
