//! Reconnection delay calculation.

use unloq_settings::TransportSettings;

/// Exponential reconnection delay with symmetric jitter.
///
/// `min(max_delay, base_delay * 2^attempt) * (1 + (random * 2 - 1) * factor)`,
/// where `random` is in `[0.0, 1.0)`. A factor of 0 makes the delay
/// deterministic.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn reconnect_delay_ms(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    randomization_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms.max(base_delay_ms));
    if randomization_factor <= 0.0 {
        return capped;
    }

    let factor = randomization_factor.min(1.0);
    let jitter = 1.0 + (random * 2.0 - 1.0) * factor;
    ((capped as f64) * jitter).round().max(0.0) as u64
}

/// Delay before reconnection attempt `attempt` (zero-based).
pub fn next_delay_ms(settings: &TransportSettings, attempt: u32) -> u64 {
    let random = if settings.randomization_factor > 0.0 {
        rand::random::<f64>()
    } else {
        0.0
    };
    reconnect_delay_ms(
        attempt,
        settings.reconnection_delay_ms,
        settings.reconnection_delay_max_ms,
        settings.randomization_factor,
        random,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        assert_eq!(reconnect_delay_ms(0, 2000, 5000, 0.0, 0.5), 2000);
        assert_eq!(reconnect_delay_ms(1, 2000, 5000, 0.0, 0.5), 4000);
        assert_eq!(reconnect_delay_ms(2, 2000, 5000, 0.0, 0.5), 5000);
        assert_eq!(reconnect_delay_ms(40, 2000, 5000, 0.0, 0.5), 5000);
    }

    #[test]
    fn max_below_base_uses_base() {
        assert_eq!(reconnect_delay_ms(3, 2000, 100, 0.0, 0.0), 2000);
    }

    #[test]
    fn jitter_is_symmetric() {
        assert_eq!(reconnect_delay_ms(0, 1000, 5000, 0.5, 0.0), 500);
        assert_eq!(reconnect_delay_ms(0, 1000, 5000, 0.5, 0.5), 1000);
        assert_eq!(reconnect_delay_ms(0, 1000, 5000, 0.5, 1.0), 1500);
    }

    #[test]
    fn enforced_settings_are_deterministic() {
        let settings = TransportSettings::default();
        assert_eq!(next_delay_ms(&settings, 0), 2000);
        assert_eq!(next_delay_ms(&settings, 1), 4000);
        assert_eq!(next_delay_ms(&settings, 5), 5000);
    }
}
