use std::time::Duration;

/// Delay before reconnect attempt number `attempt` (0-based):
/// `min(base * 2^attempt, max)`.
pub fn reconnect_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(max)
}
