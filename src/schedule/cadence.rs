use chrono::{DateTime, Utc};
use tokio::time::sleep;

/// Next epoch-aligned multiple of `interval_secs` strictly after `now`
///
/// With a 300s interval and `now` at 12:06:10 this returns 12:10:00.
/// Sub-second precision is kept so a call made exactly on a boundary
/// targets the following one.
pub fn next_boundary(now: DateTime<Utc>, interval_secs: u64) -> DateTime<Utc> {
    let interval_us = interval_secs.max(1) as i64 * 1_000_000;
    let now_us = now.timestamp_micros();
    let previous = now_us - now_us.rem_euclid(interval_us);

    DateTime::from_timestamp_micros(previous + interval_us).unwrap_or(now)
}

/// Sleep until the next interval boundary on the wall clock
///
/// The target is re-derived from the current time on every call, so time
/// spent processing a frame never shifts the alignment of later frames.
pub async fn wait_for_next_boundary(interval_secs: u64) -> DateTime<Utc> {
    let now = Utc::now();
    let target = next_boundary(now, interval_secs);
    let delay = (target - now).to_std().unwrap_or_default();

    tracing::debug!("Sleeping {:?} until {}", delay, target.format("%H:%M:%S"));
    sleep(delay).await;

    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_boundary_aligns_to_interval() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 6, 10).unwrap();
        let next = next_boundary(now, 300);

        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap());
    }

    #[test]
    fn test_exact_boundary_moves_to_following_one() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap();
        let next = next_boundary(now, 60);

        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 12, 11, 0).unwrap());
    }

    #[test]
    fn test_processing_delay_does_not_shift_alignment() {
        // A frame that ran 17s past its boundary still lands on the next one
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 12, 11, 17).unwrap();
        let next = next_boundary(late, 60);

        assert_eq!(next.timestamp() % 60, 0);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 12, 12, 0).unwrap());
    }

    #[test]
    fn test_one_second_interval() {
        let now = Utc.timestamp_micros(1_700_000_000_250_000).unwrap();
        let next = next_boundary(now, 1);

        assert_eq!(next.timestamp_micros(), 1_700_000_001_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_aligned_target() {
        let target = wait_for_next_boundary(60).await;
        assert_eq!(target.timestamp_micros() % 60_000_000, 0);
    }
}
