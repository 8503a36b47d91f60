//! A pure retry utility: bounded attempts over a backoff delay sequence.
//! Not a framework — just an iterator of durations and a loop.

use std::thread;
use std::time::Duration;

use log::warn;

const INITIAL_DELAY: Duration = Duration::from_millis(10);
const MAX_DELAY: Duration = Duration::from_millis(200);
const MULTIPLIER: f64 = 1.5;
const MAX_ATTEMPTS: u32 = 10;

/// The delay sequence used to retry the inventory promotion step of
/// `store_new_version`: 10ms, growing by 1.5x each attempt, capped at
/// 200ms, for up to 10 attempts total.
fn backoff() -> impl Iterator<Item = Duration> {
    let mut delay = INITIAL_DELAY;
    std::iter::from_fn(move || {
        let current = delay;
        let next = delay.mul_f64(MULTIPLIER);
        delay = next.min(MAX_DELAY);
        Some(current)
    })
    .take(MAX_ATTEMPTS as usize - 1)
}

/// Calls `op` until it succeeds or the backoff sequence is exhausted,
/// sleeping between attempts. Returns the last error if every attempt
/// fails.
pub fn with_backoff<T, E>(description: &str, mut op: impl FnMut() -> Result<T, E>) -> Result<T, E> {
    let mut delays = backoff();
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => match delays.next() {
                Some(delay) => {
                    warn!("Attempt {} of {} failed for {}, retrying in {:?}", attempt, MAX_ATTEMPTS, description, delay);
                    thread::sleep(delay);
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn succeeds_without_retry() {
        let calls = Cell::new(0);
        let result: Result<i32, &str> = with_backoff("test", || {
            calls.set(calls.get() + 1);
            Ok(42)
        });
        assert_eq!(Ok(42), result);
        assert_eq!(1, calls.get());
    }

    #[test]
    fn retries_until_success() {
        let calls = Cell::new(0);
        let result: Result<i32, &str> = with_backoff("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err("not yet")
            } else {
                Ok(7)
            }
        });
        assert_eq!(Ok(7), result);
        assert_eq!(3, calls.get());
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<i32, &str> = with_backoff("test", || {
            calls.set(calls.get() + 1);
            Err("always fails")
        });
        assert_eq!(Err("always fails"), result);
        assert_eq!(MAX_ATTEMPTS, calls.get());
    }

    #[test]
    fn backoff_sequence_starts_at_initial_delay_and_is_capped() {
        let delays: Vec<Duration> = backoff().collect();
        assert_eq!(INITIAL_DELAY, delays[0]);
        assert!(delays.iter().all(|d| *d <= MAX_DELAY));
        assert_eq!(MAX_ATTEMPTS as usize - 1, delays.len());
    }
}
