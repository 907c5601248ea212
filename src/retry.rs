use anyhow::{Result, anyhow};
use log::{debug, warn};
use std::time::{Duration, Instant};

/// Polls `check` until it yields a value or `timeout` is reached.
///
/// The closure should return:
/// - `Ok(Some(_))` once the resource is ready
/// - `Ok(None)` if it should be checked again
/// - `Err(_)` to fail immediately (no retry)
///
/// `check` always runs at least once, even with a zero timeout.
pub fn poll_until<T, F>(what: &str, timeout: Duration, interval: Duration, mut check: F) -> Result<T>
where
    F: FnMut() -> Result<Option<T>>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!("[poll] checking {} (attempt {})", what, attempt);

        match check() {
            Ok(Some(value)) => {
                debug!(
                    "[poll] {} ready after {}ms (attempt {})",
                    what,
                    started.elapsed().as_millis(),
                    attempt
                );
                return Ok(value);
            }
            Ok(None) => {
                if started.elapsed() >= timeout {
                    warn!(
                        "[poll] {} not ready after {}ms (attempt {})",
                        what,
                        started.elapsed().as_millis(),
                        attempt
                    );
                    return Err(anyhow!(
                        "{} not ready: timeout after {}ms",
                        what,
                        started.elapsed().as_millis()
                    ));
                }

                let remaining = timeout.saturating_sub(started.elapsed());
                debug!(
                    "[poll] {} not ready, waiting {}ms before next check ({}ms remaining)",
                    what,
                    interval.as_millis(),
                    remaining.as_millis()
                );
                std::thread::sleep(interval.min(remaining));
            }
            Err(e) => {
                warn!("[poll] checking {} failed: {}", what, e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn returns_immediately_when_ready() {
        let calls = Cell::new(0);
        let result = poll_until("cert", Duration::from_secs(5), Duration::from_millis(100), || {
            calls.set(calls.get() + 1);
            Ok(Some(42))
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn polls_until_ready() {
        let calls = Cell::new(0);
        let result = poll_until("cert", Duration::from_secs(2), Duration::from_millis(10), || {
            calls.set(calls.get() + 1);
            Ok((calls.get() >= 3).then_some("ready"))
        });
        assert_eq!(result.unwrap(), "ready");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn zero_timeout_checks_once() {
        let calls = Cell::new(0);
        let result: Result<()> = poll_until("cert", Duration::ZERO, Duration::from_millis(10), || {
            calls.set(calls.get() + 1);
            Ok(None)
        });
        assert!(result.unwrap_err().to_string().contains("timeout"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn fails_immediately_on_error() {
        let calls = Cell::new(0);
        let result: Result<()> = poll_until("cert", Duration::from_secs(5), Duration::from_millis(100), || {
            calls.set(calls.get() + 1);
            Err(anyhow!("listing failed"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
