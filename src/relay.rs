use crate::{CancelToken, VolumetricWaterContent};

use std::{
    io, thread,
    time::{Duration, Instant},
};

/// GPIO-like digital output driving one irrigation relay.
///
/// HIGH energizes the relay (valve/pump on), LOW releases it.
pub trait RelayOutput {
    fn set_high(&mut self) -> io::Result<()>;
    fn set_low(&mut self) -> io::Result<()>;
}

/// Strict-inequality irrigation decision: exactly at the threshold,
/// irrigation does not trigger.
pub fn needs_irrigation(vwc: VolumetricWaterContent, threshold: VolumetricWaterContent) -> bool {
    vwc.as_percent() < threshold.as_percent()
}

/// Poll interval for cancellation while holding a relay HIGH.
const HOLD_SLICE: Duration = Duration::from_millis(100);

/// Releases the relay when dropped, regardless of how the hold ended.
struct LowOnDrop<'a, R: RelayOutput + ?Sized>(&'a mut R);

impl<'a, R: RelayOutput + ?Sized> Drop for LowOnDrop<'a, R> {
    fn drop(&mut self) {
        if let Err(err) = self.0.set_low() {
            log::error!("Failed to release relay: {}", err);
        }
    }
}

/// Energize the relay for `hold`, then release it.
///
/// The hold blocks the calling thread, but polls `cancel` so an interrupt
/// ends it early; the relay is driven LOW on every exit path, including
/// errors and cancellation.
pub fn actuate<R>(relay: &mut R, hold: Duration, cancel: &CancelToken) -> io::Result<()>
where
    R: RelayOutput + ?Sized,
{
    let guard = LowOnDrop(relay);
    guard.0.set_high()?;
    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let elapsed = started.elapsed();
        if elapsed >= hold {
            break;
        }
        thread::sleep((hold - elapsed).min(HOLD_SLICE));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRelay;

    fn percent(value: f64) -> VolumetricWaterContent {
        VolumetricWaterContent::from_percent(value)
    }

    #[test]
    fn decision_is_strictly_below_threshold() {
        assert!(!needs_irrigation(percent(20.0), percent(20.0)));
        assert!(needs_irrigation(percent(19.9), percent(20.0)));
        assert!(!needs_irrigation(percent(20.1), percent(20.0)));
    }

    #[test]
    fn actuate_holds_high_then_releases() {
        let mut relay = MockRelay::default();
        actuate(&mut relay, Duration::from_millis(20), &CancelToken::new()).unwrap();
        assert_eq!(relay.levels, vec![true, false]);
    }

    #[test]
    fn cancellation_cuts_the_hold_short_and_releases() {
        let mut relay = MockRelay::default();
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let started = Instant::now();
        actuate(&mut relay, Duration::from_secs(30), &cancel).unwrap();
        canceller.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(relay.levels, vec![true, false]);
    }

    struct StuckRelay {
        lows: usize,
    }

    impl RelayOutput for StuckRelay {
        fn set_high(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "output stage fault"))
        }

        fn set_low(&mut self) -> io::Result<()> {
            self.lows += 1;
            Ok(())
        }
    }

    #[test]
    fn failed_energize_still_forces_low() {
        let mut relay = StuckRelay { lows: 0 };
        let err = actuate(&mut relay, Duration::from_secs(1), &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(relay.lows, 1);
    }
}
