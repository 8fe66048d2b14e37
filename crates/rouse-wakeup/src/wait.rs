// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Block until a condition holds, with a deadline.
//!
//! `wait_until` folds the poll/acknowledge/re-check loop callers would
//! otherwise hand-roll around a wakeup. The wakeup covers producers
//! that signal after changing the condition; a periodic re-check
//! covers producers that never signal.

use std::time::{Duration, Instant};

use crate::wakeup::Wakeup;

/// Sleep slice between predicate re-checks while no signal arrives.
/// A condition changed without a signal is still noticed within one
/// interval.
pub const RECHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Block until `pred` returns true or `timeout` elapses.
///
/// Returns whether the predicate held before the deadline; `None`
/// waits indefinitely. The predicate is checked before the first
/// sleep, so an already-true condition returns without touching the
/// wakeup.
///
/// Signals arriving on `wakeup` during the wait are consumed. This is
/// a consumer-side call: do not run it concurrently with another
/// waiter on the same wakeup.
pub fn wait_until<P>(wakeup: &Wakeup, timeout: Option<Duration>, mut pred: P) -> bool
where
    P: FnMut() -> bool,
{
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        if pred() {
            return true;
        }

        let mut slice = RECHECK_INTERVAL;
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            slice = slice.min(remaining);
        }

        if wakeup.wait_timeout(slice) {
            wakeup.acknowledge();
        }
    }
}
