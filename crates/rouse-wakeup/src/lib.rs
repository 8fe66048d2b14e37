// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Coalescing cross-thread wakeup primitive.
//!
//! A `Wakeup` is a level-triggered, pollable signal. Any number of
//! threads raise it; one consumer waits on it. Signals coalesce: the
//! consumer learns that something happened, never how many times, and
//! a single acknowledge clears them all.
//!
//! Components:
//! - wakeup — the signal/acknowledge primitive (eventfd, pipe fallback)
//! - poll — thin poll(2) wrapper for readiness waits
//! - wait — block until a predicate holds or a deadline passes

pub mod poll;
pub mod wait;
pub mod wakeup;

pub use wakeup::{Wakeup, WakeupError};
