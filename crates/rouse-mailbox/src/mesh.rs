// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Mesh: contexts, their worker threads, and routing.
//!
//! One OS thread per context. A worker sleeps on its context's wakeup,
//! acknowledges, drains the mailbox, and re-checks the quit flag only
//! after a full drain, so quitting always leaves an empty mailbox
//! behind. Tokens hop to uniformly random contexts (the sender
//! included) until their TTL runs out; the last retirement raises the
//! mesh-wide done signal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::debug;
use rouse_wakeup::wait::wait_until;
use rouse_wakeup::{Wakeup, WakeupError};

use crate::context::Context;
use crate::rng::{seed_for_worker, seed_from_clock, xorshift64};
use crate::token::{ContextId, Token};

/// State shared between the workers and the coordinator.
struct MeshState {
    /// All contexts, indexed by id.
    contexts: Vec<Context>,
    /// Tokens dispatched and not yet retired.
    alive: AtomicUsize,
    /// Raised once per transition of `alive` to zero.
    done: Wakeup,
}

impl MeshState {
    /// Route a token: retire it at TTL zero, otherwise spend one hop
    /// and push it to a uniformly random context, the sender included.
    fn route(&self, mut token: Token, rng: &mut u64) {
        if token.ttl() == 0 {
            self.retire();
            return;
        }
        let victim = (xorshift64(rng) as usize) % self.contexts.len();
        token.hop(victim);
        self.contexts[victim].push_token(token);
    }

    /// Account one retired token. The decrement's return value lets
    /// exactly one retirement observe the transition to zero and raise
    /// the done signal.
    fn retire(&self) {
        let prev = self.alive.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            self.done.signal();
        }
    }
}

/// A fixed set of contexts with one worker thread each.
///
/// The coordinator injects tokens with `dispatch`, waits for them all
/// to retire with `wait_idle`, and tears the mesh down with
/// `shutdown`. Shutdown asserts that every mailbox is empty; request
/// it only once routing has quiesced.
pub struct Mesh {
    state: Arc<MeshState>,
    workers: Vec<thread::JoinHandle<()>>,
    /// Coordinator-side routing state for `dispatch`.
    rng: Mutex<u64>,
}

impl Mesh {
    /// Start a mesh with `n` contexts, one worker thread each.
    ///
    /// If `n` is 0, defaults to the number of available CPU cores.
    pub fn new(n: usize) -> Result<Self, WakeupError> {
        let count = if n == 0 {
            thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        } else {
            n
        };

        let mut contexts = Vec::with_capacity(count);
        for id in 0..count {
            contexts.push(Context::new(id)?);
        }

        let state = Arc::new(MeshState {
            contexts,
            alive: AtomicUsize::new(0),
            done: Wakeup::new()?,
        });

        debug!("mesh: starting {} workers", count);

        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            let state = state.clone();
            workers.push(
                thread::Builder::new()
                    .name(format!("mesh-worker-{}", id))
                    .spawn(move || {
                        CURRENT_CONTEXT.with(|cell| cell.set(Some(id)));
                        worker_loop(id, &state);
                    })
                    .expect("failed to spawn mesh worker thread"),
            );
        }

        Ok(Self {
            state,
            workers,
            rng: Mutex::new(seed_from_clock()),
        })
    }

    /// Inject one token with `ttl` hops to live.
    ///
    /// The token counts as alive until it retires. A zero TTL retires
    /// on the spot: the token is never routed to any context.
    pub fn dispatch(&self, ttl: u32) {
        self.state.alive.fetch_add(1, Ordering::AcqRel);
        let mut rng = self.rng.lock().unwrap();
        self.state.route(Token::new(ttl), &mut rng);
    }

    /// Block until every dispatched token has retired.
    ///
    /// A predicate wait on the done signal, so it is also correct for
    /// a mesh that is already idle and after a completion signal was
    /// consumed by an earlier waiter.
    pub fn wait_idle(&self) {
        wait_until(&self.state.done, None, || self.tokens_alive() == 0);
    }

    /// Bounded `wait_idle`. Returns whether the mesh went idle in time.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        wait_until(&self.state.done, Some(timeout), || self.tokens_alive() == 0)
    }

    /// Tokens dispatched and not yet retired.
    pub fn tokens_alive(&self) -> usize {
        self.state.alive.load(Ordering::Acquire)
    }

    /// The context at `id`. Panics when out of range.
    pub fn context(&self, id: ContextId) -> &Context {
        &self.state.contexts[id]
    }

    /// All contexts, indexed by id.
    pub fn contexts(&self) -> &[Context] {
        &self.state.contexts
    }

    /// Ask every worker to quit, join them, then check what teardown
    /// is entitled to: every mailbox empty, every quit flag still set.
    ///
    /// Call after routing has quiesced (`wait_idle`); pushes racing a
    /// shutdown trip the teardown asserts. Idempotent.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        debug!("mesh: shutting down {} workers", self.workers.len());

        for ctx in &self.state.contexts {
            ctx.request_quit();
        }
        for handle in self.workers.drain(..) {
            handle.join().expect("mesh worker panicked");
        }
        for ctx in &self.state.contexts {
            assert!(ctx.is_empty(), "mailbox still holds mail after shutdown");
            assert!(ctx.quit_requested());
        }
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        // Skip during unwind: the mesh may be mid-flight and the
        // teardown asserts would turn one failure into an abort.
        //
        // Shutdown joins the workers, so a mesh shared through an Arc
        // must not lose its last handle on one of its own workers.
        if !std::thread::panicking() {
            self.shutdown();
        }
    }
}

/// Worker main loop: one per context, exits on the quit flag.
fn worker_loop(id: ContextId, state: &MeshState) {
    let mut rng = seed_for_worker(id);
    let ctx = &state.contexts[id];

    while !ctx.quit_requested() {
        ctx.wakeup().wait();
        // Acknowledge before draining. An item pushed mid-drain raises
        // a fresh wakeup and the next wait returns at once;
        // acknowledging after the drain could eat that signal and
        // sleep over a non-empty mailbox. The mailbox lock, not the
        // wakeup, decides whether work remains.
        ctx.wakeup().acknowledge();

        while let Some(job) = ctx.try_pop_job() {
            job();
        }
        while let Some(token) = ctx.try_pop_token() {
            assert_eq!(
                token.owner(),
                Some(id),
                "popped a token owned by another context",
            );
            state.route(token, &mut rng);
        }
    }
}

/// Id of the context bound to the calling worker thread.
///
/// `None` on threads that are not mesh workers, the coordinator
/// included. Lets a job observe which logical context it landed on.
pub fn current_context() -> Option<ContextId> {
    CURRENT_CONTEXT.with(|cell| cell.get())
}

thread_local! {
    static CURRENT_CONTEXT: std::cell::Cell<Option<ContextId>> = std::cell::Cell::new(None);
}
