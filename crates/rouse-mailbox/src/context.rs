// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! One context: a locked mailbox, a wakeup, a quit flag.
//!
//! Any thread pushes; exactly one worker thread pops and processes.
//! The mailbox lock is held for a single append or a single pop, never
//! while an item is processed, and never while the wakeup is raised.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rouse_wakeup::{Wakeup, WakeupError};

use crate::token::{ContextId, Token};

/// A closure queued for the context's bound worker.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queues behind the mailbox lock: routed tokens and invoked jobs.
struct Mailbox {
    tokens: VecDeque<Token>,
    jobs: VecDeque<Job>,
}

/// An independent unit of sequential processing.
///
/// Producers append to the mailbox and raise the wakeup; the one
/// worker bound to the context drains it. The quit flag asks that
/// worker to exit once its current drain finds nothing more to do.
pub struct Context {
    id: ContextId,
    mailbox: Mutex<Mailbox>,
    wakeup: Wakeup,
    quit: AtomicBool,
}

impl Context {
    pub(crate) fn new(id: ContextId) -> Result<Self, WakeupError> {
        Ok(Self {
            id,
            mailbox: Mutex::new(Mailbox {
                tokens: VecDeque::new(),
                jobs: VecDeque::new(),
            }),
            wakeup: Wakeup::new()?,
            quit: AtomicBool::new(false),
        })
    }

    /// Index of this context within its mesh.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Queue a token routed to this context and wake the worker.
    ///
    /// The wakeup is raised only after the lock is released, so a
    /// consumer woken by it always finds the token already visible. A
    /// token whose owner is not this context is a routing defect and
    /// aborts the process.
    pub(crate) fn push_token(&self, token: Token) {
        assert_eq!(
            token.owner(),
            Some(self.id),
            "token pushed onto a context it was not routed to",
        );
        {
            let mut mailbox = self.mailbox.lock().unwrap();
            mailbox.tokens.push_back(token);
        }
        self.wakeup.signal();
    }

    /// Queue `f` to run on this context's worker thread.
    ///
    /// Callable from any thread, the context's own worker included.
    /// Jobs run in queue order, before any tokens drained in the same
    /// pass.
    pub fn invoke<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut mailbox = self.mailbox.lock().unwrap();
            mailbox.jobs.push_back(Box::new(f));
        }
        self.wakeup.signal();
    }

    /// Pop one token, holding the lock only for the pop.
    pub(crate) fn try_pop_token(&self) -> Option<Token> {
        self.mailbox.lock().unwrap().tokens.pop_front()
    }

    /// Pop one job, holding the lock only for the pop.
    pub(crate) fn try_pop_job(&self) -> Option<Job> {
        self.mailbox.lock().unwrap().jobs.pop_front()
    }

    /// Ask the worker to exit once it has drained its mailbox.
    pub(crate) fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
        self.wakeup.signal();
    }

    /// Whether quit has been requested.
    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    /// Whether both queues are empty at this instant.
    pub fn is_empty(&self) -> bool {
        let mailbox = self.mailbox.lock().unwrap();
        mailbox.tokens.is_empty() && mailbox.jobs.is_empty()
    }

    pub(crate) fn wakeup(&self) -> &Wakeup {
        &self.wakeup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_wakes_and_pop_drains() {
        let ctx = Context::new(0).unwrap();
        let mut token = Token::new(5);
        token.hop(0);
        ctx.push_token(token);

        assert!(ctx.wakeup().is_signaled());
        assert!(!ctx.is_empty());

        let popped = ctx.try_pop_token().unwrap();
        assert_eq!(popped.owner(), Some(0));
        assert_eq!(popped.ttl(), 4);
        assert!(ctx.is_empty());
        assert!(ctx.try_pop_token().is_none());
    }

    #[test]
    #[should_panic(expected = "not routed")]
    fn push_of_foreign_token_panics() {
        let ctx = Context::new(3).unwrap();
        let mut token = Token::new(5);
        token.hop(1);
        ctx.push_token(token);
    }

    #[test]
    #[should_panic(expected = "not routed")]
    fn push_of_unrouted_token_panics() {
        let ctx = Context::new(0).unwrap();
        ctx.push_token(Token::new(5));
    }

    #[test]
    fn invoke_queues_a_job() {
        let ctx = Context::new(0).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        ctx.invoke(move || tx.send(7).unwrap());
        assert!(ctx.wakeup().is_signaled());
        assert!(!ctx.is_empty());

        let job = ctx.try_pop_job().unwrap();
        job();
        assert_eq!(rx.try_recv().unwrap(), 7);
        assert!(ctx.is_empty());
    }

    #[test]
    fn tokens_pop_in_push_order() {
        let ctx = Context::new(0).unwrap();
        for ttl in [3u32, 5, 7] {
            let mut t = Token::new(ttl);
            t.hop(0);
            ctx.push_token(t);
        }
        assert_eq!(ctx.try_pop_token().unwrap().ttl(), 2);
        assert_eq!(ctx.try_pop_token().unwrap().ttl(), 4);
        assert_eq!(ctx.try_pop_token().unwrap().ttl(), 6);
    }

    #[test]
    fn quit_flag_latches_and_signals() {
        let ctx = Context::new(0).unwrap();
        assert!(!ctx.quit_requested());
        ctx.request_quit();
        assert!(ctx.quit_requested());
        assert!(ctx.wakeup().is_signaled());
    }
}
