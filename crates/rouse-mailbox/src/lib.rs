// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Token-passing mailboxes over coalescing wakeups.
//!
//! A mesh of contexts, each owning a locked mailbox and a wakeup, each
//! drained by one dedicated worker thread. Tokens hop between randomly
//! chosen contexts until their TTL runs out; the mesh raises a
//! completion signal when the last token retires. Any thread may push
//! into any mailbox; only the bound worker pops.
//!
//! Components:
//! - token — the routed unit of work (owner + TTL)
//! - context — mailbox + wakeup + quit flag
//! - mesh — worker threads, routing, dispatch/quiesce/shutdown
//! - singleton — refcounted lazily-created shared resource

pub mod context;
pub mod mesh;
pub mod singleton;
pub mod token;

mod rng;

pub use context::Context;
pub use mesh::Mesh;
pub use token::{ContextId, Token};
