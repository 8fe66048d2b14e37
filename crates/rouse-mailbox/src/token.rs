// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The routed unit of work.

/// Index of a context within its mesh.
pub type ContextId = usize;

/// A unit of work hopping between contexts until its TTL runs out.
///
/// `owner` names the context the token was last routed to; every push
/// and pop validates it against the context at hand. It is `None` only
/// before the first routing. `ttl` is the number of hops left; the
/// dispatch that finds it at zero retires the token.
#[derive(Debug)]
pub struct Token {
    owner: Option<ContextId>,
    ttl: u32,
}

impl Token {
    /// A token that has not been routed anywhere yet.
    pub fn new(ttl: u32) -> Self {
        Self { owner: None, ttl }
    }

    /// The context this token was last routed to.
    pub fn owner(&self) -> Option<ContextId> {
        self.owner
    }

    /// Hops left before retirement.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Spend one hop: stamp `to` as the owner and decrement the TTL.
    ///
    /// Callers check the TTL first; a token at zero is retired, never
    /// hopped.
    pub fn hop(&mut self, to: ContextId) {
        assert!(self.ttl > 0, "hop on an exhausted token");
        self.owner = Some(to);
        self.ttl -= 1;
    }
}
