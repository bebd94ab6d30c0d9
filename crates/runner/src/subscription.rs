//! Explicit subscription handles
//!
//! Every notification stream the runner listens to is represented by a
//! [`Subscription`]: the token the collaborator handed out plus the action
//! that cancels it. Subscriptions are grouped into a [`SubscriptionSet`] that
//! is released wholesale, never implicitly on drop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle identifying one subscription at its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    /// Wrap a raw token value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw token value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Monotonic token allocator for notification sources.
#[derive(Debug)]
pub struct TokenAllocator {
    next: AtomicU64,
}

impl TokenAllocator {
    /// Create an allocator starting at 1
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Hand out a token never returned before by this allocator
    pub fn allocate(&self) -> SubscriptionToken {
        SubscriptionToken(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TokenAllocator {
    fn default() -> Self {
        Self::new()
    }
}

type CancelFn = Box<dyn FnOnce(SubscriptionToken) + Send>;

/// A live subscription and the means to cancel it.
pub struct Subscription {
    token: SubscriptionToken,
    cancel: CancelFn,
}

impl Subscription {
    /// Pair a token with the action that releases it at the source
    pub fn new<F>(token: SubscriptionToken, cancel: F) -> Self
    where
        F: FnOnce(SubscriptionToken) + Send + 'static,
    {
        Self {
            token,
            cancel: Box::new(cancel),
        }
    }

    /// Token issued by the source
    pub fn token(&self) -> SubscriptionToken {
        self.token
    }

    /// Cancel at the source, consuming the handle
    pub fn cancel(self) {
        (self.cancel)(self.token);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Owned group of subscriptions released together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a subscription
    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Tokens currently held, in subscription order
    pub fn tokens(&self) -> Vec<SubscriptionToken> {
        self.subscriptions.iter().map(Subscription::token).collect()
    }

    /// Cancel every subscription, newest first, and empty the set.
    ///
    /// Returns how many were released; zero on an empty set.
    pub fn release_all(&mut self) -> usize {
        let released = self.subscriptions.len();
        while let Some(subscription) = self.subscriptions.pop() {
            subscription.cancel();
        }
        released
    }
}
