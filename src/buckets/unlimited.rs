use super::{BoxFuture, Bucket};
use crate::{validate, Result};

/// Bucket that never runs out of tokens.
///
/// Since it is never scarce, it never refills either: waiting for a refill
/// never completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnlimitedBucket;

impl UnlimitedBucket {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Bucket for UnlimitedBucket {
    fn wait_for_refill(&self) -> BoxFuture<'_, ()> {
        Box::pin(std::future::pending())
    }

    fn can_acquire(&self, tokens: f64) -> bool {
        validate::tokens(tokens).is_ok()
    }

    fn acquire(&self, tokens: f64) -> Result<()> {
        validate::tokens(tokens)
    }
}
