use std::future::Future;

use super::{Permit, RateController};
use crate::Result;

/// Rate controller that accepts all requests and does nothing.
///
/// It holds no state, so it can be created wherever a controller is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopController;

impl NoopController {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RateController for NoopController {
    /// Always `true`.
    fn can_acquire(&self, _tokens: f64) -> bool {
        true
    }

    fn request(&self, tokens: f64) -> impl Future<Output = Result<Permit<'_>>> + Send {
        std::future::ready(Ok(Permit::detached(tokens)))
    }
}
