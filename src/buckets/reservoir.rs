use crate::{validate, Error, Result};

/// Token accounting shared by the windowed buckets.
///
/// The balance never exceeds the capacity. It only drops below zero after the
/// capacity shrank below the amount currently consumed, in which case nothing
/// can be acquired until refills catch up.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenReservoir {
    tokens: f64,
    capacity: f64,
}

impl TokenReservoir {
    /// Creates a full reservoir.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `capacity` is not strictly positive.
    pub fn new(capacity: f64) -> Result<Self> {
        validate::capacity(capacity)?;
        Ok(Self {
            tokens: capacity,
            capacity,
        })
    }

    #[must_use]
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    #[must_use]
    pub fn can_acquire(&self, tokens: f64) -> bool {
        validate::tokens(tokens).is_ok() && tokens <= self.tokens
    }

    /// Removes `tokens` from the balance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimit`] if the balance is too low and
    /// [`Error::InvalidArgument`] for a negative amount.
    pub fn take(&mut self, tokens: f64) -> Result<()> {
        validate::tokens(tokens)?;
        if tokens > self.tokens {
            return Err(Error::RateLimit { tokens });
        }
        self.tokens -= tokens;
        Ok(())
    }

    /// Adds previously consumed tokens back.
    pub fn give_back(&mut self, tokens: f64) {
        self.tokens = (self.tokens + tokens).min(self.capacity);
    }

    /// Resets the balance to the full capacity.
    pub fn fill(&mut self) {
        self.tokens = self.capacity;
    }

    /// Changes the capacity, moving the balance by the same delta.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `new_capacity` is not strictly positive.
    pub fn update_capacity(&mut self, new_capacity: f64) -> Result<()> {
        validate::capacity(new_capacity)?;
        self.tokens += new_capacity - self.capacity;
        self.capacity = new_capacity;
        Ok(())
    }
}
