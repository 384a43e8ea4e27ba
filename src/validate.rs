//! Argument checks shared by constructors and acquisition paths.

use std::time::Duration;

use crate::{Error, Result};

pub(crate) fn capacity(capacity: f64) -> Result<()> {
    // Written so that NaN is rejected as well.
    if !(capacity > 0.0) {
        return Err(Error::InvalidArgument(format!(
            "The bucket capacity has to be strictly positive. Received {capacity}"
        )));
    }
    Ok(())
}

pub(crate) fn delay(delay: Duration) -> Result<()> {
    if delay.is_zero() {
        return Err(Error::InvalidArgument(
            "The bucket refill delay has to be strictly positive".to_owned(),
        ));
    }
    Ok(())
}

pub(crate) fn tokens(tokens: f64) -> Result<()> {
    if !(tokens >= 0.0) {
        return Err(Error::InvalidArgument(format!(
            "Cannot acquire a negative amount of tokens. Received {tokens}"
        )));
    }
    Ok(())
}

pub(crate) fn max_concurrency(max_concurrency: Option<usize>) -> Result<()> {
    if max_concurrency == Some(0) {
        return Err(Error::InvalidArgument(
            "'max_concurrency' must be strictly positive, or None for unlimited concurrency"
                .to_owned(),
        ));
    }
    Ok(())
}

pub(crate) fn max_pending(max_pending: Option<usize>) -> Result<()> {
    if max_pending == Some(0) {
        return Err(Error::InvalidArgument(
            "'max_pending' must be strictly positive, or None for no pending limit".to_owned(),
        ));
    }
    Ok(())
}
