//! Common refill delays.

use std::time::Duration;

pub const SECOND: Duration = Duration::from_secs(1);
pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);
pub const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_units_build_on_each_other() {
        assert_eq!(MINUTE, SECOND * 60);
        assert_eq!(HOUR, MINUTE * 60);
        assert_eq!(DAY, HOUR * 24);
        assert_eq!(WEEK, DAY * 7);
    }
}
