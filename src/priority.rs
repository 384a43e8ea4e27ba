/// The priority of a scheduled request.
///
/// Schedulers serve higher priorities first: `Highest < High < Normal < Low < Lowest`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Highest,
    High,
    #[default]
    Normal,
    Low,
    Lowest,
}

impl Priority {
    /// Every priority, in the order schedulers serve them.
    pub const ALL: [Self; 5] = [
        Self::Highest,
        Self::High,
        Self::Normal,
        Self::Low,
        Self::Lowest,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}
