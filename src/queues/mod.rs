//! Ordered containers holding the requests a scheduler cannot admit yet.

mod fifo;
mod lifo;
mod priority;

pub use fifo::FifoQueue;
pub use lifo::LifoQueue;
pub use priority::PriorityQueue;

use crate::Result;

/// An ordered container.
///
/// The order in which elements come out is what distinguishes the
/// implementations.
pub trait Queue<T> {
    /// The number of queued elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element that [`Queue::pop`] would return next.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`](crate::Error::Empty) if the queue is empty.
    fn head(&self) -> Result<&T>;

    /// Removes the element at the head of the queue and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`](crate::Error::Empty) if the queue is empty.
    fn pop(&mut self) -> Result<T>;

    fn add(&mut self, element: T);

    /// Removes one occurrence of `element`, wherever it is in the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInQueue`](crate::Error::NotInQueue) if `element` is
    /// not queued.
    fn remove(&mut self, element: &T) -> Result<()>;
}
