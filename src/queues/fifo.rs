use std::collections::VecDeque;

use super::Queue;
use crate::{Error, Result};

/// First in, first out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoQueue<T> {
    elements: VecDeque<T>,
}

impl<T> FifoQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: VecDeque::new(),
        }
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for FifoQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<T: PartialEq> Queue<T> for FifoQueue<T> {
    fn len(&self) -> usize {
        self.elements.len()
    }

    fn head(&self) -> Result<&T> {
        self.elements.front().ok_or(Error::Empty)
    }

    fn pop(&mut self) -> Result<T> {
        self.elements.pop_front().ok_or(Error::Empty)
    }

    fn add(&mut self, element: T) {
        self.elements.push_back(element);
    }

    fn remove(&mut self, element: &T) -> Result<()> {
        let index = self
            .elements
            .iter()
            .position(|queued| queued == element)
            .ok_or(Error::NotInQueue)?;
        self.elements.remove(index);
        Ok(())
    }
}
