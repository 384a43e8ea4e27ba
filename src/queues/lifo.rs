use super::Queue;
use crate::{Error, Result};

/// Last in, first out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifoQueue<T> {
    elements: Vec<T>,
}

impl<T> LifoQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
        }
    }
}

impl<T> Default for LifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for LifoQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<T: PartialEq> Queue<T> for LifoQueue<T> {
    fn len(&self) -> usize {
        self.elements.len()
    }

    fn head(&self) -> Result<&T> {
        self.elements.last().ok_or(Error::Empty)
    }

    fn pop(&mut self) -> Result<T> {
        self.elements.pop().ok_or(Error::Empty)
    }

    fn add(&mut self, element: T) {
        self.elements.push(element);
    }

    fn remove(&mut self, element: &T) -> Result<()> {
        // Closest to the head first.
        let index = self
            .elements
            .iter()
            .rposition(|queued| queued == element)
            .ok_or(Error::NotInQueue)?;
        self.elements.remove(index);
        Ok(())
    }
}
