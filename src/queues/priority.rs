use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::Queue;
use crate::{Error, Result};

/// Queue where the lowest elements are retrieved first.
///
/// Equal elements come out in no particular order.
#[derive(Debug, Clone)]
pub struct PriorityQueue<T: Ord> {
    heap: BinaryHeap<Reverse<T>>,
}

impl<T: Ord> PriorityQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<T: Ord> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> FromIterator<T> for PriorityQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            heap: iter.into_iter().map(Reverse).collect(),
        }
    }
}

impl<T: Ord> Queue<T> for PriorityQueue<T> {
    fn len(&self) -> usize {
        self.heap.len()
    }

    fn head(&self) -> Result<&T> {
        self.heap
            .peek()
            .map(|Reverse(element)| element)
            .ok_or(Error::Empty)
    }

    fn pop(&mut self) -> Result<T> {
        self.heap
            .pop()
            .map(|Reverse(element)| element)
            .ok_or(Error::Empty)
    }

    fn add(&mut self, element: T) {
        self.heap.push(Reverse(element));
    }

    fn remove(&mut self, element: &T) -> Result<()> {
        let mut elements = std::mem::take(&mut self.heap).into_vec();
        let position = elements
            .iter()
            .position(|Reverse(queued)| queued == element);
        if let Some(index) = position {
            elements.swap_remove(index);
        }
        self.heap = BinaryHeap::from(elements);
        position.map(|_| ()).ok_or(Error::NotInQueue)
    }
}
