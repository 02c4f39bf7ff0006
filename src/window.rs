use std::collections::VecDeque;

/// Fixed-capacity list ordered newest-first; pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> PacketWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
        self.items.truncate(self.capacity);
    }

    /// Replace the contents with a snapshot that is already newest-first.
    pub fn replace(&mut self, snapshot: impl IntoIterator<Item = T>) {
        self.items.clear();
        self.items.extend(snapshot.into_iter().take(self.capacity));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> PacketWindow<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first() {
        let mut window = PacketWindow::new(100);
        window.push(1);
        window.push(2);
        assert_eq!(window.to_vec(), vec![2, 1]);
    }

    #[test]
    fn never_exceeds_capacity_and_keeps_most_recent() {
        let mut window = PacketWindow::new(100);
        for n in 1..=250 {
            window.push(n);
            assert!(window.len() <= 100);
            let expected: Vec<i32> = (1..=n).rev().take(100).collect();
            assert_eq!(window.to_vec(), expected);
        }
    }

    #[test]
    fn hundred_and_first_evicts_oldest() {
        let mut window = PacketWindow::new(100);
        for n in 1..=100 {
            window.push(n);
        }
        assert_eq!(window.len(), 100);
        window.push(101);
        assert_eq!(window.len(), 100);
        assert_eq!(window.iter().next(), Some(&101));
        assert_eq!(window.iter().last(), Some(&2));
    }

    #[test]
    fn replace_truncates_snapshot() {
        let mut window = PacketWindow::new(3);
        window.push(9);
        window.replace(vec![5, 4, 3, 2, 1]);
        assert_eq!(window.to_vec(), vec![5, 4, 3]);
    }
}
