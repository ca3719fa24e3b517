//! Deterministic priority work queue.
//!
//! Total ordering on `(priority, id)`: smaller priorities pop first and equal
//! priorities pop in insertion order. Vec-backed with linear-scan pops.

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkId(pub u64);

#[derive(Debug)]
struct Item<P, T> {
    priority: P,
    id: WorkId,
    payload: T,
}

#[derive(Debug)]
pub struct WorkQueue<P, T> {
    next_id: u64,
    items: Vec<Item<P, T>>,
}

impl<P: Ord, T> Default for WorkQueue<P, T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            items: Vec::new(),
        }
    }
}

impl<P: Ord, T> WorkQueue<P, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, priority: P, payload: T) -> WorkId {
        let id = WorkId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.items.push(Item {
            priority,
            id,
            payload,
        });
        id
    }

    /// Pops the next (smallest priority, then oldest) item.
    pub fn pop_next(&mut self) -> Option<(WorkId, P, T)> {
        let idx = self
            .items
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)))
            .map(|(idx, _)| idx)?;
        let item = self.items.swap_remove(idx);
        Some((item.id, item.priority, item.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::{WorkId, WorkQueue};

    fn drain<P: Ord, T>(q: &mut WorkQueue<P, T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some((_, _, v)) = q.pop_next() {
            out.push(v);
        }
        out
    }

    #[test]
    fn same_priority_is_insertion_order() {
        let mut q = WorkQueue::new();
        q.push(0, "a");
        q.push(0, "b");
        q.push(0, "c");
        assert_eq!(drain(&mut q), vec!["a", "b", "c"]);
    }

    #[test]
    fn smaller_priority_runs_first() {
        let mut q = WorkQueue::new();
        q.push((1, 10), "late");
        q.push((0, 99), "viewport");
        q.push((1, 2), "near");
        assert_eq!(drain(&mut q), vec!["viewport", "near", "late"]);
    }

    #[test]
    fn ids_are_handed_out_in_push_order() {
        let mut q = WorkQueue::new();
        assert_eq!(q.push(5, 'x'), WorkId(0));
        assert_eq!(q.push(1, 'y'), WorkId(1));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_next(), Some((WorkId(1), 1, 'y')));
        assert_eq!(q.pop_next(), Some((WorkId(0), 5, 'x')));
        assert!(q.is_empty() && q.pop_next().is_none());
    }
}
