/// Pairs taken out of service, held until the GPU can no longer be sampling them.
///
/// An item retired at frame `n` was replaced by a pair first presented in frame `n`; it is
/// releasable once frame `n` has completed.
#[derive(Debug)]
pub struct RetireQueue<Item> {
    retired: Vec<Retired<Item>>,
}

#[derive(Debug)]
struct Retired<Item> {
    item: Item,
    replaced_in_frame: u64,
}

impl<Item> Default for RetireQueue<Item> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Item> RetireQueue<Item> {
    pub fn new() -> Self {
        Self {
            retired: Vec::new(),
        }
    }

    pub fn retire(&mut self, item: Item, replaced_in_frame: u64) {
        self.retired.push(Retired {
            item,
            replaced_in_frame,
        });
    }

    pub fn release_presented(&mut self, completed_frame: u64) -> Vec<Item> {
        let mut releasable = Vec::new();
        let mut remaining = Vec::with_capacity(self.retired.len());
        for retired in self.retired.drain(..) {
            if retired.replaced_in_frame > completed_frame {
                remaining.push(retired);
                continue;
            }
            releasable.push(retired.item);
        }
        self.retired = remaining;
        releasable
    }

    /// Release everything regardless of frame, for shutdown after the device is idle.
    pub fn release_all(&mut self) -> Vec<Item> {
        self.retired.drain(..).map(|retired| retired.item).collect()
    }

    pub fn len(&self) -> usize {
        self.retired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_wait_for_their_replacement_frame() {
        let mut queue = RetireQueue::new();
        queue.retire("a", 3);
        queue.retire("b", 5);

        assert!(queue.release_presented(2).is_empty());
        assert_eq!(queue.release_presented(3), vec!["a"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.release_presented(9), vec!["b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn release_all_empties_the_queue() {
        let mut queue = RetireQueue::new();
        queue.retire(1, 10);
        queue.retire(2, 11);
        assert_eq!(queue.release_all(), vec![1, 2]);
        assert!(queue.is_empty());
    }
}
