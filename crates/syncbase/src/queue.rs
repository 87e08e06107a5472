use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A queue with a blocking `pop`, typically shared between two execution
/// threads (a task producer and a rendering pipe thread).
///
/// `push` appends in FIFO order; `push_front` jumps the line for tasks that
/// must run before anything already queued.
#[derive(Debug)]
pub struct MtQueue<T> {
    inner: Mutex<VecDeque<T>>,
    cond: Condvar,
}

impl<T> MtQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    /// Returns true when no element is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("queue mutex poisoned").is_empty()
    }

    /// Returns the number of queued elements.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").len()
    }

    /// Appends an element at the tail.
    pub fn push(&self, element: T) {
        let mut queue = self.inner.lock().expect("queue mutex poisoned");
        queue.push_back(element);
        self.cond.notify_one();
    }

    /// Inserts an element at the head, ahead of all queued elements.
    pub fn push_front(&self, element: T) {
        let mut queue = self.inner.lock().expect("queue mutex poisoned");
        queue.push_front(element);
        self.cond.notify_one();
    }

    /// Removes and returns the front element, blocking while empty.
    pub fn pop(&self) -> T {
        let mut queue = self.inner.lock().expect("queue mutex poisoned");
        loop {
            if let Some(element) = queue.pop_front() {
                return element;
            }
            queue = self.cond.wait(queue).expect("queue mutex poisoned");
        }
    }

    /// Removes and returns the front element if one is queued.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().expect("queue mutex poisoned").pop_front()
    }
}

impl<T> Default for MtQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
