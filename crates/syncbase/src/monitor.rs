use std::sync::{Condvar, Mutex};

/// A monitored value.
///
/// The value can be watched until it reaches a certain state; the caller
/// blocks until the condition holds. Every mutation broadcasts to all
/// waiters, so a waiter observing the condition happens-after the mutation
/// that established it.
#[derive(Debug)]
pub struct Monitor<T> {
    value: Mutex<T>,
    cond: Condvar,
}

impl<T: Copy + Ord> Monitor<T> {
    /// Creates a monitor holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            cond: Condvar::new(),
        }
    }

    /// Returns the current value.
    pub fn get(&self) -> T {
        *self.value.lock().expect("monitor mutex poisoned")
    }

    /// Replaces the value and wakes all waiters.
    pub fn set(&self, value: T) {
        let mut guard = self.value.lock().expect("monitor mutex poisoned");
        *guard = value;
        self.cond.notify_all();
    }

    /// Blocks until the value equals `target`, returning it.
    pub fn wait_eq(&self, target: T) -> T {
        let mut guard = self.value.lock().expect("monitor mutex poisoned");
        while *guard != target {
            guard = self.cond.wait(guard).expect("monitor mutex poisoned");
        }
        target
    }

    /// Blocks until the value differs from `other`, returning the new value.
    pub fn wait_ne(&self, other: T) -> T {
        let mut guard = self.value.lock().expect("monitor mutex poisoned");
        while *guard == other {
            guard = self.cond.wait(guard).expect("monitor mutex poisoned");
        }
        *guard
    }

    /// Blocks until the value is greater than or equal to `floor`.
    pub fn wait_ge(&self, floor: T) -> T {
        let mut guard = self.value.lock().expect("monitor mutex poisoned");
        while *guard < floor {
            guard = self.cond.wait(guard).expect("monitor mutex poisoned");
        }
        *guard
    }

    /// Blocks until the value is less than or equal to `ceiling`.
    pub fn wait_le(&self, ceiling: T) -> T {
        let mut guard = self.value.lock().expect("monitor mutex poisoned");
        while *guard > ceiling {
            guard = self.cond.wait(guard).expect("monitor mutex poisoned");
        }
        *guard
    }
}

impl Monitor<u32> {
    /// Increments the counter and wakes all waiters, returning the new value.
    pub fn increment(&self) -> u32 {
        let mut guard = self.value.lock().expect("monitor mutex poisoned");
        *guard += 1;
        self.cond.notify_all();
        *guard
    }

    /// Decrements the counter and wakes all waiters, returning the new value.
    pub fn decrement(&self) -> u32 {
        let mut guard = self.value.lock().expect("monitor mutex poisoned");
        *guard -= 1;
        self.cond.notify_all();
        *guard
    }
}

impl<T: Copy + Ord + Default> Default for Monitor<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
