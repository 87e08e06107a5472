use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

/// Identifier correlating a request with its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("request {0:?} was never registered or already waited on")]
    Unknown(RequestId),
    #[error("request {0:?} has already been served")]
    AlreadyServed(RequestId),
}

/// Correlation table between outgoing requests and incoming replies.
///
/// The requesting thread registers a request, sends it, and blocks in
/// [`RequestHandler::wait`]; the network receive thread serves the reply.
/// Each request is served exactly once. There is no timeout: if the reply
/// never arrives the waiter blocks indefinitely.
#[derive(Debug)]
pub struct RequestHandler<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

#[derive(Debug)]
struct State<T> {
    next: u64,
    pending: HashMap<RequestId, Option<T>>,
}

impl<T> RequestHandler<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next: 1,
                pending: HashMap::new(),
            }),
            cond: Condvar::new(),
        }
    }

    /// Registers a new request and returns its correlation id.
    pub fn register(&self) -> RequestId {
        let mut state = self.state.lock().expect("request mutex poisoned");
        let id = RequestId(state.next);
        state.next += 1;
        state.pending.insert(id, None);
        id
    }

    /// Serves a registered request, waking its waiter.
    pub fn serve(&self, id: RequestId, value: T) -> Result<(), RequestError> {
        let mut state = self.state.lock().expect("request mutex poisoned");
        match state.pending.get_mut(&id) {
            None => Err(RequestError::Unknown(id)),
            Some(Some(_)) => Err(RequestError::AlreadyServed(id)),
            Some(slot) => {
                *slot = Some(value);
                self.cond.notify_all();
                Ok(())
            }
        }
    }

    /// Returns true once a reply for `id` has arrived.
    pub fn is_served(&self, id: RequestId) -> bool {
        let state = self.state.lock().expect("request mutex poisoned");
        matches!(state.pending.get(&id), Some(Some(_)))
    }

    /// Blocks until the request is served and returns the reply value.
    ///
    /// Consumes the registration; waiting twice on the same id is an error.
    pub fn wait(&self, id: RequestId) -> Result<T, RequestError> {
        let mut state = self.state.lock().expect("request mutex poisoned");
        loop {
            match state.pending.get(&id) {
                None => return Err(RequestError::Unknown(id)),
                Some(Some(_)) => {
                    let value = state
                        .pending
                        .remove(&id)
                        .flatten()
                        .expect("served slot present");
                    return Ok(value);
                }
                Some(None) => {
                    state = self.cond.wait(state).expect("request mutex poisoned");
                }
            }
        }
    }
}

impl<T> Default for RequestHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_returns_served_value() {
        let handler = Arc::new(RequestHandler::new());
        let id = handler.register();
        let server = {
            let handler = Arc::clone(&handler);
            thread::spawn(move || handler.serve(id, 42u64).unwrap())
        };
        assert_eq!(handler.wait(id).unwrap(), 42);
        server.join().unwrap();
        assert_eq!(handler.wait(id), Err(RequestError::Unknown(id)));
    }

    #[test]
    fn serving_twice_is_rejected() {
        let handler = RequestHandler::new();
        let id = handler.register();
        handler.serve(id, 1u32).unwrap();
        assert_eq!(handler.serve(id, 2), Err(RequestError::AlreadyServed(id)));
        assert!(handler.is_served(id));
    }

    #[test]
    fn consumed_request_becomes_unknown() {
        let handler: RequestHandler<u32> = RequestHandler::new();
        let id = handler.register();
        handler.serve(id, 7).unwrap();
        assert_eq!(handler.wait(id).unwrap(), 7);
        assert_eq!(handler.serve(id, 8), Err(RequestError::Unknown(id)));
    }
}
