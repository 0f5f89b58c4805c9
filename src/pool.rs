//! Fixed-size client-ID allocator used by the server session.
//!
//! A bitmap of `max_clients` slots with a rotating search cursor, grounded directly
//! on the original pool: `allocate` searches from the cursor to the end, then wraps
//! to the beginning; `deallocate` just clears a slot. The cursor always advances one
//! past whatever it just handed out, so IDs are reused roughly in round-robin order
//! instead of always reusing the lowest free slot.

use std::sync::Mutex;

/// A server-assigned client identifier, unique among currently-live clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u32);

impl ClientId {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct State {
    slots: Vec<bool>,
    cursor: u32,
}

/// Shared between the accept-completion task (which allocates) and the
/// application thread (which deallocates once it observes a disconnection).
pub struct IdPool {
    state: Mutex<State>,
}

impl IdPool {
    pub fn new(max_clients: u32) -> Self {
        Self {
            state: Mutex::new(State {
                slots: vec![false; max_clients as usize],
                cursor: 0,
            }),
        }
    }

    /// Claim the next free id, or `None` if the pool is fully occupied.
    pub fn allocate(&self) -> Option<ClientId> {
        let mut state = self.state.lock().unwrap();
        let size = state.slots.len() as u32;
        if size == 0 {
            return None;
        }

        let cursor = state.cursor;
        if let Some(id) = Self::search(&mut state.slots, cursor, size) {
            state.cursor = (id + 1) % size;
            return Some(ClientId(id));
        }

        if let Some(id) = Self::search(&mut state.slots, 0, cursor) {
            state.cursor = (id + 1) % size;
            return Some(ClientId(id));
        }

        None
    }

    /// Return a previously allocated id to the pool.
    pub fn deallocate(&self, id: ClientId) {
        let mut state = self.state.lock().unwrap();
        state.slots[id.0 as usize] = false;
    }

    fn search(slots: &mut [bool], begin: u32, end: u32) -> Option<u32> {
        for id in begin..end {
            if !slots[id as usize] {
                slots[id as usize] = true;
                return Some(id);
            }
        }
        None
    }
}
