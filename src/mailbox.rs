//! Single-slot handoff between the reader thread and its consumers

use parking_lot::Mutex;

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    sequence: u64,
}

/// A one-element mailbox that always holds the newest value
///
/// Posting overwrites whatever is there; nothing ever queues up behind a slow
/// consumer. Each post bumps a sequence number so pollers can tell a fresh
/// value from one they already saw.
///
/// # Example
/// ```
/// use cansat_groundstation::Mailbox;
///
/// let mailbox = Mailbox::new();
/// mailbox.post("first");
/// mailbox.post("second");
///
/// assert_eq!(mailbox.peek(), Some((2, "second")));
/// assert_eq!(mailbox.take(), Some("second"));
/// assert_eq!(mailbox.take(), None);
/// ```
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                sequence: 0,
            }),
        }
    }

    /// Replace the current value and return its sequence number
    pub fn post(&self, value: T) -> u64 {
        let mut slot = self.slot.lock();
        slot.sequence += 1;
        slot.value = Some(value);
        slot.sequence
    }

    /// Remove the current value, so it is delivered at most once
    pub fn take(&self) -> Option<T> {
        self.slot.lock().value.take()
    }

    /// Drop the current value without delivering it; the sequence carries on
    pub fn clear(&self) {
        self.slot.lock().value = None;
    }
}

impl<T: Clone> Mailbox<T> {
    /// Copy of the current value with its sequence number, leaving it in place
    pub fn peek(&self) -> Option<(u64, T)> {
        let slot = self.slot.lock();
        slot.value.clone().map(|value| (slot.sequence, value))
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
