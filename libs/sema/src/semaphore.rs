// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::loom::{Condvar, Mutex};
use core::fmt;

/// A blocking counting semaphore that admits waiters in strict first-in,
/// first-out order.
///
/// Unlike a mutex there is no notion of ownership: [`release`] may be called
/// by a thread that never acquired a permit. This is deliberate — it allows a
/// critical section to be *handed* from one thread to another, where the
/// waker deposits a permit for a specific blocked thread instead of opening
/// the section to all comers. Waiters are served in the order their
/// [`acquire`] calls arrived; a later waiter never overtakes an earlier one
/// even when both are runnable.
///
/// # Implementation Notes
///
/// The queue discipline is a ticket lock: every `acquire` draws a ticket and
/// only the thread holding the lowest outstanding ticket may take a permit.
/// Permits deposited by `release` are therefore never stolen, and a permit
/// deposited before the matching `acquire` is stored rather than lost.
///
/// [`acquire`]: Semaphore::acquire
/// [`release`]: Semaphore::release
pub struct Semaphore {
    inner: Mutex<Inner>,
    wakeup: Condvar,
}

#[derive(Debug)]
struct Inner {
    permits: usize,
    /// Ticket handed to the next arriving waiter.
    next_ticket: u64,
    /// Ticket currently at the head of the queue.
    serving: u64,
}

/// The internal mutex protects nothing but three integers and is never held
/// across user code, so poisoning can only mean the semaphore itself
/// panicked mid-update. There is no recovery from that.
const POISONED: &str = "semaphore state poisoned";

// === impl Semaphore ===

impl Semaphore {
    /// Creates a new semaphore holding `permits` permits.
    pub fn new(permits: usize) -> Semaphore {
        Semaphore {
            inner: Mutex::new(Inner {
                permits,
                next_ticket: 0,
                serving: 0,
            }),
            wakeup: Condvar::new(),
        }
    }

    /// Takes one permit, blocking the current thread until one is available
    /// and all earlier `acquire` calls have been served.
    pub fn acquire(&self) {
        let mut inner = self.inner.lock().expect(POISONED);
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        while inner.serving != ticket || inner.permits == 0 {
            inner = self.wakeup.wait(inner).expect(POISONED);
        }
        inner.permits -= 1;
        inner.serving += 1;
        if inner.permits > 0 {
            // The next ticket holder may be admissible right away.
            self.wakeup.notify_all();
        }
    }

    /// Deposits one permit, waking the longest-waiting thread if any.
    ///
    /// The caller does not need to hold a permit; depositing from a thread
    /// that never acquired is how a critical section is handed over.
    pub fn release(&self) {
        let mut inner = self.inner.lock().expect(POISONED);
        inner.permits += 1;
        self.wakeup.notify_all();
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.lock() {
            Ok(inner) => f
                .debug_struct("Semaphore")
                .field("permits", &inner.permits)
                .field("queued", &(inner.next_ticket - inner.serving))
                .finish(),
            Err(_) => f.pad("Semaphore { <poisoned> }"),
        }
    }
}
