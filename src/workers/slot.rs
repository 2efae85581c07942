//! Write-once job slots shared between workers and ordered consumers

use std::sync::OnceLock;

/// One unit of work with a result that is set exactly once
///
/// A slot is done once its outcome is set; the outcome is `Some` when the
/// job succeeded. After that the slot is read-only.
#[derive(Debug)]
pub struct JobSlot<I, R> {
    input: I,
    outcome: OnceLock<Option<R>>,
}

impl<I, R> JobSlot<I, R> {
    /// Create a pending slot for `input`
    pub const fn new(input: I) -> Self {
        Self {
            input,
            outcome: OnceLock::new(),
        }
    }

    /// The job description
    pub const fn input(&self) -> &I {
        &self.input
    }

    /// Set the outcome; returns `false` if the slot was already done
    pub fn complete(&self, result: Option<R>) -> bool {
        self.outcome.set(result).is_ok()
    }

    /// Whether the outcome has been set
    pub fn is_done(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Whether the job finished successfully
    pub fn succeeded(&self) -> bool {
        self.result().is_some()
    }

    /// The successful result, if any
    pub fn result(&self) -> Option<&R> {
        self.outcome.get().and_then(Option::as_ref)
    }

    /// Take ownership of the slot for the duration of a job
    ///
    /// If the guard is dropped without [`SlotGuard::succeed`], the slot is
    /// marked done-but-unsuccessful.
    pub const fn claim(&self) -> SlotGuard<'_, I, R> {
        SlotGuard { slot: self }
    }
}

/// Completes its slot as failed unless a result is handed over
pub struct SlotGuard<'a, I, R> {
    slot: &'a JobSlot<I, R>,
}

impl<I, R> SlotGuard<'_, I, R> {
    /// The job description
    pub const fn input(&self) -> &I {
        &self.slot.input
    }

    /// Store a successful result; returns `false` if the slot was already done
    pub fn succeed(self, result: R) -> bool {
        self.slot.complete(Some(result))
    }
}

impl<I, R> Drop for SlotGuard<'_, I, R> {
    fn drop(&mut self) {
        // no-op when succeed() already set the outcome
        let _ = self.slot.complete(None);
    }
}
