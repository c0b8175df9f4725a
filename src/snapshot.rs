//! Single-slot shared values and driver lifecycle state
//!
//! Background drivers publish into a [`Snapshot`] and record their lifecycle in
//! a [`DriverStatus`]; the render loop only ever reads both.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::error::DriverError;

/// Last-writer-wins slot guarded by a mutex
///
/// The lock is held only for the copy in or out, so readers never wait on
/// whatever I/O the writer does between publishes.
#[derive(Debug)]
pub struct Snapshot<T: Copy> {
    slot: Mutex<Option<T>>,
}

impl<T: Copy> Snapshot<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Overwrite the current value
    pub fn publish(&self, value: T) {
        // A writer that panicked mid-copy cannot leave a partial `T` behind,
        // so a poisoned lock still holds a whole value.
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    /// Copy of the current value, if anything has been published yet
    pub fn latest(&self) -> Option<T> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Copy> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver lifecycle
///
/// `Uninitialized → Running`, or `Uninitialized → Failed`. `Failed` is
/// terminal; there is no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverState {
    Uninitialized = 0,
    Running = 1,
    Failed = 2,
}

impl DriverState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DriverState::Running,
            2 => DriverState::Failed,
            _ => DriverState::Uninitialized,
        }
    }
}

/// Lifecycle flag plus the recorded failure cause
#[derive(Debug)]
pub struct DriverStatus {
    state: AtomicU8,
    failure: OnceLock<DriverError>,
}

impl DriverStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(DriverState::Uninitialized as u8),
            failure: OnceLock::new(),
        }
    }

    pub fn state(&self) -> DriverState {
        DriverState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == DriverState::Running
    }

    pub fn is_failed(&self) -> bool {
        self.state() == DriverState::Failed
    }

    /// Move to `Running` unless already failed
    pub fn mark_running(&self) {
        let _ = self.state.compare_exchange(
            DriverState::Uninitialized as u8,
            DriverState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Record the cause and move to `Failed`
    ///
    /// Only the first cause is kept.
    pub fn mark_failed(&self, error: DriverError) {
        let _ = self.failure.set(error);
        self.state
            .store(DriverState::Failed as u8, Ordering::Release);
    }

    pub fn failure(&self) -> Option<&DriverError> {
        self.failure.get()
    }
}

impl Default for DriverStatus {
    fn default() -> Self {
        Self::new()
    }
}
