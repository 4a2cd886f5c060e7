//! Move-only ownership of native handles
//!
//! Every native resource the watcher holds (opened keys, wait events) lives in
//! a `ResourceGuard`. The guard pairs the raw handle with the function that
//! releases it and runs that function exactly once, when the guard is dropped
//! or reassigned while holding a valid handle.

use std::fmt;

/// A raw handle value with a distinguished "null" sentinel
pub trait RawHandle: Copy + PartialEq + fmt::Debug {
    /// The value an opener returns on failure
    const INVALID: Self;

    /// Whether this value is the sentinel
    fn is_invalid(self) -> bool {
        self == Self::INVALID
    }
}

impl RawHandle for isize {
    const INVALID: Self = 0;
}

impl RawHandle for usize {
    const INVALID: Self = 0;
}

impl RawHandle for u64 {
    const INVALID: Self = 0;
}

impl<T> RawHandle for *mut T {
    const INVALID: Self = std::ptr::null_mut();
}

type Releaser<T> = Box<dyn FnOnce(T) + Send + Sync>;

/// Owns one native handle and the function that releases it
///
/// The guard cannot be cloned. `take` moves ownership out and leaves the
/// source holding the sentinel; `reset` releases the current handle before
/// adopting another. Failures of the release function itself are not
/// observable.
pub struct ResourceGuard<T: RawHandle> {
    handle: T,
    release: Option<Releaser<T>>,
}

impl<T: RawHandle> ResourceGuard<T> {
    /// Wrap an already-obtained handle
    pub fn new<F>(handle: T, release: F) -> Self
    where
        F: FnOnce(T) + Send + Sync + 'static,
    {
        Self {
            handle,
            release: Some(Box::new(release)),
        }
    }

    /// Call `opener` and wrap whatever it returns
    ///
    /// An opener that fails returns the sentinel; the guard is then invalid
    /// and `release` is never called.
    pub fn open<O, F>(opener: O, release: F) -> Self
    where
        O: FnOnce() -> T,
        F: FnOnce(T) + Send + Sync + 'static,
    {
        Self::new(opener(), release)
    }

    /// Like `open`, for openers that report failure through `Result`
    pub fn try_open<O, E, F>(opener: O, release: F) -> Result<Self, E>
    where
        O: FnOnce() -> Result<T, E>,
        F: FnOnce(T) + Send + Sync + 'static,
    {
        opener().map(|handle| Self::new(handle, release))
    }

    /// A guard that owns nothing
    pub fn invalid() -> Self {
        Self {
            handle: T::INVALID,
            release: None,
        }
    }

    /// True unless the held value is the sentinel
    pub fn is_valid(&self) -> bool {
        !self.handle.is_invalid()
    }

    /// The raw handle, still owned by the guard
    pub fn get(&self) -> T {
        self.handle
    }

    /// Move ownership into a new guard, leaving this one invalid
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::invalid())
    }

    /// Release the held handle (if valid) and adopt `other`
    pub fn reset(&mut self, other: Self) {
        *self = other;
    }
}

impl<T: RawHandle> Default for ResourceGuard<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T: RawHandle> PartialEq<T> for ResourceGuard<T> {
    fn eq(&self, other: &T) -> bool {
        self.handle == *other
    }
}

impl<T: RawHandle> fmt::Debug for ResourceGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("handle", &self.handle)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<T: RawHandle> Drop for ResourceGuard<T> {
    fn drop(&mut self) {
        if self.handle.is_invalid() {
            return;
        }
        if let Some(release) = self.release.take() {
            release(self.handle);
        }
    }
}
