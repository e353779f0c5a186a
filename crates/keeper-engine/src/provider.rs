//! Lazily computed, memoized values shared between tasks.
//!
//! A [`Provider`] is what one unit of work hands to another instead of a
//! finished value: nothing runs until a consumer calls [`Provider::get`], and
//! after the first successful computation every clone sees the same value.
//! Providers are single-threaded (`Rc`), matching the sequential engine.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::error::EngineError;

type Compute<T> = Box<dyn Fn() -> Result<T, EngineError>>;

struct Inner<T> {
    label: String,
    value: OnceCell<T>,
    compute: Compute<T>,
}

/// A lazily computed value, memoized across clones.
pub struct Provider<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Provider<T> {
    /// Create a provider that runs `compute` on first use.
    ///
    /// A failed computation is not memoized.
    pub fn new(label: &str, compute: impl Fn() -> Result<T, EngineError> + 'static) -> Self {
        Self {
            inner: Rc::new(Inner {
                label: label.to_owned(),
                value: OnceCell::new(),
                compute: Box::new(compute),
            }),
        }
    }

    /// Create a provider that is already realized.
    pub fn of(label: &str, value: T) -> Self
    where
        T: Clone,
    {
        let inner = Inner {
            label: label.to_owned(),
            value: OnceCell::from(value.clone()),
            compute: Box::new(move || Ok(value.clone())),
        };
        Self {
            inner: Rc::new(inner),
        }
    }

    /// Derive a provider whose value is computed from this one on first use.
    pub fn map<U: 'static>(
        &self,
        label: &str,
        f: impl Fn(&T) -> Result<U, EngineError> + 'static,
    ) -> Provider<U> {
        let upstream = self.clone();
        Provider::new(label, move || f(upstream.get()?))
    }

    /// Return the value, computing it if this is the first request.
    ///
    /// # Errors
    /// Returns the computation's error; the next call retries.
    pub fn get(&self) -> Result<&T, EngineError> {
        if let Some(value) = self.inner.value.get() {
            return Ok(value);
        }
        tracing::debug!(provider = %self.inner.label, "realizing");
        let value = (self.inner.compute)()?;
        Ok(self.inner.value.get_or_init(|| value))
    }

    /// Whether the value has been computed.
    pub fn is_realized(&self) -> bool {
        self.inner.value.get().is_some()
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

impl<T: fmt::Debug> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("label", &self.inner.label)
            .field("value", &self.inner.value.get())
            .finish()
    }
}
