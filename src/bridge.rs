//! Completion bridge between native request-response calls and Rust closures.
//!
//! The native library can only carry a pointer-sized context value through a
//! request, so each pending handler is parked in a [`Registry`] slot and the
//! slot's [`CallId`] travels as that context. The native library later calls
//! [`response_trampoline`] with the context; the trampoline takes the handler
//! back out of the registry and runs it.
//!
//! Every issued `CallId` is removed exactly once: by the trampoline, or by the
//! issuing call when the native layer rejects the request synchronously.

use std::fmt;
use std::num::NonZeroUsize;
use std::os::raw::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::ffi::{self, NativeLibrary, RawError, RawPayload};
use crate::payload::Payload;
use crate::types::Config;

/// Default capacity of the process-wide registry.
pub const DEFAULT_MAX_PENDING: usize = 16_384;

const SLOT_BITS: u32 = usize::BITS / 2;
const SLOT_MASK: usize = (1 << SLOT_BITS) - 1;
const MAX_GENERATION: usize = usize::MAX >> SLOT_BITS;

/// Identifier of a pending request-response call.
///
/// The low half holds the registry slot index and the high half the
/// generation the slot was stamped with. Never zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(NonZeroUsize);

impl CallId {
    fn new(slot: usize, generation: usize) -> Option<Self> {
        if slot > SLOT_MASK || generation == 0 || generation > MAX_GENERATION {
            return None;
        }
        NonZeroUsize::new((generation << SLOT_BITS) | slot).map(CallId)
    }

    /// Registry slot index.
    pub fn slot(self) -> usize {
        self.0.get() & SLOT_MASK
    }

    /// Generation the slot carried when this call was stored.
    pub fn generation(self) -> usize {
        self.0.get() >> SLOT_BITS
    }

    /// Raw integer value.
    pub fn as_raw(self) -> usize {
        self.0.get()
    }

    /// Rebuild from a raw value; `None` for zero.
    pub fn from_raw(raw: usize) -> Option<Self> {
        let id = CallId(NonZeroUsize::new(raw)?);
        (id.generation() != 0).then_some(id)
    }

    /// Encode as the caller-context value handed to the native layer.
    pub(crate) fn into_context(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    /// Decode a caller-context value handed back by the native layer.
    pub(crate) fn from_context(context: *mut c_void) -> Option<Self> {
        Self::from_raw(context as usize)
    }
}

impl fmt::Debug for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallId({}#{})", self.slot(), self.generation())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slot(), self.generation())
    }
}

/// Raw outcome of a native call, as handed to the trampoline.
///
/// Owns whatever non-null pointers it carries until converted or discarded.
pub(crate) struct RawCompletion {
    response: *mut RawPayload,
    error: *mut RawError,
}

impl RawCompletion {
    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self {
            response: std::ptr::null_mut(),
            error: std::ptr::null_mut(),
        }
    }

    /// Convert into the value delivered to a handler, taking ownership of the
    /// native payload or error.
    ///
    /// # Safety
    ///
    /// The pointers must have been produced by `N` and be owned by `self`.
    pub(crate) unsafe fn into_result<N: NativeLibrary>(self) -> Result<Option<Payload<N>>> {
        if !self.error.is_null() {
            if !self.response.is_null() {
                N::payload_free(self.response);
            }
            return Err(ffi::error_from_native::<N>(self.error));
        }
        Ok(Payload::from_raw(self.response))
    }

    /// Free everything this completion carries.
    ///
    /// # Safety
    ///
    /// Same as [`RawCompletion::into_result`].
    pub(crate) unsafe fn discard<N: NativeLibrary>(self) {
        if !self.response.is_null() {
            N::payload_free(self.response);
        }
        if !self.error.is_null() {
            N::error_free(self.error);
        }
    }
}

/// Handler parked in the registry while its call is pending.
pub(crate) type Handler = Box<dyn FnOnce(RawCompletion) + Send>;

struct Slot {
    generation: usize,
    handler: Option<Handler>,
}

struct Slots {
    entries: Vec<Slot>,
    free: Vec<usize>,
    next_generation: usize,
    pending: usize,
}

/// Capacity-bounded table of pending handlers keyed by [`CallId`].
pub(crate) struct Registry {
    slots: Mutex<Slots>,
    capacity: usize,
}

impl Registry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, SLOT_MASK + 1);
        Self {
            slots: Mutex::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
                next_generation: 1,
                pending: 0,
            }),
            capacity,
        }
    }

    /// Park a handler and return the id that retrieves it.
    pub(crate) fn store(&self, handler: Handler) -> Result<CallId> {
        let mut slots = self.slots.lock();

        let index = match slots.free.pop() {
            Some(index) => index,
            None if slots.entries.len() < self.capacity => {
                slots.entries.push(Slot {
                    generation: 0,
                    handler: None,
                });
                slots.entries.len() - 1
            }
            None => {
                return Err(Error::TooManyPending {
                    capacity: self.capacity,
                })
            }
        };

        let generation = slots.next_generation;
        let Some(id) = CallId::new(index, generation) else {
            slots.free.push(index);
            return Err(Error::TooManyPending {
                capacity: self.capacity,
            });
        };

        slots.next_generation = if generation == MAX_GENERATION {
            1
        } else {
            generation + 1
        };
        let slot = &mut slots.entries[index];
        slot.generation = id.generation();
        slot.handler = Some(handler);
        slots.pending += 1;
        tracing::trace!(call_id = %id, "pending call stored");
        Ok(id)
    }

    /// Remove and return the handler for `id`, if it is still pending.
    pub(crate) fn take(&self, id: CallId) -> Option<Handler> {
        let mut slots = self.slots.lock();
        let slot = slots.entries.get_mut(id.slot())?;
        if slot.generation != id.generation() {
            return None;
        }
        let handler = slot.handler.take()?;
        slots.free.push(id.slot());
        slots.pending -= 1;
        tracing::trace!(call_id = %id, "pending call taken");
        Some(handler)
    }

    pub(crate) fn pending(&self) -> usize {
        self.slots.lock().pending
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, created with the default capacity on first use
/// unless [`configure`] ran before.
pub(crate) fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry::with_capacity(DEFAULT_MAX_PENDING))
}

/// Fix the capacity of the process-wide registry.
pub(crate) fn configure(config: &Config) {
    let registry = REGISTRY.get_or_init(|| Registry::with_capacity(config.max_pending_calls));
    if registry.capacity() != config.max_pending_calls.clamp(1, SLOT_MASK + 1) {
        tracing::warn!(
            requested = config.max_pending_calls,
            active = registry.capacity(),
            "completion registry already in use, capacity unchanged"
        );
    }
}

/// Number of request-response calls currently awaiting completion.
pub fn pending_calls() -> usize {
    registry().pending()
}

/// Capacity of the process-wide completion registry.
pub fn max_pending_calls() -> usize {
    registry().capacity()
}

/// Completion entry point handed to the native library for library `N`.
///
/// Runs on whatever thread the native library chooses.
pub(crate) unsafe extern "C" fn response_trampoline<N: NativeLibrary>(
    response: *mut RawPayload,
    error: *mut RawError,
    context: *mut c_void,
) {
    let completion = RawCompletion { response, error };

    let Some(id) = CallId::from_context(context) else {
        tracing::warn!("completion with an invalid call id, discarding");
        completion.discard::<N>();
        return;
    };

    let Some(handler) = registry().take(id) else {
        tracing::warn!(call_id = %id, "completion for an unknown call, discarding");
        completion.discard::<N>();
        return;
    };

    // Handlers must not unwind into native code.
    if catch_unwind(AssertUnwindSafe(move || handler(completion))).is_err() {
        tracing::error!(call_id = %id, "completion handler panicked");
    }
}
