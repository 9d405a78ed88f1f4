//! Image references and the per-handler table that owns their state.

use super::error::{ImageError, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one handler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque handle to an image loaded by one specific handler.
///
/// Valid from the `load()` that returned it until the matching `close()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageReference {
    handler: HandlerId,
    slot: u64,
}

impl ImageReference {
    pub fn handler(&self) -> HandlerId {
        self.handler
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}@handler#{}", self.slot, self.handler.0)
    }
}

/// Logical state of a loaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub mime: String,
    /// Path the image was loaded from; the default `save()` target.
    pub path: PathBuf,
}

impl ImageInfo {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Slot storage for the engine-specific state behind each live reference.
#[derive(Debug)]
pub struct ReferenceTable<T> {
    owner: HandlerId,
    next_slot: u64,
    entries: HashMap<u64, T>,
}

impl<T> ReferenceTable<T> {
    pub fn new(owner: HandlerId) -> Self {
        Self {
            owner,
            next_slot: 1,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> ImageReference {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.entries.insert(slot, value);
        ImageReference {
            handler: self.owner,
            slot,
        }
    }

    pub fn get(&self, operation: &'static str, reference: &ImageReference) -> Result<&T> {
        self.check_owner(operation, reference)?;
        self.entries
            .get(&reference.slot)
            .ok_or_else(|| closed(operation, reference))
    }

    pub fn get_mut(&mut self, operation: &'static str, reference: &ImageReference) -> Result<&mut T> {
        self.check_owner(operation, reference)?;
        self.entries
            .get_mut(&reference.slot)
            .ok_or_else(|| closed(operation, reference))
    }

    pub fn remove(&mut self, operation: &'static str, reference: &ImageReference) -> Result<T> {
        self.check_owner(operation, reference)?;
        self.entries
            .remove(&reference.slot)
            .ok_or_else(|| closed(operation, reference))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_owner(&self, operation: &'static str, reference: &ImageReference) -> Result<()> {
        if reference.handler != self.owner {
            return Err(ImageError::InvalidReference {
                operation,
                reference: reference.to_string(),
                reason: "belongs to another handler".to_string(),
            });
        }
        Ok(())
    }
}

fn closed(operation: &'static str, reference: &ImageReference) -> ImageError {
    ImageError::InvalidReference {
        operation,
        reference: reference.to_string(),
        reason: "not open (already closed or never loaded)".to_string(),
    }
}
