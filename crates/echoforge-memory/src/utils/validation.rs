//! Validation Utilities
//!
//! Every check here runs before a provider is touched.

use crate::error::{MemoryError, MemoryResult};
use crate::hooks::HookRegistration;
use crate::types::{MemoryEntry, MemoryQuery};

/// Validate an entry before it is routed to a provider
pub fn validate_entry(entry: &MemoryEntry) -> MemoryResult<()> {
    if entry.id.trim().is_empty() {
        return Err(MemoryError::validation("entry id is required"));
    }

    if entry.entry_type.trim().is_empty() {
        return Err(MemoryError::validation(format!(
            "entry '{}' has no type",
            entry.id
        )));
    }

    if entry.tags.iter().any(|t| t.is_empty()) {
        return Err(MemoryError::validation(format!(
            "entry '{}' has an empty tag",
            entry.id
        )));
    }

    if let Some(ref embedding) = entry.embedding {
        if embedding.is_empty() {
            return Err(MemoryError::validation(format!(
                "entry '{}' has an empty embedding",
                entry.id
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(MemoryError::validation(format!(
                "entry '{}' has a non-finite embedding component",
                entry.id
            )));
        }
    }

    Ok(())
}

/// Validate a query before it is routed to a provider
pub fn validate_query(query: &MemoryQuery) -> MemoryResult<()> {
    if let Some(threshold) = query.similarity_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MemoryError::validation(format!(
                "similarity threshold must be between 0 and 1, got {}",
                threshold
            )));
        }
    }

    if query.max_results == Some(0) {
        return Err(MemoryError::validation("max results must be greater than 0"));
    }

    if let Some(ref text) = query.similarity_to {
        if text.trim().is_empty() {
            return Err(MemoryError::validation("similarity text cannot be empty"));
        }
    }

    if let Some(ref id) = query.id {
        if id.is_empty() {
            return Err(MemoryError::validation("id filter cannot be empty"));
        }
    }

    Ok(())
}

/// Validate a hook registration
pub fn validate_registration(registration: &HookRegistration) -> MemoryResult<()> {
    if registration.id.trim().is_empty() {
        return Err(MemoryError::validation("hook registration id is required"));
    }

    if registration.events.is_empty() {
        return Err(MemoryError::validation(format!(
            "hook '{}' subscribes to no events",
            registration.id
        )));
    }

    Ok(())
}
