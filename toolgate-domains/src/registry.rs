// toolgate-domains/src/registry.rs
// ============================================================================
// Module: Adapter Registry
// Description: Flat registry of domain adapters keyed by domain tag.
// Purpose: Reject invalid and duplicate registrations; support lookup,
//          listing, unregistration, and clearing.
// Dependencies: toolgate-core
// ============================================================================

//! ## Overview
//! The registry is established at startup and thereafter read-mostly; hosts
//! that mutate it at runtime must serialize access externally. Registration
//! fails closed: adapters with validation errors never enter the registry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;
use toolgate_core::DomainTag;

use crate::adapter::DomainAdapter;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Adapter failed validation.
    #[error("fail-closed: invalid adapter for domain `{domain}`: {errors:?}")]
    InvalidAdapter {
        /// Domain of the rejected adapter.
        domain: String,
        /// Validation errors.
        errors: Vec<String>,
    },
    /// Domain already registered.
    #[error("fail-closed: domain already registered: {0}")]
    DuplicateDomain(String),
    /// Domain not registered.
    #[error("domain not registered: {0}")]
    UnknownDomain(String),
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Flat adapter registry keyed by domain.
#[derive(Default)]
pub struct AdapterRegistry {
    /// Adapters keyed by domain tag.
    adapters: BTreeMap<DomainTag, DomainAdapter>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, invoking its initialize hook on success.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidAdapter`] when validation finds hard
    /// errors and [`RegistryError::DuplicateDomain`] for re-registration.
    pub fn register(&mut self, adapter: DomainAdapter) -> Result<Vec<String>, RegistryError> {
        let report = adapter.validate();
        if !report.is_valid() {
            return Err(RegistryError::InvalidAdapter {
                domain: adapter.domain.to_string(),
                errors: report.errors,
            });
        }
        if self.adapters.contains_key(&adapter.domain) {
            return Err(RegistryError::DuplicateDomain(adapter.domain.to_string()));
        }
        if let Some(hook) = &adapter.hooks.on_initialize {
            hook();
        }
        self.adapters.insert(adapter.domain.clone(), adapter);
        Ok(report.warnings)
    }

    /// Returns the adapter for a domain.
    #[must_use]
    pub fn lookup(&self, domain: &DomainTag) -> Option<&DomainAdapter> {
        self.adapters.get(domain)
    }

    /// Returns the registered domains in sorted order.
    #[must_use]
    pub fn domains(&self) -> Vec<DomainTag> {
        self.adapters.keys().cloned().collect()
    }

    /// Removes an adapter, invoking its shutdown hook.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDomain`] when the domain is absent.
    pub fn unregister(&mut self, domain: &DomainTag) -> Result<(), RegistryError> {
        let Some(adapter) = self.adapters.remove(domain) else {
            return Err(RegistryError::UnknownDomain(domain.to_string()));
        };
        if let Some(hook) = &adapter.hooks.on_shutdown {
            hook();
        }
        Ok(())
    }

    /// Removes every adapter, invoking shutdown hooks in reverse
    /// registration-key order.
    pub fn clear(&mut self) {
        let adapters = std::mem::take(&mut self.adapters);
        for (_, adapter) in adapters.into_iter().rev() {
            if let Some(hook) = &adapter.hooks.on_shutdown {
                hook();
            }
        }
    }

    /// Returns the number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns true when no adapter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
