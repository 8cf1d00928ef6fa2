//! Template registry collaborator.
//!
//! Templates are keyed by mnemonic and never overwritten: the first applet to
//! contribute a mnemonic owns it.

use applet_schema::TemplateDescriptor;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

/// External registry that receives the templates contributed by installed applets.
pub trait TemplateRegistry: Send + Sync {
    /// True if a template with this mnemonic is already registered.
    fn template_exists(&self, mnemonic: &str) -> bool;

    /// Register a template.
    fn insert_template(&self, descriptor: &TemplateDescriptor);
}

impl<T: TemplateRegistry + ?Sized> TemplateRegistry for std::sync::Arc<T> {
    fn template_exists(&self, mnemonic: &str) -> bool {
        (**self).template_exists(mnemonic)
    }

    fn insert_template(&self, descriptor: &TemplateDescriptor) {
        (**self).insert_template(descriptor);
    }
}

/// Insert `descriptor` unless its mnemonic is already present.
/// Returns true if it was inserted.
pub fn insert_template_if_absent(
    registry: &dyn TemplateRegistry,
    descriptor: &TemplateDescriptor,
) -> bool {
    if registry.template_exists(&descriptor.mnemonic) {
        return false;
    }
    registry.insert_template(descriptor);
    true
}

/// Process-local template registry.
#[derive(Debug, Default)]
pub struct InMemoryTemplateRegistry {
    templates: RwLock<BTreeMap<String, TemplateDescriptor>>,
}

impl InMemoryTemplateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, TemplateDescriptor>> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered mnemonics, sorted.
    pub fn mnemonics(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// The descriptor registered under `mnemonic`.
    pub fn get(&self, mnemonic: &str) -> Option<TemplateDescriptor> {
        self.read().get(mnemonic).cloned()
    }
}

impl TemplateRegistry for InMemoryTemplateRegistry {
    fn template_exists(&self, mnemonic: &str) -> bool {
        self.read().contains_key(mnemonic)
    }

    fn insert_template(&self, descriptor: &TemplateDescriptor) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.mnemonic.clone(), descriptor.clone());
    }
}
