//! Decider kind registry.
//!
//! Maps a kind tag to its parser and service. The registry is assembled
//! once through [`DeciderRegistryBuilder`] and is immutable afterwards, so
//! it can be shared behind an `Arc` without locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use tierscale_capacity::DeciderResult;

use crate::config::DeciderConfiguration;
use crate::error::DeciderError;
use crate::fixed::FixedDeciderService;
use crate::service::{Decider, DeciderContext, DeciderService};

/// Type-erased registry entry for one decider kind.
trait DeciderKind: Send + Sync {
    fn bind(&self, config: &DeciderConfiguration) -> Result<Arc<dyn Decider>, DeciderError>;

    /// Re-encode validated settings from their typed form.
    fn normalize(&self, config: &DeciderConfiguration) -> Result<DeciderConfiguration, DeciderError>;
}

struct ServiceKind<S: DeciderService> {
    service: Arc<S>,
}

impl<S: DeciderService> DeciderKind for ServiceKind<S> {
    fn bind(&self, config: &DeciderConfiguration) -> Result<Arc<dyn Decider>, DeciderError> {
        let typed = config.typed(self.service.as_ref())?;
        Ok(Arc::new(BoundDecider {
            service: Arc::clone(&self.service),
            config: typed,
        }))
    }

    fn normalize(&self, config: &DeciderConfiguration) -> Result<DeciderConfiguration, DeciderError> {
        let typed = config.typed(self.service.as_ref())?;
        DeciderConfiguration::from_config(self.service.as_ref(), &typed)
    }
}

struct BoundDecider<S: DeciderService> {
    service: Arc<S>,
    config: S::Configuration,
}

impl<S: DeciderService> Decider for BoundDecider<S> {
    fn kind(&self) -> &'static str {
        self.service.kind()
    }

    fn evaluate(&self, ctx: &DeciderContext<'_>) -> DeciderResult {
        self.service.evaluate(&self.config, ctx)
    }
}

/// Builder for a [`DeciderRegistry`]. Starts with the built-in kinds.
pub struct DeciderRegistryBuilder {
    kinds: BTreeMap<&'static str, Arc<dyn DeciderKind>>,
}

impl DeciderRegistryBuilder {
    /// A builder with no kinds at all, not even the built-in ones.
    pub fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    /// A builder holding the built-in kinds.
    pub fn new() -> Self {
        let mut kinds: BTreeMap<&'static str, Arc<dyn DeciderKind>> = BTreeMap::new();
        kinds.insert(
            FixedDeciderService::KIND,
            Arc::new(ServiceKind {
                service: Arc::new(FixedDeciderService),
            }),
        );
        Self { kinds }
    }

    /// Register an additional kind. Kind tags must be unique.
    pub fn register<S: DeciderService>(mut self, service: S) -> Result<Self, DeciderError> {
        let kind = service.kind();
        if self.kinds.contains_key(kind) {
            return Err(DeciderError::DuplicateKind(kind.to_string()));
        }
        self.kinds.insert(
            kind,
            Arc::new(ServiceKind {
                service: Arc::new(service),
            }),
        );
        debug!(%kind, "decider kind registered");
        Ok(self)
    }

    pub fn build(self) -> DeciderRegistry {
        DeciderRegistry { kinds: self.kinds }
    }
}

impl Default for DeciderRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only table of decider kinds.
pub struct DeciderRegistry {
    kinds: BTreeMap<&'static str, Arc<dyn DeciderKind>>,
}

impl DeciderRegistry {
    pub fn builder() -> DeciderRegistryBuilder {
        DeciderRegistryBuilder::new()
    }

    /// A registry holding only the built-in kinds.
    pub fn builtin() -> Self {
        DeciderRegistryBuilder::new().build()
    }

    /// Registered kind tags, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.keys().copied()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Build a validated configuration from a kind tag and raw settings.
    ///
    /// This is the entry point for administrative mutations: anything it
    /// rejects never reaches persisted state.
    pub fn configuration(
        &self,
        kind: &str,
        settings: Map<String, Value>,
    ) -> Result<DeciderConfiguration, DeciderError> {
        let mut object = settings;
        object.insert("kind".to_string(), Value::String(kind.to_string()));
        let config: DeciderConfiguration = serde_json::from_value(Value::Object(object))
            .map_err(|e| DeciderError::invalid(kind, e.to_string()))?;
        self.lookup(config.kind())?.normalize(&config)
    }

    /// Bind a configuration to its service.
    pub fn resolve(&self, config: &DeciderConfiguration) -> Result<Arc<dyn Decider>, DeciderError> {
        self.lookup(config.kind())?.bind(config)
    }

    fn lookup(&self, kind: &str) -> Result<&Arc<dyn DeciderKind>, DeciderError> {
        self.kinds
            .get(kind)
            .ok_or_else(|| DeciderError::UnknownKind(kind.to_string()))
    }
}
