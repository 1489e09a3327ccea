//! Persisted decider configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DeciderError;
use crate::service::DeciderService;

/// One decider's configuration inside a policy: a kind tag plus the
/// kind-specific settings, stored flat as `{"kind": "...", ...settings}`.
///
/// Values built through [`DeciderConfiguration::from_config`] or
/// [`DeciderRegistry::configuration`](crate::DeciderRegistry::configuration)
/// are validated. Values read back from persisted state are not; they are
/// checked when the engine resolves them, so that a kind written by a
/// removed plugin only affects its own policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeciderConfiguration {
    kind: String,
    #[serde(flatten)]
    settings: Map<String, Value>,
}

impl DeciderConfiguration {
    /// Validate a typed configuration and convert it to the persisted form.
    pub fn from_config<S: DeciderService>(
        service: &S,
        config: &S::Configuration,
    ) -> Result<Self, DeciderError> {
        service.validate(config)?;
        let settings = match serde_json::to_value(config) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(other) => {
                return Err(DeciderError::invalid(
                    service.kind(),
                    format!("settings must serialize to an object, got {other}"),
                ));
            }
            Err(e) => return Err(DeciderError::invalid(service.kind(), e.to_string())),
        };
        Ok(Self {
            kind: service.kind().to_string(),
            settings,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    /// Decode the settings into the service's typed configuration and
    /// validate them.
    pub fn typed<S: DeciderService>(&self, service: &S) -> Result<S::Configuration, DeciderError> {
        if self.kind != service.kind() {
            return Err(DeciderError::invalid(
                service.kind(),
                format!("configuration is of kind [{}]", self.kind),
            ));
        }
        let config: S::Configuration =
            serde_json::from_value(Value::Object(self.settings.clone()))
                .map_err(|e| DeciderError::invalid(service.kind(), e.to_string()))?;
        service.validate(&config)?;
        Ok(config)
    }
}
