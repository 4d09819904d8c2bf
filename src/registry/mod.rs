//! Engine registry: the single source of truth for which engines exist,
//! whether they are healthy, and what their parameters look like.
//!
//! Registrations are an injected list built by the composition root; the
//! registry never discovers plugins by reflection. Instances are
//! constructed lazily, exactly once per process, on first use.

pub mod breaker;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

use crate::engines::{EngineError, OcrEngine};
use crate::models::engine::EngineDescriptor;
use breaker::{CircuitBreaker, HealthSnapshot};

pub type EngineFactory = Box<dyn Fn() -> Arc<dyn OcrEngine> + Send + Sync>;

/// One engine published to the registry: its capability descriptor plus a
/// factory deferred until first use.
pub struct EngineRegistration {
    pub descriptor: EngineDescriptor,
    pub factory: EngineFactory,
}

impl EngineRegistration {
    pub fn new(
        descriptor: EngineDescriptor,
        factory: impl Fn() -> Arc<dyn OcrEngine> + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptor,
            factory: Box::new(factory),
        }
    }
}

struct Entry {
    registration: EngineRegistration,
    instance: OnceLock<Arc<dyn OcrEngine>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown engine '{0}'")]
    UnknownEngine(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid engine registration '{name}': {reason}")]
    InvalidRegistration { name: String, reason: String },
}

pub struct EngineRegistry {
    entries: HashMap<String, Entry>,
    breaker: CircuitBreaker,
}

impl EngineRegistry {
    /// Build the registry from an injected registration list.
    ///
    /// A broken registration is logged and skipped so one bad plugin cannot
    /// take down the others; in strict mode it aborts discovery instead.
    /// Name collisions resolve last-registered-wins with a warning.
    pub fn discover(
        registrations: Vec<EngineRegistration>,
        strict: bool,
        breaker: CircuitBreaker,
    ) -> Result<Self, RegistryError> {
        let mut entries: HashMap<String, Entry> = HashMap::new();

        for registration in registrations {
            let name = registration.descriptor.name.clone();
            if let Err(reason) = check_registration(&registration.descriptor) {
                if strict {
                    return Err(RegistryError::InvalidRegistration { name, reason });
                }
                tracing::error!(engine = %name, reason = %reason, "skipping broken engine registration");
                continue;
            }
            if entries.contains_key(&name) {
                tracing::warn!(engine = %name, "duplicate engine registration, last one wins");
            }
            entries.insert(
                name,
                Entry {
                    registration,
                    instance: OnceLock::new(),
                },
            );
        }

        tracing::info!(
            engines = ?entries.keys().collect::<Vec<_>>(),
            "engine discovery complete"
        );
        Ok(Self { entries, breaker })
    }

    /// Engine names in stable order, for introspection and error messages.
    pub fn engine_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptor(&self, name: &str) -> Option<&EngineDescriptor> {
        self.entries.get(name).map(|e| &e.registration.descriptor)
    }

    /// The lazily-constructed singleton instance for an engine.
    ///
    /// `OnceLock` guarantees the factory runs at most once even under
    /// concurrent first use; every caller gets the same instance.
    pub fn get_engine(&self, name: &str) -> Result<Arc<dyn OcrEngine>, RegistryError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownEngine(name.to_string()))?;
        let instance = entry
            .instance
            .get_or_init(|| (entry.registration.factory)());
        Ok(Arc::clone(instance))
    }

    /// Structural schema validation plus the engine's own semantic hook.
    /// Both failure modes surface as `InvalidParameters`.
    pub fn validate_params(
        &self,
        name: &str,
        raw: &Map<String, Value>,
    ) -> Result<(), RegistryError> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| RegistryError::UnknownEngine(name.to_string()))?;

        match &descriptor.parameter_schema {
            Some(schema) => schema
                .validate(raw)
                .map_err(RegistryError::InvalidParameters)?,
            None if !raw.is_empty() => {
                return Err(RegistryError::InvalidParameters(format!(
                    "engine '{name}' takes no parameters"
                )));
            }
            None => {}
        }

        let engine = self.get_engine(name)?;
        match engine.validate_config(raw) {
            Ok(()) => Ok(()),
            Err(EngineError::InvalidParameters(reason)) => {
                Err(RegistryError::InvalidParameters(reason))
            }
            Err(other) => Err(RegistryError::InvalidParameters(other.to_string())),
        }
    }

    /// False for unknown engines, and for known engines whose circuit is
    /// currently open.
    pub fn is_available(&self, name: &str) -> bool {
        self.entries.contains_key(name) && self.breaker.is_available(name)
    }

    pub fn record_success(&self, name: &str) {
        self.breaker.record_success(name);
    }

    pub fn record_failure(&self, name: &str) {
        self.breaker.record_failure(name);
    }

    pub fn health(&self, name: &str) -> Option<HealthSnapshot> {
        self.breaker.snapshot(name)
    }
}

fn check_registration(descriptor: &EngineDescriptor) -> Result<(), String> {
    if descriptor.name.is_empty() {
        return Err("engine name is empty".to_string());
    }
    if descriptor.supported_formats.is_empty() {
        return Err("engine declares no supported formats".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::engine::DocumentFormat;
    use crate::models::hocr::HocrDocument;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubEngine {
        descriptor: EngineDescriptor,
    }

    #[async_trait]
    impl OcrEngine for StubEngine {
        fn descriptor(&self) -> &EngineDescriptor {
            &self.descriptor
        }

        async fn process(
            &self,
            _document: &Path,
            _params: &Map<String, Value>,
        ) -> Result<HocrDocument, EngineError> {
            Err(EngineError::Failed("stub".to_string()))
        }
    }

    fn descriptor(name: &str) -> EngineDescriptor {
        EngineDescriptor::new(name, [DocumentFormat::Png], None)
    }

    fn stub_registration(name: &str) -> EngineRegistration {
        let desc = descriptor(name);
        let factory_desc = desc.clone();
        EngineRegistration::new(desc, move || {
            Arc::new(StubEngine {
                descriptor: factory_desc.clone(),
            })
        })
    }

    fn default_breaker() -> CircuitBreaker {
        CircuitBreaker::new(breaker::BreakerConfig::default())
    }

    #[test]
    fn lazy_construction_is_exactly_once_under_races() {
        static CONSTRUCTIONS: AtomicUsize = AtomicUsize::new(0);

        let desc = descriptor("counted");
        let factory_desc = desc.clone();
        let registration = EngineRegistration::new(desc, move || {
            CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
            Arc::new(StubEngine {
                descriptor: factory_desc.clone(),
            }) as Arc<dyn OcrEngine>
        });

        let registry =
            Arc::new(EngineRegistry::discover(vec![registration], false, default_breaker()).unwrap());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_engine("counted").unwrap())
            })
            .collect();
        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(CONSTRUCTIONS.load(Ordering::SeqCst), 1);
        for pair in instances.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[test]
    fn duplicate_names_resolve_last_wins() {
        let first = stub_registration("dup");
        let mut second_desc = descriptor("dup");
        second_desc.supported_formats.insert(DocumentFormat::Pdf);
        let factory_desc = second_desc.clone();
        let second = EngineRegistration::new(second_desc, move || {
            Arc::new(StubEngine {
                descriptor: factory_desc.clone(),
            }) as Arc<dyn OcrEngine>
        });

        let registry =
            EngineRegistry::discover(vec![first, second], false, default_breaker()).unwrap();
        assert_eq!(registry.engine_names(), vec!["dup"]);
        assert!(registry.descriptor("dup").unwrap().supports(DocumentFormat::Pdf));
    }

    #[test]
    fn broken_registration_is_skipped_unless_strict() {
        let broken = stub_registration("");
        let good = stub_registration("good");
        let registry =
            EngineRegistry::discover(vec![broken, good], false, default_breaker()).unwrap();
        assert_eq!(registry.engine_names(), vec!["good"]);

        let broken = stub_registration("");
        let good = stub_registration("good");
        let strict = EngineRegistry::discover(vec![broken, good], true, default_breaker());
        assert!(matches!(
            strict,
            Err(RegistryError::InvalidRegistration { .. })
        ));
    }

    #[test]
    fn unknown_engines_are_not_available() {
        let registry =
            EngineRegistry::discover(vec![stub_registration("known")], false, default_breaker())
                .unwrap();
        assert!(registry.is_available("known"));
        assert!(!registry.is_available("missing"));
        assert!(matches!(
            registry.get_engine("missing"),
            Err(RegistryError::UnknownEngine(_))
        ));
    }

    #[test]
    fn open_circuit_makes_engine_unavailable() {
        let breaker = CircuitBreaker::new(breaker::BreakerConfig {
            enabled: true,
            failure_threshold: 2,
            success_threshold: 3,
            cooldown: Duration::from_secs(300),
        });
        let registry =
            EngineRegistry::discover(vec![stub_registration("flaky")], false, breaker).unwrap();

        registry.record_failure("flaky");
        assert!(registry.is_available("flaky"));
        registry.record_failure("flaky");
        assert!(!registry.is_available("flaky"));
    }

    #[test]
    fn params_rejected_when_engine_takes_none() {
        let registry =
            EngineRegistry::discover(vec![stub_registration("bare")], false, default_breaker())
                .unwrap();
        let mut raw = Map::new();
        raw.insert("mode".to_string(), Value::from(6));
        assert!(matches!(
            registry.validate_params("bare", &raw),
            Err(RegistryError::InvalidParameters(_))
        ));
        assert!(registry.validate_params("bare", &Map::new()).is_ok());
    }
}
