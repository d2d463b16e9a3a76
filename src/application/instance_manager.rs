//! Instance Lifecycle Manager
//!
//! Registry of live connection instances, one per connection id. Instances
//! are built lazily on first use and replaced (old one disposed) when the
//! settings for their connection change.

use crate::domain::entities::ConnectionSettings;
use crate::error::DatasourceError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Connection-scoped state owned by an [`InstanceManager`].
pub trait Instance: Send + Sync + 'static {
    /// Release held resources. Called once, when the instance is replaced or
    /// the manager is torn down. Must not perform network calls.
    fn dispose(&self);
}

/// Builds an instance from connection settings.
pub type InstanceFactory<I> =
    Arc<dyn Fn(&ConnectionSettings) -> Result<I, DatasourceError> + Send + Sync>;

struct RegisteredInstance<I> {
    settings: ConnectionSettings,
    instance: Arc<I>,
}

/// Instance registry keyed by connection id.
///
/// Lookups for an already-built instance only take a shard read lock.
/// Construction happens while holding the exclusive entry for that
/// connection id, so racing callers never build the same instance twice.
pub struct InstanceManager<I: Instance> {
    instances: DashMap<String, RegisteredInstance<I>>,
    factory: InstanceFactory<I>,
}

impl<I: Instance> InstanceManager<I> {
    pub fn new(factory: InstanceFactory<I>) -> Self {
        Self {
            instances: DashMap::new(),
            factory,
        }
    }

    /// Return the live instance for `settings`, building it if needed.
    pub fn get_or_create(&self, settings: &ConnectionSettings) -> Result<Arc<I>, DatasourceError> {
        if let Some(registered) = self.instances.get(&settings.id) {
            if registered.settings == *settings {
                return Ok(Arc::clone(&registered.instance));
            }
        }

        match self.instances.entry(settings.id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().settings == *settings {
                    return Ok(Arc::clone(&entry.get().instance));
                }
                let instance = self.build(settings)?;
                let previous = entry.insert(RegisteredInstance {
                    settings: settings.clone(),
                    instance: Arc::clone(&instance),
                });
                previous.instance.dispose();
                tracing::info!(
                    "settings changed for connection {}, replaced instance (updated={})",
                    settings.id,
                    settings.updated
                );
                Ok(instance)
            }
            Entry::Vacant(entry) => {
                let instance = self.build(settings)?;
                entry.insert(RegisteredInstance {
                    settings: settings.clone(),
                    instance: Arc::clone(&instance),
                });
                tracing::info!("created instance for connection {}", settings.id);
                Ok(instance)
            }
        }
    }

    /// Dispose and unregister the instance for `connection_id`.
    pub fn dispose(&self, connection_id: &str) -> bool {
        match self.instances.remove(connection_id) {
            Some((_, registered)) => {
                registered.instance.dispose();
                tracing::info!("disposed instance for connection {}", connection_id);
                true
            }
            None => false,
        }
    }

    /// Dispose every instance. Used at shutdown.
    pub fn dispose_all(&self) -> usize {
        let ids: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.dispose(id)).count()
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn build(&self, settings: &ConnectionSettings) -> Result<Arc<I>, DatasourceError> {
        match (self.factory)(settings) {
            Ok(instance) => Ok(Arc::new(instance)),
            Err(e) => {
                tracing::warn!(
                    "failed to build instance for connection {}: {}",
                    settings.id,
                    e
                );
                Err(e)
            }
        }
    }
}
