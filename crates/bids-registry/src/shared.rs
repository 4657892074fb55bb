use crate::{
    ExportReport, ParticipantRegistry, ParticipantTable, RegisterOutcome, RegistryError,
    SessionUnit,
};
use bids_core::MetadataSnapshot;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A registry handle for parallel workers. Every call holds the registry's
/// lock for its whole duration.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<ParticipantRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: ParticipantRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut ParticipantRegistry) -> R,
    ) -> Result<R, RegistryError> {
        let mut registry = self.inner.lock().map_err(|_| RegistryError::Poisoned)?;
        Ok(f(&mut registry))
    }

    pub fn register(
        &self,
        subject: &str,
        session: Option<&str>,
        snapshot: MetadataSnapshot,
        allow_conflict: bool,
    ) -> Result<RegisterOutcome, RegistryError> {
        self.with(|registry| registry.register(subject, session, snapshot, allow_conflict))?
    }

    pub fn register_unit(
        &self,
        unit: &SessionUnit,
        allow_conflict: bool,
    ) -> Result<RegisterOutcome, RegistryError> {
        self.with(|registry| registry.register_unit(unit, allow_conflict))?
    }

    pub fn export_rows(&self, path: impl AsRef<Path>) -> Result<ExportReport, RegistryError> {
        self.with(|registry| registry.export_rows(path))?
    }

    pub fn export_table(&self) -> Result<ParticipantTable, RegistryError> {
        self.with(|registry| registry.export_table())
    }

    pub fn schema_compatible(
        &self,
        table: Option<&ParticipantTable>,
    ) -> Result<bool, RegistryError> {
        self.with(|registry| registry.schema_compatible(table))
    }

    /// Unwraps the registry once no other handle is alive.
    pub fn into_inner(self) -> Result<ParticipantRegistry, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex
                .into_inner()
                .map_err(|poisoned| Self::new(poisoned.into_inner())),
            Err(inner) => Err(Self { inner }),
        }
    }
}
