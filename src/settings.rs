use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{GangsheetError, Result};
use crate::types::PackingSettings;

pub fn validate(settings: &PackingSettings) -> Result<()> {
    if settings.roll_width == 0 {
        return Err(GangsheetError::Validation("rollWidth must be positive".into()));
    }
    if settings.dpi == 0 {
        return Err(GangsheetError::Validation("dpi must be positive".into()));
    }
    if settings.margin_left >= settings.roll_width {
        return Err(GangsheetError::Validation(
            "marginLeft leaves no printable width".into(),
        ));
    }
    if let Some(limit) = settings.roll_length.limit()
        && settings.margin_top >= limit
    {
        return Err(GangsheetError::Validation(
            "rollLength must exceed marginTop".into(),
        ));
    }
    Ok(())
}

pub trait SettingsStore: Send + Sync {
    fn default_settings(&self, tenant_id: &str) -> Result<Option<PackingSettings>>;
    fn update_default_settings(&self, tenant_id: &str, settings: PackingSettings) -> Result<()>;
}

#[derive(Default)]
pub struct InMemorySettingsStore {
    by_tenant: RwLock<HashMap<String, PackingSettings>>,
}

impl SettingsStore for InMemorySettingsStore {
    fn default_settings(&self, tenant_id: &str) -> Result<Option<PackingSettings>> {
        Ok(self.by_tenant.read().get(tenant_id).copied())
    }

    fn update_default_settings(&self, tenant_id: &str, settings: PackingSettings) -> Result<()> {
        self.by_tenant.write().insert(tenant_id.to_string(), settings);
        Ok(())
    }
}

#[derive(Clone)]
pub struct SettingsResolver {
    store: Arc<dyn SettingsStore>,
}

impl SettingsResolver {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Settings for a packing run: the override if given, else the tenant default.
    pub fn resolve(
        &self,
        tenant_id: &str,
        settings_override: Option<PackingSettings>,
    ) -> Result<PackingSettings> {
        if tenant_id.is_empty() {
            return Err(GangsheetError::MissingTenant);
        }
        let settings = match settings_override {
            Some(s) => s,
            None => self.tenant_defaults(tenant_id)?,
        };
        validate(&settings)?;
        Ok(settings)
    }

    pub fn tenant_defaults(&self, tenant_id: &str) -> Result<PackingSettings> {
        if tenant_id.is_empty() {
            return Err(GangsheetError::MissingTenant);
        }
        Ok(self
            .store
            .default_settings(tenant_id)?
            .unwrap_or_default())
    }

    pub fn update_defaults(
        &self,
        tenant_id: &str,
        settings: PackingSettings,
    ) -> Result<PackingSettings> {
        if tenant_id.is_empty() {
            return Err(GangsheetError::MissingTenant);
        }
        validate(&settings)?;
        self.store.update_default_settings(tenant_id, settings)?;
        tracing::info!(tenant = tenant_id, ?settings, "updated default packing settings");
        Ok(settings)
    }
}
