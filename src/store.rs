use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{GangsheetError, Result};
use crate::gangsheet::{Gangsheet, StatusUpdate};

pub trait GangsheetStore: Send + Sync {
    fn save(&self, gangsheet: Gangsheet) -> Result<Uuid>;
    fn load(&self, id: Uuid, tenant_id: &str) -> Result<Option<Gangsheet>>;
    /// Applies `update` if the stored version equals `expected_version`.
    fn update_status(
        &self,
        id: Uuid,
        expected_version: u64,
        update: StatusUpdate,
    ) -> Result<Gangsheet>;
    fn delete(&self, id: Uuid, tenant_id: &str) -> Result<bool>;
    fn list(&self, tenant_id: &str) -> Result<Vec<Gangsheet>>;
}

#[derive(Default)]
pub struct InMemoryGangsheetStore {
    rows: RwLock<HashMap<Uuid, Gangsheet>>,
}

impl GangsheetStore for InMemoryGangsheetStore {
    fn save(&self, gangsheet: Gangsheet) -> Result<Uuid> {
        let mut rows = self.rows.write();
        if rows.contains_key(&gangsheet.id) {
            return Err(GangsheetError::Persistence(format!(
                "gangsheet {} already exists",
                gangsheet.id
            )));
        }
        let id = gangsheet.id;
        rows.insert(id, gangsheet);
        Ok(id)
    }

    fn load(&self, id: Uuid, tenant_id: &str) -> Result<Option<Gangsheet>> {
        Ok(self
            .rows
            .read()
            .get(&id)
            .filter(|g| g.tenant_id == tenant_id)
            .cloned())
    }

    fn update_status(
        &self,
        id: Uuid,
        expected_version: u64,
        update: StatusUpdate,
    ) -> Result<Gangsheet> {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| GangsheetError::NotFound(format!("gangsheet {id}")))?;
        if row.version != expected_version {
            return Err(GangsheetError::Conflict(format!(
                "gangsheet {id} is at version {}, expected {expected_version}",
                row.version
            )));
        }
        if !row.status.can_transition_to(update.status) {
            return Err(GangsheetError::Conflict(format!(
                "gangsheet {id} cannot move from {:?} to {:?}",
                row.status, update.status
            )));
        }
        row.status = update.status;
        if let Some(urls) = update.file_urls {
            row.file_urls = urls;
        }
        if update.error.is_some() {
            row.error = update.error;
        }
        row.version += 1;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    fn delete(&self, id: Uuid, tenant_id: &str) -> Result<bool> {
        let mut rows = self.rows.write();
        match rows.get(&id) {
            Some(g) if g.tenant_id == tenant_id => {
                rows.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list(&self, tenant_id: &str) -> Result<Vec<Gangsheet>> {
        let mut out: Vec<Gangsheet> = self
            .rows
            .read()
            .values()
            .filter(|g| g.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}
