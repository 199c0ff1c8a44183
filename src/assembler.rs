use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{GangsheetError, Result};
use crate::extractor::{DesignLookup, Extraction, RejectedItem, extract};
use crate::gangsheet::{Gangsheet, GangsheetStatus, GangsheetStatusView, StatusUpdate};
use crate::render::{RenderJob, Renderer};
use crate::settings::SettingsResolver;
use crate::solver::Solver;
use crate::store::GangsheetStore;
use crate::types::{OrderId, PackingSettings, PlacementResult};

const MAX_WRITE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GangsheetRequest {
    pub order_ids: Vec<OrderId>,
    #[serde(default)]
    pub product_ids: Option<Vec<String>>,
    #[serde(default)]
    pub settings: Option<PackingSettings>,
    #[serde(default)]
    pub group_by_modification: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub settings: PackingSettings,
    pub result: PlacementResult,
    pub unresolved_order_ids: Vec<OrderId>,
    pub rejected_items: Vec<RejectedItem>,
}

struct Plan {
    settings: PackingSettings,
    extraction: Extraction,
    result: PlacementResult,
}

pub struct Assembler<R: Renderer> {
    resolver: SettingsResolver,
    lookup: Arc<dyn DesignLookup>,
    store: Arc<dyn GangsheetStore>,
    renderer: Arc<R>,
    render_timeout: Duration,
    render_tasks: Arc<Mutex<HashMap<Uuid, AbortHandle>>>,
}

impl<R: Renderer> Assembler<R> {
    pub fn new(
        resolver: SettingsResolver,
        lookup: Arc<dyn DesignLookup>,
        store: Arc<dyn GangsheetStore>,
        renderer: Arc<R>,
        render_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            lookup,
            store,
            renderer,
            render_timeout,
            render_tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn plan(&self, tenant_id: &str, req: &GangsheetRequest) -> Result<Plan> {
        let settings = self.resolver.resolve(tenant_id, req.settings)?;
        let extraction = extract(
            self.lookup.as_ref(),
            tenant_id,
            &req.order_ids,
            req.product_ids.as_deref(),
        )?;
        if extraction.items.is_empty() {
            return Err(GangsheetError::NoPlaceableItems(format!(
                "none of the {} requested orders have resolvable designs",
                req.order_ids.len()
            )));
        }

        let result = Solver::new(settings, req.group_by_modification).solve(&extraction.items)?;
        if result.total_designs == 0 {
            return Err(GangsheetError::NoPlaceableItems(format!(
                "all {} design items are larger than the roll",
                result.failed.len()
            )));
        }
        Ok(Plan {
            settings,
            extraction,
            result,
        })
    }

    /// Packs without persisting anything.
    pub fn preview(&self, tenant_id: &str, req: &GangsheetRequest) -> Result<Preview> {
        let plan = self.plan(tenant_id, req)?;
        Ok(Preview {
            settings: plan.settings,
            result: plan.result,
            unresolved_order_ids: plan.extraction.unresolved_order_ids,
            rejected_items: plan.extraction.rejected,
        })
    }

    /// Must be called from within a Tokio runtime, which runs the render task.
    pub fn create_gangsheet(&self, tenant_id: &str, req: &GangsheetRequest) -> Result<Gangsheet> {
        let runtime = Handle::try_current()
            .map_err(|e| GangsheetError::Rendering(format!("no runtime for render task: {e}")))?;
        let Plan {
            settings,
            extraction,
            result,
        } = self.plan(tenant_id, req)?;

        let now = Utc::now();
        let mut order_ids = req.order_ids.clone();
        order_ids.sort_unstable();
        order_ids.dedup();
        let gangsheet = Gangsheet {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            status: GangsheetStatus::Pending,
            settings,
            group_by_modification: req.group_by_modification,
            order_ids,
            result,
            unresolved_order_ids: extraction.unresolved_order_ids,
            rejected_items: extraction.rejected,
            file_urls: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        self.store.save(gangsheet.clone())?;
        info!(
            tenant = tenant_id,
            gangsheet = %gangsheet.id,
            rolls = gangsheet.result.total_rolls,
            designs = gangsheet.result.total_designs,
            oversized = gangsheet.result.failed.len(),
            "gangsheet created"
        );

        let image_urls = extraction
            .items
            .into_iter()
            .map(|item| (item.id, item.image_url))
            .collect();
        self.spawn_render(&runtime, &gangsheet, image_urls);
        Ok(gangsheet)
    }

    fn spawn_render(
        &self,
        runtime: &Handle,
        gangsheet: &Gangsheet,
        image_urls: HashMap<String, String>,
    ) {
        let job = RenderJob {
            gangsheet_id: gangsheet.id,
            settings: gangsheet.settings,
            result: gangsheet.result.clone(),
            image_urls,
        };
        let store = Arc::clone(&self.store);
        let renderer = Arc::clone(&self.renderer);
        let tasks = Arc::clone(&self.render_tasks);
        let timeout = self.render_timeout;
        let tenant_id = gangsheet.tenant_id.clone();
        let id = gangsheet.id;

        // Held across spawn so the task cannot deregister before it is registered.
        let mut registry = self.render_tasks.lock();
        let handle = runtime.spawn(async move {
            run_render(store.as_ref(), renderer.as_ref(), timeout, &tenant_id, job).await;
            tasks.lock().remove(&id);
        });
        registry.insert(id, handle.abort_handle());
    }

    pub fn get_gangsheet(&self, tenant_id: &str, id: Uuid) -> Result<Gangsheet> {
        require_tenant(tenant_id)?;
        self.store
            .load(id, tenant_id)?
            .ok_or_else(|| GangsheetError::NotFound(format!("gangsheet {id}")))
    }

    pub fn get_gangsheet_status(&self, tenant_id: &str, id: Uuid) -> Result<GangsheetStatusView> {
        self.get_gangsheet(tenant_id, id)
            .map(|g| GangsheetStatusView::from(&g))
    }

    /// File URLs of a completed gangsheet, one per roll.
    pub fn download_gangsheet(&self, tenant_id: &str, id: Uuid) -> Result<Vec<String>> {
        let g = self.get_gangsheet(tenant_id, id)?;
        match g.status {
            GangsheetStatus::Completed => Ok(g.file_urls),
            GangsheetStatus::Failed => Err(GangsheetError::Conflict(format!(
                "gangsheet {id} failed to render: {}",
                g.error.unwrap_or_default()
            ))),
            status => Err(GangsheetError::Conflict(format!(
                "gangsheet {id} is {status:?}, not ready for download"
            ))),
        }
    }

    pub fn delete_gangsheet(&self, tenant_id: &str, id: Uuid) -> Result<()> {
        require_tenant(tenant_id)?;
        if !self.store.delete(id, tenant_id)? {
            return Err(GangsheetError::NotFound(format!("gangsheet {id}")));
        }
        if let Some(handle) = self.render_tasks.lock().remove(&id) {
            handle.abort();
            debug!(gangsheet = %id, "aborted render of deleted gangsheet");
        }
        info!(tenant = tenant_id, gangsheet = %id, "gangsheet deleted");
        Ok(())
    }

    pub fn list_gangsheets(&self, tenant_id: &str) -> Result<Vec<Gangsheet>> {
        require_tenant(tenant_id)?;
        self.store.list(tenant_id)
    }

    pub fn settings(&self, tenant_id: &str) -> Result<PackingSettings> {
        self.resolver.tenant_defaults(tenant_id)
    }

    pub fn update_settings(
        &self,
        tenant_id: &str,
        settings: PackingSettings,
    ) -> Result<PackingSettings> {
        self.resolver.update_defaults(tenant_id, settings)
    }
}

fn require_tenant(tenant_id: &str) -> Result<()> {
    if tenant_id.is_empty() {
        return Err(GangsheetError::MissingTenant);
    }
    Ok(())
}

async fn run_render<R: Renderer>(
    store: &dyn GangsheetStore,
    renderer: &R,
    timeout: Duration,
    tenant_id: &str,
    job: RenderJob,
) {
    let id = job.gangsheet_id;
    if let Err(e) = transition(store, id, tenant_id, StatusUpdate::processing()) {
        warn!(gangsheet = %id, "render skipped: {e}");
        return;
    }

    let update = match tokio::time::timeout(timeout, renderer.render(job)).await {
        Ok(Ok(urls)) => {
            info!(gangsheet = %id, files = urls.len(), "gangsheet rendered");
            StatusUpdate::completed(urls)
        }
        Ok(Err(e)) => {
            warn!(gangsheet = %id, "render failed: {e}");
            StatusUpdate::failed(e.to_string())
        }
        Err(_) => {
            warn!(gangsheet = %id, timeout_secs = timeout.as_secs_f64(), "render timed out");
            StatusUpdate::failed(format!("render timed out after {:?}", timeout))
        }
    };

    if let Err(e) = transition(store, id, tenant_id, update) {
        error!(gangsheet = %id, "could not record render outcome: {e}");
        let fallback = StatusUpdate::failed(format!("could not record render outcome: {e}"));
        if let Err(e) = transition(store, id, tenant_id, fallback) {
            error!(gangsheet = %id, "gangsheet left unfinished: {e}");
        }
    }
}

/// Applies a status change with optimistic locking, reloading on version conflicts.
pub(crate) fn transition(
    store: &dyn GangsheetStore,
    id: Uuid,
    tenant_id: &str,
    update: StatusUpdate,
) -> Result<Gangsheet> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let current = store
            .load(id, tenant_id)?
            .ok_or_else(|| GangsheetError::NotFound(format!("gangsheet {id}")))?;
        if !current.status.can_transition_to(update.status) {
            return Err(GangsheetError::Conflict(format!(
                "gangsheet {id} cannot move from {:?} to {:?}",
                current.status, update.status
            )));
        }
        match store.update_status(id, current.version, update.clone()) {
            Ok(g) => {
                debug!(gangsheet = %id, status = ?g.status, version = g.version, "status updated");
                return Ok(g);
            }
            Err(GangsheetError::Conflict(msg)) => {
                debug!(gangsheet = %id, attempt, "write conflict: {msg}");
            }
            Err(e) => return Err(e),
        }
    }
    Err(GangsheetError::Conflict(format!(
        "gangsheet {id} kept changing after {MAX_WRITE_ATTEMPTS} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{DesignRecord, InMemoryDesignLookup};
    use crate::settings::InMemorySettingsStore;
    use crate::store::InMemoryGangsheetStore;
    use crate::types::{RollLength, inches};

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeed,
        Fail,
        Hang,
    }

    struct StubRenderer(Outcome);

    impl Renderer for StubRenderer {
        async fn render(&self, job: RenderJob) -> Result<Vec<String>> {
            match self.0 {
                Outcome::Succeed => Ok(job
                    .result
                    .rolls
                    .iter()
                    .map(|r| format!("mem://{}/{}", job.gangsheet_id, r.roll_number))
                    .collect()),
                Outcome::Fail => Err(GangsheetError::Rendering("printer on fire".into())),
                Outcome::Hang => std::future::pending().await,
            }
        }
    }

    fn record(order_id: OrderId, line: u32, w_in: u32, group: &str) -> DesignRecord {
        DesignRecord {
            order_id,
            line_index: line,
            design_item_id: format!("{order_id}-{line}"),
            product_id: None,
            group_key: Some(group.to_string()),
            width_px: w_in * 300,
            height_px: 3000,
            image_url: format!("https://cdn.example/{order_id}-{line}.png"),
        }
    }

    fn settings() -> PackingSettings {
        PackingSettings {
            roll_width: inches(22),
            roll_length: RollLength::Bounded(inches(30)),
            dpi: 300,
            gap_between_items: 0,
            margin_top: 0,
            margin_left: 0,
        }
    }

    fn assembler(outcome: Outcome) -> (Assembler<StubRenderer>, Arc<InMemoryGangsheetStore>) {
        let lookup = InMemoryDesignLookup::default();
        lookup.insert("acme", record(1, 0, 10, "front"));
        lookup.insert("acme", record(1, 1, 10, "back"));
        lookup.insert("acme", record(2, 0, 12, "front"));
        lookup.insert("acme", record(3, 0, 30, "front"));
        lookup.insert("acme", record(4, 0, 12, "front"));
        let settings_store = Arc::new(InMemorySettingsStore::default());
        let store = Arc::new(InMemoryGangsheetStore::default());
        let assembler = Assembler::new(
            SettingsResolver::new(settings_store),
            Arc::new(lookup),
            store.clone(),
            Arc::new(StubRenderer(outcome)),
            Duration::from_millis(50),
        );
        assembler.update_settings("acme", settings()).unwrap();
        (assembler, store)
    }

    fn request(order_ids: Vec<OrderId>) -> GangsheetRequest {
        GangsheetRequest {
            order_ids,
            ..Default::default()
        }
    }

    async fn wait_for_terminal(a: &Assembler<StubRenderer>, id: Uuid) -> Gangsheet {
        for _ in 0..200 {
            let g = a.get_gangsheet("acme", id).unwrap();
            if g.status.is_terminal() {
                return g;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("gangsheet {id} never reached a terminal status");
    }

    #[test]
    fn test_preview_partial_resolution() {
        let (a, store) = assembler(Outcome::Succeed);
        let preview = a.preview("acme", &request(vec![1, 2, 99])).unwrap();
        assert_eq!(preview.result.total_designs, 3);
        assert_eq!(preview.unresolved_order_ids, vec![99]);
        assert!(store.list("acme").unwrap().is_empty());
    }

    #[test]
    fn test_preview_matches_created_layout() {
        let (a, _) = assembler(Outcome::Succeed);
        let req = request(vec![4, 2, 1]);
        let preview = a.preview("acme", &req).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let created = rt.block_on(async { a.create_gangsheet("acme", &req) }).unwrap();
        assert_eq!(preview.result, created.result);
    }

    #[test]
    fn test_oversized_items_surface_in_result() {
        let (a, _) = assembler(Outcome::Succeed);
        let preview = a.preview("acme", &request(vec![2, 3])).unwrap();
        assert_eq!(preview.result.total_designs, 1);
        assert_eq!(preview.result.failed.len(), 1);
        assert_eq!(preview.result.failed[0].order_id, 3);
    }

    #[test]
    fn test_all_oversized_is_error() {
        let (a, _) = assembler(Outcome::Succeed);
        let err = a.preview("acme", &request(vec![3])).unwrap_err();
        assert!(matches!(err, GangsheetError::NoPlaceableItems(_)));
    }

    #[test]
    fn test_nothing_resolvable_is_error() {
        let (a, _) = assembler(Outcome::Succeed);
        let err = a.preview("acme", &request(vec![98, 99])).unwrap_err();
        assert!(matches!(err, GangsheetError::NoPlaceableItems(_)));
    }

    #[test]
    fn test_empty_order_list_is_validation_error() {
        let (a, _) = assembler(Outcome::Succeed);
        let err = a.preview("acme", &request(vec![])).unwrap_err();
        assert!(matches!(err, GangsheetError::Validation(_)));
    }

    #[test]
    fn test_override_settings_used() {
        let (a, _) = assembler(Outcome::Succeed);
        let req = GangsheetRequest {
            settings: Some(PackingSettings {
                roll_length: RollLength::Unbounded,
                ..settings()
            }),
            ..request(vec![1, 2, 4])
        };
        let preview = a.preview("acme", &req).unwrap();
        assert_eq!(preview.result.total_rolls, 1);
        assert_eq!(preview.settings.roll_length, RollLength::Unbounded);
    }

    #[test]
    fn test_group_by_modification() {
        let (a, _) = assembler(Outcome::Succeed);
        let req = GangsheetRequest {
            group_by_modification: true,
            ..request(vec![1, 2])
        };
        let preview = a.preview("acme", &req).unwrap();
        let ids: Vec<_> = preview
            .result
            .rolls
            .iter()
            .flat_map(|r| &r.placements)
            .map(|p| p.design_item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1-0", "2-0", "1-1"]);
    }

    #[tokio::test]
    async fn test_create_renders_to_completed() {
        let (a, _) = assembler(Outcome::Succeed);
        let g = a.create_gangsheet("acme", &request(vec![1, 2, 4, 99])).unwrap();
        assert_eq!(g.status, GangsheetStatus::Pending);
        assert_eq!(g.unresolved_order_ids, vec![99]);
        assert_eq!(g.order_ids, vec![1, 2, 4, 99]);

        let done = wait_for_terminal(&a, g.id).await;
        assert_eq!(done.status, GangsheetStatus::Completed);
        assert_eq!(done.file_urls.len(), done.result.total_rolls);
        assert_eq!(a.download_gangsheet("acme", g.id).unwrap(), done.file_urls);
        assert_eq!(done.version, 2);
    }

    #[tokio::test]
    async fn test_render_failure_marks_failed_and_keeps_layout() {
        let (a, _) = assembler(Outcome::Fail);
        let g = a.create_gangsheet("acme", &request(vec![1])).unwrap();
        let done = wait_for_terminal(&a, g.id).await;
        assert_eq!(done.status, GangsheetStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("printer on fire"));
        assert_eq!(done.result, g.result);
        assert!(matches!(
            a.download_gangsheet("acme", g.id),
            Err(GangsheetError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_render_timeout_marks_failed() {
        let (a, _) = assembler(Outcome::Hang);
        let g = a.create_gangsheet("acme", &request(vec![1])).unwrap();
        let done = wait_for_terminal(&a, g.id).await;
        assert_eq!(done.status, GangsheetStatus::Failed);
        assert!(done.error.unwrap().contains("timed out"));
        let status = a.get_gangsheet_status("acme", g.id).unwrap();
        assert_eq!(status.status, GangsheetStatus::Failed);
    }

    #[tokio::test]
    async fn test_download_before_completion_conflicts() {
        let (a, _) = assembler(Outcome::Hang);
        let g = a.create_gangsheet("acme", &request(vec![1])).unwrap();
        assert!(matches!(
            a.download_gangsheet("acme", g.id),
            Err(GangsheetError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_aborts_render_and_removes() {
        let (a, _) = assembler(Outcome::Hang);
        let g = a.create_gangsheet("acme", &request(vec![1])).unwrap();
        a.delete_gangsheet("acme", g.id).unwrap();
        assert!(a.render_tasks.lock().is_empty());
        assert!(matches!(
            a.get_gangsheet("acme", g.id),
            Err(GangsheetError::NotFound(_))
        ));
        assert!(matches!(
            a.delete_gangsheet("acme", g.id),
            Err(GangsheetError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_gangsheets_are_tenant_scoped() {
        let (a, _) = assembler(Outcome::Succeed);
        let g = a.create_gangsheet("acme", &request(vec![1])).unwrap();
        assert!(matches!(
            a.get_gangsheet("other", g.id),
            Err(GangsheetError::NotFound(_))
        ));
        assert_eq!(a.list_gangsheets("acme").unwrap().len(), 1);
        assert!(a.list_gangsheets("other").unwrap().is_empty());
        assert!(matches!(
            a.list_gangsheets(""),
            Err(GangsheetError::MissingTenant)
        ));
    }

    #[tokio::test]
    async fn test_settings_snapshot_is_immutable() {
        let (a, _) = assembler(Outcome::Succeed);
        let g = a.create_gangsheet("acme", &request(vec![1])).unwrap();
        a.update_settings("acme", PackingSettings::default()).unwrap();
        let stored = a.get_gangsheet("acme", g.id).unwrap();
        assert_eq!(stored.settings, settings());
    }

    #[test]
    fn test_create_outside_runtime_is_error() {
        let (a, store) = assembler(Outcome::Succeed);
        let err = a.create_gangsheet("acme", &request(vec![1])).unwrap_err();
        assert!(matches!(err, GangsheetError::Rendering(_)));
        assert!(store.list("acme").unwrap().is_empty());
    }

    /// Refuses to record a completed render.
    struct CompletionRefusingStore(InMemoryGangsheetStore);

    impl GangsheetStore for CompletionRefusingStore {
        fn save(&self, gangsheet: Gangsheet) -> Result<Uuid> {
            self.0.save(gangsheet)
        }

        fn load(&self, id: Uuid, tenant_id: &str) -> Result<Option<Gangsheet>> {
            self.0.load(id, tenant_id)
        }

        fn update_status(
            &self,
            id: Uuid,
            expected_version: u64,
            update: StatusUpdate,
        ) -> Result<Gangsheet> {
            if update.status == GangsheetStatus::Completed {
                return Err(GangsheetError::Persistence("disk full".into()));
            }
            self.0.update_status(id, expected_version, update)
        }

        fn delete(&self, id: Uuid, tenant_id: &str) -> Result<bool> {
            self.0.delete(id, tenant_id)
        }

        fn list(&self, tenant_id: &str) -> Result<Vec<Gangsheet>> {
            self.0.list(tenant_id)
        }
    }

    #[tokio::test]
    async fn test_unrecordable_outcome_marks_failed() {
        let store = CompletionRefusingStore(InMemoryGangsheetStore::default());
        let g = crate::store::tests::gangsheet("acme");
        let job = RenderJob {
            gangsheet_id: g.id,
            settings: g.settings,
            result: g.result.clone(),
            image_urls: HashMap::new(),
        };
        let id = store.save(g).unwrap();
        run_render(
            &store,
            &StubRenderer(Outcome::Succeed),
            Duration::from_secs(1),
            "acme",
            job,
        )
        .await;

        let g = store.load(id, "acme").unwrap().unwrap();
        assert_eq!(g.status, GangsheetStatus::Failed);
        assert!(g.error.unwrap().contains("disk full"));
    }

    #[test]
    fn test_transition_reloads_after_concurrent_write() {
        let store = InMemoryGangsheetStore::default();
        let id = store.save(crate::store::tests::gangsheet("acme")).unwrap();
        // another writer moves the record on first
        store.update_status(id, 0, StatusUpdate::processing()).unwrap();
        let g = transition(&store, id, "acme", StatusUpdate::failed("boom")).unwrap();
        assert_eq!(g.status, GangsheetStatus::Failed);
        assert_eq!(g.version, 2);

        let err = transition(&store, id, "acme", StatusUpdate::processing()).unwrap_err();
        assert!(matches!(err, GangsheetError::Conflict(_)));
    }
}
