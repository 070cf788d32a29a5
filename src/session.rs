use std::sync::Arc;

use crate::collector::{CancelToken, CollectedRecords};
use crate::domain::{CatalogEntry, ResourceId, ResourceMeta};
use crate::error::ExplorerError;
use crate::i18n::Lang;

/// Identifies one fetch request; only the newest ticket may publish.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub generation: u64,
    pub resource: ResourceId,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone)]
pub enum FetchState {
    Idle,
    Loading(ResourceId),
    Ready(Arc<CollectedRecords>),
    Failed(Arc<ExplorerError>),
}

/// Per-user UI state. Selecting a new resource discards whatever the previous
/// selection produced, including fetches still in flight.
#[derive(Debug)]
pub struct Session {
    pub lang: Lang,
    pub max_rows: Option<usize>,
    pub filter: String,
    selected: Option<ResourceId>,
    meta: Option<ResourceMeta>,
    catalog: Option<Arc<Vec<CatalogEntry>>>,
    state: FetchState,
    generation: u64,
    active: Option<CancelToken>,
}

impl Session {
    pub fn new(lang: Lang, max_rows: Option<usize>) -> Self {
        Self {
            lang,
            max_rows,
            filter: String::new(),
            selected: None,
            meta: None,
            catalog: None,
            state: FetchState::Idle,
            generation: 0,
            active: None,
        }
    }

    pub fn toggle_lang(&mut self) {
        self.lang = self.lang.toggled();
    }

    pub fn selected(&self) -> Option<&ResourceId> {
        self.selected.as_ref()
    }

    pub fn meta(&self) -> Option<&ResourceMeta> {
        self.meta.as_ref()
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn records(&self) -> Option<Arc<CollectedRecords>> {
        match &self.state {
            FetchState::Ready(records) => Some(records.clone()),
            _ => None,
        }
    }

    pub fn catalog(&self) -> Option<Arc<Vec<CatalogEntry>>> {
        self.catalog.clone()
    }

    pub fn set_catalog(&mut self, entries: Vec<CatalogEntry>) {
        self.catalog = Some(Arc::new(entries));
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, FetchState::Loading(_))
    }

    /// Starts a fetch for `id`, cancelling and invalidating any earlier one.
    pub fn begin_fetch(&mut self, id: ResourceId) -> FetchTicket {
        if let Some(previous) = self.active.take() {
            previous.cancel();
        }
        self.generation += 1;
        let cancel = CancelToken::new();
        self.active = Some(cancel.clone());
        if self.selected.as_ref() != Some(&id) {
            self.meta = None;
        }
        self.selected = Some(id.clone());
        self.filter.clear();
        self.state = FetchState::Loading(id.clone());
        FetchTicket {
            generation: self.generation,
            resource: id,
            cancel,
        }
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Stores metadata resolved for the current selection; stale lookups are ignored.
    pub fn set_meta(&mut self, ticket: &FetchTicket, meta: ResourceMeta) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.meta = Some(meta);
        true
    }

    /// Publishes the outcome of `ticket`. Returns `false` when the ticket was
    /// superseded and the result was dropped.
    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        result: Result<CollectedRecords, ExplorerError>,
    ) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(
                resource = %ticket.resource,
                generation = ticket.generation,
                "dropping stale fetch result"
            );
            return false;
        }
        self.active = None;
        self.state = match result {
            Ok(records) => FetchState::Ready(Arc::new(records)),
            Err(err) => FetchState::Failed(Arc::new(err)),
        };
        true
    }

    /// Cancels the in-flight fetch, if any, and returns to idle.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel();
            self.generation += 1;
            self.state = FetchState::Idle;
        }
    }

    /// Selects `id` without fetching rows, e.g. a resource that is only downloadable.
    pub fn select(&mut self, id: ResourceId) {
        self.cancel();
        self.generation += 1;
        if self.selected.as_ref() != Some(&id) {
            self.meta = None;
        }
        self.selected = Some(id);
        self.filter.clear();
        self.state = FetchState::Idle;
    }
}
