use crate::backend::ValueWrite;
use crate::error::SignError;
use crate::fields::FieldTypeRegistry;
use crate::interaction::{ClickOutcome, InteractionController, ModePolicy};
use crate::model::{DocumentInfo, FieldValue, ItemId};
use crate::store::ItemStore;
use crate::sync::{Call, Compensation, SyncClient, SyncEvent, Ticket};
use eframe::egui;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Configure,
    Sign,
}

impl Mode {
    pub fn policy(self) -> ModePolicy {
        match self {
            Mode::Configure => ModePolicy::CONFIGURE,
            Mode::Sign => ModePolicy::SIGN,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Configure => "Configure",
            Mode::Sign => "Sign",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Loaded,
    ReadyToSign(bool),
    Completed,
    Notice(String),
}

/// One open document: layout and values, the gesture in progress and the
/// calls still waiting for the backend.
pub struct Session {
    mode: Mode,
    info: DocumentInfo,
    store: ItemStore,
    controller: InteractionController,
    sync: SyncClient,
    registry: FieldTypeRegistry,
    loaded: bool,
    ready_to_sign: bool,
    signing: Option<Ticket>,
    completed: bool,
    focus_request: Option<ItemId>,
    notice: Option<String>,
    outbox: Vec<SessionEvent>,
    closed: bool,
}

impl Session {
    /// Starts the session and requests the document from the backend.
    pub fn new(mode: Mode, mut sync: SyncClient, registry: FieldTypeRegistry) -> Self {
        sync.submit(Call::GetInfo, Compensation::None);
        Self {
            mode,
            info: DocumentInfo::default(),
            store: ItemStore::new(),
            controller: InteractionController::new(mode.policy()),
            sync,
            registry,
            loaded: false,
            ready_to_sign: false,
            signing: None,
            completed: false,
            focus_request: None,
            notice: None,
            outbox: Vec::new(),
            closed: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn registry(&self) -> &FieldTypeRegistry {
        &self.registry
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_signing(&self) -> bool {
        self.signing.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn pending_calls(&self) -> usize {
        self.sync.in_flight()
    }

    pub fn set_page_count(&mut self, pages: u32) {
        self.store.set_page_count(pages);
    }

    /// Reconciles backend replies and returns what the host should react to.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let events = self.sync.poll(&mut self.store);
        for event in &events {
            self.controller.on_sync_event(event);
        }
        for event in events {
            match event {
                SyncEvent::Loaded(info) => {
                    info!(name = %info.name, items = self.store.len(), "session loaded");
                    self.info = info;
                    self.loaded = true;
                    self.outbox.push(SessionEvent::Loaded);
                }
                SyncEvent::Created { item, .. } => debug!(item, "item placed"),
                SyncEvent::Saved { ticket, method } => debug!(ticket, method, "saved"),
                SyncEvent::Signed { ticket } => {
                    info!(ticket, "document signed");
                    self.signing = None;
                    self.completed = true;
                    self.outbox.push(SessionEvent::Completed);
                }
                SyncEvent::Failed {
                    ticket,
                    method,
                    error,
                    rolled_back,
                } => {
                    if self.signing == Some(ticket) {
                        self.signing = None;
                    }
                    let message = match rolled_back {
                        Some(id) => format!("{error} (item {id} reverted)"),
                        None => error.to_string(),
                    };
                    warn!(ticket, method, "{message}");
                    self.notify(message);
                }
            }
        }
        self.refresh_ready();
        std::mem::take(&mut self.outbox)
    }

    fn notify(&mut self, message: String) {
        self.notice = Some(message.clone());
        self.outbox.push(SessionEvent::Notice(message));
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    fn refresh_ready(&mut self) {
        if self.mode != Mode::Sign || !self.loaded {
            return;
        }
        let ready = !self.completed && self.all_required_filled();
        if ready != self.ready_to_sign {
            debug!(ready, "ready to sign changed");
            self.ready_to_sign = ready;
            self.outbox.push(SessionEvent::ReadyToSign(ready));
        }
    }

    pub fn all_required_filled(&self) -> bool {
        self.registry.all_required_filled(self.store.all())
    }

    pub fn ready_to_sign(&self) -> bool {
        self.ready_to_sign
    }

    /// Stores a value locally and writes it; a failed write restores the old value.
    pub fn set_value(&mut self, id: ItemId, value: FieldValue) -> Option<Ticket> {
        if self.mode != Mode::Sign || self.closed {
            return None;
        }
        let Some(before) = self.store.set_value(id, &value) else {
            self.notify(SignError::NotFound(id).to_string());
            return None;
        };
        let write = ValueWrite {
            item: id,
            values: value.to_values(),
        };
        let compensation = Compensation::restore(&before, value.group());
        let ticket = self.sync.submit(Call::Write(vec![write]), compensation);
        self.refresh_ready();
        ticket
    }

    /// Moves focus to the next item in tab order, if any.
    pub fn advance_focus(&mut self, from: ItemId) -> Option<ItemId> {
        let next = self.registry.next_in_tab_order(&self.store, from)?;
        self.focus_request = Some(next);
        Some(next)
    }

    pub fn take_focus_request(&mut self) -> Option<ItemId> {
        self.focus_request.take()
    }

    pub fn sign(&mut self) -> Option<Ticket> {
        if self.mode != Mode::Sign || !self.ready_to_sign || self.signing.is_some() || self.closed {
            return None;
        }
        info!("signing document");
        self.signing = self.sync.submit(Call::ActionSign, Compensation::None);
        self.signing
    }

    /// Abandons any gesture and stops talking to the backend.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.controller.abandon();
        self.sync.shutdown();
        self.closed = true;
    }

    pub fn open_menu(&mut self, page: u32, page_rect: egui::Rect, pointer: egui::Pos2) -> bool {
        self.controller.open_menu(&self.info, page, page_rect, pointer)
    }

    pub fn dismiss_menu(&mut self) {
        self.controller.dismiss_menu();
    }

    pub fn choose_entry(&mut self, index: usize) -> Option<Ticket> {
        self.controller.choose_entry(index, &mut self.sync)
    }

    pub fn begin_drag(&mut self, id: ItemId, page_rect: egui::Rect) -> bool {
        self.controller.begin_drag(&self.store, id, page_rect)
    }

    pub fn begin_resize(&mut self, id: ItemId, page_rect: egui::Rect, pointer: egui::Pos2) -> bool {
        self.controller.begin_resize(&self.store, id, page_rect, pointer)
    }

    pub fn pointer_moved(&mut self, page_rect: egui::Rect, pointer: egui::Pos2) {
        self.controller.pointer_moved(page_rect, pointer);
    }

    pub fn pointer_released(&mut self, pointer: Option<egui::Pos2>) -> Option<Ticket> {
        self.controller
            .pointer_released(pointer, &mut self.store, &mut self.sync)
    }

    pub fn click_item(&mut self, id: ItemId) -> ClickOutcome {
        let outcome = self.controller.click_item(&self.store, id);
        if let ClickOutcome::Focus(id) = outcome {
            self.focus_request = Some(id);
        }
        outcome
    }

    pub fn edit_draft_mut(&mut self) -> Option<&mut crate::interaction::EditDraft> {
        self.controller.edit_draft_mut()
    }

    pub fn save_edit(&mut self) -> Option<Ticket> {
        self.controller
            .save_edit(&self.info, &mut self.store, &mut self.sync)
    }

    pub fn delete_edited(&mut self) -> Option<Ticket> {
        self.controller.delete_edited(&mut self.store, &mut self.sync)
    }

    pub fn cancel_edit(&mut self) {
        self.controller.cancel_edit();
    }

    pub fn cancel_gesture(&mut self) {
        self.controller.abandon();
    }
}
