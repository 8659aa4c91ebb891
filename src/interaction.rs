use crate::geometry::{PercentSize, pixel_to_percent, resize_from_anchor};
use crate::model::{
    DocumentInfo, FieldGroup, FieldId, Item, ItemId, ItemPatch, NewItem, Percent, PercentRect,
    RoleId,
};
use crate::store::ItemStore;
use crate::sync::{Call, Compensation, SyncClient, SyncEvent, Ticket};
use eframe::egui;
use tracing::debug;

pub const DEFAULT_ITEM_WIDTH: f32 = 20.0;
pub const DEFAULT_ITEM_HEIGHT: f32 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemClick {
    Edit,
    Focus,
}

/// What a workflow mode allows the overlay to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModePolicy {
    pub can_create: bool,
    pub can_move: bool,
    pub can_resize: bool,
    pub on_item_click: ItemClick,
}

impl ModePolicy {
    pub const CONFIGURE: Self = Self {
        can_create: true,
        can_move: true,
        can_resize: true,
        on_item_click: ItemClick::Edit,
    };

    pub const SIGN: Self = Self {
        can_create: false,
        can_move: false,
        can_resize: false,
        on_item_click: ItemClick::Focus,
    };
}

#[derive(Clone, Debug, PartialEq)]
pub struct MenuEntry {
    pub field_id: FieldId,
    pub role_id: Option<RoleId>,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlacementMenu {
    pub page: u32,
    pub at: Percent,
    pub entries: Vec<MenuEntry>,
}

impl PlacementMenu {
    fn build(page: u32, at: Percent, info: &DocumentInfo) -> Self {
        let mut entries = Vec::new();
        for field in &info.fields {
            if info.roles.is_empty() {
                entries.push(MenuEntry {
                    field_id: field.id,
                    role_id: None,
                    label: field.name.clone(),
                });
            }
            for role in &info.roles {
                entries.push(MenuEntry {
                    field_id: field.id,
                    role_id: Some(role.id),
                    label: format!("{} · {}", field.name, role.name),
                });
            }
        }
        Self {
            page,
            at: at.clamped(),
            entries,
        }
    }
}

/// Pointer capture held for the duration of a drag or resize.
#[derive(Clone, Debug, PartialEq)]
pub struct PointerCapture {
    pub item: ItemId,
    pub page_rect: egui::Rect,
    pub before: Item,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditDraft {
    pub item: ItemId,
    pub field_id: FieldId,
    pub role_id: Option<RoleId>,
    pub required: bool,
}

impl EditDraft {
    fn of(item: &Item) -> Self {
        Self {
            item: item.id,
            field_id: item.field_id,
            role_id: item.role_id,
            required: item.required,
        }
    }

    fn patch_against(&self, item: &Item) -> ItemPatch {
        ItemPatch {
            field_id: (self.field_id != item.field_id).then_some(self.field_id),
            role_id: (self.role_id != item.role_id).then_some(self.role_id).flatten(),
            required: (self.required != item.required).then_some(self.required),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InteractionState {
    Idle,
    /// Menu is open; once an entry is chosen the menu hides and `creating`
    /// holds the add call until its reply arrives.
    PlacingNew {
        menu: PlacementMenu,
        creating: Option<Ticket>,
    },
    Dragging {
        capture: PointerCapture,
        current: Percent,
    },
    Resizing {
        capture: PointerCapture,
        grab: egui::Vec2,
        current: PercentSize,
    },
    Editing(EditDraft),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClickOutcome {
    Ignored,
    Editing,
    Focus(ItemId),
}

pub struct InteractionController {
    policy: ModePolicy,
    state: InteractionState,
}

impl InteractionController {
    pub fn new(policy: ModePolicy) -> Self {
        Self {
            policy,
            state: InteractionState::Idle,
        }
    }

    pub fn policy(&self) -> ModePolicy {
        self.policy
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, InteractionState::Idle)
    }

    pub fn menu(&self) -> Option<&PlacementMenu> {
        match &self.state {
            InteractionState::PlacingNew {
                menu,
                creating: None,
            } => Some(menu),
            _ => None,
        }
    }

    pub fn is_creating(&self) -> bool {
        matches!(
            self.state,
            InteractionState::PlacingNew {
                creating: Some(_),
                ..
            }
        )
    }

    pub fn captured_item(&self) -> Option<ItemId> {
        match &self.state {
            InteractionState::Dragging { capture, .. }
            | InteractionState::Resizing { capture, .. } => Some(capture.item),
            _ => None,
        }
    }

    /// Opens the placement menu at a pointer position, replacing any menu already open.
    pub fn open_menu(
        &mut self,
        info: &DocumentInfo,
        page: u32,
        page_rect: egui::Rect,
        pointer: egui::Pos2,
    ) -> bool {
        if !self.policy.can_create {
            return false;
        }
        match self.state {
            InteractionState::Idle
            | InteractionState::PlacingNew {
                creating: None, ..
            } => {}
            _ => {
                debug!("placement menu refused while another gesture is active");
                return false;
            }
        }
        let at = pixel_to_percent(page_rect, pointer);
        debug!(page, x = at.x, y = at.y, "placement menu opened");
        self.state = InteractionState::PlacingNew {
            menu: PlacementMenu::build(page, at, info),
            creating: None,
        };
        true
    }

    /// Closes an open menu without creating anything.
    pub fn dismiss_menu(&mut self) {
        if self.menu().is_some() {
            debug!("placement menu dismissed");
            self.state = InteractionState::Idle;
        }
    }

    pub fn choose_entry(&mut self, index: usize, sync: &mut SyncClient) -> Option<Ticket> {
        let InteractionState::PlacingNew {
            menu,
            creating: creating @ None,
        } = &mut self.state
        else {
            return None;
        };
        let entry = menu.entries.get(index)?;
        let new = NewItem {
            field_id: entry.field_id,
            role_id: entry.role_id,
            page: menu.page,
            position_x: menu.at.x,
            position_y: menu.at.y,
            width: DEFAULT_ITEM_WIDTH,
            height: DEFAULT_ITEM_HEIGHT,
        };
        match sync.submit(Call::AddItem(new), Compensation::None) {
            Some(ticket) => {
                debug!(ticket, "creating item");
                *creating = Some(ticket);
                Some(ticket)
            }
            None => {
                self.state = InteractionState::Idle;
                None
            }
        }
    }

    pub fn begin_drag(&mut self, store: &ItemStore, id: ItemId, page_rect: egui::Rect) -> bool {
        if !self.policy.can_move || !self.is_idle() {
            return false;
        }
        let Some(item) = store.get(id) else {
            return false;
        };
        debug!(id, "drag started");
        self.state = InteractionState::Dragging {
            current: item.rect().origin(),
            capture: PointerCapture {
                item: id,
                page_rect,
                before: item.clone(),
            },
        };
        true
    }

    pub fn begin_resize(
        &mut self,
        store: &ItemStore,
        id: ItemId,
        page_rect: egui::Rect,
        pointer: egui::Pos2,
    ) -> bool {
        if !self.policy.can_resize || !self.is_idle() {
            return false;
        }
        let Some(item) = store.get(id) else {
            return false;
        };
        let corner = crate::geometry::percent_rect_to_pixel(page_rect, item.rect()).max;
        debug!(id, "resize started");
        self.state = InteractionState::Resizing {
            grab: corner - pointer,
            current: PercentSize {
                width: item.width,
                height: item.height,
            },
            capture: PointerCapture {
                item: id,
                page_rect,
                before: item.clone(),
            },
        };
        true
    }

    /// Tracks the captured pointer; `page_rect` is the captured page's current screen rect.
    pub fn pointer_moved(&mut self, page_rect: egui::Rect, pointer: egui::Pos2) {
        match &mut self.state {
            InteractionState::Dragging { capture, current } => {
                capture.page_rect = page_rect;
                *current = pixel_to_percent(page_rect, pointer);
            }
            InteractionState::Resizing {
                capture,
                grab,
                current,
            } => {
                capture.page_rect = page_rect;
                *current = resize_from_anchor(page_rect, capture.before.rect().origin(), pointer + *grab);
            }
            _ => {}
        }
    }

    /// Ends a drag or resize: commits the geometry locally and persists it.
    /// Releasing outside a gesture does nothing, so a gesture commits once.
    pub fn pointer_released(
        &mut self,
        pointer: Option<egui::Pos2>,
        store: &mut ItemStore,
        sync: &mut SyncClient,
    ) -> Option<Ticket> {
        if self.captured_item().is_none() {
            return None;
        }
        if let (Some(pointer), Some(rect)) = (pointer, self.captured_page_rect()) {
            self.pointer_moved(rect, pointer);
        }
        let (id, patch, group) = match std::mem::replace(&mut self.state, InteractionState::Idle) {
            InteractionState::Dragging { capture, current } => {
                (capture.item, ItemPatch::position(current), FieldGroup::Position)
            }
            InteractionState::Resizing {
                capture, current, ..
            } => (
                capture.item,
                ItemPatch::size(current.width, current.height),
                FieldGroup::Size,
            ),
            _ => return None,
        };
        debug!(id, "gesture released");
        let before = store.update(id, &patch)?;
        sync.submit(
            Call::SetItemData { item: id, patch },
            Compensation::restore(&before, group),
        )
    }

    fn captured_page_rect(&self) -> Option<egui::Rect> {
        match &self.state {
            InteractionState::Dragging { capture, .. }
            | InteractionState::Resizing { capture, .. } => Some(capture.page_rect),
            _ => None,
        }
    }

    /// Geometry to paint for an item while it is being dragged or resized.
    pub fn preview(&self, id: ItemId) -> Option<PercentRect> {
        match &self.state {
            InteractionState::Dragging { capture, current } if capture.item == id => {
                Some(PercentRect {
                    x: current.x,
                    y: current.y,
                    ..capture.before.rect()
                })
            }
            InteractionState::Resizing {
                capture, current, ..
            } if capture.item == id => Some(PercentRect {
                width: current.width,
                height: current.height,
                ..capture.before.rect()
            }),
            _ => None,
        }
    }

    pub fn click_item(&mut self, store: &ItemStore, id: ItemId) -> ClickOutcome {
        if !self.is_idle() {
            return ClickOutcome::Ignored;
        }
        let Some(item) = store.get(id) else {
            return ClickOutcome::Ignored;
        };
        match self.policy.on_item_click {
            ItemClick::Edit => {
                debug!(id, "editing item");
                self.state = InteractionState::Editing(EditDraft::of(item));
                ClickOutcome::Editing
            }
            ItemClick::Focus => ClickOutcome::Focus(id),
        }
    }

    pub fn edit_draft(&self) -> Option<&EditDraft> {
        match &self.state {
            InteractionState::Editing(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn edit_draft_mut(&mut self) -> Option<&mut EditDraft> {
        match &mut self.state {
            InteractionState::Editing(draft) => Some(draft),
            _ => None,
        }
    }

    /// Applies the edited attributes and persists only what changed.
    pub fn save_edit(
        &mut self,
        info: &DocumentInfo,
        store: &mut ItemStore,
        sync: &mut SyncClient,
    ) -> Option<Ticket> {
        let InteractionState::Editing(draft) = std::mem::replace(&mut self.state, InteractionState::Idle)
        else {
            return None;
        };
        let patch = draft.patch_against(store.get(draft.item)?);
        if patch.is_empty() {
            return None;
        }
        let field = patch.field_id.and_then(|id| info.field(id)).cloned();
        let before = store.modify(draft.item, |item| {
            item.apply(&patch);
            if let Some(field) = field {
                item.name = field.name;
                item.field_type = field.field_type;
                item.default_value = field.default_value;
            }
        })?;
        sync.submit(
            Call::SetItemData {
                item: draft.item,
                patch,
            },
            Compensation::restore(&before, FieldGroup::Attributes),
        )
    }

    pub fn delete_edited(&mut self, store: &mut ItemStore, sync: &mut SyncClient) -> Option<Ticket> {
        let InteractionState::Editing(draft) = std::mem::replace(&mut self.state, InteractionState::Idle)
        else {
            return None;
        };
        let removed = store.remove(draft.item)?;
        debug!(id = draft.item, "deleting item");
        sync.submit(Call::DeleteItem(draft.item), Compensation::Reinsert(removed))
    }

    pub fn cancel_edit(&mut self) {
        if matches!(self.state, InteractionState::Editing(_)) {
            self.state = InteractionState::Idle;
        }
    }

    /// Drops whatever gesture is active without persisting anything.
    pub fn abandon(&mut self) {
        if !self.is_idle() {
            debug!(state = ?self.state, "gesture abandoned");
        }
        self.state = InteractionState::Idle;
    }

    /// Releases the creation guard once the add call has answered.
    pub fn on_sync_event(&mut self, event: &SyncEvent) {
        if let InteractionState::PlacingNew {
            creating: Some(ticket),
            ..
        } = self.state
            && event.ticket() == Some(ticket)
        {
            debug!(ticket, "creation finished");
            self.state = InteractionState::Idle;
        }
    }
}
