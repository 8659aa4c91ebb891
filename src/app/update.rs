use crate::fields::{FieldContext, FieldOutput, SignaturePad, paint_placeholder};
use crate::geometry::percent_rect_to_pixel;
use crate::model::{FieldKind, FieldValue, Item, ItemId};
use crate::viewer::Readiness;
use crate::workflow::{Mode, SessionEvent};
use eframe::egui;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::help::draw_help_window;
use super::palette::MenuAction;
use super::render::{blocking_message, draw_item_box, draw_page, handle_rects};
use super::{PadState, PageView, SignApp, ViewerState};

const DEFAULT_PAGE_SIZE: egui::Vec2 = egui::vec2(612.0, 792.0);

enum OverlayAction {
    OpenMenu {
        page: u32,
        rect: egui::Rect,
        pointer: egui::Pos2,
    },
    Click(ItemId),
    BeginDrag(ItemId, egui::Rect),
    BeginResize(ItemId, egui::Rect, egui::Pos2),
    Commit(ItemId, FieldValue),
    Advance(ItemId),
    OpenPad(ItemId),
}

#[derive(Clone, Copy)]
enum EditAction {
    Save,
    Delete,
    Cancel,
}

impl eframe::App for SignApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            self.close();
        }
        self.upload_pages(ctx);
        self.poll_viewer(ctx);
        self.poll_session(ctx);
        self.handle_keys(ctx);

        self.top_bar(ctx);
        self.status_bar(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(fatal) = &self.fatal {
                blocking_message(ui, "Cannot open document", fatal);
                return;
            }
            if let ViewerState::Failed(message) = &self.viewer_state {
                blocking_message(ui, "Document could not be displayed", message);
                return;
            }
            let actions = self.pages_ui(ui);
            self.apply_overlay_actions(actions);
        });

        self.track_pointer(ctx);
        self.menu_ui(ctx);
        self.edit_window(ctx);
        self.pad_window(ctx);
        draw_help_window(ctx, &mut self.show_help);

        if self.session.as_ref().is_some_and(|s| s.pending_calls() > 0) {
            ctx.request_repaint_after(Duration::from_millis(30));
        }
    }
}

impl SignApp {
    fn upload_pages(&mut self, ctx: &egui::Context) {
        for page in self.viewer.take_decoded() {
            let size = egui::vec2(page.image.size[0] as f32, page.image.size[1] as f32);
            let texture = ctx.load_texture(
                format!("page-{}", page.index),
                page.image,
                egui::TextureOptions::LINEAR,
            );
            if let Some(slot) = self.pages.get_mut(page.index) {
                *slot = Some(PageView { texture, size });
                self.viewer.mark_uploaded();
                debug!(index = page.index, name = %page.name, "page uploaded");
            }
        }
    }

    fn poll_viewer(&mut self, ctx: &egui::Context) {
        if self.viewer_state != ViewerState::Waiting {
            return;
        }
        let now = Instant::now();
        match self.ready_poll.poll(&mut self.viewer, now) {
            Ok(Readiness::Ready { pages }) => {
                self.viewer_state = ViewerState::Ready { pages };
                if let Some(session) = &mut self.session {
                    session.set_page_count(pages);
                }
            }
            Ok(Readiness::Pending) => ctx.request_repaint_after(self.ready_poll.wait(now)),
            Err(e) => self.viewer_state = ViewerState::Failed(e.to_string()),
        }
    }

    fn poll_session(&mut self, ctx: &egui::Context) {
        let Some(session) = &mut self.session else {
            return;
        };
        for event in session.poll() {
            match event {
                SessionEvent::Loaded => {
                    self.status = Some(format!("Loaded {}", session.info().name));
                }
                SessionEvent::ReadyToSign(true) => {
                    self.status = Some("All required fields are filled".to_string());
                }
                SessionEvent::ReadyToSign(false) => {}
                SessionEvent::Completed => {
                    self.status = Some("Document signed".to_string());
                    self.pad = None;
                }
                SessionEvent::Notice(message) => self.status = Some(message),
            }
        }
        if let Some(id) = session.take_focus_request() {
            ctx.memory_mut(|m| m.request_focus(crate::fields::field_widget_id(id)));
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        if ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::F1)) {
            self.show_help = !self.show_help;
        }
        let zoom_in = ctx.input_mut(|i| {
            i.consume_key(egui::Modifiers::COMMAND, egui::Key::Plus)
                || i.consume_key(egui::Modifiers::COMMAND, egui::Key::Equals)
        });
        if zoom_in {
            self.zoom = (self.zoom * 1.1).min(4.0);
        }
        if ctx.input_mut(|i| i.consume_key(egui::Modifiers::COMMAND, egui::Key::Minus)) {
            self.zoom = (self.zoom / 1.1).max(0.25);
        }
        if self.pad.is_none() && ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            if let Some(session) = &mut self.session {
                session.cancel_gesture();
            }
        }
    }

    fn top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong(self.settings.mode.label());
                ui.separator();
                if ui.button("Pages…").clicked() {
                    self.open_pages_dialog();
                }
                if ui.button("Fixture…").clicked() {
                    self.open_fixture_dialog();
                }
                ui.separator();
                if let Some(session) = &mut self.session {
                    if session.is_loaded() {
                        ui.label(session.info().name.as_str());
                    } else {
                        ui.spinner();
                        ui.label("Loading…");
                    }
                    ui.separator();
                    ui.label(format!("Fields: {}", session.store().len()));
                    if session.mode() == Mode::Sign {
                        ui.separator();
                        if session.is_completed() {
                            ui.colored_label(egui::Color32::from_rgb(120, 200, 120), "Signed");
                        } else {
                            let enabled = session.ready_to_sign() && !session.is_signing();
                            if ui.add_enabled(enabled, egui::Button::new("Sign")).clicked() {
                                session.sign();
                            }
                        }
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Help (F1)").clicked() {
                        self.show_help = true;
                    }
                    if ui.button("Save settings").clicked() {
                        self.persist_settings();
                    }
                    ui.separator();
                    if ui.small_button("+").clicked() {
                        self.zoom = (self.zoom * 1.1).min(4.0);
                    }
                    ui.label(format!("{:.0}%", self.zoom * 100.0));
                    if ui.small_button("−").clicked() {
                        self.zoom = (self.zoom / 1.1).max(0.25);
                    }
                });
            });
        });
    }

    fn status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let notice = self
                    .session
                    .as_ref()
                    .and_then(|s| s.notice())
                    .map(str::to_string);
                if let Some(notice) = notice {
                    ui.colored_label(egui::Color32::from_rgb(220, 90, 90), notice);
                    if ui.small_button("Dismiss").clicked()
                        && let Some(session) = &mut self.session
                    {
                        session.dismiss_notice();
                    }
                } else if let Some(status) = &self.status {
                    ui.label(status);
                } else {
                    ui.label("Ready");
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    match &self.viewer_state {
                        ViewerState::Waiting => {
                            ui.label(format!("Waiting for pages ({})", self.ready_poll.attempts()))
                        }
                        ViewerState::Ready { pages } => ui.label(format!("Pages: {pages}")),
                        ViewerState::Failed(_) => ui.label("Viewer failed"),
                    };
                    if let Some(session) = &self.session {
                        ui.separator();
                        ui.label(format!("Unsaved: {}", session.pending_calls()));
                    }
                });
            });
        });
    }

    fn pages_ui(&mut self, ui: &mut egui::Ui) -> Vec<OverlayAction> {
        let mut actions = Vec::new();
        let overlays = matches!(self.viewer_state, ViewerState::Ready { .. })
            && self.session.as_ref().is_some_and(|s| s.is_loaded());
        egui::ScrollArea::both()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    for index in 0..self.pages.len() {
                        let size = self.pages[index]
                            .as_ref()
                            .map_or(DEFAULT_PAGE_SIZE, |p| p.size)
                            * self.zoom;
                        let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click());
                        draw_page(ui.painter(), rect, self.pages[index].as_ref(), index + 1);
                        self.page_rects[index] = Some(rect);
                        if overlays {
                            self.page_overlay(ui, index as u32 + 1, rect, &response, &mut actions);
                        }
                        ui.add_space(12.0);
                    }
                });
            });
        actions
    }

    fn page_overlay(
        &self,
        ui: &mut egui::Ui,
        page: u32,
        rect: egui::Rect,
        response: &egui::Response,
        actions: &mut Vec<OverlayAction>,
    ) {
        let Some(session) = &self.session else {
            return;
        };
        if response.secondary_clicked()
            && let Some(pointer) = response.interact_pointer_pos()
        {
            actions.push(OverlayAction::OpenMenu { page, rect, pointer });
        }
        let controller = session.controller();
        let items: Vec<Item> = session.store().on_page(page).cloned().collect();
        for item in &items {
            let percent = controller.preview(item.id).unwrap_or_else(|| item.rect());
            let item_rect = percent_rect_to_pixel(rect, percent);
            match session.mode() {
                Mode::Configure => {
                    let role = item
                        .role_id
                        .and_then(|r| session.info().role(r))
                        .map(|r| r.name.as_str());
                    let active = controller.captured_item() == Some(item.id)
                        || controller.edit_draft().is_some_and(|d| d.item == item.id);
                    draw_item_box(ui.painter(), item, item_rect, role, active);

                    let base = egui::Id::new(("item", item.id));
                    let body = ui.interact(item_rect, base, egui::Sense::click());
                    let (drag_rect, resize_rect) = handle_rects(item_rect);
                    let drag = ui.interact(drag_rect, base.with("move"), egui::Sense::drag());
                    let resize = ui.interact(resize_rect, base.with("resize"), egui::Sense::drag());
                    if drag.drag_started() {
                        actions.push(OverlayAction::BeginDrag(item.id, rect));
                    } else if resize.drag_started() {
                        if let Some(pointer) = resize.interact_pointer_pos() {
                            actions.push(OverlayAction::BeginResize(item.id, rect, pointer));
                        }
                    } else if body.clicked() {
                        actions.push(OverlayAction::Click(item.id));
                    }
                    drag.on_hover_cursor(egui::CursorIcon::Grab);
                    resize.on_hover_cursor(egui::CursorIcon::ResizeNwSe);
                }
                Mode::Sign => {
                    let ctx = FieldContext {
                        info: session.info(),
                        editable: item.to_sign && !session.is_completed(),
                    };
                    let output = match session.registry().resolve(item.field_type) {
                        Some(field_type) => field_type.generate(ui, &ctx, item, item_rect),
                        None => {
                            paint_placeholder(ui, item, item_rect);
                            FieldOutput::default()
                        }
                    };
                    if let Some(value) = output.commit {
                        actions.push(OverlayAction::Commit(item.id, value));
                    }
                    if output.advance {
                        actions.push(OverlayAction::Advance(item.id));
                    }
                    if output.open_pad {
                        actions.push(OverlayAction::OpenPad(item.id));
                    }
                }
            }
        }
    }

    fn apply_overlay_actions(&mut self, actions: Vec<OverlayAction>) {
        let Some(session) = &mut self.session else {
            return;
        };
        for action in actions {
            match action {
                OverlayAction::OpenMenu { page, rect, pointer } => {
                    if session.open_menu(page, rect, pointer) {
                        self.menu_filter.open(pointer);
                    }
                }
                OverlayAction::Click(id) => {
                    session.click_item(id);
                }
                OverlayAction::BeginDrag(id, rect) => {
                    session.begin_drag(id, rect);
                }
                OverlayAction::BeginResize(id, rect, pointer) => {
                    session.begin_resize(id, rect, pointer);
                }
                OverlayAction::Commit(id, value) => {
                    session.set_value(id, value);
                }
                OverlayAction::Advance(id) => {
                    session.advance_focus(id);
                }
                OverlayAction::OpenPad(id) => {
                    self.pad = Some(PadState {
                        item: id,
                        pad: SignaturePad::default(),
                    });
                }
            }
        }
    }

    /// Feeds the pointer to an active drag or resize, wherever it is on screen.
    fn track_pointer(&mut self, ctx: &egui::Context) {
        let Some(session) = &mut self.session else {
            return;
        };
        let Some(id) = session.controller().captured_item() else {
            return;
        };
        let page_rect = session
            .store()
            .get(id)
            .and_then(|item| (item.page as usize).checked_sub(1))
            .and_then(|index| self.page_rects.get(index).copied().flatten());
        let pointer = ctx.input(|i| i.pointer.latest_pos());
        if let (Some(rect), Some(pointer)) = (page_rect, pointer) {
            session.pointer_moved(rect, pointer);
        }
        if ctx.input(|i| i.pointer.any_released()) {
            session.pointer_released(pointer);
        }
    }

    fn menu_ui(&mut self, ctx: &egui::Context) {
        let Some(session) = &mut self.session else {
            return;
        };
        let Some(menu) = session.controller().menu().cloned() else {
            return;
        };
        match self.menu_filter.ui(ctx, &menu) {
            MenuAction::Choose(index) => {
                session.choose_entry(index);
            }
            MenuAction::Dismiss => session.dismiss_menu(),
            MenuAction::None => {}
        }
    }

    fn edit_window(&mut self, ctx: &egui::Context) {
        let Some(session) = &mut self.session else {
            return;
        };
        let fields = session.info().fields.clone();
        let roles = session.info().roles.clone();
        let Some(draft) = session.edit_draft_mut() else {
            return;
        };
        let mut action = None;
        let mut open = true;
        egui::Window::new("Edit field")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                egui::Grid::new("edit_field_grid").num_columns(2).show(ui, |ui| {
                    ui.label("Field");
                    let current = fields
                        .iter()
                        .find(|f| f.id == draft.field_id)
                        .map_or_else(|| "?".to_string(), |f| f.name.clone());
                    egui::ComboBox::from_id_salt("edit_field")
                        .selected_text(current)
                        .show_ui(ui, |ui| {
                            for field in &fields {
                                ui.selectable_value(&mut draft.field_id, field.id, field.name.as_str());
                            }
                        });
                    ui.end_row();

                    ui.label("Type");
                    let kind = fields
                        .iter()
                        .find(|f| f.id == draft.field_id)
                        .map_or(FieldKind::Unknown, |f| f.field_type);
                    ui.weak(kind.label());
                    ui.end_row();

                    ui.label("Role");
                    let current = draft
                        .role_id
                        .and_then(|r| roles.iter().find(|role| role.id == r))
                        .map_or_else(|| "None".to_string(), |r| r.name.clone());
                    egui::ComboBox::from_id_salt("edit_role")
                        .selected_text(current)
                        .show_ui(ui, |ui| {
                            for role in &roles {
                                ui.selectable_value(&mut draft.role_id, Some(role.id), role.name.as_str());
                            }
                        });
                    ui.end_row();

                    ui.label("Required");
                    ui.checkbox(&mut draft.required, "");
                    ui.end_row();
                });
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        action = Some(EditAction::Save);
                    }
                    if ui.button("Delete").clicked() {
                        action = Some(EditAction::Delete);
                    }
                    if ui.button("Cancel").clicked() {
                        action = Some(EditAction::Cancel);
                    }
                });
            });
        if !open {
            action = Some(EditAction::Cancel);
        }
        match action {
            Some(EditAction::Save) => {
                session.save_edit();
            }
            Some(EditAction::Delete) => {
                session.delete_edited();
            }
            Some(EditAction::Cancel) => session.cancel_edit(),
            None => {}
        }
    }

    fn pad_window(&mut self, ctx: &egui::Context) {
        let Some(state) = &mut self.pad else {
            return;
        };
        let mut open = true;
        let mut adopt = false;
        let mut cancel = ctx.input(|i| i.key_pressed(egui::Key::Escape));
        egui::Window::new("Draw your signature")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                state.pad.ui(ui, egui::vec2(420.0, 160.0));
                ui.horizontal(|ui| {
                    if ui.button("Clear").clicked() {
                        state.pad.clear();
                    }
                    if ui
                        .add_enabled(!state.pad.is_empty(), egui::Button::new("Adopt"))
                        .clicked()
                    {
                        adopt = true;
                    }
                    if ui.button("Cancel").clicked() {
                        cancel = true;
                    }
                });
            });
        if adopt {
            let item = state.item;
            match state.pad.to_png_base64(840, 320) {
                Ok(data) => {
                    if let Some(session) = &mut self.session {
                        session.set_value(item, FieldValue::Binary(data));
                    }
                }
                Err(e) => {
                    warn!(item, error = %e, "signature could not be encoded");
                    self.status = Some(format!("Could not store signature: {e}"));
                }
            }
        }
        if adopt || cancel || !open {
            self.pad = None;
        }
    }
}
