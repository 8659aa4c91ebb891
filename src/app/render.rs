use crate::model::{FieldKind, Item};
use eframe::egui;

use super::PageView;

pub(super) const HANDLE_SIZE: f32 = 9.0;

pub(super) fn draw_page(painter: &egui::Painter, rect: egui::Rect, page: Option<&PageView>, number: usize) {
    painter.rect_filled(
        rect.translate(egui::vec2(3.0, 3.0)),
        0.0,
        egui::Color32::from_black_alpha(60),
    );
    match page {
        Some(view) => {
            painter.image(
                view.texture.id(),
                rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }
        None => {
            painter.rect_filled(rect, 0.0, egui::Color32::from_gray(235));
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                format!("Loading page {number}…"),
                egui::FontId::proportional(16.0),
                egui::Color32::GRAY,
            );
        }
    }
}

fn kind_color(kind: FieldKind) -> egui::Color32 {
    match kind {
        FieldKind::Text => egui::Color32::from_rgb(90, 160, 255),
        FieldKind::Signature => egui::Color32::from_rgb(120, 200, 120),
        FieldKind::Unknown => egui::Color32::from_rgb(200, 140, 80),
    }
}

/// Layout view of an item: tinted box, name and role, and its two handles.
pub(super) fn draw_item_box(
    painter: &egui::Painter,
    item: &Item,
    rect: egui::Rect,
    role: Option<&str>,
    active: bool,
) {
    let color = kind_color(item.field_type);
    painter.rect_filled(rect, 2.0, color.gamma_multiply(0.25));
    painter.rect_stroke(
        rect,
        2.0,
        egui::Stroke::new(if active { 2.0 } else { 1.0 }, color),
        egui::StrokeKind::Inside,
    );
    let mut label = item.name.clone();
    if let Some(role) = role {
        label.push_str(" · ");
        label.push_str(role);
    }
    if item.required {
        label.push_str(" *");
    }
    painter.with_clip_rect(rect).text(
        rect.left_center() + egui::vec2(4.0, 0.0),
        egui::Align2::LEFT_CENTER,
        label,
        egui::FontId::proportional((rect.height() * 0.7).clamp(8.0, 14.0)),
        egui::Color32::from_gray(30),
    );
    let (drag, resize) = handle_rects(rect);
    painter.rect_filled(drag, 1.0, color);
    painter.rect_filled(resize, 1.0, color);
}

/// Drag handle on the top-left corner, resize handle on the bottom-right.
pub(super) fn handle_rects(item: egui::Rect) -> (egui::Rect, egui::Rect) {
    let size = egui::vec2(HANDLE_SIZE, HANDLE_SIZE);
    (
        egui::Rect::from_center_size(item.left_top(), size),
        egui::Rect::from_center_size(item.right_bottom(), size),
    )
}

pub(super) fn blocking_message(ui: &mut egui::Ui, title: &str, message: &str) {
    ui.vertical_centered(|ui| {
        ui.add_space(ui.available_height() * 0.35);
        ui.heading(title);
        ui.add_space(8.0);
        ui.label(egui::RichText::new(message).color(egui::Color32::from_rgb(220, 90, 90)));
    });
}
