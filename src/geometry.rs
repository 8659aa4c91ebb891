//! Conversions between screen pixels and page-relative percentages.
//!
//! Every pixel/percent conversion in the crate goes through this module.

use crate::model::{Percent, PercentRect, clamp_percent};
use eframe::egui;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PercentSize {
    pub width: f32,
    pub height: f32,
}

fn ratio(offset: f32, extent: f32) -> f32 {
    if extent <= f32::EPSILON {
        return 0.0;
    }
    clamp_percent(offset * 100.0 / extent)
}

/// Maps a pointer position to page percentages; pointers off the page land on its edge.
pub fn pixel_to_percent(page: egui::Rect, pointer: egui::Pos2) -> Percent {
    Percent {
        x: ratio(pointer.x - page.min.x, page.width()),
        y: ratio(pointer.y - page.min.y, page.height()),
    }
}

pub fn percent_to_pixel(page: egui::Rect, at: Percent) -> egui::Pos2 {
    let at = at.clamped();
    egui::pos2(
        page.min.x + at.x / 100.0 * page.width(),
        page.min.y + at.y / 100.0 * page.height(),
    )
}

pub fn percent_rect_to_pixel(page: egui::Rect, rect: PercentRect) -> egui::Rect {
    let min = percent_to_pixel(page, rect.origin());
    let size = egui::vec2(
        clamp_percent(rect.width) / 100.0 * page.width(),
        clamp_percent(rect.height) / 100.0 * page.height(),
    );
    egui::Rect::from_min_size(min, size)
}

/// Size spanned from `anchor` (top-left of the item) to the pointer, never negative.
pub fn resize_from_anchor(page: egui::Rect, anchor: Percent, pointer: egui::Pos2) -> PercentSize {
    let anchor_px = percent_to_pixel(page, anchor);
    PercentSize {
        width: ratio((pointer.x - anchor_px.x).max(0.0), page.width()),
        height: ratio((pointer.y - anchor_px.y).max(0.0), page.height()),
    }
}
