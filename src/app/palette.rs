use crate::interaction::PlacementMenu;
use eframe::egui;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum MenuAction {
    None,
    Choose(usize),
    Dismiss,
}

/// Search box and keyboard selection over the placement menu entries.
#[derive(Default)]
pub(super) struct PlacementFilter {
    pub query: String,
    pub selected: usize,
    anchor: egui::Pos2,
    request_focus: bool,
    just_opened: bool,
}

impl PlacementFilter {
    pub fn open(&mut self, anchor: egui::Pos2) {
        self.anchor = anchor;
        self.query.clear();
        self.selected = 0;
        self.request_focus = true;
        self.just_opened = true;
    }

    /// Entry indexes that match the query, best match first.
    pub fn filtered(&self, menu: &PlacementMenu) -> Vec<usize> {
        let q = self.query.trim();
        if q.is_empty() {
            return (0..menu.entries.len()).collect();
        }
        let matcher = SkimMatcherV2::default();
        let mut out: Vec<(usize, i64)> = menu
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| matcher.fuzzy_match(&entry.label, q).map(|s| (idx, s)))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.into_iter().map(|(idx, _)| idx).collect()
    }

    pub fn ui(&mut self, ctx: &egui::Context, menu: &PlacementMenu) -> MenuAction {
        let just_opened = std::mem::take(&mut self.just_opened);
        let matches = self.filtered(menu);
        if self.selected >= matches.len() {
            self.selected = matches.len().saturating_sub(1);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            return MenuAction::Dismiss;
        }
        if ctx.input(|i| i.key_pressed(egui::Key::ArrowDown)) && !matches.is_empty() {
            self.selected = (self.selected + 1).min(matches.len() - 1);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::ArrowUp)) && !matches.is_empty() {
            self.selected = self.selected.saturating_sub(1);
        }
        let mut run_selected = ctx.input(|i| i.key_pressed(egui::Key::Enter));

        let area = egui::Area::new(egui::Id::new("placement_menu"))
            .fixed_pos(self.anchor)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                let frame = egui::Frame::new()
                    .fill(egui::Color32::from_rgba_unmultiplied(20, 20, 20, 240))
                    .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(90, 160, 255)))
                    .inner_margin(8.0)
                    .corner_radius(egui::CornerRadius::same(6));
                frame.show(ui, |ui| {
                    ui.set_width(260.0);
                    ui.label(format!("Page {} · {:.0}%, {:.0}%", menu.page, menu.at.x, menu.at.y));
                    let resp = ui.add(
                        egui::TextEdit::singleline(&mut self.query)
                            .desired_width(f32::INFINITY)
                            .hint_text("Field or role"),
                    );
                    if self.request_focus {
                        resp.request_focus();
                        self.request_focus = false;
                    }
                    ui.separator();
                    if menu.entries.is_empty() {
                        ui.weak("No fields are defined for this document");
                    }
                    egui::ScrollArea::vertical().max_height(240.0).show(ui, |ui| {
                        for (row, &idx) in matches.iter().enumerate() {
                            let label = &menu.entries[idx].label;
                            if ui
                                .add(egui::Button::new(label).selected(row == self.selected))
                                .clicked()
                            {
                                self.selected = row;
                                run_selected = true;
                            }
                        }
                    });
                });
            });

        let clicked_outside = ctx.input(|i| {
            (i.pointer.primary_clicked() || i.pointer.secondary_clicked())
                && i.pointer
                    .interact_pos()
                    .is_some_and(|pos| !area.response.rect.contains(pos))
        });
        if clicked_outside && !just_opened {
            return MenuAction::Dismiss;
        }
        match matches.get(self.selected) {
            Some(&idx) if run_selected => MenuAction::Choose(idx),
            _ => MenuAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::tests::sample_info;
    use crate::interaction::{InteractionController, ModePolicy};

    fn menu() -> PlacementMenu {
        let mut controller = InteractionController::new(ModePolicy::CONFIGURE);
        let page = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(100.0, 100.0));
        controller.open_menu(&sample_info(), 1, page, egui::pos2(10.0, 10.0));
        controller.menu().cloned().unwrap()
    }

    #[test]
    fn empty_query_lists_every_entry() {
        let filter = PlacementFilter::default();
        assert_eq!(filter.filtered(&menu()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn query_narrows_to_matching_combinations() {
        let filter = PlacementFilter {
            query: "sig land".to_string(),
            ..Default::default()
        };
        let menu = menu();
        let hits = filter.filtered(&menu);
        assert_eq!(menu.entries[hits[0]].label, "Signature · Landlord");
        assert!(hits.iter().all(|&i| menu.entries[i].label.starts_with("Signature")));
    }
}
