//! Field types: how each kind of item is painted and when its value counts as filled.

use crate::model::{DocumentInfo, FieldKind, FieldValue, Item, ItemId};
use crate::store::ItemStore;
use eframe::egui;
use std::collections::HashMap;

mod signature;
mod text;

pub use signature::{SignatureField, SignaturePad, decode_signature};
pub use text::TextField;

pub struct FieldContext<'a> {
    pub info: &'a DocumentInfo,
    /// Value editing is allowed (sign mode). Configure mode paints read-only previews.
    pub editable: bool,
}

/// What a field widget asked for during one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldOutput {
    pub commit: Option<FieldValue>,
    pub advance: bool,
    pub open_pad: bool,
}

impl FieldOutput {
    pub fn is_empty(&self) -> bool {
        self.commit.is_none() && !self.advance && !self.open_pad
    }
}

pub trait FieldType {
    fn kind(&self) -> FieldKind;

    fn generate(
        &self,
        ui: &mut egui::Ui,
        ctx: &FieldContext<'_>,
        item: &Item,
        rect: egui::Rect,
    ) -> FieldOutput;

    fn check(&self, item: &Item) -> bool;
}

pub fn field_widget_id(item: ItemId) -> egui::Id {
    egui::Id::new(("sign_field", item))
}

pub struct FieldTypeRegistry {
    types: HashMap<FieldKind, Box<dyn FieldType>>,
}

impl FieldTypeRegistry {
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TextField));
        registry.register(Box::new(SignatureField));
        registry
    }

    pub fn register(&mut self, field_type: Box<dyn FieldType>) {
        self.types.insert(field_type.kind(), field_type);
    }

    pub fn resolve(&self, kind: FieldKind) -> Option<&dyn FieldType> {
        self.types.get(&kind).map(|t| t.as_ref())
    }

    pub fn check(&self, item: &Item) -> bool {
        self.resolve(item.field_type)
            .is_some_and(|field_type| field_type.check(item))
    }

    pub fn all_required_filled<'a>(&self, items: impl IntoIterator<Item = &'a Item>) -> bool {
        items
            .into_iter()
            .filter(|item| item.required)
            .all(|item| self.check(item))
    }

    /// Item with the smallest tabindex strictly after `from`, across every page.
    pub fn next_in_tab_order(&self, store: &ItemStore, from: ItemId) -> Option<ItemId> {
        let current = store.get(from)?.tabindex;
        store
            .all()
            .filter(|item| item.tabindex > current)
            .min_by_key(|item| (item.tabindex, item.id))
            .map(|item| item.id)
    }
}

impl Default for FieldTypeRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

pub(crate) fn paint_placeholder(ui: &egui::Ui, item: &Item, rect: egui::Rect) {
    let painter = ui.painter_at(rect);
    painter.rect_filled(rect, 2.0, egui::Color32::from_rgba_unmultiplied(255, 236, 179, 200));
    painter.text(
        rect.left_center() + egui::vec2(4.0, 0.0),
        egui::Align2::LEFT_CENTER,
        &item.name,
        egui::FontId::proportional((rect.height() * 0.7).clamp(8.0, 14.0)),
        egui::Color32::from_rgb(90, 70, 20),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::text_item;

    #[test]
    fn text_check_requires_non_empty_value() {
        let registry = FieldTypeRegistry::with_builtin();
        let mut item = text_item(1, 1, 1);
        assert!(!registry.check(&item));
        item.value_text = Some(String::new());
        assert!(!registry.check(&item));
        item.value_text = Some("Ada".into());
        assert!(registry.check(&item));
    }

    #[test]
    fn unknown_kinds_never_pass() {
        let registry = FieldTypeRegistry::with_builtin();
        let mut item = text_item(1, 1, 1);
        item.field_type = FieldKind::Unknown;
        item.value_text = Some("filled".into());
        assert!(!registry.check(&item));
    }

    #[test]
    fn completeness_only_looks_at_required_items() {
        let registry = FieldTypeRegistry::with_builtin();
        let mut a = text_item(1, 1, 1);
        let mut b = text_item(2, 2, 2);
        b.required = true;
        assert!(!registry.all_required_filled([&a, &b]));
        b.value_text = Some("done".into());
        assert!(registry.all_required_filled([&a, &b]));
        a.required = true;
        assert!(!registry.all_required_filled([&a, &b]));
        assert!(registry.all_required_filled(std::iter::empty::<&Item>()));
    }

    #[test]
    fn tab_advance_crosses_pages_without_wrapping() {
        let registry = FieldTypeRegistry::with_builtin();
        let store = ItemStore::from_items([
            text_item(1, 1, 1),
            text_item(2, 3, 4),
            text_item(3, 2, 2),
            text_item(4, 1, 7),
        ]);
        assert_eq!(registry.next_in_tab_order(&store, 1), Some(3));
        assert_eq!(registry.next_in_tab_order(&store, 3), Some(2));
        assert_eq!(registry.next_in_tab_order(&store, 2), Some(4));
        assert_eq!(registry.next_in_tab_order(&store, 4), None);
        assert_eq!(registry.next_in_tab_order(&store, 99), None);
    }

    #[test]
    fn tab_advance_skips_equal_tabindex() {
        let registry = FieldTypeRegistry::with_builtin();
        let store = ItemStore::from_items([text_item(1, 1, 1), text_item(2, 1, 1), text_item(3, 2, 2)]);
        assert_eq!(registry.next_in_tab_order(&store, 1), Some(3));
        assert_eq!(registry.next_in_tab_order(&store, 2), Some(3));
    }

    #[test]
    fn registering_replaces_by_kind() {
        struct AlwaysFilled;
        impl FieldType for AlwaysFilled {
            fn kind(&self) -> FieldKind {
                FieldKind::Text
            }
            fn generate(
                &self,
                _ui: &mut egui::Ui,
                _ctx: &FieldContext<'_>,
                _item: &Item,
                _rect: egui::Rect,
            ) -> FieldOutput {
                FieldOutput::default()
            }
            fn check(&self, _item: &Item) -> bool {
                true
            }
        }
        let mut registry = FieldTypeRegistry::with_builtin();
        registry.register(Box::new(AlwaysFilled));
        assert!(registry.check(&text_item(1, 1, 1)));
    }
}
