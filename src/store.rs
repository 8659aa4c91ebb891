use crate::model::{FieldValue, Item, ItemId, ItemPatch, Revert, reading_order};
use std::collections::BTreeMap;
use tracing::debug;

/// Placed items of the open document, keyed by id.
///
/// Mutations are local only; persisting them is up to the caller.
#[derive(Clone, Debug, Default)]
pub struct ItemStore {
    items: BTreeMap<ItemId, Item>,
    page_count: Option<u32>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut store = Self::new();
        for item in items {
            store.add(item);
        }
        store
    }

    pub fn replace_all(&mut self, items: impl IntoIterator<Item = Item>) {
        self.items.clear();
        for item in items {
            self.add(item);
        }
    }

    /// Bounds the page of every current and future item once the viewer knows the page count.
    pub fn set_page_count(&mut self, pages: u32) {
        self.page_count = Some(pages.max(1));
        for item in self.items.values_mut() {
            item.page = item.page.clamp(1, pages.max(1));
        }
    }

    pub fn page_count(&self) -> Option<u32> {
        self.page_count
    }

    pub fn add(&mut self, mut item: Item) {
        item.clamp();
        if let Some(pages) = self.page_count {
            item.page = item.page.min(pages);
        }
        self.items.insert(item.id, item);
    }

    /// Returns the item as it was before the patch, or `None` when the id is unknown.
    pub fn update(&mut self, id: ItemId, patch: &ItemPatch) -> Option<Item> {
        self.modify(id, |item| item.apply(patch))
    }

    pub fn set_value(&mut self, id: ItemId, value: &FieldValue) -> Option<Item> {
        self.modify(id, |item| item.set_value(value))
    }

    pub fn modify(&mut self, id: ItemId, change: impl FnOnce(&mut Item)) -> Option<Item> {
        let Some(item) = self.items.get_mut(&id) else {
            debug!(id, "change on missing item ignored");
            return None;
        };
        let before = item.clone();
        change(item);
        item.clamp();
        Some(before)
    }

    /// Undoes one group of attributes; returns false if the item is gone.
    pub fn revert(&mut self, id: ItemId, revert: &Revert) -> bool {
        self.modify(id, |item| item.revert(revert)).is_some()
    }

    /// Numbers tab stops in reading order from 1, as the backend does after
    /// every layout change.
    pub fn renumber_tabs(&mut self) {
        for (tabindex, id) in reading_order(self.items.values()).into_iter().enumerate() {
            if let Some(item) = self.items.get_mut(&id) {
                item.tabindex = tabindex as i32 + 1;
            }
        }
    }

    pub fn remove(&mut self, id: ItemId) -> Option<Item> {
        self.items.remove(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn on_page(&self, page: u32) -> impl Iterator<Item = &Item> {
        self.items.values().filter(move |item| item.page == page)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{FieldGroup, FieldKind, Percent};

    pub(crate) fn text_item(id: ItemId, page: u32, tabindex: i32) -> Item {
        Item {
            id,
            field_id: 1,
            field_type: FieldKind::Text,
            name: "Name".to_string(),
            role_id: Some(1),
            page,
            position_x: 10.0,
            position_y: 10.0,
            width: 20.0,
            height: 1.5,
            required: false,
            value_text: None,
            value_binary: None,
            tabindex,
            default_value: None,
            to_sign: true,
        }
    }

    #[test]
    fn add_clamps_geometry() {
        let mut item = text_item(1, 1, 1);
        item.position_x = -5.0;
        item.height = 250.0;
        let store = ItemStore::from_items([item]);
        let stored = store.get(1).unwrap();
        assert_eq!(stored.position_x, 0.0);
        assert_eq!(stored.height, 100.0);
    }

    #[test]
    fn revert_undoes_only_its_group() {
        let mut store = ItemStore::from_items([text_item(1, 1, 1)]);
        let before = store
            .update(1, &ItemPatch::position(Percent::new(30.0, 40.0)))
            .unwrap();
        assert_eq!(before.position_x, 10.0);
        assert_eq!(store.get(1).unwrap().position_x, 30.0);
        store.update(1, &ItemPatch::size(50.0, 4.0));
        assert!(store.revert(1, &Revert::capture(&before, FieldGroup::Position)));
        let item = store.get(1).unwrap();
        assert_eq!(item.position_x, 10.0);
        assert_eq!(item.width, 50.0);
        assert!(!store.revert(9, &Revert::capture(&before, FieldGroup::Position)));
    }

    #[test]
    fn renumbering_follows_reading_order() {
        let mut below = text_item(1, 1, 1);
        below.position_y = 60.0;
        let mut right = text_item(2, 1, 2);
        right.position_x = 70.0;
        let left = text_item(3, 1, 3);
        let next_page = text_item(4, 2, 0);
        let mut store = ItemStore::from_items([below, right, left, next_page]);
        store.renumber_tabs();
        let tabs: Vec<i32> = [3, 2, 1, 4].iter().map(|id| store.get(*id).unwrap().tabindex).collect();
        assert_eq!(tabs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn missing_ids_are_no_ops() {
        let mut store = ItemStore::new();
        assert!(store.update(9, &ItemPatch::size(1.0, 1.0)).is_none());
        assert!(store.set_value(9, &FieldValue::Text("x".into())).is_none());
        assert!(store.remove(9).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn page_count_bounds_items() {
        let mut store = ItemStore::from_items([text_item(1, 5, 1)]);
        store.set_page_count(3);
        assert_eq!(store.get(1).unwrap().page, 3);
        store.add(text_item(2, 8, 2));
        assert_eq!(store.get(2).unwrap().page, 3);
    }

    #[test]
    fn on_page_filters_by_page() {
        let store = ItemStore::from_items([text_item(1, 2, 3), text_item(2, 1, 5), text_item(3, 2, 1)]);
        let ids: Vec<ItemId> = store.on_page(2).map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(store.on_page(3).count(), 0);
    }
}
