use super::{Backend, ValueWrite};
use crate::error::{Result, SignError};
use crate::model::{
    DocumentInfo, FieldKind, Item, ItemId, ItemPatch, NewItem, RecordId, reading_order,
};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info};

/// In-process backend with the server's bookkeeping: id assignment, reading-order
/// tab indexes and the signability check on `action_sign`.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    record: RecordId,
    info: DocumentInfo,
    next_id: ItemId,
    signed: bool,
    scripted_failures: VecDeque<&'static str>,
}

impl MemoryBackend {
    pub fn new(record: RecordId, info: DocumentInfo) -> Self {
        let next_id = info.items.keys().max().copied().unwrap_or(0) + 1;
        let mut backend = Self {
            record,
            info,
            next_id,
            signed: false,
            scripted_failures: VecDeque::new(),
        };
        backend.renumber_tabs();
        backend
    }

    pub fn load(record: RecordId, path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let info: DocumentInfo = serde_json::from_str(&raw)?;
        info!(path = %path.as_ref().display(), items = info.items.len(), "loaded fixture document");
        Ok(Self::new(record, info))
    }

    /// Makes the next call to `method` fail once.
    pub fn fail_next(&mut self, method: &'static str) {
        self.scripted_failures.push_back(method);
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.info.items.values()
    }

    fn guard(&mut self, method: &'static str, record: RecordId) -> Result<()> {
        if let Some(pos) = self.scripted_failures.iter().position(|m| *m == method) {
            self.scripted_failures.remove(pos);
            return Err(SignError::backend(method, "scripted failure"));
        }
        if record != self.record {
            return Err(SignError::backend(method, format!("record {record} does not exist")));
        }
        Ok(())
    }

    fn item_mut(&mut self, method: &'static str, id: ItemId) -> Result<&mut Item> {
        self.info
            .items
            .get_mut(&id)
            .ok_or_else(|| SignError::backend(method, format!("item {id} does not exist")))
    }

    fn renumber_tabs(&mut self) {
        let order = reading_order(self.info.items.values());
        for (tabindex, id) in order.into_iter().enumerate() {
            if let Some(item) = self.info.items.get_mut(&id) {
                item.tabindex = tabindex as i32 + 1;
            }
        }
    }

    fn refresh_to_sign(&mut self) {
        let partner = self.info.partner.id;
        let roles = self.info.roles.clone();
        for item in self.info.items.values_mut() {
            item.to_sign = match item.role_id.and_then(|r| roles.iter().find(|role| role.id == r)) {
                Some(role) => role.partner_id == Some(partner),
                None => roles.is_empty(),
            };
        }
    }

    fn sync_field_attributes(&mut self, id: ItemId) {
        let Some(item) = self.info.items.get(&id) else {
            return;
        };
        let Some(field) = self.info.field(item.field_id).cloned() else {
            return;
        };
        if let Some(item) = self.info.items.get_mut(&id) {
            item.name = field.name;
            item.field_type = field.field_type;
            item.default_value = field.default_value;
        }
    }
}

impl Backend for MemoryBackend {
    fn get_info(&mut self, record: RecordId) -> Result<DocumentInfo> {
        self.guard("get_info", record)?;
        self.refresh_to_sign();
        let mut info = self.info.clone();
        info.to_sign = !self.signed && info.items.values().any(|item| item.to_sign);
        Ok(info)
    }

    fn add_item(&mut self, record: RecordId, new: &NewItem) -> Result<Item> {
        self.guard("add_item", record)?;
        let field = self
            .info
            .field(new.field_id)
            .cloned()
            .ok_or_else(|| SignError::backend("add_item", format!("field {} does not exist", new.field_id)))?;
        let id = self.next_id;
        self.next_id += 1;
        let mut item = Item {
            id,
            field_id: field.id,
            field_type: field.field_type,
            name: field.name,
            role_id: new.role_id.or_else(|| self.info.roles.first().map(|r| r.id)),
            page: new.page,
            position_x: new.position_x,
            position_y: new.position_y,
            width: new.width,
            height: new.height,
            required: false,
            value_text: None,
            value_binary: None,
            tabindex: 0,
            default_value: field.default_value,
            to_sign: false,
        };
        item.clamp();
        self.info.items.insert(id, item);
        self.renumber_tabs();
        self.refresh_to_sign();
        debug!(id, "memory backend created item");
        Ok(self.info.items[&id].clone())
    }

    fn set_item_data(&mut self, record: RecordId, id: ItemId, patch: &ItemPatch) -> Result<()> {
        self.guard("set_item_data", record)?;
        self.item_mut("set_item_data", id)?.apply(patch);
        if patch.field_id.is_some() {
            self.sync_field_attributes(id);
        }
        self.renumber_tabs();
        Ok(())
    }

    fn delete_item(&mut self, record: RecordId, id: ItemId) -> Result<()> {
        self.guard("delete_item", record)?;
        self.info
            .items
            .remove(&id)
            .ok_or_else(|| SignError::backend("delete_item", format!("item {id} does not exist")))?;
        self.renumber_tabs();
        Ok(())
    }

    fn write(&mut self, record: RecordId, writes: &[ValueWrite]) -> Result<()> {
        self.guard("write", record)?;
        for write in writes {
            let item = self.item_mut("write", write.item)?;
            if let Some(text) = &write.values.value_text {
                item.value_text = (!text.is_empty()).then(|| text.clone());
            }
            if let Some(data) = &write.values.value_binary {
                item.value_binary = (!data.is_empty()).then(|| data.clone());
            }
        }
        Ok(())
    }

    fn action_sign(&mut self, record: RecordId) -> Result<()> {
        self.guard("action_sign", record)?;
        self.refresh_to_sign();
        for item in self.info.items.values().filter(|i| i.required && i.to_sign) {
            let filled = match item.field_type {
                FieldKind::Text => item.value_text.as_deref().is_some_and(|t| !t.is_empty()),
                FieldKind::Signature => item.value_binary.as_deref().is_some_and(|b| !b.is_empty()),
                FieldKind::Unknown => true,
            };
            if !filled {
                return Err(SignError::backend(
                    "action_sign",
                    format!("Field {} is not filled", item.name),
                ));
            }
        }
        self.signed = true;
        info!(record, "document signed");
        Ok(())
    }
}
