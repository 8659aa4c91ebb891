//! Persistence collaborators. The sync client talks to any [`Backend`].

use crate::error::Result;
use crate::model::{DocumentInfo, Item, ItemId, ItemPatch, ItemValues, NewItem, RecordId};

pub(crate) mod memory;
mod rpc;

pub use memory::MemoryBackend;
pub use rpc::RpcBackend;

/// One `write` operation on an item's value slots, sent as `(1, id, values)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueWrite {
    pub item: ItemId,
    pub values: ItemValues,
}

pub trait Backend: Send {
    fn get_info(&mut self, record: RecordId) -> Result<DocumentInfo>;

    fn add_item(&mut self, record: RecordId, item: &NewItem) -> Result<Item>;

    fn set_item_data(&mut self, record: RecordId, item: ItemId, patch: &ItemPatch) -> Result<()>;

    fn delete_item(&mut self, record: RecordId, item: ItemId) -> Result<()>;

    fn write(&mut self, record: RecordId, writes: &[ValueWrite]) -> Result<()>;

    fn action_sign(&mut self, record: RecordId) -> Result<()>;
}
