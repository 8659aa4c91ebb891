//! Persistence of local changes.
//!
//! Every call is registered with a compensating action before it is sent. A
//! success discards the compensation; a failure applies it to the store, so
//! optimistic edits never outlive a rejected call. A failure only reverts the
//! attributes its own call changed, and never over a newer call on them.

use crate::backend::{Backend, ValueWrite};
use crate::error::{Result, SignError};
use crate::model::{DocumentInfo, FieldGroup, Item, ItemId, ItemPatch, NewItem, RecordId, Revert};
use crate::store::ItemStore;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::{HashMap, VecDeque};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

pub type Ticket = u64;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    GetInfo,
    AddItem(NewItem),
    SetItemData { item: ItemId, patch: ItemPatch },
    DeleteItem(ItemId),
    Write(Vec<ValueWrite>),
    ActionSign,
}

impl Call {
    pub fn method(&self) -> &'static str {
        match self {
            Call::GetInfo => "get_info",
            Call::AddItem(_) => "add_item",
            Call::SetItemData { .. } => "set_item_data",
            Call::DeleteItem(_) => "delete_item",
            Call::Write(_) => "write",
            Call::ActionSign => "action_sign",
        }
    }
}

/// Undo step applied to the store if the call fails.
#[derive(Clone, Debug, PartialEq)]
pub enum Compensation {
    None,
    /// Put back the attributes an optimistic change overwrote.
    Restore { item: ItemId, revert: Revert },
    /// Re-add an item that was optimistically removed.
    Reinsert(Item),
}

impl Compensation {
    pub fn restore(before: &Item, group: FieldGroup) -> Self {
        Compensation::Restore {
            item: before.id,
            revert: Revert::capture(before, group),
        }
    }

    fn key(&self) -> Option<(ItemId, FieldGroup)> {
        match self {
            Compensation::Restore { item, revert } => Some((*item, revert.group())),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum SyncEvent {
    /// The document was fetched; its items now live in the store.
    Loaded(DocumentInfo),
    Created { ticket: Ticket, item: ItemId },
    Saved { ticket: Ticket, method: &'static str },
    Signed { ticket: Ticket },
    Failed {
        ticket: Ticket,
        method: &'static str,
        error: SignError,
        rolled_back: Option<ItemId>,
    },
}

impl SyncEvent {
    pub fn ticket(&self) -> Option<Ticket> {
        match self {
            SyncEvent::Loaded(_) => None,
            SyncEvent::Created { ticket, .. }
            | SyncEvent::Saved { ticket, .. }
            | SyncEvent::Signed { ticket }
            | SyncEvent::Failed { ticket, .. } => Some(*ticket),
        }
    }
}

enum Reply {
    Info(DocumentInfo),
    Created(Item),
    Ack,
}

struct Job {
    ticket: Ticket,
    call: Call,
}

type Outcome = (Ticket, Result<Reply>);

enum Dispatch {
    Inline {
        backend: Box<dyn Backend>,
        done: VecDeque<Outcome>,
    },
    Worker {
        jobs: Option<Sender<Job>>,
        replies: Receiver<Outcome>,
        handle: Option<JoinHandle<()>>,
    },
}

struct Pending {
    method: &'static str,
    compensation: Compensation,
}

pub struct SyncClient {
    record: RecordId,
    dispatch: Dispatch,
    next_ticket: Ticket,
    pending: HashMap<Ticket, Pending>,
    latest: HashMap<(ItemId, FieldGroup), Ticket>,
    undelivered: VecDeque<Outcome>,
    closed: bool,
}

fn execute(backend: &mut dyn Backend, record: RecordId, call: Call) -> Result<Reply> {
    match call {
        Call::GetInfo => backend.get_info(record).map(Reply::Info),
        Call::AddItem(new) => backend.add_item(record, &new).map(Reply::Created),
        Call::SetItemData { item, patch } => {
            backend.set_item_data(record, item, &patch).map(|_| Reply::Ack)
        }
        Call::DeleteItem(item) => backend.delete_item(record, item).map(|_| Reply::Ack),
        Call::Write(writes) => backend.write(record, &writes).map(|_| Reply::Ack),
        Call::ActionSign => backend.action_sign(record).map(|_| Reply::Ack),
    }
}

impl SyncClient {
    /// Runs calls synchronously on submit; results still surface through [`SyncClient::poll`].
    pub fn inline(record: RecordId, backend: Box<dyn Backend>) -> Self {
        Self {
            record,
            dispatch: Dispatch::Inline {
                backend,
                done: VecDeque::new(),
            },
            next_ticket: 1,
            pending: HashMap::new(),
            latest: HashMap::new(),
            undelivered: VecDeque::new(),
            closed: false,
        }
    }

    /// Runs calls on a background thread so the UI never waits for the network.
    pub fn spawn(record: RecordId, mut backend: Box<dyn Backend>) -> Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<Outcome>();
        let handle = std::thread::Builder::new()
            .name("sync-worker".to_string())
            .spawn(move || {
                for job in job_rx {
                    let outcome = execute(backend.as_mut(), record, job.call);
                    if reply_tx.send((job.ticket, outcome)).is_err() {
                        break;
                    }
                }
                debug!("sync worker stopped");
            })?;
        Ok(Self {
            record,
            dispatch: Dispatch::Worker {
                jobs: Some(job_tx),
                replies: reply_rx,
                handle: Some(handle),
            },
            next_ticket: 1,
            pending: HashMap::new(),
            latest: HashMap::new(),
            undelivered: VecDeque::new(),
            closed: false,
        })
    }

    /// Queues a call; returns `None` once the client has been shut down.
    pub fn submit(&mut self, call: Call, compensation: Compensation) -> Option<Ticket> {
        if self.closed {
            debug!(method = call.method(), "sync client closed, call dropped");
            return None;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let method = call.method();
        debug!(ticket, method, "submitting call");
        if let Some(key) = compensation.key() {
            self.latest.insert(key, ticket);
        }
        self.pending.insert(
            ticket,
            Pending {
                method,
                compensation,
            },
        );
        match &mut self.dispatch {
            Dispatch::Inline { backend, done } => {
                let outcome = execute(backend.as_mut(), self.record, call);
                done.push_back((ticket, outcome));
            }
            Dispatch::Worker { jobs, .. } => {
                let sent = jobs
                    .as_ref()
                    .is_some_and(|tx| tx.send(Job { ticket, call }).is_ok());
                if !sent {
                    warn!(ticket, method, "sync worker unavailable");
                    self.undelivered
                        .push_back((ticket, Err(SignError::backend(method, "sync worker unavailable"))));
                }
            }
        }
        Some(ticket)
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, ticket: Ticket) -> bool {
        self.pending.contains_key(&ticket)
    }

    /// Applies every reply that has arrived since the last poll.
    pub fn poll(&mut self, store: &mut ItemStore) -> Vec<SyncEvent> {
        let mut outcomes: Vec<Outcome> = self.undelivered.drain(..).collect();
        match &mut self.dispatch {
            Dispatch::Inline { done, .. } => outcomes.extend(done.drain(..)),
            Dispatch::Worker { replies, .. } => loop {
                match replies.try_recv() {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            },
        }
        outcomes
            .into_iter()
            .filter_map(|(ticket, outcome)| self.reconcile(ticket, outcome, store))
            .collect()
    }

    fn reconcile(
        &mut self,
        ticket: Ticket,
        outcome: Result<Reply>,
        store: &mut ItemStore,
    ) -> Option<SyncEvent> {
        let Some(pending) = self.pending.remove(&ticket) else {
            debug!(ticket, "reply for unknown ticket ignored");
            return None;
        };
        let event = match outcome {
            Ok(Reply::Info(mut info)) => {
                let items = std::mem::take(&mut info.items);
                info!(items = items.len(), "document loaded");
                store.replace_all(items.into_values());
                SyncEvent::Loaded(info)
            }
            Ok(Reply::Created(item)) => {
                let id = item.id;
                store.add(item);
                SyncEvent::Created { ticket, item: id }
            }
            Ok(Reply::Ack) if pending.method == "action_sign" => SyncEvent::Signed { ticket },
            Ok(Reply::Ack) => SyncEvent::Saved {
                ticket,
                method: pending.method,
            },
            Err(error) => {
                let rolled_back = match pending.compensation {
                    Compensation::None => None,
                    Compensation::Restore { item, revert } => {
                        self.compensate(ticket, item, revert, store)
                    }
                    Compensation::Reinsert(item) => {
                        let id = item.id;
                        store.add(item);
                        Some(id)
                    }
                };
                warn!(ticket, method = pending.method, ?rolled_back, %error, "call failed");
                SyncEvent::Failed {
                    ticket,
                    method: pending.method,
                    error,
                    rolled_back,
                }
            }
        };
        if matches!(pending.method, "add_item" | "set_item_data" | "delete_item") {
            store.renumber_tabs();
        }
        Some(event)
    }

    /// Reverts a failed change unless a newer call on the same attributes
    /// exists. A newer call still in flight inherits the older values, since
    /// its own snapshot holds the value that just failed.
    fn compensate(
        &mut self,
        ticket: Ticket,
        item: ItemId,
        revert: Revert,
        store: &mut ItemStore,
    ) -> Option<ItemId> {
        let key = (item, revert.group());
        let successor = self
            .pending
            .iter()
            .filter(|(t, p)| **t > ticket && p.compensation.key() == Some(key))
            .map(|(t, _)| *t)
            .min();
        if let Some(next) = successor {
            debug!(ticket, next, "failed change superseded by call in flight");
            if let Some(pending) = self.pending.get_mut(&next) {
                pending.compensation = Compensation::Restore { item, revert };
            }
            return None;
        }
        if self.latest.get(&key).is_some_and(|latest| *latest > ticket) {
            debug!(ticket, item, "failed change already superseded");
            return None;
        }
        store.revert(item, &revert).then_some(item)
    }

    /// Stops dispatching; replies still in flight are discarded.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        self.latest.clear();
        if let Dispatch::Worker { jobs, handle, .. } = &mut self.dispatch {
            jobs.take();
            // The worker exits after its current call; it is not joined so a
            // slow request cannot hold up closing the view.
            handle.take();
        }
        info!("sync client shut down");
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::backend::memory::tests::sample_info;
    use crate::model::{FieldValue, ItemValues, Percent};
    use std::time::{Duration, Instant};

    fn new_item() -> NewItem {
        NewItem {
            field_id: 1,
            role_id: Some(10),
            page: 1,
            position_x: 50.0,
            position_y: 50.0,
            width: 20.0,
            height: 1.5,
        }
    }

    #[test]
    fn replies_surface_only_on_poll() {
        let mut store = ItemStore::new();
        let mut sync = SyncClient::inline(1, Box::new(MemoryBackend::new(1, sample_info())));
        let ticket = sync.submit(Call::AddItem(new_item()), Compensation::None).unwrap();
        assert!(store.is_empty());
        assert!(sync.is_pending(ticket));
        let events = sync.poll(&mut store);
        assert!(matches!(events[..], [SyncEvent::Created { ticket: t, .. }] if t == ticket));
        assert_eq!(store.len(), 1);
        assert_eq!(sync.in_flight(), 0);
    }

    #[test]
    fn failed_update_restores_previous_position() {
        let mut backend = MemoryBackend::new(1, sample_info());
        let created = backend.add_item(1, &new_item()).unwrap();
        backend.fail_next("set_item_data");
        let mut store = ItemStore::from_items([created.clone()]);
        let mut sync = SyncClient::inline(1, Box::new(backend));

        let patch = ItemPatch::position(Percent::new(5.0, 5.0));
        let before = store.update(created.id, &patch).unwrap();
        sync.submit(
            Call::SetItemData { item: created.id, patch },
            Compensation::restore(&before, FieldGroup::Position),
        );
        let events = sync.poll(&mut store);
        match &events[..] {
            [SyncEvent::Failed { method, rolled_back, .. }] => {
                assert_eq!(*method, "set_item_data");
                assert_eq!(*rolled_back, Some(created.id));
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(store.get(created.id).unwrap().position_x, 50.0);
    }

    #[test]
    fn failed_delete_reinserts_item() {
        let mut backend = MemoryBackend::new(1, sample_info());
        let created = backend.add_item(1, &new_item()).unwrap();
        backend.fail_next("delete_item");
        let mut store = ItemStore::from_items([created.clone()]);
        let mut sync = SyncClient::inline(1, Box::new(backend));
        let removed = store.remove(created.id).unwrap();
        sync.submit(Call::DeleteItem(created.id), Compensation::Reinsert(removed));
        sync.poll(&mut store);
        assert!(store.contains(created.id));
    }

    fn write_text(store: &mut ItemStore, sync: &mut SyncClient, id: ItemId, text: &str) -> Ticket {
        let value = FieldValue::Text(text.to_string());
        let before = store.set_value(id, &value).unwrap();
        let write = ValueWrite {
            item: id,
            values: value.to_values(),
        };
        sync.submit(Call::Write(vec![write]), Compensation::restore(&before, value.group()))
            .unwrap()
    }

    #[test]
    fn failed_write_keeps_newer_successful_value() {
        let mut backend = MemoryBackend::new(1, sample_info());
        let created = backend.add_item(1, &new_item()).unwrap();
        backend.fail_next("write");
        let mut store = ItemStore::from_items([created.clone()]);
        let mut sync = SyncClient::inline(1, Box::new(backend));

        let first = write_text(&mut store, &mut sync, created.id, "A");
        write_text(&mut store, &mut sync, created.id, "B");
        let events = sync.poll(&mut store);
        assert!(matches!(
            events[0],
            SyncEvent::Failed { ticket, rolled_back: None, .. } if ticket == first
        ));
        assert!(matches!(events[1], SyncEvent::Saved { method: "write", .. }));
        assert_eq!(store.get(created.id).unwrap().value_text.as_deref(), Some("B"));
    }

    #[test]
    fn consecutive_failed_writes_restore_the_oldest_value() {
        let mut backend = MemoryBackend::new(1, sample_info());
        let created = backend.add_item(1, &new_item()).unwrap();
        backend.fail_next("write");
        backend.fail_next("write");
        let mut store = ItemStore::from_items([created.clone()]);
        let mut sync = SyncClient::inline(1, Box::new(backend));

        write_text(&mut store, &mut sync, created.id, "A");
        write_text(&mut store, &mut sync, created.id, "B");
        let events = sync.poll(&mut store);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], SyncEvent::Failed { rolled_back: Some(_), .. }));
        assert_eq!(store.get(created.id).unwrap().value_text, None);
    }

    #[test]
    fn failed_move_keeps_later_attribute_edit() {
        let mut backend = MemoryBackend::new(1, sample_info());
        let created = backend.add_item(1, &new_item()).unwrap();
        backend.fail_next("set_item_data");
        let mut store = ItemStore::from_items([created.clone()]);
        let mut sync = SyncClient::inline(1, Box::new(backend));

        let moved = ItemPatch::position(Percent::new(5.0, 5.0));
        let before = store.update(created.id, &moved).unwrap();
        sync.submit(
            Call::SetItemData { item: created.id, patch: moved },
            Compensation::restore(&before, FieldGroup::Position),
        );
        let required = ItemPatch {
            required: Some(true),
            ..Default::default()
        };
        let before = store.update(created.id, &required).unwrap();
        sync.submit(
            Call::SetItemData { item: created.id, patch: required },
            Compensation::restore(&before, FieldGroup::Attributes),
        );
        sync.poll(&mut store);
        let item = store.get(created.id).unwrap();
        assert_eq!(item.position_x, 50.0);
        assert!(item.required);
    }

    #[test]
    fn layout_changes_renumber_local_tab_order() {
        let mut backend = MemoryBackend::new(1, sample_info());
        let lower = backend.add_item(1, &new_item()).unwrap();
        let mut store = ItemStore::from_items([lower.clone()]);
        let mut sync = SyncClient::inline(1, Box::new(backend));
        let upper = NewItem {
            position_y: 5.0,
            ..new_item()
        };
        sync.submit(Call::AddItem(upper), Compensation::None);
        sync.poll(&mut store);
        assert_eq!(store.get(lower.id).unwrap().tabindex, 2);
        let created = store.all().find(|i| i.id != lower.id).unwrap();
        assert_eq!(created.tabindex, 1);
    }

    #[test]
    fn load_moves_items_into_store() {
        let mut info = sample_info();
        let mut backend = MemoryBackend::new(1, info.clone());
        let created = backend.add_item(1, &new_item()).unwrap();
        info.items.insert(created.id, created);
        let mut store = ItemStore::new();
        let mut sync = SyncClient::inline(1, Box::new(backend));
        sync.submit(Call::GetInfo, Compensation::None);
        let events = sync.poll(&mut store);
        match &events[..] {
            [SyncEvent::Loaded(info)] => assert!(info.items.is_empty()),
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn closed_client_drops_calls() {
        let mut store = ItemStore::new();
        let mut sync = SyncClient::inline(1, Box::new(MemoryBackend::new(1, sample_info())));
        sync.shutdown();
        assert!(sync.submit(Call::GetInfo, Compensation::None).is_none());
        assert!(sync.poll(&mut store).is_empty());
    }

    #[test]
    fn worker_thread_delivers_replies() {
        let mut store = ItemStore::new();
        let mut sync = SyncClient::spawn(1, Box::new(MemoryBackend::new(1, sample_info()))).unwrap();
        let ticket = sync.submit(Call::AddItem(new_item()), Compensation::None).unwrap();
        let write = Call::Write(vec![ValueWrite {
            item: 1,
            values: ItemValues { value_text: Some("Ada".into()), value_binary: None },
        }]);
        sync.submit(write, Compensation::None).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while events.len() < 2 && Instant::now() < deadline {
            events.extend(sync.poll(&mut store));
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(events[0], SyncEvent::Created { ticket: t, .. } if t == ticket));
        assert!(matches!(events[1], SyncEvent::Saved { method: "write", .. }));
        assert_eq!(store.len(), 1);
    }
}
