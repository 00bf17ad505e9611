//! Record store collaborator
//!
//! Durable storage lives outside the analysis core. The core only needs a
//! store that accepts flat records and hands back generated integer ids
//! synchronously; it assumes nothing about ordering or exactly-once
//! delivery beyond those ids.

use hbd_common::models::{
    ChatId, ChatMeta, ClusterId, Identity, IdentityId, Message, MessageId, Participant,
    ParticipantId, WishCluster,
};
use hbd_common::{Error, Result};
use std::sync::{Mutex, MutexGuard};

/// Persistence interface consumed by the batch pipeline
pub trait RecordStore: Send + Sync {
    fn save_chat(&self, chat: &ChatMeta) -> Result<ChatId>;

    /// Ids are returned positionally, one per message
    fn save_messages(&self, chat_id: ChatId, messages: &[Message]) -> Result<Vec<MessageId>>;

    /// Ids are returned positionally, one per participant
    fn save_participants(
        &self,
        chat_id: ChatId,
        participants: &[Participant],
    ) -> Result<Vec<ParticipantId>>;

    fn save_clusters(&self, clusters: &[WishCluster]) -> Result<Vec<ClusterId>>;

    fn save_identities(&self, identities: &[Identity]) -> Result<Vec<IdentityId>>;
}

#[derive(Debug, Default)]
struct Tables {
    chats: Vec<ChatMeta>,
    messages: Vec<Message>,
    participants: Vec<Participant>,
    clusters: Vec<WishCluster>,
    identities: Vec<Identity>,
}

/// In-memory store with sequential ids starting at 1 per table
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Storage("record store lock poisoned".to_string()))
    }

    pub fn chats(&self) -> Vec<ChatMeta> {
        self.lock().map(|t| t.chats.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().map(|t| t.messages.clone()).unwrap_or_default()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.lock().map(|t| t.participants.clone()).unwrap_or_default()
    }

    pub fn clusters(&self) -> Vec<WishCluster> {
        self.lock().map(|t| t.clusters.clone()).unwrap_or_default()
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.lock().map(|t| t.identities.clone()).unwrap_or_default()
    }
}

/// Append records, assigning the next sequential ids
fn append<T: Clone>(table: &mut Vec<T>, records: &[T], set_id: impl Fn(&mut T, i64)) -> Vec<i64> {
    records
        .iter()
        .map(|record| {
            let id = table.len() as i64 + 1;
            let mut stored = record.clone();
            set_id(&mut stored, id);
            table.push(stored);
            id
        })
        .collect()
}

impl RecordStore for InMemoryStore {
    fn save_chat(&self, chat: &ChatMeta) -> Result<ChatId> {
        let mut tables = self.lock()?;
        let ids = append(&mut tables.chats, std::slice::from_ref(chat), |c, id| c.id = id);
        Ok(ids[0])
    }

    fn save_messages(&self, chat_id: ChatId, messages: &[Message]) -> Result<Vec<MessageId>> {
        let mut tables = self.lock()?;
        Ok(append(&mut tables.messages, messages, |m, id| {
            m.id = id;
            m.chat_id = chat_id;
        }))
    }

    fn save_participants(
        &self,
        chat_id: ChatId,
        participants: &[Participant],
    ) -> Result<Vec<ParticipantId>> {
        let mut tables = self.lock()?;
        Ok(append(&mut tables.participants, participants, |p, id| {
            p.id = id;
            p.chat_id = chat_id;
        }))
    }

    fn save_clusters(&self, clusters: &[WishCluster]) -> Result<Vec<ClusterId>> {
        let mut tables = self.lock()?;
        Ok(append(&mut tables.clusters, clusters, |c, id| c.id = Some(id)))
    }

    fn save_identities(&self, identities: &[Identity]) -> Result<Vec<IdentityId>> {
        let mut tables = self.lock()?;
        Ok(append(&mut tables.identities, identities, |i, id| i.id = Some(id)))
    }
}
