//! Mirrored server entities: channels, users, and their lazily-fetched
//! binary attachments.
//!
//! State messages are partial by design: a field the server includes
//! overwrites the mirrored value, a field it omits leaves the value
//! alone. The merge functions here spell that contract out per field.

use std::collections::BTreeSet;

use bytes::Bytes;
use mumble_protocol::messages::{ChannelState, UserState};

/// A large binary attachment the server advertises by content hash and
/// streams only on request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Blob {
    /// The server advertised neither data nor a hash; reads resolve to
    /// empty without a round trip.
    #[default]
    Empty,
    /// A hash is known but the content has not been requested.
    Advertised(Bytes),
    /// A request-blob for this hash is in flight.
    Fetching(Bytes),
    /// Content is available.
    Resolved { hash: Option<Bytes>, data: Bytes },
}

impl Blob {
    /// Content, if already present.
    #[must_use]
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            Self::Resolved { data, .. } => Some(data),
            _ => None,
        }
    }

    /// True while a request-blob round trip is outstanding.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        matches!(self, Self::Fetching(_))
    }

    /// Applies one state message's view of this attachment.
    ///
    /// A hash that differs from the one on record invalidates whatever
    /// was here, abandoning any outstanding fetch; waiters re-check and
    /// issue a fresh request against the new hash.
    pub(crate) fn update(&mut self, data: Option<&[u8]>, hash: Option<&[u8]>) {
        if let Some(hash) = hash {
            let known = match self {
                Self::Advertised(old) | Self::Fetching(old) => old.as_ref() == hash,
                Self::Resolved { hash: Some(old), .. } => old.as_ref() == hash,
                Self::Resolved { hash: None, .. } | Self::Empty => false,
            };
            if !known {
                *self = Self::Advertised(Bytes::copy_from_slice(hash));
            }
        }

        if let Some(data) = data {
            let hash = match self {
                Self::Advertised(hash) | Self::Fetching(hash) => Some(hash.clone()),
                Self::Resolved { hash, .. } => hash.clone(),
                Self::Empty => None,
            };
            *self = Self::Resolved {
                hash,
                data: Bytes::copy_from_slice(data),
            };
        }
    }

    /// Marks an advertised attachment as requested. Returns true when
    /// the caller should actually send the request-blob message.
    pub(crate) fn begin_fetch(&mut self) -> bool {
        if let Self::Advertised(hash) = self {
            *self = Self::Fetching(hash.clone());
            true
        } else {
            false
        }
    }
}

/// One channel in the server's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u32,
    /// Absent only on the root channel.
    pub parent_id: Option<u32>,
    /// Undirected link edges; supplementary to the tree, never parentage.
    pub link_ids: BTreeSet<u32>,
    pub name: String,
    /// Ordering hint among siblings.
    pub position: i32,
    pub description: Blob,
}

impl Channel {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            parent_id: None,
            link_ids: BTreeSet::new(),
            name: String::new(),
            position: 0,
            description: Blob::Empty,
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.id == 0
    }

    pub(crate) fn merge(&mut self, state: &ChannelState) {
        if let Some(parent) = state.parent {
            self.parent_id = Some(parent);
        }
        if let Some(name) = &state.name {
            self.name.clone_from(name);
        }
        if !state.links.is_empty() {
            self.link_ids = state.links.iter().copied().collect();
        }
        for id in &state.links_add {
            self.link_ids.insert(*id);
        }
        for id in &state.links_remove {
            self.link_ids.remove(id);
        }
        if let Some(position) = state.position {
            self.position = position;
        }
        self.description.update(
            state.description.as_deref().map(str::as_bytes),
            state.description_hash.as_deref(),
        );
    }
}

/// One connected user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Ephemeral per-connection id; reused only after a disconnect.
    pub session: u32,
    /// Registered account id; absent for guests.
    pub user_id: Option<u32>,
    pub name: String,
    /// The channel the user is currently in.
    pub channel_id: u32,
    pub mute: bool,
    pub deaf: bool,
    pub suppress: bool,
    pub self_mute: bool,
    pub self_deaf: bool,
    pub priority_speaker: bool,
    pub recording: bool,
    /// Client certificate fingerprint.
    pub hash: Option<String>,
    pub comment: Blob,
    pub texture: Blob,
}

impl User {
    pub(crate) fn new(session: u32) -> Self {
        Self {
            session,
            user_id: None,
            name: String::new(),
            // Users spawn in the root channel until the server says otherwise.
            channel_id: 0,
            mute: false,
            deaf: false,
            suppress: false,
            self_mute: false,
            self_deaf: false,
            priority_speaker: false,
            recording: false,
            hash: None,
            comment: Blob::Empty,
            texture: Blob::Empty,
        }
    }

    pub(crate) fn merge(&mut self, state: &UserState) {
        if let Some(user_id) = state.user_id {
            self.user_id = Some(user_id);
        }
        if let Some(name) = &state.name {
            self.name.clone_from(name);
        }
        if let Some(channel_id) = state.channel_id {
            self.channel_id = channel_id;
        }
        if let Some(mute) = state.mute {
            self.mute = mute;
        }
        if let Some(deaf) = state.deaf {
            self.deaf = deaf;
        }
        if let Some(suppress) = state.suppress {
            self.suppress = suppress;
        }
        if let Some(self_mute) = state.self_mute {
            self.self_mute = self_mute;
        }
        if let Some(self_deaf) = state.self_deaf {
            self.self_deaf = self_deaf;
        }
        if let Some(priority_speaker) = state.priority_speaker {
            self.priority_speaker = priority_speaker;
        }
        if let Some(recording) = state.recording {
            self.recording = recording;
        }
        if let Some(hash) = &state.hash {
            self.hash = Some(hash.clone());
        }
        self.comment.update(
            state.comment.as_deref().map(str::as_bytes),
            state.comment_hash.as_deref(),
        );
        self.texture
            .update(state.texture.as_deref(), state.texture_hash.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_absent_channel_fields() {
        let mut channel = Channel::new(3);
        channel.merge(&ChannelState {
            channel_id: Some(3),
            name: Some("Lobby".to_string()),
            position: Some(1),
            ..ChannelState::default()
        });

        channel.merge(&ChannelState {
            channel_id: Some(3),
            position: Some(2),
            ..ChannelState::default()
        });

        assert_eq!(channel.name, "Lobby");
        assert_eq!(channel.position, 2);
    }

    #[test]
    fn merge_patches_links() {
        let mut channel = Channel::new(1);
        channel.merge(&ChannelState {
            channel_id: Some(1),
            links: vec![2, 3],
            ..ChannelState::default()
        });
        assert_eq!(channel.link_ids, BTreeSet::from([2, 3]));

        channel.merge(&ChannelState {
            channel_id: Some(1),
            links_add: vec![4],
            links_remove: vec![2],
            ..ChannelState::default()
        });
        assert_eq!(channel.link_ids, BTreeSet::from([3, 4]));

        // A full links list replaces the set outright.
        channel.merge(&ChannelState {
            channel_id: Some(1),
            links: vec![9],
            ..ChannelState::default()
        });
        assert_eq!(channel.link_ids, BTreeSet::from([9]));
    }

    #[test]
    fn merge_keeps_absent_user_flags() {
        let mut user = User::new(7);
        user.merge(&UserState {
            session: Some(7),
            name: Some("alice".to_string()),
            self_mute: Some(true),
            ..UserState::default()
        });
        user.merge(&UserState {
            session: Some(7),
            deaf: Some(true),
            ..UserState::default()
        });

        assert_eq!(user.name, "alice");
        assert!(user.self_mute);
        assert!(user.deaf);
        assert!(!user.mute);
    }

    #[test]
    fn blob_resolves_empty_without_hash() {
        let blob = Blob::default();
        assert_eq!(blob, Blob::Empty);
        assert!(blob.data().is_none());
    }

    #[test]
    fn blob_hash_change_abandons_outstanding_fetch() {
        let mut blob = Blob::default();
        blob.update(None, Some(b"hash-a"));
        assert_eq!(blob, Blob::Advertised(Bytes::from_static(b"hash-a")));

        assert!(blob.begin_fetch());
        assert!(blob.is_fetching());
        // Same hash again must not disturb the in-flight fetch.
        blob.update(None, Some(b"hash-a"));
        assert!(blob.is_fetching());

        // A new hash abandons the fetch and requires a fresh request.
        blob.update(None, Some(b"hash-b"));
        assert_eq!(blob, Blob::Advertised(Bytes::from_static(b"hash-b")));

        assert!(blob.begin_fetch());
        blob.update(Some(b"content"), Some(b"hash-b"));
        assert_eq!(
            blob.data().map(Bytes::as_ref),
            Some(&b"content"[..])
        );
    }

    #[test]
    fn blob_inline_data_resolves_immediately() {
        let mut blob = Blob::default();
        blob.update(Some(b"short comment"), None);
        assert_eq!(blob.data().map(Bytes::as_ref), Some(&b"short comment"[..]));
        assert!(!blob.begin_fetch());
    }

    #[test]
    fn blob_rehash_invalidates_resolved_content() {
        let mut blob = Blob::default();
        blob.update(Some(b"old"), Some(b"hash-a"));
        blob.update(None, Some(b"hash-b"));
        assert_eq!(blob, Blob::Advertised(Bytes::from_static(b"hash-b")));
    }
}
