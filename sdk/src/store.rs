//! In-memory replica of the server's channel/user state.
//!
//! The server is the sole source of truth: entities are created on the
//! first state message naming an unseen id, merged in place on every
//! later one, and destroyed only by an explicit remove. Besides the id
//! indices the store keeps derived name indices, which must never hold
//! stale bindings.

use std::collections::HashMap;

use tracing::{error, warn};

use mumble_protocol::messages::{ChannelState, UserState};

use crate::entities::{Channel, User};

/// Result of applying a channel state message.
pub(crate) struct AppliedChannelState {
    pub channel: Channel,
    pub added: bool,
}

/// Result of applying a user state message.
pub(crate) struct AppliedUserState {
    pub user: User,
    pub added: bool,
    /// Channel the user occupied before this update, when the update
    /// moved an already-known user.
    pub moved_from: Option<u32>,
}

/// The mirrored server state.
///
/// Mutated only by the control channel's message handlers; everything
/// else reads.
#[derive(Debug, Default)]
pub struct ServerState {
    channels: HashMap<u32, Channel>,
    channels_by_name: HashMap<String, u32>,
    users: HashMap<u32, User>,
    users_by_name: HashMap<String, u32>,
    session: Option<u32>,
    welcome_text: Option<String>,
    max_bandwidth: Option<u32>,
}

impl ServerState {
    pub(crate) fn apply_channel_state(
        &mut self,
        state: &ChannelState,
    ) -> Option<AppliedChannelState> {
        let Some(id) = state.channel_id else {
            warn!("channel state without a channel id; ignored");
            return None;
        };

        if let Some(parent) = state.parent {
            if parent != id && !self.channels.contains_key(&parent) {
                // The server must announce parents before children.
                error!("channel {} references unknown parent {}", id, parent);
                debug_assert!(false, "channel {id} references unknown parent {parent}");
            }
        }

        let added = !self.channels.contains_key(&id);
        let channel = self.channels.entry(id).or_insert_with(|| Channel::new(id));
        let old_name = channel.name.clone();
        channel.merge(state);
        let channel = channel.clone();

        if !added && old_name != channel.name {
            self.channels_by_name.remove(&old_name);
        }
        if !channel.name.is_empty() {
            if let Some(previous) = self.channels_by_name.insert(channel.name.clone(), id) {
                if previous != id {
                    error!("channel name {:?} bound to both {} and {}", channel.name, previous, id);
                    debug_assert!(false, "channel name {:?} bound twice", channel.name);
                }
            }
        }

        Some(AppliedChannelState { channel, added })
    }

    pub(crate) fn remove_channel(&mut self, id: u32) -> Option<Channel> {
        let channel = self.channels.remove(&id)?;
        if self.channels_by_name.get(&channel.name) == Some(&id) {
            self.channels_by_name.remove(&channel.name);
        }
        Some(channel)
    }

    pub(crate) fn apply_user_state(&mut self, state: &UserState) -> Option<AppliedUserState> {
        let Some(session) = state.session else {
            warn!("user state without a session id; ignored");
            return None;
        };

        let added = !self.users.contains_key(&session);
        let user = self.users.entry(session).or_insert_with(|| User::new(session));
        let old_name = user.name.clone();
        let old_channel = user.channel_id;
        user.merge(state);
        let user = user.clone();

        if !added && old_name != user.name {
            self.users_by_name.remove(&old_name);
        }
        if !user.name.is_empty() {
            if let Some(previous) = self.users_by_name.insert(user.name.clone(), session) {
                if previous != session {
                    error!("user name {:?} bound to both {} and {}", user.name, previous, session);
                    debug_assert!(false, "user name {:?} bound twice", user.name);
                }
            }
        }

        if !self.channels.contains_key(&user.channel_id) {
            error!("user {} placed in unknown channel {}", session, user.channel_id);
            debug_assert!(false, "user {session} in unknown channel {}", user.channel_id);
        }

        let moved_from = (!added && old_channel != user.channel_id).then_some(old_channel);
        Some(AppliedUserState {
            user,
            added,
            moved_from,
        })
    }

    pub(crate) fn remove_user(&mut self, session: u32) -> Option<User> {
        let user = self.users.remove(&session)?;
        if self.users_by_name.get(&user.name) == Some(&session) {
            self.users_by_name.remove(&user.name);
        }
        Some(user)
    }

    pub(crate) fn set_sync(
        &mut self,
        session: Option<u32>,
        welcome_text: Option<String>,
        max_bandwidth: Option<u32>,
    ) {
        if session.is_some() {
            self.session = session;
        }
        if welcome_text.is_some() {
            self.welcome_text = welcome_text;
        }
        if max_bandwidth.is_some() {
            self.max_bandwidth = max_bandwidth;
        }
    }

    pub(crate) fn channel_mut(&mut self, id: u32) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    pub(crate) fn user_mut(&mut self, session: u32) -> Option<&mut User> {
        self.users.get_mut(&session)
    }

    /// The root of the channel tree, fixed at id 0.
    #[must_use]
    pub fn root(&self) -> Option<&Channel> {
        self.channels.get(&0)
    }

    #[must_use]
    pub fn channel(&self, id: u32) -> Option<&Channel> {
        self.channels.get(&id)
    }

    #[must_use]
    pub fn channel_by_name(&self, name: &str) -> Option<&Channel> {
        self.channels_by_name
            .get(name)
            .and_then(|id| self.channels.get(id))
    }

    #[must_use]
    pub fn parent_of(&self, channel: &Channel) -> Option<&Channel> {
        channel.parent_id.and_then(|id| self.channels.get(&id))
    }

    /// Direct children, ordered by position, then id for stability.
    #[must_use]
    pub fn children_of(&self, id: u32) -> Vec<&Channel> {
        let mut children: Vec<&Channel> = self
            .channels
            .values()
            .filter(|channel| channel.parent_id == Some(id))
            .collect();
        children.sort_by_key(|channel| (channel.position, channel.id));
        children
    }

    #[must_use]
    pub fn linked_channels(&self, id: u32) -> Vec<&Channel> {
        let Some(channel) = self.channels.get(&id) else {
            return Vec::new();
        };
        channel
            .link_ids
            .iter()
            .filter_map(|link| self.channels.get(link))
            .collect()
    }

    #[must_use]
    pub fn users_in(&self, channel_id: u32) -> Vec<&User> {
        self.users
            .values()
            .filter(|user| user.channel_id == channel_id)
            .collect()
    }

    #[must_use]
    pub fn user(&self, session: u32) -> Option<&User> {
        self.users.get(&session)
    }

    #[must_use]
    pub fn user_by_name(&self, name: &str) -> Option<&User> {
        self.users_by_name
            .get(name)
            .and_then(|session| self.users.get(session))
    }

    /// Own session id, known once the server has synced.
    #[must_use]
    pub fn session(&self) -> Option<u32> {
        self.session
    }

    /// Own user entry, once synced and announced.
    #[must_use]
    pub fn me(&self) -> Option<&User> {
        self.session.and_then(|session| self.users.get(&session))
    }

    #[must_use]
    pub fn welcome_text(&self) -> Option<&str> {
        self.welcome_text.as_deref()
    }

    #[must_use]
    pub fn max_bandwidth(&self) -> Option<u32> {
        self.max_bandwidth
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_state(id: u32, name: &str, parent: Option<u32>) -> ChannelState {
        ChannelState {
            channel_id: Some(id),
            parent,
            name: Some(name.to_string()),
            ..ChannelState::default()
        }
    }

    fn seeded() -> ServerState {
        let mut store = ServerState::default();
        store.apply_channel_state(&channel_state(0, "Root", None));
        store
    }

    #[test]
    fn partial_update_merges_in_place() {
        let mut store = seeded();
        store.apply_channel_state(&channel_state(3, "Lobby", Some(0)));

        let applied = store
            .apply_channel_state(&ChannelState {
                channel_id: Some(3),
                position: Some(2),
                ..ChannelState::default()
            })
            .unwrap();

        assert!(!applied.added);
        let channel = store.channel(3).unwrap();
        assert_eq!(channel.name, "Lobby");
        assert_eq!(channel.position, 2);
        assert_eq!(channel.parent_id, Some(0));
    }

    #[test]
    fn rename_leaves_no_stale_name_binding() {
        let mut store = seeded();
        store.apply_channel_state(&channel_state(3, "Lobby", Some(0)));

        store.apply_channel_state(&ChannelState {
            channel_id: Some(3),
            name: Some("Foyer".to_string()),
            ..ChannelState::default()
        });

        assert!(store.channel_by_name("Lobby").is_none());
        assert_eq!(store.channel_by_name("Foyer").unwrap().id, 3);
    }

    #[test]
    fn remove_deletes_both_index_entries() {
        let mut store = seeded();
        store.apply_channel_state(&channel_state(3, "Lobby", Some(0)));

        let removed = store.remove_channel(3).unwrap();
        assert_eq!(removed.name, "Lobby");
        assert!(store.channel(3).is_none());
        assert!(store.channel_by_name("Lobby").is_none());
    }

    #[test]
    fn tree_stays_rooted_through_updates() {
        let mut store = seeded();
        store.apply_channel_state(&channel_state(1, "A", Some(0)));
        store.apply_channel_state(&channel_state(2, "B", Some(0)));
        store.apply_channel_state(&channel_state(3, "C", Some(1)));
        store.remove_channel(3);
        store.apply_channel_state(&ChannelState {
            channel_id: Some(2),
            parent: Some(1),
            ..ChannelState::default()
        });

        assert_eq!(store.root().unwrap().id, 0);
        for channel in store.channels() {
            if !channel.is_root() {
                let parent = channel.parent_id.expect("non-root without parent");
                assert!(store.channel(parent).is_some());
            }
        }
    }

    #[test]
    fn children_sort_by_position_then_id() {
        let mut store = seeded();
        for (id, position) in [(1, 5), (2, 1), (3, 1)] {
            store.apply_channel_state(&ChannelState {
                channel_id: Some(id),
                parent: Some(0),
                name: Some(format!("ch{id}")),
                position: Some(position),
                ..ChannelState::default()
            });
        }

        let order: Vec<u32> = store.children_of(0).iter().map(|c| c.id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn user_lifecycle_and_indices() {
        let mut store = seeded();
        let applied = store
            .apply_user_state(&UserState {
                session: Some(7),
                name: Some("alice".to_string()),
                ..UserState::default()
            })
            .unwrap();
        assert!(applied.added);
        assert_eq!(store.user_by_name("alice").unwrap().session, 7);

        let removed = store.remove_user(7).unwrap();
        assert_eq!(removed.name, "alice");
        assert!(store.user(7).is_none());
        assert!(store.user_by_name("alice").is_none());
    }

    #[test]
    fn user_move_is_reported_with_prior_channel() {
        let mut store = seeded();
        store.apply_channel_state(&channel_state(1, "A", Some(0)));
        store.apply_user_state(&UserState {
            session: Some(7),
            name: Some("alice".to_string()),
            ..UserState::default()
        });

        let applied = store
            .apply_user_state(&UserState {
                session: Some(7),
                channel_id: Some(1),
                ..UserState::default()
            })
            .unwrap();

        assert!(!applied.added);
        assert_eq!(applied.moved_from, Some(0));
        assert_eq!(store.user(7).unwrap().channel_id, 1);
        assert_eq!(store.users_in(1).len(), 1);
    }

    #[test]
    fn me_resolves_through_session() {
        let mut store = seeded();
        store.apply_user_state(&UserState {
            session: Some(42),
            name: Some("self".to_string()),
            ..UserState::default()
        });
        store.set_sync(Some(42), Some("welcome".to_string()), Some(72_000));

        assert_eq!(store.me().unwrap().name, "self");
        assert_eq!(store.welcome_text(), Some("welcome"));
        assert_eq!(store.max_bandwidth(), Some(72_000));
    }
}
