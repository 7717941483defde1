//! Online-user and group registry
//!
//! The single serialization point for all shared relay state. One mutex
//! guards both maps together: login, logout, and the list broadcasts all
//! touch invariants spanning users and groups, so the lock is joint
//! rather than per-map. Nothing blocks under the lock — outbound frames
//! are enqueued onto per-session channels and the socket writes happen on
//! the connections' writer tasks.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tracing::{debug, info};

use parley_protocol::ServerFrame;

use crate::fanout;
use crate::session::{SessionHandle, SessionId};

/// Outcome of a private-message delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    RecipientOffline,
}

/// Outcome of a group-message delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupDelivery {
    Delivered,
    NotAMember,
    NoSuchGroup,
}

#[derive(Default)]
struct RegistryInner {
    /// name -> live session; keys unique, one name per session
    online: HashMap<String, SessionHandle>,
    /// group name -> member names, insertion order, creator first
    groups: HashMap<String, Vec<String>>,
}

impl RegistryInner {
    fn user_snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self.online.keys().cloned().collect();
        users.sort();
        users
    }

    fn group_snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.groups
            .iter()
            .map(|(name, members)| (name.clone(), members.clone()))
            .collect()
    }

    fn broadcast_user_list(&self) {
        let frame = ServerFrame::UserList(self.user_snapshot());
        fanout::multicast(self.online.values(), &frame);
    }

    fn broadcast_group_list(&self) {
        let frame = ServerFrame::GroupList(self.group_snapshot());
        fanout::multicast(self.online.values(), &frame);
    }
}

/// Shared registry of online users and group memberships
///
/// Constructed once at server start and handed to every connection task.
/// Every public operation is one critical section: the snapshot backing a
/// broadcast is taken under the same lock as the mutation that triggered
/// it, so each broadcast reflects exactly the state it announces.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Atomically claim `name` for `session`
    ///
    /// Fails on an empty or already-claimed name; the caller rejects the
    /// login and closes the connection. On success the updated user and
    /// group lists go out to everyone, the new session included.
    pub fn try_login(&self, name: &str, session: SessionHandle) -> bool {
        let mut inner = self.inner.lock();
        if name.is_empty() || inner.online.contains_key(name) {
            debug!("{}: login as {:?} rejected", session.id(), name);
            return false;
        }
        let id = session.id();
        inner.online.insert(name.to_string(), session);
        info!("{} logged in as {}", id, name);
        inner.broadcast_user_list();
        inner.broadcast_group_list();
        true
    }

    /// Remove a session's name from the online map and from every group
    ///
    /// Idempotent, and keyed by session id: a stale teardown cannot evict
    /// a newer connection that reclaimed the name. Broadcasts one list
    /// round only when state actually changed.
    pub fn logout(&self, id: SessionId, name: &str) {
        let mut inner = self.inner.lock();
        let owns_name = inner.online.get(name).map(|s| s.id() == id).unwrap_or(false);
        if !owns_name {
            debug!("{}: logout of {} was a no-op", id, name);
            return;
        }
        inner.online.remove(name);
        for members in inner.groups.values_mut() {
            members.retain(|member| member != name);
        }
        info!("{} ({}) logged out", id, name);
        inner.broadcast_user_list();
        inner.broadcast_group_list();
    }

    /// Create `group` with `creator` as its first member
    ///
    /// A repeated create is silently ignored.
    pub fn create_group(&self, group: &str, creator: &str) {
        let mut inner = self.inner.lock();
        if inner.groups.contains_key(group) {
            debug!("group {:?} already exists", group);
            return;
        }
        inner
            .groups
            .insert(group.to_string(), vec![creator.to_string()]);
        info!("{} created group {:?}", creator, group);
        inner.broadcast_group_list();
    }

    /// Append `member` to an existing group
    ///
    /// No-op when the group is unknown or the member already joined.
    pub fn join_group(&self, group: &str, member: &str) {
        let mut inner = self.inner.lock();
        let Some(members) = inner.groups.get_mut(group) else {
            debug!("{} tried to join unknown group {:?}", member, group);
            return;
        };
        if members.iter().any(|m| m == member) {
            return;
        }
        members.push(member.to_string());
        info!("{} joined group {:?}", member, group);
        inner.broadcast_group_list();
    }

    /// Route one private message to its recipient's session
    pub fn send_private(&self, sender: &str, recipient: &str, message: &str) -> Delivery {
        let inner = self.inner.lock();
        match inner.online.get(recipient) {
            Some(session) => {
                fanout::unicast(
                    session,
                    ServerFrame::RecvPrivate {
                        sender: sender.to_string(),
                        message: message.to_string(),
                    },
                );
                Delivery::Delivered
            }
            None => Delivery::RecipientOffline,
        }
    }

    /// Fan a group message out to every online member except the sender
    ///
    /// The sender renders its own message locally; the server never
    /// echoes. Offline members are skipped, not an error.
    pub fn send_group(&self, sender: &str, group: &str, message: &str) -> GroupDelivery {
        let inner = self.inner.lock();
        let Some(members) = inner.groups.get(group) else {
            return GroupDelivery::NoSuchGroup;
        };
        if !members.iter().any(|m| m == sender) {
            return GroupDelivery::NotAMember;
        }
        let frame = ServerFrame::RecvGroup {
            sender: sender.to_string(),
            group: group.to_string(),
            message: message.to_string(),
        };
        let recipients = members
            .iter()
            .filter(|member| member.as_str() != sender)
            .filter_map(|member| inner.online.get(member));
        fanout::multicast(recipients, &frame);
        GroupDelivery::Delivered
    }

    /// Atomic copy of the online names, sorted
    #[allow(dead_code)]
    pub fn snapshot_users(&self) -> Vec<String> {
        self.inner.lock().user_snapshot()
    }

    /// Atomic copy of the groups and their member lists
    #[allow(dead_code)]
    pub fn snapshot_groups(&self) -> BTreeMap<String, Vec<String>> {
        self.inner.lock().group_snapshot()
    }

    /// Enqueue one frame to every online session
    #[allow(dead_code)]
    pub fn broadcast_all(&self, frame: &ServerFrame) -> usize {
        let inner = self.inner.lock();
        fanout::multicast(inner.online.values(), frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Build a session handle with its receiving end
    fn session() -> (SessionHandle, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(32);
        (SessionHandle::new(tx), rx)
    }

    /// Pull everything currently queued for a session
    fn drain(rx: &mut mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Log a session in and discard the resulting list broadcasts
    fn login(registry: &Registry, name: &str) -> (SessionHandle, mpsc::Receiver<ServerFrame>) {
        let (handle, mut rx) = session();
        assert!(registry.try_login(name, handle.clone()));
        drain(&mut rx);
        (handle, rx)
    }

    // ==================== Login Tests ====================

    #[test]
    fn test_try_login_success() {
        let registry = Registry::new();
        let (handle, _rx) = session();

        assert!(registry.try_login("alice", handle));
        assert_eq!(registry.snapshot_users(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_try_login_duplicate_name() {
        let registry = Registry::new();
        let (first, _rx1) = session();
        let (second, _rx2) = session();

        assert!(registry.try_login("alice", first));
        assert!(!registry.try_login("alice", second));
        assert_eq!(registry.snapshot_users().len(), 1);
    }

    #[test]
    fn test_try_login_empty_name() {
        let registry = Registry::new();
        let (handle, _rx) = session();

        assert!(!registry.try_login("", handle));
        assert!(registry.snapshot_users().is_empty());
    }

    #[test]
    fn test_login_broadcasts_both_lists_to_everyone() {
        let registry = Registry::new();
        let (_alice, mut alice_rx) = login(&registry, "alice");

        let (bob, mut bob_rx) = session();
        assert!(registry.try_login("bob", bob));

        let expected = vec![
            ServerFrame::UserList(vec!["alice".into(), "bob".into()]),
            ServerFrame::GroupList(BTreeMap::new()),
        ];
        assert_eq!(drain(&mut alice_rx), expected);
        // The new session receives the same snapshots
        assert_eq!(drain(&mut bob_rx), expected);
    }

    #[tokio::test]
    async fn test_concurrent_login_single_winner() {
        let registry = Arc::new(Registry::new());
        let mut tasks = Vec::new();

        for _ in 0..50 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (handle, rx) = {
                    let (tx, rx) = mpsc::channel(8);
                    (SessionHandle::new(tx), rx)
                };
                (registry.try_login("alice", handle), rx)
            }));
        }

        let mut winners = 0;
        for task in tasks {
            let (won, _rx) = task.await.unwrap();
            if won {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(registry.snapshot_users(), vec!["alice".to_string()]);
    }

    // ==================== Logout Tests ====================

    #[test]
    fn test_logout_removes_from_online_and_groups() {
        let registry = Registry::new();
        let (alice, _alice_rx) = login(&registry, "alice");
        let (_bob, _bob_rx) = login(&registry, "bob");

        registry.create_group("Tech", "alice");
        registry.join_group("Tech", "bob");

        registry.logout(alice.id(), "alice");

        assert_eq!(registry.snapshot_users(), vec!["bob".to_string()]);
        assert_eq!(
            registry.snapshot_groups().get("Tech"),
            Some(&vec!["bob".to_string()])
        );
    }

    #[test]
    fn test_logout_is_idempotent() {
        let registry = Registry::new();
        let (alice, _rx) = login(&registry, "alice");

        registry.logout(alice.id(), "alice");
        registry.logout(alice.id(), "alice");

        assert!(registry.snapshot_users().is_empty());
    }

    #[test]
    fn test_logout_unknown_name_is_noop() {
        let registry = Registry::new();
        let (alice, _rx) = login(&registry, "alice");

        registry.logout(alice.id(), "nobody");
        assert_eq!(registry.snapshot_users(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_stale_logout_cannot_evict_new_claimant() {
        let registry = Registry::new();
        let (old, _old_rx) = login(&registry, "alice");
        registry.logout(old.id(), "alice");

        // A new connection reclaims the name and joins a group
        let (_new, _new_rx) = login(&registry, "alice");
        registry.create_group("Tech", "alice");

        // The old session's id no longer owns the name
        registry.logout(old.id(), "alice");

        assert_eq!(registry.snapshot_users(), vec!["alice".to_string()]);
        assert_eq!(
            registry.snapshot_groups().get("Tech"),
            Some(&vec!["alice".to_string()])
        );
    }

    #[test]
    fn test_logout_broadcasts_to_remaining_sessions() {
        let registry = Registry::new();
        let (alice, _alice_rx) = login(&registry, "alice");
        let (_bob, mut bob_rx) = login(&registry, "bob");

        registry.logout(alice.id(), "alice");

        assert_eq!(
            drain(&mut bob_rx),
            vec![
                ServerFrame::UserList(vec!["bob".into()]),
                ServerFrame::GroupList(BTreeMap::new()),
            ]
        );
    }

    // ==================== Group Tests ====================

    #[test]
    fn test_create_group_creator_first() {
        let registry = Registry::new();
        let (_alice, _rx) = login(&registry, "alice");

        registry.create_group("Tech", "alice");

        assert_eq!(
            registry.snapshot_groups().get("Tech"),
            Some(&vec!["alice".to_string()])
        );
    }

    #[test]
    fn test_create_group_is_idempotent() {
        let registry = Registry::new();
        let (_alice, _alice_rx) = login(&registry, "alice");
        let (_bob, _bob_rx) = login(&registry, "bob");

        registry.create_group("Tech", "alice");
        registry.create_group("Tech", "bob");

        // One group, original creator kept
        let groups = registry.snapshot_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.get("Tech"), Some(&vec!["alice".to_string()]));
    }

    #[test]
    fn test_join_group_preserves_order() {
        let registry = Registry::new();
        for name in ["alice", "bob", "carol"] {
            let (handle, _rx) = session();
            assert!(registry.try_login(name, handle));
        }

        registry.create_group("Tech", "carol");
        registry.join_group("Tech", "alice");
        registry.join_group("Tech", "bob");

        assert_eq!(
            registry.snapshot_groups().get("Tech"),
            Some(&vec![
                "carol".to_string(),
                "alice".to_string(),
                "bob".to_string()
            ])
        );
    }

    #[test]
    fn test_join_group_twice_single_membership() {
        let registry = Registry::new();
        let (_alice, _alice_rx) = login(&registry, "alice");
        let (_bob, _bob_rx) = login(&registry, "bob");

        registry.create_group("Tech", "alice");
        registry.join_group("Tech", "bob");
        registry.join_group("Tech", "bob");

        assert_eq!(
            registry.snapshot_groups().get("Tech"),
            Some(&vec!["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn test_join_unknown_group_is_noop() {
        let registry = Registry::new();
        let (_alice, _rx) = login(&registry, "alice");

        registry.join_group("Tech", "alice");
        assert!(registry.snapshot_groups().is_empty());
    }

    #[test]
    fn test_noop_join_does_not_rebroadcast() {
        let registry = Registry::new();
        let (_alice, mut alice_rx) = login(&registry, "alice");

        registry.create_group("Tech", "alice");
        drain(&mut alice_rx);

        registry.join_group("Tech", "alice");
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn test_group_mutations_broadcast_group_list() {
        let registry = Registry::new();
        let (_alice, mut alice_rx) = login(&registry, "alice");
        let (_bob, mut bob_rx) = login(&registry, "bob");
        drain(&mut alice_rx);

        registry.create_group("Tech", "alice");

        let mut expected = BTreeMap::new();
        expected.insert("Tech".to_string(), vec!["alice".to_string()]);
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerFrame::GroupList(expected.clone())]
        );
        assert_eq!(drain(&mut bob_rx), vec![ServerFrame::GroupList(expected)]);
    }

    // ==================== Private Message Tests ====================

    #[test]
    fn test_send_private_delivered_only_to_recipient() {
        let registry = Registry::new();
        let (_alice, mut alice_rx) = login(&registry, "alice");
        let (_bob, mut bob_rx) = login(&registry, "bob");
        let (_eve, mut eve_rx) = login(&registry, "eve");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let outcome = registry.send_private("alice", "bob", "hi bob");

        assert_eq!(outcome, Delivery::Delivered);
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerFrame::RecvPrivate {
                sender: "alice".into(),
                message: "hi bob".into()
            }]
        );
        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut eve_rx).is_empty());
    }

    #[test]
    fn test_send_private_offline_recipient() {
        let registry = Registry::new();
        let (_alice, _rx) = login(&registry, "alice");

        let outcome = registry.send_private("alice", "carol", "anyone there?");
        assert_eq!(outcome, Delivery::RecipientOffline);
    }

    // ==================== Group Message Tests ====================

    #[test]
    fn test_send_group_reaches_online_members_once() {
        let registry = Registry::new();
        let (_alice, mut alice_rx) = login(&registry, "alice");
        let (_bob, mut bob_rx) = login(&registry, "bob");
        let (dave, _dave_rx) = login(&registry, "dave");
        let (_eve, mut eve_rx) = login(&registry, "eve");

        registry.create_group("Tech", "alice");
        registry.join_group("Tech", "bob");
        registry.join_group("Tech", "dave");
        // dave is a member but goes offline
        registry.logout(dave.id(), "dave");

        drain(&mut alice_rx);
        drain(&mut bob_rx);
        drain(&mut eve_rx);

        let outcome = registry.send_group("alice", "Tech", "hi");

        assert_eq!(outcome, GroupDelivery::Delivered);
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerFrame::RecvGroup {
                sender: "alice".into(),
                group: "Tech".into(),
                message: "hi".into()
            }]
        );
        // No echo to the sender, nothing to non-members
        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut eve_rx).is_empty());
    }

    #[test]
    fn test_send_group_requires_membership() {
        let registry = Registry::new();
        let (_alice, _alice_rx) = login(&registry, "alice");
        let (_eve, _eve_rx) = login(&registry, "eve");

        registry.create_group("Tech", "alice");

        assert_eq!(
            registry.send_group("eve", "Tech", "let me in"),
            GroupDelivery::NotAMember
        );
    }

    #[test]
    fn test_send_group_unknown_group() {
        let registry = Registry::new();
        let (_alice, _rx) = login(&registry, "alice");

        assert_eq!(
            registry.send_group("alice", "Ghost", "hello?"),
            GroupDelivery::NoSuchGroup
        );
    }

    // ==================== Snapshot and Broadcast Tests ====================

    #[test]
    fn test_snapshot_users_sorted() {
        let registry = Registry::new();
        for name in ["carol", "alice", "bob"] {
            let (handle, _rx) = session();
            assert!(registry.try_login(name, handle));
        }

        assert_eq!(
            registry.snapshot_users(),
            vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
        );
    }

    #[test]
    fn test_broadcast_all_counts_live_sessions() {
        let registry = Registry::new();
        let (_alice, mut alice_rx) = login(&registry, "alice");
        let (_bob, bob_rx) = login(&registry, "bob");
        drain(&mut alice_rx);
        // bob's connection is gone but logout has not run yet
        drop(bob_rx);

        let frame = ServerFrame::error("going down");
        assert_eq!(registry.broadcast_all(&frame), 1);
        assert_eq!(drain(&mut alice_rx), vec![frame]);
    }
}
