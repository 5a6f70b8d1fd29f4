//! The lock manager: an in-memory registry of active locks.
//!
//! Locks are keyed both by token and by lock root path. The path index is
//! an ordered map, which makes ancestor lookups a walk over the O(depth)
//! prefix chain and descendant lookups a range scan - the flattened form
//! of a path trie. Coverage is never materialized; it is derived from
//! `(lock_path, depth)` on every query.
//!
//! Expired locks are reaped lazily at the start of every operation. A
//! background reaper can be started on top of that with
//! [`LockManager::start_reaper`].

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dyn_clone::DynClone;
use parking_lot::Mutex;
use uuid::Uuid;
use xmltree::Element;

use crate::davpath::DavPath;

/// Qualified name of a lock type. Only `DAV:write` is standard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTypeName {
    pub namespace: String,
    pub name: String,
}

impl LockTypeName {
    pub fn write() -> LockTypeName {
        LockTypeName {
            namespace: "DAV:".to_string(),
            name: "write".to_string(),
        }
    }
}

/// How far down a lock reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDepth {
    /// The lock root only.
    Zero,
    /// The lock root and every descendant.
    Infinity,
}

/// One active lock record.
#[derive(Debug, Clone)]
pub struct ActiveLock {
    /// Globally unique `urn:uuid:` token.
    pub token: String,
    /// The path the lock was created on (the lock root).
    pub lock_path: DavPath,
    pub lock_type: LockTypeName,
    pub exclusive: bool,
    pub depth: LockDepth,
    /// Client-supplied owner element, preserved verbatim.
    pub owner: Option<Element>,
    /// Principal that created the lock, when known.
    pub principal: Option<String>,
    pub created_at: DateTime<Utc>,
    /// 0 means "no expiration".
    pub timeout_seconds: u64,
    /// Derived; absent when `timeout_seconds` is 0.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ActiveLock {
    fn covers_key(&self, key: &[u8]) -> bool {
        let root = self.lock_path.key_bytes();
        if key == root {
            return true;
        }
        match self.depth {
            LockDepth::Zero => false,
            LockDepth::Infinity => key.starts_with(root) && key.get(root.len()) == Some(&b'/'),
        }
    }

    /// Whether this lock applies to `path`.
    pub fn covers(&self, path: &DavPath) -> bool {
        self.covers_key(path.key_bytes())
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => self.timeout_seconds != 0 && now >= at,
            None => false,
        }
    }
}

/// Why a lock could not be created.
#[derive(Debug, Clone)]
pub enum LockError {
    /// An incompatible lock already covers part of the requested range.
    Conflict(ActiveLock),
    /// The configured lock limit was hit.
    LimitReached,
}

/// Persistence hook for the lock manager. Called synchronously inside the
/// manager's critical section, so persisted state cannot drift from
/// memory. Implementations must not call back into the manager.
pub trait LockStore: Debug + Send + Sync + DynClone {
    /// All locks that survived a restart; called once at startup.
    fn load_all(&self) -> Vec<ActiveLock>;
    fn on_added(&self, lock: &ActiveLock);
    fn on_refreshed(&self, lock: &ActiveLock);
    fn on_removed(&self, lock: &ActiveLock);
}

dyn_clone::clone_trait_object!(LockStore);

/// Trivial `LockStore` keeping records in memory; mainly for tests and as
/// a template for durable implementations.
#[derive(Debug, Clone)]
pub struct MemLockStore(Arc<Mutex<Vec<ActiveLock>>>);

impl MemLockStore {
    pub fn new() -> Box<MemLockStore> {
        Box::new(MemLockStore(Arc::new(Mutex::new(Vec::new()))))
    }
}

impl LockStore for MemLockStore {
    fn load_all(&self) -> Vec<ActiveLock> {
        self.0.lock().clone()
    }
    fn on_added(&self, lock: &ActiveLock) {
        self.0.lock().push(lock.clone());
    }
    fn on_refreshed(&self, lock: &ActiveLock) {
        let mut v = self.0.lock();
        if let Some(slot) = v.iter_mut().find(|l| l.token == lock.token) {
            *slot = lock.clone();
        }
    }
    fn on_removed(&self, lock: &ActiveLock) {
        self.0.lock().retain(|l| l.token != lock.token);
    }
}

#[derive(Debug, Default)]
struct State {
    by_token: HashMap<String, ActiveLock>,
    // lock root key -> tokens rooted there
    by_path: BTreeMap<Vec<u8>, Vec<String>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    store: Option<Box<dyn LockStore>>,
    max_locks: Option<usize>,
    max_timeout_seconds: Option<u64>,
}

/// The process-wide lock registry. Cheap to clone; all clones share state.
#[derive(Debug, Clone)]
pub struct LockManager(Arc<Shared>);

impl LockManager {
    pub fn new() -> LockManager {
        LockManager(Arc::new(Shared {
            state: Mutex::new(State::default()),
            store: None,
            max_locks: None,
            max_timeout_seconds: None,
        }))
    }

    /// Attach a persistence hook and load surviving locks from it.
    pub fn with_store(store: Box<dyn LockStore>) -> LockManager {
        let mut state = State::default();
        for lock in store.load_all() {
            insert(&mut state, lock);
        }
        LockManager(Arc::new(Shared {
            state: Mutex::new(state),
            store: Some(store),
            max_locks: None,
            max_timeout_seconds: None,
        }))
    }

    /// Cap the number of simultaneously active locks. Only effective
    /// before the manager is cloned or shared.
    pub fn max_locks(mut self, n: usize) -> LockManager {
        if let Some(shared) = Arc::get_mut(&mut self.0) {
            shared.max_locks = Some(n);
        }
        self
    }

    /// Clamp client-requested timeouts (and "Infinite") to a maximum.
    /// Only effective before the manager is cloned or shared.
    pub fn max_timeout(mut self, seconds: u64) -> LockManager {
        if let Some(shared) = Arc::get_mut(&mut self.0) {
            shared.max_timeout_seconds = Some(seconds);
        }
        self
    }

    /// Spawn a background task that reaps expired locks every `period`.
    /// Must be called from within a tokio runtime. Reaping also happens
    /// lazily on every access, so the reaper is optional.
    pub fn start_reaper(&self, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let mut state = this.0.state.lock();
                reap(&mut state, this.0.store.as_deref(), Utc::now());
            }
        })
    }

    /// Register a new lock. Fails when an incompatible lock already
    /// covers any path in the requested range, or the lock limit is hit.
    ///
    /// The target resource does not have to exist; LOCK on an unmapped
    /// URL registers the lock and the resource stays unmapped until a
    /// later write creates it.
    pub fn add_lock(
        &self,
        path: &DavPath,
        lock_type: LockTypeName,
        exclusive: bool,
        depth: LockDepth,
        timeout_seconds: u64,
        owner: Option<&Element>,
        principal: Option<&str>,
    ) -> Result<ActiveLock, LockError> {
        let now = Utc::now();
        let mut state = self.0.state.lock();
        reap(&mut state, self.0.store.as_deref(), now);

        if let Some(max) = self.0.max_locks {
            if state.by_token.len() >= max {
                return Err(LockError::LimitReached);
            }
        }

        let key = path.key_bytes().to_vec();
        for other in candidate_locks(&state, &key, depth == LockDepth::Infinity) {
            if other.lock_type == lock_type && (other.exclusive || exclusive) {
                trace!("add_lock: conflict with {} at {}", other.token, other.lock_path);
                return Err(LockError::Conflict(other.clone()));
            }
        }

        let timeout_seconds = self.clamp_timeout(timeout_seconds);
        let lock = ActiveLock {
            token: Uuid::new_v4().urn().to_string(),
            lock_path: path.clone(),
            lock_type,
            exclusive,
            depth,
            owner: owner.cloned(),
            principal: principal.map(|s| s.to_string()),
            created_at: now,
            timeout_seconds,
            expires_at: expiry(now, timeout_seconds),
        };
        trace!("add_lock: {} created at {}", lock.token, lock.lock_path);
        if let Some(store) = self.0.store.as_deref() {
            store.on_added(&lock);
        }
        insert(&mut state, lock.clone());
        Ok(lock)
    }

    /// Refresh a lock: reset the expiry base to now with a new timeout.
    /// Only the owning principal may refresh.
    pub fn refresh_lock(
        &self,
        token: &str,
        path: &DavPath,
        principal: Option<&str>,
        timeout_seconds: u64,
    ) -> Result<ActiveLock, ()> {
        let now = Utc::now();
        let mut state = self.0.state.lock();
        reap(&mut state, self.0.store.as_deref(), now);

        let key = path.key_bytes().to_vec();
        let timeout_seconds = self.clamp_timeout(timeout_seconds);
        let lock = state.by_token.get_mut(token).ok_or(())?;
        if !lock.covers_key(&key) || !principal_matches(lock, principal) {
            return Err(());
        }
        lock.timeout_seconds = timeout_seconds;
        lock.expires_at = expiry(now, timeout_seconds);
        let lock = lock.clone();
        if let Some(store) = self.0.store.as_deref() {
            store.on_refreshed(&lock);
        }
        Ok(lock)
    }

    /// Remove a lock by its exact token. Only the owning principal may
    /// remove; the token must name a lock covering `path`.
    pub fn remove_lock(&self, token: &str, path: &DavPath, principal: Option<&str>) -> Result<(), ()> {
        let now = Utc::now();
        let mut state = self.0.state.lock();
        reap(&mut state, self.0.store.as_deref(), now);

        let key = path.key_bytes().to_vec();
        match state.by_token.get(token) {
            Some(lock) if lock.covers_key(&key) && principal_matches(lock, principal) => {}
            _ => return Err(()),
        }
        let lock = remove(&mut state, token).unwrap();
        if let Some(store) = self.0.store.as_deref() {
            store.on_removed(&lock);
        }
        Ok(())
    }

    /// Look a lock up by token; with `path`, only if its coverage
    /// includes that path.
    pub fn get_lock(&self, token: &str, path: Option<&DavPath>) -> Option<ActiveLock> {
        let now = Utc::now();
        let mut state = self.0.state.lock();
        reap(&mut state, self.0.store.as_deref(), now);

        let lock = state.by_token.get(token)?;
        match path {
            Some(p) if !lock.covers_key(p.key_bytes()) => None,
            _ => Some(lock.clone()),
        }
    }

    /// The active locks that apply to `path`. Ordering is unspecified.
    pub fn get_locks(
        &self,
        path: &DavPath,
        include_ancestors: bool,
        include_descendants: bool,
        type_filter: Option<&LockTypeName>,
    ) -> Vec<ActiveLock> {
        let now = Utc::now();
        let mut state = self.0.state.lock();
        reap(&mut state, self.0.store.as_deref(), now);

        let key = path.key_bytes().to_vec();
        let mut out: Vec<ActiveLock> = Vec::new();
        for tok in tokens_at(&state, &key) {
            out.push(state.by_token[&tok].clone());
        }
        if include_ancestors {
            for tok in tokens_at_ancestors(&state, &key) {
                let lock = &state.by_token[&tok];
                if lock.covers_key(&key) {
                    out.push(lock.clone());
                }
            }
        }
        if include_descendants {
            for tok in tokens_below(&state, &key) {
                out.push(state.by_token[&tok].clone());
            }
        }
        match type_filter {
            Some(t) => out.into_iter().filter(|l| &l.lock_type == t).collect(),
            None => out,
        }
    }

    /// Check a write against the registry: every lock covering `path`
    /// (and, when `deep`, every lock rooted below it) must either have
    /// its token submitted or be a shared lock alongside one that was.
    /// Returns the first offending lock.
    pub fn check_submitted(
        &self,
        path: &DavPath,
        deep: bool,
        submitted: &[String],
        principal: Option<&str>,
    ) -> Result<(), ActiveLock> {
        let now = Utc::now();
        let mut state = self.0.state.lock();
        reap(&mut state, self.0.store.as_deref(), now);

        let key = path.key_bytes().to_vec();
        let mut holds_lock = false;
        let mut first_seen: Option<ActiveLock> = None;
        for lock in candidate_locks(&state, &key, deep) {
            let is_submitted = submitted.iter().any(|t| t == &lock.token)
                && principal_matches(lock, principal);
            if is_submitted {
                holds_lock = true;
            } else if lock.exclusive {
                return Err(lock.clone());
            } else {
                first_seen.get_or_insert_with(|| lock.clone());
            }
        }
        if !holds_lock {
            if let Some(lock) = first_seen {
                return Err(lock);
            }
        }
        Ok(())
    }

    /// Remove every lock rooted at or below `path` (after DELETE, MOVE,
    /// or an overwriting COPY).
    pub fn remove_below(&self, path: &DavPath) {
        let now = Utc::now();
        let mut state = self.0.state.lock();
        reap(&mut state, self.0.store.as_deref(), now);

        let key = path.key_bytes().to_vec();
        let mut tokens = tokens_at(&state, &key);
        tokens.extend(tokens_below(&state, &key));
        for tok in tokens {
            if let Some(lock) = remove(&mut state, &tok) {
                if let Some(store) = self.0.store.as_deref() {
                    store.on_removed(&lock);
                }
            }
        }
    }

    fn clamp_timeout(&self, requested: u64) -> u64 {
        match self.0.max_timeout_seconds {
            Some(max) if requested == 0 || requested > max => max,
            _ => requested,
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        LockManager::new()
    }
}

fn expiry(now: DateTime<Utc>, timeout_seconds: u64) -> Option<DateTime<Utc>> {
    if timeout_seconds == 0 {
        None
    } else {
        Some(now + Duration::seconds(timeout_seconds as i64))
    }
}

fn principal_matches(lock: &ActiveLock, principal: Option<&str>) -> bool {
    match (lock.principal.as_deref(), principal) {
        (Some(a), Some(b)) => a == b,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

fn insert(state: &mut State, lock: ActiveLock) {
    let key = lock.lock_path.key_bytes().to_vec();
    state
        .by_path
        .entry(key)
        .or_default()
        .push(lock.token.clone());
    state.by_token.insert(lock.token.clone(), lock);
}

fn remove(state: &mut State, token: &str) -> Option<ActiveLock> {
    let lock = state.by_token.remove(token)?;
    let key = lock.lock_path.key_bytes().to_vec();
    if let Some(tokens) = state.by_path.get_mut(&key) {
        tokens.retain(|t| t != token);
        if tokens.is_empty() {
            state.by_path.remove(&key);
        }
    }
    Some(lock)
}

fn reap(state: &mut State, store: Option<&dyn LockStore>, now: DateTime<Utc>) {
    let expired: Vec<String> = state
        .by_token
        .values()
        .filter(|l| l.expired(now))
        .map(|l| l.token.clone())
        .collect();
    for tok in expired {
        if let Some(lock) = remove(state, &tok) {
            trace!("reap: lock {} expired", lock.token);
            if let Some(store) = store {
                store.on_removed(&lock);
            }
        }
    }
}

// tokens of locks rooted exactly at `key`.
fn tokens_at(state: &State, key: &[u8]) -> Vec<String> {
    state.by_path.get(key).cloned().unwrap_or_default()
}

// tokens of locks rooted at any strict ancestor of `key`.
fn tokens_at_ancestors(state: &State, key: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    for anc in ancestor_keys(key) {
        if let Some(tokens) = state.by_path.get(anc) {
            out.extend(tokens.iter().cloned());
        }
    }
    out
}

// tokens of locks rooted strictly below `key` (range scan).
fn tokens_below(state: &State, key: &[u8]) -> Vec<String> {
    let mut lower = key.to_vec();
    lower.push(b'/');
    let mut upper = key.to_vec();
    upper.push(b'/' + 1);
    state
        .by_path
        .range(lower..upper)
        .flat_map(|(_, tokens)| tokens.iter().cloned())
        .collect()
}

// strict ancestors of a path key: "" for "/a", "" and "/a" for "/a/b", ...
fn ancestor_keys(key: &[u8]) -> Vec<&[u8]> {
    let mut out: Vec<&[u8]> = vec![b""];
    for (i, &c) in key.iter().enumerate() {
        if c == b'/' && i > 0 {
            out.push(&key[..i]);
        }
    }
    out.retain(|a| a.len() < key.len());
    out
}

// all locks whose coverage includes `key`, plus - when `deep` - all locks
// rooted below it.
fn candidate_locks<'a>(state: &'a State, key: &[u8], deep: bool) -> Vec<&'a ActiveLock> {
    let mut out: Vec<&ActiveLock> = Vec::new();
    for tok in tokens_at(state, key) {
        out.push(&state.by_token[&tok]);
    }
    for tok in tokens_at_ancestors(state, key) {
        let lock = &state.by_token[&tok];
        if lock.covers_key(key) {
            out.push(lock);
        }
    }
    if deep {
        for tok in tokens_below(state, key) {
            out.push(&state.by_token[&tok]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> DavPath {
        DavPath::new(s).unwrap()
    }

    fn add(
        mgr: &LockManager,
        p: &str,
        exclusive: bool,
        depth: LockDepth,
    ) -> Result<ActiveLock, LockError> {
        mgr.add_lock(
            &path(p),
            LockTypeName::write(),
            exclusive,
            depth,
            0,
            None,
            None,
        )
    }

    #[test]
    fn token_is_urn_uuid_and_unique() {
        let mgr = LockManager::new();
        let a = add(&mgr, "/a", false, LockDepth::Zero).unwrap();
        let b = add(&mgr, "/b", false, LockDepth::Zero).unwrap();
        assert!(a.token.starts_with("urn:uuid:"));
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn exclusive_conflicts_with_everything_of_same_type() {
        let mgr = LockManager::new();
        add(&mgr, "/a", true, LockDepth::Zero).unwrap();
        assert!(matches!(
            add(&mgr, "/a", true, LockDepth::Zero),
            Err(LockError::Conflict(_))
        ));
        assert!(matches!(
            add(&mgr, "/a", false, LockDepth::Zero),
            Err(LockError::Conflict(_))
        ));
    }

    #[test]
    fn shared_locks_coexist() {
        let mgr = LockManager::new();
        add(&mgr, "/a", false, LockDepth::Zero).unwrap();
        add(&mgr, "/a", false, LockDepth::Zero).unwrap();
        assert!(matches!(
            add(&mgr, "/a", true, LockDepth::Zero),
            Err(LockError::Conflict(_))
        ));
    }

    #[test]
    fn conflict_is_symmetric_across_depth() {
        // deep lock above vs lock below, in both orders.
        let mgr = LockManager::new();
        add(&mgr, "/a/", true, LockDepth::Infinity).unwrap();
        assert!(matches!(
            add(&mgr, "/a/b/c", true, LockDepth::Zero),
            Err(LockError::Conflict(_))
        ));

        let mgr = LockManager::new();
        add(&mgr, "/a/b/c", true, LockDepth::Zero).unwrap();
        assert!(matches!(
            add(&mgr, "/a/", true, LockDepth::Infinity),
            Err(LockError::Conflict(_))
        ));
    }

    #[test]
    fn depth_zero_does_not_cover_children() {
        let mgr = LockManager::new();
        let lock = add(&mgr, "/a", true, LockDepth::Zero).unwrap();
        assert!(lock.covers(&path("/a")));
        assert!(lock.covers(&path("/a/")));
        assert!(!lock.covers(&path("/a/b")));
        // sibling lock is fine
        add(&mgr, "/a/b", true, LockDepth::Zero).unwrap();
    }

    #[test]
    fn infinity_covers_subtree_only() {
        let mgr = LockManager::new();
        let lock = add(&mgr, "/a/", true, LockDepth::Infinity).unwrap();
        assert!(lock.covers(&path("/a/")));
        assert!(lock.covers(&path("/a/b/c")));
        assert!(!lock.covers(&path("/ab")));
        assert!(!lock.covers(&path("/")));
    }

    #[test]
    fn different_type_names_do_not_conflict() {
        let mgr = LockManager::new();
        add(&mgr, "/a", true, LockDepth::Zero).unwrap();
        let other = LockTypeName {
            namespace: "urn:example".to_string(),
            name: "transaction".to_string(),
        };
        mgr.add_lock(&path("/a"), other, true, LockDepth::Zero, 0, None, None)
            .unwrap();
    }

    #[test]
    fn expired_locks_are_reaped() {
        let mgr = LockManager::new();
        let lock = mgr
            .add_lock(
                &path("/a"),
                LockTypeName::write(),
                true,
                LockDepth::Zero,
                1,
                None,
                None,
            )
            .unwrap();
        // force expiry by rewriting the record.
        {
            let mut state = mgr.0.state.lock();
            let l = state.by_token.get_mut(&lock.token).unwrap();
            l.expires_at = Some(Utc::now() - Duration::seconds(1));
        }
        assert!(mgr.get_lock(&lock.token, None).is_none());
        // and the path is free again.
        add(&mgr, "/a", true, LockDepth::Zero).unwrap();
    }

    #[test]
    fn refresh_resets_expiry() {
        let mgr = LockManager::new();
        let lock = mgr
            .add_lock(
                &path("/a"),
                LockTypeName::write(),
                true,
                LockDepth::Zero,
                60,
                None,
                Some("alice"),
            )
            .unwrap();
        let refreshed = mgr
            .refresh_lock(&lock.token, &path("/a"), Some("alice"), 3600)
            .unwrap();
        assert_eq!(refreshed.timeout_seconds, 3600);
        assert!(refreshed.expires_at.unwrap() > lock.expires_at.unwrap());
        // wrong principal may not refresh.
        assert!(mgr
            .refresh_lock(&lock.token, &path("/a"), Some("bob"), 60)
            .is_err());
    }

    #[test]
    fn timeout_clamped_to_maximum() {
        let mgr = LockManager::new().max_timeout(600);
        let lock = mgr
            .add_lock(
                &path("/a"),
                LockTypeName::write(),
                true,
                LockDepth::Zero,
                0,
                None,
                None,
            )
            .unwrap();
        assert_eq!(lock.timeout_seconds, 600);
        assert!(lock.expires_at.is_some());
    }

    #[test]
    fn limit_reached() {
        let mgr = LockManager::new().max_locks(1);
        add(&mgr, "/a", true, LockDepth::Zero).unwrap();
        assert!(matches!(
            add(&mgr, "/b", true, LockDepth::Zero),
            Err(LockError::LimitReached)
        ));
    }

    #[test]
    fn submitted_token_check() {
        let mgr = LockManager::new();
        let lock = add(&mgr, "/col/", true, LockDepth::Infinity).unwrap();
        // a PUT to a child without the token fails with the ancestor lock.
        let err = mgr
            .check_submitted(&path("/col/file"), false, &[], None)
            .unwrap_err();
        assert_eq!(err.token, lock.token);
        // with the token it passes.
        mgr.check_submitted(&path("/col/file"), false, &[lock.token.clone()], None)
            .unwrap();
        // deep check from above catches the lock below.
        let err2 = mgr.check_submitted(&path("/"), true, &[], None).unwrap_err();
        assert_eq!(err2.token, lock.token);
    }

    #[test]
    fn get_locks_ancestors_and_descendants() {
        let mgr = LockManager::new();
        let top = add(&mgr, "/a/", false, LockDepth::Infinity).unwrap();
        let leaf = add(&mgr, "/a/b/c", false, LockDepth::Zero).unwrap();

        let at_leaf = mgr.get_locks(&path("/a/b/c"), true, false, None);
        let tokens: Vec<&str> = at_leaf.iter().map(|l| l.token.as_str()).collect();
        assert!(tokens.contains(&top.token.as_str()));
        assert!(tokens.contains(&leaf.token.as_str()));

        let below_root = mgr.get_locks(&path("/a/"), false, true, None);
        assert_eq!(below_root.len(), 2);
    }

    #[test]
    fn remove_below_clears_subtree() {
        let mgr = LockManager::new();
        add(&mgr, "/a/", false, LockDepth::Infinity).unwrap();
        add(&mgr, "/a/b", false, LockDepth::Zero).unwrap();
        let out = add(&mgr, "/z", false, LockDepth::Zero).unwrap();
        mgr.remove_below(&path("/a/"));
        assert!(mgr.get_locks(&path("/a/"), true, true, None).is_empty());
        assert!(mgr.get_lock(&out.token, None).is_some());
    }

    #[test]
    fn store_hooks_and_reload() {
        let store = MemLockStore::new();
        let mgr = LockManager::with_store(store.clone());
        let lock = add(&mgr, "/a", true, LockDepth::Zero).unwrap();
        mgr.refresh_lock(&lock.token, &path("/a"), None, 60).unwrap();

        // a new manager on the same store sees the lock.
        let mgr2 = LockManager::with_store(store.clone());
        assert!(mgr2.get_lock(&lock.token, Some(&path("/a"))).is_some());

        mgr.remove_lock(&lock.token, &path("/a"), None).unwrap();
        let mgr3 = LockManager::with_store(store);
        assert!(mgr3.get_lock(&lock.token, None).is_none());
    }

    #[test]
    fn unlock_requires_exact_token_and_coverage() {
        let mgr = LockManager::new();
        let lock = add(&mgr, "/a", true, LockDepth::Zero).unwrap();
        assert!(mgr
            .remove_lock("urn:uuid:not-the-token", &path("/a"), None)
            .is_err());
        assert!(mgr.remove_lock(&lock.token, &path("/b"), None).is_err());
        mgr.remove_lock(&lock.token, &path("/a"), None).unwrap();
    }
}
