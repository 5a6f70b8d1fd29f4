//! Dead-property storage.
//!
//! Dead properties are stored verbatim as XML fragments, keyed by the
//! resource's canonical path. The store must apply a whole PROPPATCH
//! batch atomically and serialize writes per path; the in-memory
//! implementation here does both with a single mutex.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use dyn_clone::DynClone;
use parking_lot::Mutex;

use crate::davpath::DavPath;

/// A property's qualified name, plus the prefix it was submitted with
/// (kept so responses can echo the client's choice).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropName {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub name: String,
}

impl PropName {
    pub fn new(namespace: Option<&str>, name: &str) -> PropName {
        PropName {
            namespace: namespace.map(|s| s.to_string()),
            prefix: None,
            name: name.to_string(),
        }
    }

    pub fn dav(name: &str) -> PropName {
        PropName::new(Some("DAV:"), name)
    }

    /// Equality on (namespace, local name) only.
    pub fn same_name(&self, other: &PropName) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

/// A stored dead property: name plus the serialized XML fragment of the
/// whole property element (including `xsi:type` / `xml:lang` attributes).
#[derive(Debug, Clone)]
pub struct StoredProp {
    pub name: PropName,
    pub xml: Vec<u8>,
}

/// One instruction of a PROPPATCH batch, in document order.
#[derive(Debug, Clone)]
pub enum PropOp {
    Set(StoredProp),
    Remove(PropName),
}

/// Dead-property persistence contract.
///
/// Writes for the same path are totally ordered; a whole
/// [`apply`](PropertyStore::apply) batch lands atomically or not at all.
pub trait PropertyStore: Debug + Send + Sync + DynClone {
    /// All dead properties of a resource.
    fn get(&self, path: &DavPath) -> Vec<StoredProp>;

    /// One dead property, by qualified name.
    fn get_prop(&self, path: &DavPath, name: &PropName) -> Option<Vec<u8>>;

    /// Apply a batch of set/remove operations atomically.
    fn apply(&self, path: &DavPath, batch: &[PropOp]);

    /// Copy all properties from one path to another (overwrites).
    fn copy(&self, from: &DavPath, to: &DavPath);

    /// Re-key all properties below `from` to live below `to`.
    fn rename(&self, from: &DavPath, to: &DavPath);

    /// Drop all properties of a path (and, for collections, its subtree).
    fn remove(&self, path: &DavPath);
}

dyn_clone::clone_trait_object!(PropertyStore);

type PropMap = HashMap<PropKey, Vec<StoredProp>>;

// properties are keyed by the trailing-slash-insensitive path bytes.
type PropKey = Vec<u8>;

fn key(path: &DavPath) -> PropKey {
    path.key_bytes().to_vec()
}

/// Ephemeral in-memory property store.
#[derive(Debug, Clone)]
pub struct MemPropStore(Arc<Mutex<PropMap>>);

impl MemPropStore {
    pub fn new() -> Box<MemPropStore> {
        Box::new(MemPropStore(Arc::new(Mutex::new(HashMap::new()))))
    }
}

impl PropertyStore for MemPropStore {
    fn get(&self, path: &DavPath) -> Vec<StoredProp> {
        self.0.lock().get(&key(path)).cloned().unwrap_or_default()
    }

    fn get_prop(&self, path: &DavPath, name: &PropName) -> Option<Vec<u8>> {
        self.0
            .lock()
            .get(&key(path))?
            .iter()
            .find(|p| p.name.same_name(name))
            .map(|p| p.xml.clone())
    }

    fn apply(&self, path: &DavPath, batch: &[PropOp]) {
        let mut map = self.0.lock();
        let props = map.entry(key(path)).or_default();
        for op in batch {
            match op {
                PropOp::Set(prop) => {
                    props.retain(|p| !p.name.same_name(&prop.name));
                    props.push(prop.clone());
                }
                PropOp::Remove(name) => {
                    props.retain(|p| !p.name.same_name(name));
                }
            }
        }
        if props.is_empty() {
            map.remove(&key(path));
        }
    }

    fn copy(&self, from: &DavPath, to: &DavPath) {
        let mut map = self.0.lock();
        match map.get(&key(from)).cloned() {
            Some(props) => {
                map.insert(key(to), props);
            }
            None => {
                map.remove(&key(to));
            }
        }
    }

    fn rename(&self, from: &DavPath, to: &DavPath) {
        let mut map = self.0.lock();
        let from_key = key(from);
        let to_key = key(to);
        let affected: Vec<PropKey> = map
            .keys()
            .filter(|k| in_subtree(k, &from_key))
            .cloned()
            .collect();
        for k in affected {
            if let Some(props) = map.remove(&k) {
                let mut nk = to_key.clone();
                nk.extend_from_slice(&k[from_key.len()..]);
                map.insert(nk, props);
            }
        }
    }

    fn remove(&self, path: &DavPath) {
        let mut map = self.0.lock();
        let pkey = key(path);
        map.retain(|k, _| !in_subtree(k, &pkey));
    }
}

fn in_subtree(k: &[u8], root: &[u8]) -> bool {
    k == root || (k.starts_with(root) && k.get(root.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(ns: &str, name: &str, text: &str) -> StoredProp {
        StoredProp {
            name: PropName::new(Some(ns), name),
            xml: format!("<{} xmlns=\"{}\">{}</{}>", name, ns, text, name).into_bytes(),
        }
    }

    fn path(s: &str) -> DavPath {
        DavPath::new(s).unwrap()
    }

    #[test]
    fn set_get_remove() {
        let store = MemPropStore::new();
        let p = path("/r");
        store.apply(&p, &[PropOp::Set(prop("urn:x", "v1", "1"))]);
        assert_eq!(store.get(&p).len(), 1);
        assert!(store
            .get_prop(&p, &PropName::new(Some("urn:x"), "v1"))
            .is_some());
        store.apply(&p, &[PropOp::Remove(PropName::new(Some("urn:x"), "v1"))]);
        assert!(store.get(&p).is_empty());
    }

    #[test]
    fn set_replaces_same_name() {
        let store = MemPropStore::new();
        let p = path("/r");
        store.apply(&p, &[PropOp::Set(prop("urn:x", "v", "old"))]);
        store.apply(&p, &[PropOp::Set(prop("urn:x", "v", "new"))]);
        let props = store.get(&p);
        assert_eq!(props.len(), 1);
        assert!(String::from_utf8_lossy(&props[0].xml).contains("new"));
    }

    #[test]
    fn rename_rekeys_subtree() {
        let store = MemPropStore::new();
        store.apply(&path("/a/"), &[PropOp::Set(prop("urn:x", "p", "root"))]);
        store.apply(&path("/a/b"), &[PropOp::Set(prop("urn:x", "p", "child"))]);
        store.rename(&path("/a/"), &path("/z/"));
        assert!(store.get(&path("/a/")).is_empty());
        assert_eq!(store.get(&path("/z/")).len(), 1);
        assert_eq!(store.get(&path("/z/b")).len(), 1);
    }

    #[test]
    fn copy_overwrites_destination() {
        let store = MemPropStore::new();
        store.apply(&path("/src"), &[PropOp::Set(prop("urn:x", "p", "s"))]);
        store.apply(&path("/dst"), &[PropOp::Set(prop("urn:x", "q", "d"))]);
        store.copy(&path("/src"), &path("/dst"));
        let props = store.get(&path("/dst"));
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].name.name, "p");
    }

    #[test]
    fn trailing_slash_is_same_key() {
        let store = MemPropStore::new();
        store.apply(&path("/c"), &[PropOp::Set(prop("urn:x", "p", "1"))]);
        assert_eq!(store.get(&path("/c/")).len(), 1);
    }
}
