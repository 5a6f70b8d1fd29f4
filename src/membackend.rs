//! Ephemeral in-memory resource backend.
//!
//! Useful for tests and for embedders that want a WebDAV namespace
//! without touching disk. The whole tree lives behind one mutex; clones
//! share state.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::stream;
use parking_lot::Mutex;

use crate::backend::{
    BackendError, BackendFuture, BackendResult, ByteStream, Resource, ResourceBackend,
    ResourceKind, ResourceMeta,
};
use crate::davheaders::ETag;
use crate::davpath::DavPath;

#[derive(Debug)]
enum Node {
    Dir {
        children: HashMap<Vec<u8>, Node>,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    },
    File {
        data: Bytes,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
        version: u64,
    },
}

impl Node {
    fn new_dir(now: DateTime<Utc>) -> Node {
        Node::Dir {
            children: HashMap::new(),
            created: now,
            modified: now,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }

    fn children(&self) -> Option<&HashMap<Vec<u8>, Node>> {
        match self {
            Node::Dir { children, .. } => Some(children),
            Node::File { .. } => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut HashMap<Vec<u8>, Node>> {
        match self {
            Node::Dir { children, .. } => Some(children),
            Node::File { .. } => None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    root: Node,
    version: u64,
}

/// In-memory backend; a handle that is cheap to clone.
#[derive(Debug, Clone)]
pub struct MemBackend {
    inner: Arc<Mutex<Inner>>,
    atomic_rename: bool,
}

impl MemBackend {
    pub fn new() -> Box<MemBackend> {
        Box::new(MemBackend {
            inner: Arc::new(Mutex::new(Inner {
                root: Node::new_dir(now_secs()),
                version: 0,
            })),
            atomic_rename: true,
        })
    }

    /// Disable the atomic-rename capability, forcing MOVE through the
    /// copy-then-delete planner.
    pub fn without_rename(mut self: Box<Self>) -> Box<MemBackend> {
        self.atomic_rename = false;
        self
    }
}

fn now_secs() -> DateTime<Utc> {
    Utc.timestamp_opt(Utc::now().timestamp(), 0).unwrap()
}

fn segments(path: &DavPath) -> Vec<Vec<u8>> {
    path.as_bytes()
        .split(|&c| c == b'/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_vec())
        .collect()
}

fn lookup<'a>(root: &'a Node, segs: &[Vec<u8>]) -> Option<&'a Node> {
    let mut node = root;
    for seg in segs {
        node = node.children()?.get(seg)?;
    }
    Some(node)
}

fn lookup_mut<'a>(root: &'a mut Node, segs: &[Vec<u8>]) -> Option<&'a mut Node> {
    let mut node = root;
    for seg in segs {
        node = node.children_mut()?.get_mut(seg)?;
    }
    Some(node)
}

// navigate to the parent dir of `segs`, returning (parent, name).
fn parent_dir<'a>(
    root: &'a mut Node,
    segs: &[Vec<u8>],
) -> BackendResult<(&'a mut HashMap<Vec<u8>, Node>, Vec<u8>)> {
    let (name, dirsegs) = segs.split_last().ok_or(BackendError::Forbidden)?;
    let parent = lookup_mut(root, dirsegs).ok_or(BackendError::NotFound)?;
    let children = parent.children_mut().ok_or(BackendError::NotFound)?;
    Ok((children, name.clone()))
}

fn content_type(path: &DavPath) -> String {
    path.file_name()
        .and_then(|name| name.rsplit_once('.'))
        .and_then(|(_, ext)| mime_guess::from_ext(ext).first_raw())
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn resource_for(node: &Node, path: &DavPath) -> Resource {
    let mut path = path.clone();
    path.add_slash_if(node.is_dir());
    match node {
        Node::Dir {
            created, modified, ..
        } => Resource {
            path,
            kind: ResourceKind::Collection,
            meta: ResourceMeta {
                len: None,
                modified: Some(*modified),
                created: Some(*created),
                etag: None,
                content_type: None,
            },
        },
        Node::File {
            data,
            created,
            modified,
            version,
        } => {
            let ct = content_type(&path);
            Resource {
                path,
                kind: ResourceKind::NonCollection,
                meta: ResourceMeta {
                    len: Some(data.len() as u64),
                    modified: Some(*modified),
                    created: Some(*created),
                    etag: Some(ETag::new(false, format!("{:x}-{:x}", version, data.len()))),
                    content_type: Some(ct),
                },
            }
        }
    }
}

impl ResourceBackend for MemBackend {
    fn resolve<'a>(&'a self, path: &'a DavPath) -> BackendFuture<'a, Option<Resource>> {
        Box::pin(async move {
            let inner = self.inner.lock();
            Ok(lookup(&inner.root, &segments(path)).map(|node| resource_for(node, path)))
        })
    }

    fn read<'a>(&'a self, resource: &'a Resource) -> BackendFuture<'a, ByteStream> {
        Box::pin(async move {
            let inner = self.inner.lock();
            match lookup(&inner.root, &segments(&resource.path)) {
                Some(Node::File { data, .. }) => {
                    let data = data.clone();
                    let strm: ByteStream = Box::pin(stream::once(async move { Ok(data) }));
                    Ok(strm)
                }
                Some(Node::Dir { .. }) => Err(BackendError::Forbidden),
                None => Err(BackendError::NotFound),
            }
        })
    }

    fn write<'a>(&'a self, path: &'a DavPath, body: ByteStream) -> BackendFuture<'a, Resource> {
        Box::pin(async move {
            use futures_util::StreamExt;
            let mut body = body;
            let mut data = Vec::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|_| BackendError::GeneralFailure)?;
                data.extend_from_slice(&chunk);
            }

            let now = now_secs();
            let mut inner = self.inner.lock();
            inner.version += 1;
            let version = inner.version;
            let (children, name) = parent_dir(&mut inner.root, &segments(path))?;
            let created = match children.get(&name) {
                Some(Node::Dir { .. }) => return Err(BackendError::Exists),
                Some(Node::File { created, .. }) => *created,
                None => now,
            };
            let node = Node::File {
                data: Bytes::from(data),
                created,
                modified: now,
                version,
            };
            children.insert(name, node);
            let node = children.get(path.file_name_bytes()).unwrap();
            Ok(resource_for(node, path))
        })
    }

    fn make_collection<'a>(&'a self, path: &'a DavPath) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let now = now_secs();
            let mut inner = self.inner.lock();
            let (children, name) = parent_dir(&mut inner.root, &segments(path))?;
            if children.contains_key(&name) {
                return Err(BackendError::Exists);
            }
            children.insert(name, Node::new_dir(now));
            Ok(())
        })
    }

    fn delete<'a>(&'a self, path: &'a DavPath) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            let (children, name) = parent_dir(&mut inner.root, &segments(path))?;
            match children.remove(&name) {
                Some(_) => Ok(()),
                None => Err(BackendError::NotFound),
            }
        })
    }

    fn copy_file<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let now = now_secs();
            let mut inner = self.inner.lock();
            inner.version += 1;
            let version = inner.version;
            let (data, created) = match lookup(&inner.root, &segments(from)) {
                Some(Node::File { data, created, .. }) => (data.clone(), *created),
                Some(Node::Dir { .. }) => return Err(BackendError::Forbidden),
                None => return Err(BackendError::NotFound),
            };
            let (children, name) = parent_dir(&mut inner.root, &segments(to))?;
            children.insert(
                name,
                Node::File {
                    data,
                    created,
                    modified: now,
                    version,
                },
            );
            Ok(())
        })
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            let node = {
                let (children, name) = parent_dir(&mut inner.root, &segments(from))?;
                children.remove(&name).ok_or(BackendError::NotFound)?
            };
            match parent_dir(&mut inner.root, &segments(to)) {
                Ok((children, name)) => {
                    children.insert(name, node);
                    Ok(())
                }
                Err(e) => {
                    // put it back; the rename must look atomic.
                    let (children, name) = parent_dir(&mut inner.root, &segments(from))?;
                    children.insert(name, node);
                    Err(e)
                }
            }
        })
    }

    fn supports_rename(&self) -> bool {
        self.atomic_rename
    }

    fn list_children<'a>(&'a self, resource: &'a Resource) -> BackendFuture<'a, Vec<Resource>> {
        Box::pin(async move {
            let inner = self.inner.lock();
            let node =
                lookup(&inner.root, &segments(&resource.path)).ok_or(BackendError::NotFound)?;
            let children = node.children().ok_or(BackendError::Forbidden)?;
            let mut out = Vec::with_capacity(children.len());
            for (name, child) in children {
                let mut cpath = resource.path.clone();
                cpath.push_segment(name);
                out.push(resource_for(child, &cpath));
            }
            Ok(out)
        })
    }
}
