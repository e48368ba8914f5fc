//! In-memory tree filesystem.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]: a directory
//! owns the ids of its children, a child keeps its parent's id. Freed slots are
//! recycled. All data is lost when the filesystem is dropped.
//!
//! Child lists start at capacity 4 and double. Removing a child moves the last
//! sibling into its slot, so listing order after a removal is unspecified.

use super::traits::{DirEntry, Driver, EntryKind, path_components};
use crate::error::{FsError, FsResult};

const INITIAL_CHILD_CAPACITY: usize = 4;

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

#[derive(Debug)]
enum NodeData {
    File { data: Vec<u8> },
    Directory { children: Vec<NodeId> },
}

#[derive(Debug)]
struct FsNode {
    name: String,
    parent: Option<NodeId>,
    data: NodeData,
}

impl FsNode {
    fn kind(&self) -> EntryKind {
        match self.data {
            NodeData::File { .. } => EntryKind::File,
            NodeData::Directory { .. } => EntryKind::Directory,
        }
    }
}

/// In-memory filesystem.
#[derive(Debug)]
pub struct Ramfs {
    nodes: Vec<Option<FsNode>>,
    free: Vec<NodeId>,
}

impl Default for Ramfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Ramfs {
    /// Create an empty filesystem holding only the root directory.
    pub fn new() -> Self {
        let root = FsNode {
            name: String::new(),
            parent: None,
            data: NodeData::Directory {
                children: Vec::with_capacity(INITIAL_CHILD_CAPACITY),
            },
        };
        Self {
            nodes: vec![Some(root)],
            free: Vec::new(),
        }
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Resolve `path` to a node.
    ///
    /// Every segment before the last must be a directory. With
    /// `create_intermediate_dirs`, missing ones are made on the way; the last
    /// segment must exist either way.
    pub fn traverse(&mut self, path: &str, create_intermediate_dirs: bool) -> FsResult<NodeId> {
        let components = path_components(path);
        let Some((leaf, parents)) = components.split_last() else {
            return Ok(ROOT);
        };
        let parent = self.walk_dirs(parents, create_intermediate_dirs, path)?;
        self.child_named(parent, leaf)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    fn node(&self, id: NodeId) -> FsResult<&FsNode> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| FsError::Io(format!("dangling ramfs node {}", id.0)))
    }

    fn node_mut(&mut self, id: NodeId) -> FsResult<&mut FsNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| FsError::Io(format!("dangling ramfs node {}", id.0)))
    }

    fn child_named(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        let Ok(FsNode {
            data: NodeData::Directory { children },
            ..
        }) = self.node(dir)
        else {
            return None;
        };
        children
            .iter()
            .copied()
            .find(|&c| self.node(c).is_ok_and(|n| n.name == name))
    }

    /// Walk `components` as directories from the root.
    fn walk_dirs(&mut self, components: &[&str], create: bool, path: &str) -> FsResult<NodeId> {
        let mut current = ROOT;
        for component in components {
            current = match self.child_named(current, component) {
                Some(child) => {
                    if self.node(child)?.kind() != EntryKind::Directory {
                        return Err(FsError::NotDirectory(path.to_string()));
                    }
                    child
                }
                None if create => self.attach(current, component, Self::empty_dir())?,
                None => return Err(FsError::NotFound(path.to_string())),
            };
        }
        Ok(current)
    }

    /// Resolve a full path without creating anything.
    fn lookup(&self, path: &str) -> FsResult<NodeId> {
        let mut current = ROOT;
        for component in path_components(path) {
            if self.node(current)?.kind() != EntryKind::Directory {
                return Err(FsError::NotDirectory(path.to_string()));
            }
            current = self
                .child_named(current, component)
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        }
        Ok(current)
    }

    fn empty_dir() -> NodeData {
        NodeData::Directory {
            children: Vec::with_capacity(INITIAL_CHILD_CAPACITY),
        }
    }

    /// Create a node named `name` under `parent`.
    ///
    /// Room in the parent's child list is reserved before the node is
    /// allocated, so a failed allocation leaves the tree as it was.
    fn attach(&mut self, parent: NodeId, name: &str, data: NodeData) -> FsResult<NodeId> {
        {
            let NodeData::Directory { children } = &mut self.node_mut(parent)?.data else {
                return Err(FsError::NotDirectory(name.to_string()));
            };
            if children.len() == children.capacity() {
                let target = (children.capacity() * 2).max(INITIAL_CHILD_CAPACITY);
                children.try_reserve_exact(target - children.len())?;
            }
        }

        let node = FsNode {
            name: name.to_string(),
            parent: Some(parent),
            data,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(node);
                id
            }
            None => {
                self.nodes.try_reserve(1)?;
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };

        if let NodeData::Directory { children } = &mut self.node_mut(parent)?.data {
            children.push(id);
        }
        Ok(id)
    }

    /// Unlink `id` from its parent and free its subtree.
    fn detach(&mut self, id: NodeId) -> FsResult<()> {
        let parent = self
            .node(id)?
            .parent
            .ok_or_else(|| FsError::PermissionDenied("cannot remove root directory".into()))?;
        if let NodeData::Directory { children } = &mut self.node_mut(parent)?.data {
            if let Some(pos) = children.iter().position(|&c| c == id) {
                children.swap_remove(pos);
            }
        }

        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes[next.0].take() {
                if let NodeData::Directory { children } = node.data {
                    pending.extend(children);
                }
                self.free.push(next);
            }
        }
        Ok(())
    }

    /// Store `bytes` into a file buffer.
    ///
    /// Capacity doubles, or jumps straight to the needed size when doubling is
    /// not enough. Overwrites never shrink capacity.
    fn store(data: &mut Vec<u8>, bytes: &[u8], append: bool) -> FsResult<()> {
        let base = if append { data.len() } else { 0 };
        let new_len = base
            .checked_add(bytes.len())
            .ok_or(FsError::OutOfMemory)?;
        if new_len > data.capacity() {
            let target = (data.capacity() * 2).max(new_len);
            data.try_reserve_exact(target - data.len())?;
        }
        data.truncate(base);
        data.extend_from_slice(bytes);
        Ok(())
    }
}

impl Driver for Ramfs {
    fn name(&self) -> &'static str {
        "ramfs"
    }

    fn read_only(&self) -> bool {
        false
    }

    fn mkdir(&mut self, path: &str) -> FsResult<()> {
        let components = path_components(path);
        let Some((leaf, parents)) = components.split_last() else {
            return Ok(());
        };
        let parent = self.walk_dirs(parents, false, path)?;
        match self.child_named(parent, leaf) {
            Some(existing) => match self.node(existing)?.kind() {
                EntryKind::Directory => Ok(()),
                EntryKind::File => Err(FsError::AlreadyExists(path.to_string())),
            },
            None => {
                self.attach(parent, leaf, Self::empty_dir())?;
                tracing::trace!(path, "ramfs mkdir");
                Ok(())
            }
        }
    }

    fn write_file(&mut self, path: &str, data: &[u8], append: bool) -> FsResult<()> {
        let components = path_components(path);
        let Some((leaf, parents)) = components.split_last() else {
            return Err(FsError::IsDirectory(path.to_string()));
        };
        let parent = self.walk_dirs(parents, true, path)?;

        match self.child_named(parent, leaf) {
            Some(existing) => match &mut self.node_mut(existing)?.data {
                NodeData::File { data: contents } => Self::store(contents, data, append),
                NodeData::Directory { .. } => Err(FsError::IsDirectory(path.to_string())),
            },
            None => {
                let mut contents = Vec::new();
                Self::store(&mut contents, data, false)?;
                self.attach(parent, leaf, NodeData::File { data: contents })?;
                Ok(())
            }
        }
    }

    fn read_file(&mut self, path: &str, buf: &mut [u8]) -> FsResult<usize> {
        let contents = self.read_file_ref(path)?;
        let n = contents.len().min(buf.len());
        buf[..n].copy_from_slice(&contents[..n]);
        Ok(contents.len())
    }

    fn read_file_ref(&mut self, path: &str) -> FsResult<&[u8]> {
        let id = self.lookup(path)?;
        match &self.node(id)?.data {
            NodeData::File { data } => Ok(data),
            NodeData::Directory { .. } => Err(FsError::IsDirectory(path.to_string())),
        }
    }

    fn remove(&mut self, path: &str, recursive: bool) -> FsResult<()> {
        let id = self.lookup(path)?;
        if id == ROOT {
            return Err(FsError::PermissionDenied(format!(
                "cannot remove root directory: {}",
                path
            )));
        }
        let busy = match &self.node(id)?.data {
            NodeData::Directory { children } => !children.is_empty() && !recursive,
            NodeData::File { .. } => false,
        };
        if busy {
            return Err(FsError::Busy(format!("directory not empty: {}", path)));
        }
        self.detach(id)
    }

    fn file_type(&mut self, path: &str) -> Option<EntryKind> {
        let id = self.lookup(path).ok()?;
        self.node(id).ok().map(FsNode::kind)
    }

    fn list_dir(&mut self, path: &str, visit: &mut dyn FnMut(&DirEntry)) -> FsResult<()> {
        let id = self.lookup(path)?;
        let NodeData::Directory { children } = &self.node(id)?.data else {
            return Err(FsError::NotDirectory(path.to_string()));
        };
        for &child in children {
            let node = self.node(child)?;
            let entry = match &node.data {
                NodeData::File { data } => DirEntry::file(node.name.clone(), data.len() as u64),
                NodeData::Directory { .. } => DirEntry::directory(node.name.clone()),
            };
            visit(&entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Errno;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn names(fs: &mut Ramfs, path: &str) -> Vec<String> {
        let mut out = Vec::new();
        fs.list_dir(path, &mut |e| out.push(e.name.clone())).unwrap();
        out
    }

    fn capacity_of(fs: &Ramfs, path: &str) -> usize {
        let id = fs.lookup(path).unwrap();
        match &fs.node(id).unwrap().data {
            NodeData::File { data } => data.capacity(),
            NodeData::Directory { children } => children.capacity(),
        }
    }

    /// Structural checks over every live node.
    fn check_invariants(fs: &Ramfs) {
        let mut reachable = 0;
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            reachable += 1;
            let node = fs.node(id).unwrap();
            if let NodeData::Directory { children } = &node.data {
                assert!(children.len() <= children.capacity());
                let mut seen = HashSet::new();
                for &child in children {
                    let c = fs.node(child).unwrap();
                    assert_eq!(c.parent, Some(id));
                    assert!(seen.insert(c.name.clone()), "duplicate sibling {}", c.name);
                    stack.push(child);
                }
            }
        }
        assert_eq!(reachable, fs.node_count());
    }

    #[test]
    fn test_write_and_read() {
        let mut fs = Ramfs::new();
        fs.write_file("/test.txt", b"hello world", false).unwrap();
        let mut buf = [0u8; 64];
        let n = fs.read_file("/test.txt", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    #[test]
    fn test_read_not_found() {
        let mut fs = Ramfs::new();
        let err = fs.read_file("/nonexistent.txt", &mut []).unwrap_err();
        assert_eq!(err.errno(), Errno::ENOENT);
    }

    #[test]
    fn test_nested_write_creates_parents() {
        let mut fs = Ramfs::new();
        fs.write_file("/a/b/c/file.txt", b"nested", false).unwrap();
        assert_eq!(fs.file_type("/a"), Some(EntryKind::Directory));
        assert_eq!(fs.file_type("/a/b/c"), Some(EntryKind::Directory));
        assert_eq!(fs.read_file_ref("/a/b/c/file.txt").unwrap(), b"nested");
        check_invariants(&fs);
    }

    #[test]
    fn test_traverse() {
        let mut fs = Ramfs::new();
        assert_eq!(fs.traverse("/", false).unwrap(), ROOT);
        assert_eq!(fs.traverse("/x/y", false).unwrap_err().errno(), Errno::ENOENT);

        // intermediates are fabricated, the leaf is not
        assert_eq!(fs.traverse("/x/y", true).unwrap_err().errno(), Errno::ENOENT);
        assert_eq!(fs.file_type("/x"), Some(EntryKind::Directory));

        fs.write_file("/f", b"", false).unwrap();
        assert_eq!(fs.traverse("/f/g", true).unwrap_err().errno(), Errno::ENOTDIR);
    }

    #[test]
    fn test_mkdir_rules() {
        let mut fs = Ramfs::new();
        fs.mkdir("/").unwrap();
        assert_eq!(fs.mkdir("/missing/child").unwrap_err().errno(), Errno::ENOENT);

        fs.mkdir("/dir").unwrap();
        let before = fs.node_count();
        fs.mkdir("/dir").unwrap();
        assert_eq!(fs.node_count(), before);

        fs.write_file("/file", b"x", false).unwrap();
        assert_eq!(fs.mkdir("/file").unwrap_err().errno(), Errno::EEXIST);
    }

    #[test]
    fn test_write_over_directory_fails() {
        let mut fs = Ramfs::new();
        fs.mkdir("/dir").unwrap();
        let err = fs.write_file("/dir", b"x", false).unwrap_err();
        assert_eq!(err.errno(), Errno::EISDIR);
        assert_eq!(fs.write_file("/", b"x", false).unwrap_err().errno(), Errno::EISDIR);
    }

    #[test]
    fn test_append_and_overwrite() {
        let mut fs = Ramfs::new();
        fs.write_file("/log", b"one", true).unwrap();
        fs.write_file("/log", b"two", true).unwrap();
        assert_eq!(fs.read_file_ref("/log").unwrap(), b"onetwo");

        fs.write_file("/log", b"x", false).unwrap();
        assert_eq!(fs.read_file_ref("/log").unwrap(), b"x");
    }

    #[test]
    fn test_overwrite_keeps_capacity() {
        let mut fs = Ramfs::new();
        fs.write_file("/f", &[1u8; 100], false).unwrap();
        let cap = capacity_of(&fs, "/f");
        assert!(cap >= 100);

        fs.write_file("/f", b"tiny", false).unwrap();
        assert_eq!(capacity_of(&fs, "/f"), cap);
        assert_eq!(fs.read_file_ref("/f").unwrap(), b"tiny");
    }

    #[test]
    fn test_buffer_growth_doubles() {
        let mut fs = Ramfs::new();
        fs.write_file("/f", &[0u8; 10], false).unwrap();
        let cap = capacity_of(&fs, "/f");
        fs.write_file("/f", &[0u8; 1], true).unwrap();
        assert!(capacity_of(&fs, "/f") >= cap * 2);

        // doubling is not enough: grow to the exact size
        fs.write_file("/g", &[0u8; 4], false).unwrap();
        fs.write_file("/g", &[0u8; 1000], true).unwrap();
        assert!(capacity_of(&fs, "/g") >= 1004);
        assert_eq!(fs.read_file_ref("/g").unwrap().len(), 1004);
    }

    #[test]
    fn test_repeated_overwrite_is_stable() {
        let mut fs = Ramfs::new();
        for _ in 0..3 {
            fs.write_file("/same", b"payload", false).unwrap();
        }
        let mut buf = [0u8; 0];
        assert_eq!(fs.read_file("/same", &mut buf).unwrap(), 7);
    }

    #[test]
    fn test_read_reports_true_size() {
        let mut fs = Ramfs::new();
        fs.write_file("/big", b"0123456789", false).unwrap();

        let n = fs.read_file("/big", &mut []).unwrap();
        assert_eq!(n, 10);

        let mut small = [0u8; 4];
        let n = fs.read_file("/big", &mut small).unwrap();
        assert_eq!(n, 10);
        assert_eq!(&small, b"0123");

        fs.mkdir("/d").unwrap();
        assert_eq!(fs.read_file("/d", &mut small).unwrap_err().errno(), Errno::EISDIR);
    }

    #[test]
    fn test_remove_rules() {
        let mut fs = Ramfs::new();
        assert_eq!(fs.remove("/", true).unwrap_err().errno(), Errno::EPERM);
        assert_eq!(fs.remove("/nope", false).unwrap_err().errno(), Errno::ENOENT);

        fs.write_file("/dir/sub/file.txt", b"data", false).unwrap();
        assert_eq!(fs.remove("/dir", false).unwrap_err().errno(), Errno::EBUSY);

        fs.remove("/dir", true).unwrap();
        assert!(!fs.exists("/dir"));
        assert_eq!(fs.node_count(), 1);
        check_invariants(&fs);
    }

    #[test]
    fn test_remove_empty_directory() {
        let mut fs = Ramfs::new();
        fs.mkdir("/empty").unwrap();
        fs.remove("/empty", false).unwrap();
        assert!(!fs.exists("/empty"));
    }

    #[test]
    fn test_removal_swaps_last_child_in() {
        let mut fs = Ramfs::new();
        for name in ["a", "b", "c", "d"] {
            fs.write_file(&format!("/{}", name), b"", false).unwrap();
        }
        assert_eq!(names(&mut fs, "/"), ["a", "b", "c", "d"]);
        fs.remove("/a", false).unwrap();
        assert_eq!(names(&mut fs, "/"), ["d", "b", "c"]);
    }

    #[test]
    fn test_child_capacity_doubles_from_four() {
        let mut fs = Ramfs::new();
        assert!(capacity_of(&fs, "/") >= 4);
        for i in 0..5 {
            fs.mkdir(&format!("/d{}", i)).unwrap();
        }
        assert!(capacity_of(&fs, "/") >= 8);
        check_invariants(&fs);
    }

    #[test]
    fn test_list_dir_on_file() {
        let mut fs = Ramfs::new();
        fs.write_file("/f", b"abc", false).unwrap();
        let err = fs.list_dir("/f", &mut |_| {}).unwrap_err();
        assert_eq!(err.errno(), Errno::ENOTDIR);

        let mut entries = Vec::new();
        fs.list_dir("/", &mut |e| entries.push(e.clone())).unwrap();
        assert_eq!(entries, vec![DirEntry::file("f", 3)]);
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut fs = Ramfs::new();
        fs.write_file("/a/b", b"1", false).unwrap();
        let slots = fs.nodes.len();
        fs.remove("/a", true).unwrap();
        fs.write_file("/c/d", b"2", false).unwrap();
        assert_eq!(fs.nodes.len(), slots);
        check_invariants(&fs);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Mkdir(String),
        Write(String, bool),
        Remove(String, bool),
    }

    fn arb_path() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d", "e"]), 1..4)
            .prop_map(|parts| format!("/{}", parts.join("/")))
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            arb_path().prop_map(Op::Mkdir),
            (arb_path(), any::<bool>()).prop_map(|(p, a)| Op::Write(p, a)),
            (arb_path(), any::<bool>()).prop_map(|(p, r)| Op::Remove(p, r)),
        ]
    }

    proptest! {
        #[test]
        fn invariants_hold_after_every_mutation(ops in prop::collection::vec(arb_op(), 1..60)) {
            let mut fs = Ramfs::new();
            for op in ops {
                // failures are expected; the tree must stay well-formed regardless
                let _ = match op {
                    Op::Mkdir(p) => fs.mkdir(&p),
                    Op::Write(p, append) => fs.write_file(&p, b"xyz", append),
                    Op::Remove(p, recursive) => fs.remove(&p, recursive),
                };
                check_invariants(&fs);
            }
        }
    }
}
