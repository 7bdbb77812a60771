//! The simulated file system the model reads and narrates writes to.
//!
//! Every write returns a new [`Vfs`]; nodes off the written path are shared
//! between versions through `Arc`, nodes on it are copied. A value handed out
//! earlier is never observably changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::error::VfsError;

pub type Entries = BTreeMap<String, Arc<VfsNode>>;

/// Files serialize as JSON strings and directories as JSON objects, which is
/// also the shape carried by the state-update signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VfsNode {
    File(String),
    Dir(Entries),
}

impl VfsNode {
    pub fn file(contents: impl Into<String>) -> Self {
        Self::File(contents.into())
    }

    pub fn empty_dir() -> Self {
        Self::Dir(Entries::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef<'a> {
    File(&'a str),
    Dir(&'a Entries),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vfs {
    root: Arc<Entries>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self {
            root: Arc::new(Entries::new()),
        }
    }
}

impl Vfs {
    pub fn from_entries(entries: Entries) -> Self {
        Self {
            root: Arc::new(entries),
        }
    }

    pub fn seed() -> Self {
        let mut documents = Entries::new();
        documents.insert(
            "report.txt".to_string(),
            Arc::new(VfsNode::file("This is a sample report file.")),
        );

        let mut user = Entries::new();
        user.insert("documents".to_string(), Arc::new(VfsNode::Dir(documents)));
        user.insert(
            "notes.txt".to_string(),
            Arc::new(VfsNode::file("Pentesting notes...")),
        );

        let mut home = Entries::new();
        home.insert("user".to_string(), Arc::new(VfsNode::Dir(user)));

        let mut etc = Entries::new();
        etc.insert(
            "shadow".to_string(),
            Arc::new(VfsNode::file(
                "root:$6$salt$hacker:18635:0:99999:7:::\n\
                 user:$6$salt$pleasentry:18635:0:99999:7:::\n\
                 guest::18635:0:99999:7:::\n",
            )),
        );

        let mut root = Entries::new();
        root.insert("home".to_string(), Arc::new(VfsNode::Dir(home)));
        root.insert("etc".to_string(), Arc::new(VfsNode::Dir(etc)));
        Self::from_entries(root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// An empty path addresses the root. Walking through a file is NotFound.
    pub fn read(&self, path: &[String]) -> Result<NodeRef<'_>, VfsError> {
        let mut current = NodeRef::Dir(&self.root);
        for (depth, segment) in path.iter().enumerate() {
            let NodeRef::Dir(entries) = current else {
                return Err(VfsError::NotFound(path[..=depth].join("/")));
            };
            let Some(child) = entries.get(segment) else {
                return Err(VfsError::NotFound(path[..=depth].join("/")));
            };
            current = match child.as_ref() {
                VfsNode::File(contents) => NodeRef::File(contents),
                VfsNode::Dir(entries) => NodeRef::Dir(entries),
            };
        }
        Ok(current)
    }

    pub fn read_file(&self, path: &[String]) -> Result<&str, VfsError> {
        match self.read(path)? {
            NodeRef::File(contents) => Ok(contents),
            NodeRef::Dir(_) => Err(VfsError::NotFound(path.join("/"))),
        }
    }

    pub fn list(&self, path: &[String]) -> Result<Vec<&str>, VfsError> {
        match self.read(path)? {
            NodeRef::Dir(entries) => Ok(entries.keys().map(String::as_str).collect()),
            NodeRef::File(_) => Err(VfsError::NotADirectory(path.join("/"))),
        }
    }

    pub fn is_dir(&self, path: &[String]) -> bool {
        matches!(self.read(path), Ok(NodeRef::Dir(_)))
    }

    /// Returns a new tree with `content` at `path`, creating missing parent
    /// directories. `self` is left untouched.
    pub fn write(&self, path: &[String], content: VfsNode) -> Result<Vfs, VfsError> {
        let Some((name, parents)) = path.split_last() else {
            return match content {
                VfsNode::Dir(entries) => Ok(Self::from_entries(entries)),
                VfsNode::File(_) => Err(VfsError::RootMustBeDirectory),
            };
        };

        let mut root = Entries::clone(&self.root);
        write_into(&mut root, path, parents, name, content)?;
        Ok(Self::from_entries(root))
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn write_into(
    dir: &mut Entries,
    full_path: &[String],
    parents: &[String],
    name: &str,
    content: VfsNode,
) -> Result<(), VfsError> {
    let Some((head, rest)) = parents.split_first() else {
        dir.insert(name.to_string(), Arc::new(content));
        return Ok(());
    };

    let child = dir
        .entry(head.clone())
        .or_insert_with(|| Arc::new(VfsNode::empty_dir()));
    // Copies the node only when an older version still shares it.
    match Arc::make_mut(child) {
        VfsNode::Dir(entries) => write_into(entries, full_path, rest, name, content),
        VfsNode::File(_) => {
            let depth = full_path.len() - 1 - parents.len();
            Err(VfsError::NotADirectory(full_path[..=depth].join("/")))
        }
    }
}

pub fn path_of(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|segment| segment.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn write_creates_missing_parents() {
        let vfs = Vfs::default()
            .write(&path_of(&["a", "b", "c.txt"]), VfsNode::file("hi"))
            .unwrap();

        assert_eq!(vfs.read_file(&path_of(&["a", "b", "c.txt"])).unwrap(), "hi");
        assert!(vfs.is_dir(&path_of(&["a", "b"])));
    }

    #[test]
    fn write_leaves_previous_version_untouched() {
        let before = Vfs::seed();
        let snapshot = before.clone();
        let after = before
            .write(
                &path_of(&["home", "user", "notes.txt"]),
                VfsNode::file("rewritten"),
            )
            .unwrap();
        let after = after
            .write(&path_of(&["home", "user", "loot"]), VfsNode::empty_dir())
            .unwrap();

        assert_eq!(before, snapshot);
        assert_eq!(
            before.read_file(&path_of(&["home", "user", "notes.txt"])).unwrap(),
            "Pentesting notes..."
        );
        assert!(!before.is_dir(&path_of(&["home", "user", "loot"])));
        assert_eq!(
            after.read_file(&path_of(&["home", "user", "notes.txt"])).unwrap(),
            "rewritten"
        );
    }

    #[test]
    fn untouched_branches_are_shared() {
        let before = Vfs::seed();
        let after = before
            .write(&path_of(&["home", "user", "x.txt"]), VfsNode::file("x"))
            .unwrap();

        let etc_before = before.root.get("etc").unwrap();
        let etc_after = after.root.get("etc").unwrap();
        assert!(Arc::ptr_eq(etc_before, etc_after));
        assert!(!Arc::ptr_eq(
            before.root.get("home").unwrap(),
            after.root.get("home").unwrap()
        ));
    }

    #[test]
    fn reading_through_a_file_is_not_found() {
        let vfs = Vfs::seed();
        let err = vfs
            .read(&path_of(&["etc", "shadow", "deeper"]))
            .unwrap_err();
        assert_eq!(err, VfsError::NotFound("etc/shadow/deeper".to_string()));
    }

    #[test]
    fn writing_beneath_a_file_is_rejected() {
        let vfs = Vfs::seed();
        let err = vfs
            .write(&path_of(&["etc", "shadow", "x"]), VfsNode::file("x"))
            .unwrap_err();
        assert_eq!(err, VfsError::NotADirectory("etc/shadow".to_string()));
    }

    #[test]
    fn empty_path_addresses_the_root() {
        let vfs = Vfs::seed();
        let NodeRef::Dir(root) = vfs.read(&[]).unwrap() else {
            panic!("root must be a directory");
        };
        assert_eq!(root.keys().collect::<Vec<_>>(), vec!["etc", "home"]);

        let replaced = vfs.write(&[], VfsNode::empty_dir()).unwrap();
        assert!(replaced.is_empty());
        assert_eq!(
            vfs.write(&[], VfsNode::file("x")).unwrap_err(),
            VfsError::RootMustBeDirectory
        );
    }

    #[test]
    fn listing_enumerates_directory_keys() {
        let vfs = Vfs::seed();
        assert_eq!(
            vfs.list(&path_of(&["home", "user"])).unwrap(),
            vec!["documents", "notes.txt"]
        );
    }

    #[test]
    fn json_shape_uses_strings_for_files_and_objects_for_dirs() {
        let vfs: Vfs =
            serde_json::from_str(r#"{"home":{"user":{"a.txt":"alpha"}},"motd":"hi"}"#).unwrap();
        assert_eq!(vfs.read_file(&path_of(&["motd"])).unwrap(), "hi");
        assert_eq!(
            vfs.read_file(&path_of(&["home", "user", "a.txt"])).unwrap(),
            "alpha"
        );
        assert_eq!(
            serde_json::to_string(&vfs).unwrap(),
            r#"{"home":{"user":{"a.txt":"alpha"}},"motd":"hi"}"#
        );
    }
}
