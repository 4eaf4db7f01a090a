//! Virtual filesystem over a directory of archives
//!
//! Every archive found in a search directory is loaded and folded into one
//! case-insensitive tree. Archives are folded in priority order so that the
//! contents of earlier archives win over later ones unless overwriting is
//! requested.
//!
//! # Examples
//!
//! ```no_run
//! use taforge::vfs::{BuildOptions, FileSystem};
//! use taforge::vfs::FileRead;
//!
//! let fs = FileSystem::build("/games/ta", &BuildOptions::default())?;
//! let mut handle = fs.open_file("units/ARMCOM.FBI")?;
//! let text = handle.read_to_end_data()?;
//! # Ok::<(), taforge::ForgeError>(())
//! ```

mod handle;

pub use handle::{FileRead, MemoryHandle, ReadHandle};

use crate::hpi::{self, ArchiveDirectory, ArchiveFile, ArchiveItem};
use crate::{ForgeError, Result};
use log::{debug, trace};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Archive extensions in ascending priority order
pub const WEIGHTED_ARCHIVE_EXTENSIONS: [&str; 5] = ["ufo", "gp3", "ccx", "gpf", "hpi"];

/// Options controlling how a [`FileSystem`] is assembled
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Archive extensions to load, in the order archives are folded
    pub extensions: Vec<String>,
    /// Let later archives replace entries of earlier ones
    pub overwrite: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            extensions: WEIGHTED_ARCHIVE_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            overwrite: false,
        }
    }
}

impl BuildOptions {
    /// Fold weight of an archive path; unlisted extensions weigh -1
    pub fn weight(&self, path: &Path) -> i64 {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return -1;
        };
        self.extensions
            .iter()
            .position(|allowed| allowed.eq_ignore_ascii_case(ext))
            .map_or(-1, |index| index as i64)
    }

    fn allows(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
    }
}

/// A file in the filesystem together with the archive it lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsFile {
    /// Archive metadata used for extraction
    pub info: ArchiveFile,
    /// Location of the containing archive
    pub archive: PathBuf,
}

impl VfsFile {
    /// File name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Size of the extracted data
    pub fn size(&self) -> usize {
        self.info.size
    }

    /// True if the file name ends with `.ext` (compared case-insensitively)
    pub fn has_extension(&self, ext: &str) -> bool {
        self.info.has_extension(ext)
    }

    /// File name without its extension
    pub fn base_name(&self) -> &str {
        self.info.base_name()
    }
}

/// A node of the filesystem tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A file backed by an archive
    File(VfsFile),
    /// A directory of further nodes
    Directory(VfsDirectory),
}

impl Node {
    /// Name of the node within its directory
    pub fn name(&self) -> &str {
        match self {
            Node::File(file) => file.name(),
            Node::Directory(dir) => &dir.name,
        }
    }

    /// The file, if this node is one
    pub fn as_file(&self) -> Option<&VfsFile> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    /// The directory, if this node is one
    pub fn as_directory(&self) -> Option<&VfsDirectory> {
        match self {
            Node::File(_) => None,
            Node::Directory(dir) => Some(dir),
        }
    }

    fn from_archive_item(item: &ArchiveItem, archive: &Path) -> Self {
        match item {
            ArchiveItem::File(info) => Node::File(VfsFile {
                info: info.clone(),
                archive: archive.to_path_buf(),
            }),
            ArchiveItem::Directory(dir) => {
                Node::Directory(VfsDirectory::from_archive_directory(dir, archive))
            }
        }
    }
}

fn fold_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// A directory whose children are looked up case-insensitively
///
/// Children iterate in case-folded name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VfsDirectory {
    /// Directory name; the root directory has an empty name
    pub name: String,
    children: BTreeMap<String, Node>,
}

impl VfsDirectory {
    /// Create an empty directory
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: BTreeMap::new(),
        }
    }

    /// Mirror an archive directory, tagging every file with its archive
    pub fn from_archive_directory(dir: &ArchiveDirectory, archive: &Path) -> Self {
        let mut out = Self::new(dir.name.clone());
        for item in &dir.items {
            out.insert(Node::from_archive_item(item, archive));
        }
        out
    }

    /// Insert a node, replacing any child with the same folded name
    pub fn insert(&mut self, node: Node) -> Option<Node> {
        self.children.insert(fold_name(node.name()), node)
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True if the directory has no children
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterate over direct children
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.children.values()
    }

    /// Look up a direct child by name, ignoring ASCII case
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children
            .get(&fold_name(name))
            .filter(|node| node.name().eq_ignore_ascii_case(name))
    }

    /// Look up a direct child directory
    pub fn directory(&self, name: &str) -> Option<&VfsDirectory> {
        self.get(name).and_then(Node::as_directory)
    }

    /// Look up a direct child file
    pub fn file(&self, name: &str) -> Option<&VfsFile> {
        self.get(name).and_then(Node::as_file)
    }

    /// Direct child files with the given extension
    pub fn files_with_extension<'a>(&'a self, ext: &'a str) -> impl Iterator<Item = &'a VfsFile> {
        self.iter()
            .filter_map(Node::as_file)
            .filter(move |file| file.has_extension(ext))
    }

    /// Fold `incoming` into this directory
    ///
    /// An empty directory is replaced by `incoming` outright. Existing files
    /// are kept unless `overwrite` is set; directories present on both sides
    /// are merged recursively; a directory arriving where a file exists only
    /// replaces it with `overwrite`.
    pub fn merge(self, incoming: VfsDirectory, overwrite: bool) -> VfsDirectory {
        if self.children.is_empty() {
            return incoming;
        }

        let mut merged = self;
        for (key, node) in incoming.children {
            match merged.children.remove(&key) {
                None => {
                    merged.children.insert(key, node);
                }
                Some(Node::Directory(existing)) => match node {
                    Node::Directory(dir) => {
                        trace!("Merging directory {}", dir.name);
                        merged
                            .children
                            .insert(key, Node::Directory(existing.merge(dir, overwrite)));
                    }
                    file @ Node::File(_) => {
                        let keep = if overwrite {
                            file
                        } else {
                            Node::Directory(existing)
                        };
                        merged.children.insert(key, keep);
                    }
                },
                Some(existing @ Node::File(_)) => {
                    if overwrite {
                        trace!("Replacing {} with later entry", existing.name());
                        merged.children.insert(key, node);
                    } else {
                        merged.children.insert(key, existing);
                    }
                }
            }
        }
        merged
    }

    /// Resolve a `/`-separated path relative to this directory
    ///
    /// A single leading `/` is ignored. Components are matched
    /// case-insensitively; an empty path resolves to nothing.
    pub fn resolve(&self, path: &str) -> Option<&Node> {
        let mut components = path.split('/').peekable();
        if components.peek() == Some(&"") {
            components.next();
        }

        let mut current = self;
        let mut found = None;
        while let Some(component) = components.next() {
            let node = current.get(component)?;
            if components.peek().is_none() {
                found = Some(node);
            } else {
                current = node.as_directory()?;
            }
        }
        found
    }

    /// Visit every file below this directory together with its full path
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &VfsFile),
    {
        fn recurse<F: FnMut(&str, &VfsFile)>(dir: &VfsDirectory, prefix: &str, visit: &mut F) {
            for node in dir.iter() {
                let path = if prefix.is_empty() {
                    node.name().to_string()
                } else {
                    format!("{}/{}", prefix, node.name())
                };
                match node {
                    Node::File(file) => visit(&path, file),
                    Node::Directory(sub) => recurse(sub, &path, visit),
                }
            }
        }
        recurse(self, "", &mut visit);
    }
}

/// A merged, case-insensitive view over one or more archives
#[derive(Debug, Clone, Default)]
pub struct FileSystem {
    root: VfsDirectory,
}

impl FileSystem {
    /// A filesystem with no files or directories
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every archive in `search_dir` and fold them into one tree
    ///
    /// Subdirectories of `search_dir` are not searched.
    pub fn build<P: AsRef<Path>>(search_dir: P, options: &BuildOptions) -> Result<Self> {
        let mut archives: Vec<PathBuf> = fs::read_dir(search_dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && options.allows(path))
            .collect();

        archives.sort_by(|a, b| {
            options
                .weight(a)
                .cmp(&options.weight(b))
                .then_with(|| a.file_name().cmp(&b.file_name()))
        });

        let mut root = VfsDirectory::default();
        for path in &archives {
            debug!("Adding archive {}", path.display());
            let dir = hpi::load_directory(path)?;
            root = root.merge(
                VfsDirectory::from_archive_directory(&dir, path),
                options.overwrite,
            );
        }

        debug!(
            "Filesystem built from {} archives in {}",
            archives.len(),
            search_dir.as_ref().display()
        );
        Ok(Self { root })
    }

    /// A filesystem exposing the contents of a single archive
    pub fn from_archive<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dir = hpi::load_directory(path)?;
        Ok(Self {
            root: VfsDirectory::from_archive_directory(&dir, path),
        })
    }

    /// Wrap an already assembled tree
    pub fn from_root(root: VfsDirectory) -> Self {
        Self { root }
    }

    /// The root directory
    pub fn root(&self) -> &VfsDirectory {
        &self.root
    }

    /// Resolve a path to a node
    pub fn resolve(&self, path: &str) -> Option<&Node> {
        self.root.resolve(path)
    }

    /// Resolve a path to a node, failing with [`ForgeError::NotFound`]
    pub fn try_resolve(&self, path: &str) -> Result<&Node> {
        self.resolve(path)
            .ok_or_else(|| ForgeError::NotFound(path.to_string()))
    }

    /// Resolve a path to a directory
    pub fn directory(&self, path: &str) -> Option<&VfsDirectory> {
        self.resolve(path).and_then(Node::as_directory)
    }

    /// Open the file at `path` for reading
    pub fn open_file(&self, path: &str) -> Result<ReadHandle> {
        match self.try_resolve(path)? {
            Node::File(file) => Ok(ReadHandle::new(file.clone())),
            Node::Directory(_) => Err(ForgeError::PathIsNotFile(path.to_string())),
        }
    }

    /// Open an already resolved file
    pub fn open(&self, file: &VfsFile) -> ReadHandle {
        ReadHandle::new(file.clone())
    }

    /// Visit every file in the filesystem with its full path
    pub fn walk<F: FnMut(&str, &VfsFile)>(&self, visit: F) {
        self.root.walk(visit)
    }
}
