//! Repository tree construction and traversal.
//!
//! The hosting API returns a flat, recursive listing. [`build_tree`] turns it
//! into nested [`RepositoryEntry`] values using an arena of nodes indexed by
//! path, filled in listing order. Listings are expected to name every
//! directory before its descendants; what happens to an entry whose parent
//! has not been seen is governed by [`OrphanPolicy`].

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::types::{EntryType, RepositoryEntry};

/// One record of a flat recursive listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub path: String,
    pub entry_type: EntryType,
    pub identity_hash: String,
}

impl ListedEntry {
    pub fn new(path: impl Into<String>, entry_type: EntryType, identity_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entry_type,
            identity_hash: identity_hash.into(),
        }
    }
}

/// What to do with a listed entry whose parent directory is unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Drop the entry and log a warning
    #[default]
    Skip,
    /// Fail the whole tree build
    Reject,
}

struct Node {
    entry: RepositoryEntry,
    children: Vec<usize>,
}

/// Build a nested tree from a flat listing
///
/// # Arguments
/// * `listing` - Entries in listing order, directories before their descendants
/// * `policy` - What to do with an entry whose parent is not in the listing
/// * `content_url` - Called once per file path; returns its raw content address
///
/// Returns the children of the synthetic root.
pub fn build_tree<F>(
    listing: Vec<ListedEntry>,
    policy: OrphanPolicy,
    mut content_url: F,
) -> Result<Vec<RepositoryEntry>>
where
    F: FnMut(&str) -> Result<String>,
{
    let mut nodes = vec![Node {
        entry: RepositoryEntry {
            name: String::new(),
            path: String::new(),
            entry_type: EntryType::Directory,
            content_url: None,
            identity_hash: String::new(),
            children: None,
        },
        children: Vec::new(),
    }];
    let mut index: HashMap<String, usize> = HashMap::from([(String::new(), 0)]);

    for item in listing {
        let path = item.path.trim_matches('/');
        if path.is_empty() {
            continue;
        }
        if index.contains_key(path) {
            tracing::warn!(path, "duplicate path in tree listing, keeping the first");
            continue;
        }

        let (parent_path, name) = path.rsplit_once('/').unwrap_or(("", path));
        let parent = match index.get(parent_path) {
            Some(&id) if nodes[id].entry.is_directory() => id,
            _ => match policy {
                OrphanPolicy::Skip => {
                    tracing::warn!(path, parent = parent_path, "skipping tree entry with unknown parent");
                    continue;
                }
                OrphanPolicy::Reject => {
                    return Err(SessionError::transport(format!(
                        "tree listing names '{}' before its parent directory '{}'",
                        path, parent_path
                    )));
                }
            },
        };

        let content_url = match item.entry_type {
            EntryType::File => Some(content_url(path)?),
            EntryType::Directory => None,
        };

        let id = nodes.len();
        nodes.push(Node {
            entry: RepositoryEntry {
                name: name.to_string(),
                path: path.to_string(),
                entry_type: item.entry_type,
                content_url,
                identity_hash: item.identity_hash,
                children: None,
            },
            children: Vec::new(),
        });
        nodes[parent].children.push(id);
        index.insert(path.to_string(), id);
    }

    Ok(assemble(&mut nodes, 0))
}

fn assemble(nodes: &mut [Node], id: usize) -> Vec<RepositoryEntry> {
    let child_ids = std::mem::take(&mut nodes[id].children);
    let mut entries: Vec<RepositoryEntry> = child_ids
        .into_iter()
        .map(|child| {
            let mut entry = nodes[child].entry.clone();
            if entry.is_directory() {
                entry.children = Some(assemble(nodes, child));
            }
            entry
        })
        .collect();
    entries.sort_by(compare_entries);
    entries
}

/// Directories before files, then by name
pub fn compare_entries(a: &RepositoryEntry, b: &RepositoryEntry) -> Ordering {
    match (a.entry_type, b.entry_type) {
        (EntryType::Directory, EntryType::File) => Ordering::Less,
        (EntryType::File, EntryType::Directory) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    }
}

/// Depth-first, pre-order list of every path in the tree
pub fn flatten_paths(entries: &[RepositoryEntry]) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(entries, &mut paths);
    paths
}

fn collect_paths(entries: &[RepositoryEntry], out: &mut Vec<String>) {
    for entry in entries {
        out.push(entry.path.clone());
        collect_paths(entry.children(), out);
    }
}

/// Look up an entry by its full path
pub fn find_entry<'a>(entries: &'a [RepositoryEntry], path: &str) -> Option<&'a RepositoryEntry> {
    let path = path.trim_matches('/');
    let mut level = entries;
    let mut found = None;
    let mut prefix_len = 0;

    for component in path.split('/') {
        prefix_len += component.len();
        let prefix = &path[..prefix_len];
        let entry = level.iter().find(|e| e.path == prefix)?;
        level = entry.children();
        found = Some(entry);
        prefix_len += 1;
    }

    found
}

/// Number of file entries in the tree
pub fn count_files(entries: &[RepositoryEntry]) -> usize {
    entries
        .iter()
        .map(|e| if e.is_file() { 1 } else { count_files(e.children()) })
        .sum()
}

/// Indented text rendering of the tree, one entry per line
pub fn render_tree(entries: &[RepositoryEntry]) -> String {
    let mut out = String::new();
    render_level(entries, 0, &mut out);
    out
}

fn render_level(entries: &[RepositoryEntry], depth: usize, out: &mut String) {
    let mut sorted: Vec<&RepositoryEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| compare_entries(a, b));

    for entry in sorted {
        let icon = if entry.is_directory() { "📁" } else { "📄" };
        out.push_str(&"  ".repeat(depth));
        out.push_str(icon);
        out.push(' ');
        out.push_str(&entry.name);
        out.push('\n');
        render_level(entry.children(), depth + 1, out);
    }
}
