use std::collections::HashMap;

use crate::error::{Result, VdrvError};

use super::structures::Entry;

/// All entries of an archive, in chain order, with parent/child lookups.
///
/// Entries live in one contiguous vector. Two indexes are built once after
/// the chain has been read: record offset to position, and parent offset to
/// the positions of its children. Children keep their chain order.
#[derive(Debug, Default)]
pub struct DriveMetadata {
    entries: Vec<Entry>,
    by_offset: HashMap<u32, usize>,
    children: HashMap<u32, Vec<usize>>,
}

impl DriveMetadata {
    /// Index a fully parsed chain.
    ///
    /// # Errors
    ///
    /// Two records at the same offset cannot come from a real chain walk
    /// and are rejected as [`VdrvError::Malformed`].
    pub fn new(entries: Vec<Entry>) -> Result<Self> {
        let mut by_offset = HashMap::with_capacity(entries.len());
        let mut children: HashMap<u32, Vec<usize>> = HashMap::new();

        for (index, entry) in entries.iter().enumerate() {
            if by_offset.insert(entry.entry_offset, index).is_some() {
                return Err(VdrvError::Malformed(format!(
                    "duplicate record offset 0x{:X}",
                    entry.entry_offset
                )));
            }
            children.entry(entry.parent_offset).or_default().push(index);
        }

        Ok(Self {
            entries,
            by_offset,
            children,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entry at a position in chain order.
    pub fn entry_at(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Entry whose record sits at `offset`.
    pub fn by_offset(&self, offset: u32) -> Option<&Entry> {
        self.by_offset.get(&offset).map(|&i| &self.entries[i])
    }

    /// Top-level directories: directory entries without a parent.
    pub fn root_entries(&self) -> Vec<&Entry> {
        self.indexed_children(0)
            .filter(|e| e.is_directory())
            .collect()
    }

    /// Entries whose parent is `entry`, in chain order.
    pub fn child_entries(&self, entry: &Entry) -> Vec<&Entry> {
        if entry.entry_offset == 0 {
            // An offset of 0 means "no parent", not a record.
            return Vec::new();
        }
        self.indexed_children(entry.entry_offset).collect()
    }

    fn indexed_children(&self, parent: u32) -> impl Iterator<Item = &Entry> {
        self.children
            .get(&parent)
            .into_iter()
            .flatten()
            .map(|&i| &self.entries[i])
    }

    /// Slash-separated archive path of `entry`, built from its ancestors.
    ///
    /// Returns `None` if an ancestor is missing or the parent links loop.
    pub fn path_of(&self, entry: &Entry) -> Option<String> {
        let mut parts = vec![entry.name().into_owned()];
        let mut parent = entry.parent_offset;

        while parent != 0 {
            if parts.len() > self.entries.len() {
                return None;
            }
            let p = self.by_offset(parent)?;
            parts.push(p.name().into_owned());
            parent = p.parent_offset;
        }

        parts.reverse();
        Some(parts.join("/"))
    }

    /// Check that every parent link lands on a directory and that no parent
    /// chain loops.
    ///
    /// Extraction only ever walks down from [`root_entries`](Self::root_entries),
    /// so it terminates on archives that fail this check; entries that are
    /// not reachable from a root are simply not extracted.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for entry in &self.entries {
            if entry.parent_offset == 0 {
                continue;
            }
            match self.by_offset(entry.parent_offset) {
                None => problems.push(format!(
                    "{} (0x{:X}) points at missing parent 0x{:X}",
                    entry.name(),
                    entry.entry_offset,
                    entry.parent_offset
                )),
                Some(parent) if !parent.is_directory() => problems.push(format!(
                    "{} (0x{:X}) has file {} as parent",
                    entry.name(),
                    entry.entry_offset,
                    parent.name()
                )),
                Some(_) => {}
            }
        }

        for entry in &self.entries {
            if self.has_parent_cycle(entry) {
                problems.push(format!(
                    "{} (0x{:X}) is part of a parent cycle",
                    entry.name(),
                    entry.entry_offset
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(VdrvError::Malformed(problems.join("; ")))
        }
    }

    fn has_parent_cycle(&self, entry: &Entry) -> bool {
        // Floyd's tortoise and hare over the parent links.
        let step = |offset: u32| -> Option<u32> {
            match self.by_offset(offset)?.parent_offset {
                0 => None,
                p => Some(p),
            }
        };

        let mut slow = Some(entry.entry_offset);
        let mut fast = step(entry.entry_offset);

        while let (Some(s), Some(f)) = (slow, fast) {
            if s == f {
                return true;
            }
            slow = step(s);
            fast = step(f).and_then(step);
        }

        false
    }
}
