//! Interface to the file-system collaborator.
//!
//! The core never reads or writes files; it only owns references to open
//! files and a working directory, duplicates them on fork, and releases
//! them on exit. Reference counting is the `Arc` itself, so "duplicate"
//! is a clone and "close" is a drop, and tests can observe the counts.

use alloc::sync::Arc;

use crate::config::NOFILE;

/// An open file as the file system sees it. Opaque to this core.
pub trait FileObject: Send + Sync {}

/// A directory handle (a process's working directory). Opaque here.
pub trait Directory: Send + Sync {}

pub type FileRef = Arc<dyn FileObject>;
pub type DirRef = Arc<dyn Directory>;

/// A process's fixed table of open-file slots.
pub struct FileTable {
    slots: [Option<FileRef>; NOFILE],
}

impl FileTable {
    pub const fn new() -> Self {
        FileTable {
            slots: [const { None }; NOFILE],
        }
    }

    /// Install a file in the lowest free slot, returning its index.
    pub fn install(&mut self, file: FileRef) -> Option<usize> {
        for (fd, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return Some(fd);
            }
        }
        None
    }

    pub fn get(&self, fd: usize) -> Option<&FileRef> {
        self.slots.get(fd).and_then(|s| s.as_ref())
    }

    /// Close one slot, releasing its reference.
    pub fn close(&mut self, fd: usize) -> Option<FileRef> {
        self.slots.get_mut(fd).and_then(|s| s.take())
    }

    /// Release every open file (process exit).
    pub fn close_all(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    /// Duplicate every open handle for a child (fork). Each clone bumps
    /// the underlying reference count.
    pub fn duplicate(&self) -> FileTable {
        let mut table = FileTable::new();
        for (fd, slot) in self.slots.iter().enumerate() {
            table.slots[fd] = slot.clone();
        }
        table
    }

    /// Number of occupied slots.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;

    struct Stub;
    impl FileObject for Stub {}

    #[test]
    fn duplicate_bumps_reference_counts() {
        let file: FileRef = Arc::new(Stub);
        let mut table = FileTable::new();
        table.install(file.clone()).unwrap();
        assert_eq!(Arc::strong_count(&file), 2);

        let copy = table.duplicate();
        assert_eq!(Arc::strong_count(&file), 3);
        assert_eq!(copy.open_count(), 1);

        drop(copy);
        assert_eq!(Arc::strong_count(&file), 2);
    }

    #[test]
    fn close_all_releases_everything() {
        let file: FileRef = Arc::new(Stub);
        let mut table = FileTable::new();
        table.install(file.clone()).unwrap();
        table.install(file.clone()).unwrap();
        assert_eq!(table.open_count(), 2);
        table.close_all();
        assert_eq!(table.open_count(), 0);
        assert_eq!(Arc::strong_count(&file), 1);
    }
}
