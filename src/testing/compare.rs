//! Recursive directory-tree comparison
//!
//! Two trees are equal when every level holds the same entry names, every
//! entry has the same kind on both sides, and every file matches byte for
//! byte. The marker entry is skipped at every level: reference trees carry
//! it so version control keeps their otherwise empty directories.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Entry name ignored at every level by default
pub const DEFAULT_MARKER: &str = "gitstub";

const CHUNK: usize = 8 * 1024;

/// First difference found between two trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeMismatch {
    /// Present only in the left tree
    LeftOnly(PathBuf),
    /// Present only in the right tree
    RightOnly(PathBuf),
    /// Cannot be compared: unreadable, a file on one side and a directory on
    /// the other, or neither a file nor a directory
    Funny(PathBuf),
    /// File content differs
    ContentDiffers(PathBuf),
    /// A tree root is missing or cannot be listed
    UnreadableRoot(PathBuf),
}

impl fmt::Display for TreeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeMismatch::LeftOnly(p) => write!(f, "only in produced tree: {}", p.display()),
            TreeMismatch::RightOnly(p) => write!(f, "only in reference tree: {}", p.display()),
            TreeMismatch::Funny(p) => write!(f, "cannot compare: {}", p.display()),
            TreeMismatch::ContentDiffers(p) => write!(f, "content differs: {}", p.display()),
            TreeMismatch::UnreadableRoot(p) => {
                write!(f, "cannot read tree root: {}", p.display())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Dir,
    Other,
}

/// Compares directory trees, ignoring one marker entry name
#[derive(Debug, Clone)]
pub struct DirectoryComparator {
    marker: String,
}

impl Default for DirectoryComparator {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl DirectoryComparator {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Compare `left` against `right`
    ///
    /// Paths in the returned mismatch are relative to the tree roots.
    pub fn compare(&self, left: &Path, right: &Path) -> Result<(), TreeMismatch> {
        self.compare_level(left, right, Path::new(""))
    }

    /// Convenience wrapper returning only equality
    pub fn trees_equal(&self, left: &Path, right: &Path) -> bool {
        self.compare(left, right).is_ok()
    }

    fn compare_level(&self, left: &Path, right: &Path, rel: &Path) -> Result<(), TreeMismatch> {
        let left_names = self.entry_names(left).map_err(|_| unreadable(left, rel))?;
        let right_names = self.entry_names(right).map_err(|_| unreadable(right, rel))?;

        if let Some(name) = left_names.difference(&right_names).next() {
            return Err(TreeMismatch::LeftOnly(rel.join(name)));
        }
        if let Some(name) = right_names.difference(&left_names).next() {
            return Err(TreeMismatch::RightOnly(rel.join(name)));
        }

        // Files first, then recurse, so a shallow difference is reported
        // before anything deeper.
        let mut subdirs = Vec::new();
        for name in &left_names {
            let l = left.join(name);
            let r = right.join(name);
            let entry_rel = rel.join(name);

            match (kind_of(&l), kind_of(&r)) {
                (Some(Kind::File), Some(Kind::File)) => {
                    match files_equal(&l, &r) {
                        Ok(true) => {}
                        Ok(false) => return Err(TreeMismatch::ContentDiffers(entry_rel)),
                        Err(_) => return Err(TreeMismatch::Funny(entry_rel)),
                    }
                }
                (Some(Kind::Dir), Some(Kind::Dir)) => subdirs.push((l, r, entry_rel)),
                _ => return Err(TreeMismatch::Funny(entry_rel)),
            }
        }

        for (l, r, entry_rel) in subdirs {
            self.compare_level(&l, &r, &entry_rel)?;
        }
        Ok(())
    }

    fn entry_names(&self, dir: &Path) -> io::Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name != self.marker {
                names.insert(name);
            }
        }
        Ok(names)
    }
}

/// Mismatch for a directory that cannot be listed; roots are reported by
/// their full path since their relative path is empty
fn unreadable(dir: &Path, rel: &Path) -> TreeMismatch {
    if rel.as_os_str().is_empty() {
        TreeMismatch::UnreadableRoot(dir.to_path_buf())
    } else {
        TreeMismatch::Funny(rel.to_path_buf())
    }
}

/// Kind of an entry, following symlinks; `None` when it cannot be stat'ed
fn kind_of(path: &Path) -> Option<Kind> {
    let meta = fs::metadata(path).ok()?;
    Some(if meta.is_file() {
        Kind::File
    } else if meta.is_dir() {
        Kind::Dir
    } else {
        Kind::Other
    })
}

/// Full content comparison, never shallow
fn files_equal(left: &Path, right: &Path) -> io::Result<bool> {
    let (mut a, mut b) = (File::open(left)?, File::open(right)?);
    if a.metadata()?.len() != b.metadata()?.len() {
        return Ok(false);
    }

    let mut buf_a = vec![0u8; CHUNK];
    let mut buf_b = vec![0u8; CHUNK];
    loop {
        let n = read_full(&mut a, &mut buf_a)?;
        let m = read_full(&mut b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn mailbox(root: &Path) {
        write(root, "cur/1.mysmtp", b"From: a@b.c\r\n\r\nhello\r\n");
        fs::create_dir_all(root.join("tmp")).unwrap();
    }

    fn trees() -> (TempDir, TempDir) {
        let left = TempDir::new().unwrap();
        let right = TempDir::new().unwrap();
        mailbox(left.path());
        mailbox(right.path());
        (left, right)
    }

    #[test]
    fn test_identical_trees() {
        let (left, right) = trees();
        let cmp = DirectoryComparator::default();
        assert_eq!(cmp.compare(left.path(), right.path()), Ok(()));
        assert_eq!(cmp.compare(right.path(), left.path()), Ok(()));
    }

    #[test]
    fn test_marker_is_ignored_at_every_level() {
        let (left, right) = trees();
        write(right.path(), "gitstub", b"");
        write(right.path(), "tmp/gitstub", b"");
        write(left.path(), "cur/gitstub", b"something else");

        assert!(DirectoryComparator::default().trees_equal(left.path(), right.path()));
    }

    #[test]
    fn test_one_byte_difference() {
        let (left, right) = trees();
        write(right.path(), "cur/1.mysmtp", b"From: a@b.c\r\n\r\nhellO\r\n");

        assert_eq!(
            DirectoryComparator::default().compare(left.path(), right.path()),
            Err(TreeMismatch::ContentDiffers(PathBuf::from("cur/1.mysmtp")))
        );
    }

    #[test]
    fn test_same_size_different_content_past_first_chunk() {
        let (left, right) = trees();
        let mut big = vec![b'x'; CHUNK * 2 + 10];
        write(left.path(), "cur/big", &big);
        big[CHUNK + 5] = b'y';
        write(right.path(), "cur/big", &big);

        assert!(!DirectoryComparator::default().trees_equal(left.path(), right.path()));
    }

    #[test]
    fn test_extra_entries_on_either_side() {
        let (left, right) = trees();
        write(left.path(), "cur/2.mysmtp", b"x");
        let cmp = DirectoryComparator::default();

        assert_eq!(
            cmp.compare(left.path(), right.path()),
            Err(TreeMismatch::LeftOnly(PathBuf::from("cur/2.mysmtp")))
        );
        assert_eq!(
            cmp.compare(right.path(), left.path()),
            Err(TreeMismatch::RightOnly(PathBuf::from("cur/2.mysmtp")))
        );
    }

    #[test]
    fn test_file_versus_directory_is_funny() {
        let (left, right) = trees();
        write(left.path(), "new", b"file");
        fs::create_dir_all(right.path().join("new")).unwrap();

        assert_eq!(
            DirectoryComparator::default().compare(left.path(), right.path()),
            Err(TreeMismatch::Funny(PathBuf::from("new")))
        );
    }

    #[test]
    fn test_missing_root() {
        let (left, _right) = trees();
        let missing = left.path().join("does-not-exist");
        let mismatch = DirectoryComparator::default()
            .compare(left.path(), &missing)
            .unwrap_err();

        assert_eq!(mismatch, TreeMismatch::UnreadableRoot(missing.clone()));
        assert!(mismatch.to_string().contains("does-not-exist"));
    }

    #[test]
    fn test_custom_marker() {
        let (left, right) = trees();
        write(left.path(), ".keep", b"");
        assert!(!DirectoryComparator::default().trees_equal(left.path(), right.path()));
        assert!(DirectoryComparator::new(".keep").trees_equal(left.path(), right.path()));
    }
}
