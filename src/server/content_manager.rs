use std::io::{self, Read};
use std::path::Path;
use std::time::SystemTime;

/// The filesystem operations the static file service relies on.
pub trait ContentManager: Send + Sync {
    type Content: Read;

    fn open_for_read(&self, path: &Path) -> io::Result<Self::Content>;
    fn stat_size(&self, path: &Path) -> io::Result<u64>;
    fn modified(&self, path: &Path) -> Option<SystemTime>;
    fn is_directory(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_symlink(&self, path: &Path) -> bool;
    /// Names of the entries directly inside `path`, in no particular order.
    fn list_entries(&self, path: &Path) -> io::Result<Vec<String>>;
}
