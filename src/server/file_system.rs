use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::SystemTime;
use super::content_manager::ContentManager;

/// `ContentManager` backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemAdapter;

impl ContentManager for FileSystemAdapter {
    type Content = File;

    fn open_for_read(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn stat_size(&self, path: &Path) -> io::Result<u64> {
        fs::metadata(path).map(|md| md.len())
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|md| md.modified()).ok()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|md| md.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn list_entries(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}
