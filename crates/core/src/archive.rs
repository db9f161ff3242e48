//! EPUB archive extraction: ZIP → directory on disk or in-memory entry map,
//! plus the per-file-name extraction cache.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{EpubError, SecurityError};
use crate::location::Location;
use crate::progress::{emit_progress, ProgressHandler};
use crate::security::{self, SecurityLimits};

/// Where extracted entries are materialized.
#[derive(Debug, Clone, Copy)]
pub enum ExtractTarget<'a> {
    Directory(&'a Path),
    Memory,
}

/// The entries of an extracted archive, addressed by archive-internal name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedContent {
    Directory(PathBuf),
    Memory(BTreeMap<String, Vec<u8>>),
}

impl ExtractedContent {
    /// Read an entry's bytes. A missing entry is `ResourceNotFound`, as is a
    /// name that would leave the extraction root.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, EpubError> {
        match self {
            ExtractedContent::Directory(_) if !is_archive_relative(name) => {
                Err(EpubError::ResourceNotFound(name.to_string()))
            }
            ExtractedContent::Directory(root) => match fs::read(root.join(name)) {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(EpubError::ResourceNotFound(name.to_string()))
                }
                Err(e) => Err(EpubError::Io(e)),
            },
            ExtractedContent::Memory(entries) => entries
                .get(name)
                .cloned()
                .ok_or_else(|| EpubError::ResourceNotFound(name.to_string())),
        }
    }

    /// Read an entry as text. Invalid UTF-8 is replaced rather than rejected.
    pub fn read_to_string(&self, name: &str) -> Result<String, EpubError> {
        let bytes = self.read(name)?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Where an entry lives, whether or not it exists.
    pub fn locate(&self, name: &str) -> Location {
        match self {
            ExtractedContent::Directory(root) => {
                let mut path = root.clone();
                path.extend(name.split('/'));
                Location::File(path)
            }
            ExtractedContent::Memory(_) => Location::Entry(name.to_string()),
        }
    }

    /// Directory root for disk extractions.
    pub fn root(&self) -> Option<&Path> {
        match self {
            ExtractedContent::Directory(root) => Some(root),
            ExtractedContent::Memory(_) => None,
        }
    }
}

/// Relative, with no `..` segment: joining it to a root stays under that root.
fn is_archive_relative(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && !name.starts_with('\\')
        && !Path::new(name).is_absolute()
        && !name.split(['/', '\\']).any(|segment| segment == "..")
}

/// Extract every entry of the ZIP archive at `archive_path`.
///
/// Directory extraction writes into a staging directory next to the target
/// and renames it into place once every entry succeeded, replacing any
/// existing directory at the target.
pub fn extract(
    archive_path: &Path,
    target: ExtractTarget<'_>,
    limits: &SecurityLimits,
    progress: Option<&dyn ProgressHandler>,
) -> Result<ExtractedContent, EpubError> {
    let source = archive_path.display().to_string();
    let file = File::open(archive_path).map_err(|e| EpubError::InvalidArchive {
        path: source.clone(),
        detail: e.to_string(),
    })?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| EpubError::InvalidArchive {
            path: source.clone(),
            detail: e.to_string(),
        })?;

    security::check_entry_count(archive.len() as u64, limits)?;

    match target {
        ExtractTarget::Memory => {
            let mut entries = BTreeMap::new();
            for_each_entry(&mut archive, &source, limits, progress, |entry| {
                if let Some(data) = entry.data {
                    entries.insert(entry.name, data);
                }
                Ok(())
            })?;
            tracing::debug!("Extracted {} entries of {} into memory", entries.len(), source);
            Ok(ExtractedContent::Memory(entries))
        }
        ExtractTarget::Directory(dest) => {
            let staging = StagingDir::create(dest)?;
            for_each_entry(&mut archive, &source, limits, progress, |entry| {
                write_entry(staging.path(), entry)
            })?;
            staging.commit(dest)?;
            tracing::info!("Extracted {} to {}", source, dest.display());
            Ok(ExtractedContent::Directory(dest.to_path_buf()))
        }
    }
}

/// One archive entry, read and checked.
struct Entry {
    name: String,
    /// Entry name as a relative path, `None` if it cannot be enclosed.
    enclosed: Option<PathBuf>,
    unix_mode: Option<u32>,
    /// File contents; `None` for directory entries.
    data: Option<Vec<u8>>,
}

fn for_each_entry<R, F>(
    archive: &mut ZipArchive<R>,
    source: &str,
    limits: &SecurityLimits,
    progress: Option<&dyn ProgressHandler>,
    mut handle: F,
) -> Result<(), EpubError>
where
    R: Read + Seek,
    F: FnMut(Entry) -> Result<(), EpubError>,
{
    let total = archive.len() as u64;
    let mut total_size = 0u64;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| EpubError::CorruptArchive {
            entry: format!("#{i}"),
            detail: e.to_string(),
        })?;
        let name = file.name().to_string();

        security::check_entry(&name, file.compressed_size(), file.size(), limits)?;
        total_size = total_size.saturating_add(file.size());
        security::check_total_size(total_size, limits)?;

        let data = if file.is_dir() {
            None
        } else {
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)
                .map_err(|e| EpubError::CorruptArchive {
                    entry: name.clone(),
                    detail: e.to_string(),
                })?;
            Some(buf)
        };
        let entry = Entry {
            enclosed: file.enclosed_name(),
            unix_mode: file.unix_mode(),
            name,
            data,
        };
        drop(file);

        emit_progress(progress, source, i as u64 + 1, total, &entry.name);
        handle(entry)?;
    }

    Ok(())
}

fn write_entry(root: &Path, entry: Entry) -> Result<(), EpubError> {
    let relative = entry
        .enclosed
        .ok_or_else(|| SecurityError::PathTraversal {
            path: entry.name.clone(),
        })?;
    let out_path = root.join(relative);

    let Some(data) = entry.data else {
        fs::create_dir_all(&out_path)?;
        return Ok(());
    };

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&out_path, data)?;

    #[cfg(unix)]
    if let Some(mode) = entry.unix_mode {
        use std::os::unix::fs::PermissionsExt;
        // Owner keeps read/write so the cache stays usable.
        fs::set_permissions(&out_path, fs::Permissions::from_mode((mode & 0o777) | 0o600))?;
    }

    Ok(())
}

/// A sibling directory entries are written into before the final rename.
/// Removed on drop unless committed.
struct StagingDir {
    path: PathBuf,
    committed: bool,
}

impl StagingDir {
    fn create(dest: &Path) -> Result<Self, EpubError> {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "extract".to_string());
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let path = parent.join(format!(".{name}.partial"));
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir(&path)?;
        Ok(Self {
            path,
            committed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self, dest: &Path) -> Result<(), EpubError> {
        if dest.exists() {
            fs::remove_dir_all(dest)?;
        }
        fs::rename(&self.path, dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                tracing::warn!("Could not remove staging directory {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Performs the actual extraction on behalf of an [`ExtractionCache`].
pub trait Extractor {
    fn extract(
        &self,
        archive_path: &Path,
        target: ExtractTarget<'_>,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<ExtractedContent, EpubError>;
}

/// The ZIP extractor, bounded by security limits.
#[derive(Debug, Clone, Default)]
pub struct ZipExtractor {
    pub limits: SecurityLimits,
}

impl ZipExtractor {
    pub fn new(limits: SecurityLimits) -> Self {
        Self { limits }
    }
}

impl Extractor for ZipExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        target: ExtractTarget<'_>,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<ExtractedContent, EpubError> {
        extract(archive_path, target, &self.limits, progress)
    }
}

/// Extracts each archive at most once per file name.
///
/// The cache directory of `/any/where/Book.epub` is `<root>/Book.epub`. If it
/// already exists it is reused as is; the source file is not consulted again,
/// so a different archive with the same name yields the stale content.
#[derive(Debug, Clone)]
pub struct ExtractionCache<E = ZipExtractor> {
    root: PathBuf,
    extractor: E,
}

impl ExtractionCache<ZipExtractor> {
    pub fn new(root: impl Into<PathBuf>, limits: SecurityLimits) -> Self {
        Self::with_extractor(root, ZipExtractor::new(limits))
    }
}

impl<E: Extractor> ExtractionCache<E> {
    pub fn with_extractor(root: impl Into<PathBuf>, extractor: E) -> Self {
        Self {
            root: root.into(),
            extractor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Cache directory for an archive, keyed by its base name.
    pub fn cache_dir_for(&self, archive_path: &Path) -> Result<PathBuf, EpubError> {
        let name = archive_path
            .file_name()
            .ok_or_else(|| EpubError::InvalidArchive {
                path: archive_path.display().to_string(),
                detail: "path has no file name".to_string(),
            })?;
        Ok(self.root.join(name))
    }

    /// Reuse the cached extraction of `archive_path`, extracting first if
    /// there is none.
    pub fn get_or_extract(
        &self,
        archive_path: &Path,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<ExtractedContent, EpubError> {
        let dir = self.cache_dir_for(archive_path)?;
        if dir.is_dir() {
            tracing::debug!("Reusing cached extraction {}", dir.display());
            return Ok(ExtractedContent::Directory(dir));
        }
        self.extractor
            .extract(archive_path, ExtractTarget::Directory(&dir), progress)
    }
}
