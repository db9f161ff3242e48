//! EPUB reader: extract the archive, locate and parse the package document,
//! and expose metadata, cover and reading order for a viewer.

pub mod container;
pub mod cover;
pub mod navigator;
pub mod package;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::{self, ExtractTarget, ExtractedContent, ExtractionCache, Extractor};
use crate::error::EpubError;
use crate::location::{parent_prefix, resolve_href, Location};
use crate::progress::ProgressHandler;
use crate::security::SecurityLimits;

pub use container::parse_container;
pub use cover::get_cover;
pub use navigator::{build_spine, DocumentSpine};
pub use package::{get_meta, get_meta_all, parse_package, ManifestItem, PackageModel};

/// Where an opened book's entries are materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// A per-file-name directory under the cache root, reused across opens.
    #[default]
    Directory,
    /// An in-memory entry map, dropped with the container.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub cache_dir: PathBuf,
    pub mode: ExtractionMode,
    pub limits: SecurityLimits,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            cache_dir: crate::config::default_cache_dir(),
            mode: ExtractionMode::default(),
            limits: SecurityLimits::default(),
        }
    }
}

/// One opened EPUB file.
#[derive(Debug, Clone)]
pub struct EpubContainer {
    source_path: PathBuf,
    content: ExtractedContent,
    package_path: String,
    package_prefix: String,
    package: PackageModel,
    spine: DocumentSpine,
    cover: Option<Location>,
}

impl EpubContainer {
    pub fn open(path: impl AsRef<Path>, opts: &OpenOptions) -> Result<Self, EpubError> {
        Self::open_with_progress(path, opts, None)
    }

    pub fn open_with_progress(
        path: impl AsRef<Path>,
        opts: &OpenOptions,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<Self, EpubError> {
        let path = path.as_ref();
        match opts.mode {
            ExtractionMode::Directory => {
                let cache = ExtractionCache::new(&opts.cache_dir, opts.limits.clone());
                Self::open_cached(path, &cache, progress)
            }
            ExtractionMode::Memory => {
                let content = archive::extract(path, ExtractTarget::Memory, &opts.limits, progress)?;
                Self::from_content(path, content)
            }
        }
    }

    /// Open through an existing extraction cache.
    pub fn open_cached<E: Extractor>(
        path: impl AsRef<Path>,
        cache: &ExtractionCache<E>,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<Self, EpubError> {
        let path = path.as_ref();
        let content = cache.get_or_extract(path, progress)?;
        Self::from_content(path, content)
    }

    /// Parse already extracted content.
    pub fn from_content(source_path: impl Into<PathBuf>, content: ExtractedContent) -> Result<Self, EpubError> {
        let source_path = source_path.into();
        let package_path = parse_container(&content)?;
        let package_prefix = parent_prefix(&package_path).to_string();
        let package = parse_package(&content, &package_path)?;
        let spine = build_spine(&package, &content, &package_prefix);
        let cover = get_cover(&package, &content, &package_prefix);

        tracing::debug!(
            "Opened {}: package {}, {} spine documents",
            source_path.display(),
            package_path,
            spine.len()
        );

        Ok(Self {
            source_path,
            content,
            package_path,
            package_prefix,
            package,
            spine,
            cover,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn content(&self) -> &ExtractedContent {
        &self.content
    }

    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    pub fn package_prefix(&self) -> &str {
        &self.package_prefix
    }

    pub fn package(&self) -> &PackageModel {
        &self.package
    }

    pub fn spine(&self) -> &DocumentSpine {
        &self.spine
    }

    pub fn meta(&self, field: &str) -> Option<&str> {
        get_meta(&self.package, field)
    }

    pub fn meta_all(&self, field: &str) -> &[String] {
        get_meta_all(&self.package, field)
    }

    pub fn cover(&self) -> Option<&Location> {
        self.cover.as_ref()
    }

    /// Location of the current document in reading order.
    pub fn uri(&self) -> Option<&str> {
        self.spine.current()
    }

    pub fn set_uri(&mut self, uri: &str) {
        self.spine.set_position_by_uri(uri);
    }

    pub fn next(&mut self) {
        self.spine.next();
    }

    pub fn previous(&mut self) {
        self.spine.previous();
    }

    pub fn is_first(&self) -> bool {
        self.spine.is_first()
    }

    pub fn is_last(&self) -> bool {
        self.spine.is_last()
    }

    /// Read a resource by href relative to the package document.
    pub fn read_resource(&self, href: &str) -> Result<Vec<u8>, EpubError> {
        let name = resolve_href(&self.package_prefix, href)
            .ok_or_else(|| EpubError::ResourceNotFound(href.to_string()))?;
        self.content.read(&name)
    }
}
