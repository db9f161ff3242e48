//! The user's book collection: an in-memory list of entries mirrored to a
//! [`BookStore`], with a case-insensitive author/title filter.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::epub::{EpubContainer, OpenOptions};
use crate::error::{EpubError, StoreError};
use crate::store::BookStore;

/// One row of the collection. `path` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub author: Option<String>,
    pub title: Option<String>,
    pub path: PathBuf,
}

impl CollectionEntry {
    /// Entry for an opened book, from its first creator and title.
    pub fn from_epub(epub: &EpubContainer) -> Self {
        Self {
            author: epub.meta("creator").map(str::to_string),
            title: epub.meta("title").map(str::to_string),
            path: epub.source_path().to_path_buf(),
        }
    }

    /// Whether this entry passes the filter `term`.
    ///
    /// An entry missing its author or title always passes, as does every
    /// entry when `term` is empty.
    pub fn matches(&self, term: &str) -> bool {
        if term.is_empty() {
            return true;
        }
        let (Some(author), Some(title)) = (&self.author, &self.title) else {
            return true;
        };
        let term = term.to_lowercase();
        author.to_lowercase().contains(&term) || title.to_lowercase().contains(&term)
    }
}

/// Change notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    Added(CollectionEntry),
    /// An entry with an existing path was replaced; carries the new entry.
    Replaced(CollectionEntry),
    Removed(CollectionEntry),
    FilterChanged(Option<String>),
    /// The list was rebuilt from the store; carries the new length.
    Reloaded(usize),
}

type Subscriber = Box<dyn FnMut(&CollectionEvent)>;

pub struct Collection<S: BookStore> {
    store: S,
    entries: Vec<CollectionEntry>,
    filter: Option<String>,
    subscribers: Vec<Subscriber>,
}

impl<S: BookStore + fmt::Debug> fmt::Debug for Collection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("store", &self.store)
            .field("entries", &self.entries)
            .field("filter", &self.filter)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<S: BookStore> Collection<S> {
    /// Build the collection from everything in `store`.
    ///
    /// Store failures are logged and leave the collection empty.
    pub fn load(mut store: S) -> Self {
        if let Err(e) = store.ensure_schema() {
            log_store_error("create collection table", &e);
        }
        let entries = read_entries(&store);
        tracing::debug!("Loaded {} collection entries", entries.len());
        Self {
            store,
            entries,
            filter: None,
            subscribers: Vec::new(),
        }
    }

    /// Discard the in-memory list and read it again from the store.
    pub fn reload(&mut self) {
        self.entries = read_entries(&self.store);
        self.notify(CollectionEvent::Reloaded(self.entries.len()));
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&CollectionEvent) + 'static) {
        self.subscribers.push(Box::new(callback));
    }

    /// Insert `entry`, replacing any entry with the same path, and persist it.
    pub fn add(&mut self, entry: CollectionEntry) {
        if let Err(e) = self.store.upsert(&entry) {
            log_store_error("save collection entry", &e);
        }
        let event = match self.entries.iter_mut().find(|e| e.path == entry.path) {
            Some(existing) => {
                *existing = entry.clone();
                CollectionEvent::Replaced(entry)
            }
            None => {
                self.entries.push(entry.clone());
                CollectionEvent::Added(entry)
            }
        };
        self.notify(event);
    }

    /// Add an already opened book.
    pub fn add_epub(&mut self, epub: &EpubContainer) -> CollectionEntry {
        let entry = CollectionEntry::from_epub(epub);
        self.add(entry.clone());
        entry
    }

    /// Open the EPUB at `path` and add it.
    pub fn add_book(&mut self, path: impl AsRef<Path>, opts: &OpenOptions) -> Result<CollectionEntry, EpubError> {
        let epub = EpubContainer::open(path, opts)?;
        Ok(self.add_epub(&epub))
    }

    /// Remove the entry for `path` from the list and the store.
    pub fn remove(&mut self, path: &Path) -> Option<CollectionEntry> {
        let index = self.entries.iter().position(|e| e.path == path)?;
        let removed = self.entries.remove(index);
        if let Err(e) = self.store.delete(path) {
            log_store_error("delete collection entry", &e);
        }
        self.notify(CollectionEvent::Removed(removed.clone()));
        Some(removed)
    }

    /// Remove the `index`-th visible entry.
    pub fn remove_book(&mut self, index: usize) -> Option<CollectionEntry> {
        let path = self.get_book(index)?.path.clone();
        self.remove(&path)
    }

    /// Entries matching `term`. An empty term matches everything.
    pub fn find(&self, term: &str) -> Vec<&CollectionEntry> {
        self.entries.iter().filter(|e| e.matches(term)).collect()
    }

    pub fn set_filter(&mut self, term: Option<&str>) {
        let term = term.filter(|t| !t.is_empty()).map(str::to_string);
        if term == self.filter {
            return;
        }
        self.filter = term;
        self.notify(CollectionEvent::FilterChanged(self.filter.clone()));
    }

    pub fn filter_term(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Entries passing the current filter, in insertion order.
    pub fn visible(&self) -> Vec<&CollectionEntry> {
        self.find(self.filter.as_deref().unwrap_or(""))
    }

    pub fn get_book(&self, index: usize) -> Option<&CollectionEntry> {
        self.visible().into_iter().nth(index)
    }

    /// Open the book behind the `index`-th visible entry.
    pub fn open_book(&self, index: usize, opts: &OpenOptions) -> Result<EpubContainer, EpubError> {
        let entry = self
            .get_book(index)
            .ok_or_else(|| EpubError::ResourceNotFound(format!("no book at row {index}")))?;
        EpubContainer::open(&entry.path, opts)
    }

    /// Drop every entry whose file no longer exists. Returns the dropped entries.
    pub fn prune_missing(&mut self) -> Vec<CollectionEntry> {
        let missing: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|e| !e.path.exists())
            .map(|e| e.path.clone())
            .collect();

        let removed: Vec<CollectionEntry> = missing.iter().filter_map(|p| self.remove(p)).collect();
        if !removed.is_empty() {
            tracing::info!("Removed {} missing books from the collection", removed.len());
        }
        removed
    }

    pub fn entries(&self) -> &[CollectionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn notify(&mut self, event: CollectionEvent) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }
}

fn read_entries<S: BookStore>(store: &S) -> Vec<CollectionEntry> {
    store.load_all().unwrap_or_else(|e| {
        log_store_error("load collection", &e);
        Vec::new()
    })
}

fn log_store_error(action: &str, e: &StoreError) {
    tracing::warn!("Could not {}: {}", action, e);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::tests::write_epub;
    use crate::epub::ExtractionMode;
    use crate::security::SecurityLimits;
    use crate::store::{JsonStore, MemoryStore};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn entry(author: &str, title: &str, path: &str) -> CollectionEntry {
        CollectionEntry {
            author: Some(author.to_string()),
            title: Some(title.to_string()),
            path: PathBuf::from(path),
        }
    }

    fn orwell() -> CollectionEntry {
        entry("George Orwell", "1984", "/books/1984.epub")
    }

    fn huxley() -> CollectionEntry {
        entry("Aldous Huxley", "Brave New World", "/books/bnw.epub")
    }

    /// Store whose every operation fails.
    #[derive(Debug, Default)]
    struct BrokenStore;

    fn broken() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))
    }

    impl BookStore for BrokenStore {
        fn ensure_schema(&mut self) -> Result<(), StoreError> {
            Err(broken())
        }
        fn load_all(&self) -> Result<Vec<CollectionEntry>, StoreError> {
            Err(broken())
        }
        fn upsert(&mut self, _entry: &CollectionEntry) -> Result<(), StoreError> {
            Err(broken())
        }
        fn delete(&mut self, _path: &Path) -> Result<(), StoreError> {
            Err(broken())
        }
    }

    #[test]
    fn filter_matches_author_or_title_case_insensitively() {
        let mut c = Collection::load(MemoryStore::new());
        c.add(orwell());
        c.add(huxley());

        assert_eq!(c.find("orw"), vec![&orwell()]);
        assert_eq!(c.find("BRAVE"), vec![&huxley()]);
        assert_eq!(c.find("").len(), 2);
        assert!(c.find("tolkien").is_empty());

        c.set_filter(Some("orw"));
        assert_eq!(c.visible(), vec![&orwell()]);
        assert_eq!(c.get_book(0), Some(&orwell()));
        assert_eq!(c.get_book(1), None);

        c.set_filter(Some(""));
        assert_eq!(c.filter_term(), None);
        assert_eq!(c.visible().len(), 2);
    }

    #[test]
    fn entries_missing_metadata_are_always_visible() {
        let mut c = Collection::load(MemoryStore::new());
        c.add(orwell());
        c.add(CollectionEntry {
            author: None,
            title: Some("Anonymous".into()),
            path: "/books/anon.epub".into(),
        });

        c.set_filter(Some("orwell"));
        let paths: Vec<_> = c.visible().iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/books/1984.epub"), PathBuf::from("/books/anon.epub")]);
    }

    #[test]
    fn add_replaces_by_path() {
        let mut c = Collection::load(MemoryStore::new());
        c.add(orwell());
        c.add(entry("George Orwell", "Nineteen Eighty-Four", "/books/1984.epub"));
        assert_eq!(c.len(), 1);
        assert_eq!(c.entries()[0].title.as_deref(), Some("Nineteen Eighty-Four"));
        assert_eq!(c.store().load_all().unwrap(), c.entries());
    }

    #[test]
    fn contents_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("meta.json");

        let mut c = Collection::load(JsonStore::new(&table));
        c.add(orwell());
        c.add(huxley());
        c.add(entry("Ray Bradbury", "Fahrenheit 451", "/books/f451.epub"));
        c.remove(Path::new("/books/f451.epub"));
        let before = c.entries().to_vec();
        drop(c);

        let c = Collection::load(JsonStore::new(&table));
        assert_eq!(c.entries(), before.as_slice());
    }

    #[test]
    fn store_failures_do_not_fail_operations() {
        let mut c = Collection::load(BrokenStore);
        assert!(c.is_empty());

        c.add(orwell());
        c.add(huxley());
        assert_eq!(c.len(), 2);
        assert_eq!(c.remove(Path::new("/books/1984.epub")), Some(orwell()));
        assert_eq!(c.entries(), [huxley()]);

        c.reload();
        assert!(c.is_empty());
    }

    #[test]
    fn subscribers_see_every_change() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut c = Collection::load(MemoryStore::new());
        let sink = Rc::clone(&events);
        c.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        c.add(orwell());
        c.add(orwell());
        c.set_filter(Some("x"));
        c.set_filter(Some("x"));
        c.remove_book(0);
        c.remove(Path::new("/nowhere.epub"));
        c.reload();

        assert_eq!(
            *events.borrow(),
            vec![
                CollectionEvent::Added(orwell()),
                CollectionEvent::Replaced(orwell()),
                CollectionEvent::FilterChanged(Some("x".into())),
                CollectionEvent::Reloaded(1),
            ]
        );
    }

    #[test]
    fn remove_book_uses_visible_index() {
        let mut c = Collection::load(MemoryStore::new());
        c.add(orwell());
        c.add(huxley());
        c.set_filter(Some("huxley"));

        assert_eq!(c.remove_book(0), Some(huxley()));
        assert_eq!(c.remove_book(0), None);
        assert_eq!(c.entries(), [orwell()]);
    }

    #[test]
    fn prune_drops_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.epub");
        std::fs::write(&present, b"").unwrap();

        let mut c = Collection::load(MemoryStore::new());
        c.add(CollectionEntry {
            author: None,
            title: None,
            path: present.clone(),
        });
        c.add(orwell());

        assert_eq!(c.prune_missing(), vec![orwell()]);
        assert_eq!(c.len(), 1);
        assert_eq!(c.entries()[0].path, present);
        assert_eq!(c.store().load_all().unwrap().len(), 1);
    }

    #[test]
    fn add_and_open_books_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1984.epub");
        write_epub(&path, "1984", "George Orwell");
        let opts = OpenOptions {
            cache_dir: dir.path().join("cache"),
            mode: ExtractionMode::Memory,
            limits: SecurityLimits::default(),
        };

        let mut c = Collection::load(MemoryStore::new());
        let added = c.add_book(&path, &opts).unwrap();
        assert_eq!(added, CollectionEntry {
            author: Some("George Orwell".into()),
            title: Some("1984".into()),
            path: path.clone(),
        });

        let epub = c.open_book(0, &opts).unwrap();
        assert_eq!(epub.meta("title"), Some("1984"));
        assert!(matches!(c.open_book(5, &opts), Err(EpubError::ResourceNotFound(_))));

        let bogus = dir.path().join("bogus.epub");
        std::fs::write(&bogus, b"nope").unwrap();
        assert!(c.add_book(&bogus, &opts).is_err());
        assert_eq!(c.len(), 1);
    }
}
