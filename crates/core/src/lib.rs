pub mod archive;
pub mod collection;
pub mod config;
pub mod epub;
pub mod error;
pub mod location;
pub mod progress;
pub mod security;
pub mod store;
pub mod xml;

pub mod prelude {
    pub use crate::collection::{Collection, CollectionEntry, CollectionEvent};
    pub use crate::epub::{EpubContainer, ExtractionMode, OpenOptions};
    pub use crate::error::*;
    pub use crate::location::Location;
    pub use crate::store::{BookStore, JsonStore, MemoryStore};
}
