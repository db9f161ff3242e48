//! Reading-order navigation over the spine.

use serde::Serialize;

use crate::archive::ExtractedContent;
use crate::epub::package::PackageModel;
use crate::location::{resolve_href, strip_fragment};

/// Resolved spine locations with a cursor.
///
/// The cursor is `Some(i)` with `i < len` whenever the spine is non-empty and
/// `None` when it is empty. Moving past either end is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentSpine {
    locations: Vec<String>,
    cursor: Option<usize>,
}

impl DocumentSpine {
    /// Build a spine over already resolved locations, cursor on the first.
    pub fn new(locations: Vec<String>) -> Self {
        let cursor = if locations.is_empty() { None } else { Some(0) };
        Self { locations, cursor }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn position(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<&str> {
        self.cursor.map(|i| self.locations[i].as_str())
    }

    pub fn first(&self) -> Option<&str> {
        self.locations.first().map(String::as_str)
    }

    pub fn is_first(&self) -> bool {
        self.cursor == Some(0)
    }

    pub fn is_last(&self) -> bool {
        self.cursor.is_some() && self.cursor == self.locations.len().checked_sub(1)
    }

    pub fn next(&mut self) {
        if let Some(i) = self.cursor {
            if i + 1 < self.locations.len() {
                self.cursor = Some(i + 1);
            }
        }
    }

    pub fn previous(&mut self) {
        if let Some(i) = self.cursor {
            self.cursor = Some(i.saturating_sub(1));
        }
    }

    /// Move the cursor to the first location equal to `uri` with its fragment
    /// removed. Leaves the cursor alone when nothing matches.
    pub fn set_position_by_uri(&mut self, uri: &str) {
        let wanted = strip_fragment(uri);
        if let Some(i) = self.locations.iter().position(|l| l == wanted) {
            self.cursor = Some(i);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.locations.iter().map(String::as_str)
    }
}

/// Resolve each spine idref through the manifest into a location URI.
///
/// Ids missing from the manifest and hrefs escaping the archive root are
/// skipped.
pub fn build_spine(model: &PackageModel, content: &ExtractedContent, package_prefix: &str) -> DocumentSpine {
    let mut locations = Vec::with_capacity(model.spine.len());

    for idref in &model.spine {
        let Some(href) = model.href(idref) else {
            tracing::debug!("Skipping spine item '{}': not in manifest", idref);
            continue;
        };
        let Some(name) = resolve_href(package_prefix, href) else {
            tracing::debug!("Skipping spine item '{}': href '{}' leaves the archive", idref, href);
            continue;
        };
        locations.push(content.locate(&name).uri());
    }

    DocumentSpine::new(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::package::ManifestItem;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn model(manifest: &[(&str, &str)], spine: &[&str]) -> PackageModel {
        PackageModel {
            manifest: manifest
                .iter()
                .map(|(id, href)| {
                    (
                        id.to_string(),
                        ManifestItem {
                            href: href.to_string(),
                            media_type: None,
                            properties: None,
                        },
                    )
                })
                .collect(),
            spine: spine.iter().map(|s| s.to_string()).collect(),
            ..PackageModel::default()
        }
    }

    fn memory() -> ExtractedContent {
        ExtractedContent::Memory(BTreeMap::new())
    }

    fn spine_of(n: usize) -> DocumentSpine {
        DocumentSpine::new((0..n).map(|i| format!("ch{i}.xhtml")).collect())
    }

    #[test]
    fn build_resolves_against_prefix_and_skips_dangling_ids() {
        let m = model(&[("a", "a.xhtml"), ("b", "Text/b.xhtml")], &["a", "ghost", "b", "a"]);
        let spine = build_spine(&m, &memory(), "OEBPS");
        assert_eq!(
            spine.iter().collect::<Vec<_>>(),
            vec!["OEBPS/a.xhtml", "OEBPS/Text/b.xhtml", "OEBPS/a.xhtml"]
        );
        assert_eq!(spine.position(), Some(0));
    }

    #[cfg(unix)]
    #[test]
    fn directory_content_yields_file_uris() {
        let m = model(&[("a", "a%20b.xhtml")], &["a"]);
        let content = ExtractedContent::Directory(PathBuf::from("/cache/books/x.epub"));
        let spine = build_spine(&m, &content, "");
        assert_eq!(spine.current(), Some("file:///cache/books/x.epub/a%20b.xhtml"));
    }

    #[test]
    fn empty_spine_has_no_cursor() {
        let mut spine = build_spine(&model(&[], &["x"]), &memory(), "");
        assert!(spine.is_empty());
        assert_eq!(spine.current(), None);
        assert_eq!(spine.first(), None);
        assert!(!spine.is_first());
        assert!(!spine.is_last());
        spine.next();
        spine.previous();
        spine.set_position_by_uri("x");
        assert_eq!(spine.position(), None);
    }

    #[test]
    fn single_entry_is_first_and_last() {
        let spine = spine_of(1);
        assert!(spine.is_first());
        assert!(spine.is_last());
    }

    #[test]
    fn next_and_previous_clamp() {
        let mut spine = spine_of(3);
        assert!(spine.is_first() && !spine.is_last());

        spine.previous();
        assert_eq!(spine.position(), Some(0));

        spine.next();
        spine.next();
        assert!(spine.is_last());
        spine.next();
        assert_eq!(spine.current(), Some("ch2.xhtml"));
    }

    #[test]
    fn first_does_not_follow_the_cursor() {
        let mut spine = spine_of(3);
        assert_eq!(spine.first(), Some("ch0.xhtml"));
        spine.next();
        spine.next();
        assert_eq!(spine.current(), Some("ch2.xhtml"));
        assert_eq!(spine.first(), Some("ch0.xhtml"));
        assert_eq!(spine.position(), Some(2));
    }

    #[test]
    fn set_position_strips_fragment_and_ignores_unknown() {
        let mut spine = spine_of(3);
        spine.set_position_by_uri("ch2.xhtml#section-4");
        assert_eq!(spine.position(), Some(2));

        spine.set_position_by_uri("elsewhere.xhtml");
        assert_eq!(spine.position(), Some(2));

        spine.set_position_by_uri("ch1.xhtml");
        assert_eq!(spine.current(), Some("ch1.xhtml"));
    }

    #[test]
    fn duplicate_locations_match_the_first() {
        let mut spine = DocumentSpine::new(vec!["a".into(), "b".into(), "a".into()]);
        spine.next();
        spine.next();
        spine.set_position_by_uri("a");
        assert_eq!(spine.position(), Some(0));
    }

    proptest! {
        #[test]
        fn cursor_stays_in_bounds(len in 1usize..20, moves in proptest::collection::vec(any::<bool>(), 0..60)) {
            let mut spine = spine_of(len);
            for forward in moves {
                if forward { spine.next() } else { spine.previous() }
                let pos = spine.position().unwrap();
                prop_assert!(pos < len);
                prop_assert_eq!(spine.is_first(), pos == 0);
                prop_assert_eq!(spine.is_last(), pos == len - 1);
            }
        }

        #[test]
        fn built_spine_never_exceeds_idrefs(ids in proptest::collection::vec("[a-d]", 0..12)) {
            let m = model(&[("a", "a.xhtml"), ("b", "b.xhtml")], &ids.iter().map(String::as_str).collect::<Vec<_>>());
            let spine = build_spine(&m, &memory(), "");
            let resolvable = ids.iter().filter(|id| *id == "a" || *id == "b").count();
            prop_assert!(spine.len() <= ids.len());
            prop_assert_eq!(spine.len(), resolvable);
            prop_assert_eq!(spine.position(), if resolvable == 0 { None } else { Some(0) });
        }
    }
}
