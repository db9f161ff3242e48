//! Cover image lookup.

use crate::archive::ExtractedContent;
use crate::epub::package::PackageModel;
use crate::location::{resolve_href, Location};

/// Conventional manifest ids tried, in order, when a package declares no cover.
pub const COVER_IDS: &[&str] = &["cover", "cover-image", "my-cover-image", "cover.jpeg"];

/// Location of the book's cover image, if one can be found.
///
/// An explicit cover declaration naming a manifest item is used first; after
/// that the first of [`COVER_IDS`] present in the manifest wins.
pub fn get_cover(model: &PackageModel, content: &ExtractedContent, package_prefix: &str) -> Option<Location> {
    let declared = model
        .cover_id
        .as_deref()
        .and_then(|id| model.href(id));

    let href = declared.or_else(|| COVER_IDS.iter().find_map(|id| model.href(id)))?;
    let name = resolve_href(package_prefix, href)?;
    Some(content.locate(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::package::ManifestItem;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn model(ids: &[(&str, &str)]) -> PackageModel {
        PackageModel {
            manifest: ids
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
            ..PackageModel::default()
        }
    }

    fn memory() -> ExtractedContent {
        ExtractedContent::Memory(BTreeMap::new())
    }

    #[test]
    fn cover_image_used_when_cover_id_absent() {
        let m = model(&[("cover-image", "img/cover.jpg"), ("ch1", "ch1.xhtml")]);
        assert_eq!(
            get_cover(&m, &memory(), "OEBPS"),
            Some(Location::Entry("OEBPS/img/cover.jpg".into()))
        );
    }

    #[test]
    fn priority_order_is_respected() {
        let m = model(&[
            ("cover.jpeg", "d.jpg"),
            ("my-cover-image", "c.jpg"),
            ("cover-image", "b.jpg"),
            ("cover", "a.xhtml"),
        ]);
        assert_eq!(get_cover(&m, &memory(), ""), Some(Location::Entry("a.xhtml".into())));

        let m = model(&[("cover.jpeg", "d.jpg"), ("my-cover-image", "c.jpg")]);
        assert_eq!(get_cover(&m, &memory(), ""), Some(Location::Entry("c.jpg".into())));
    }

    #[test]
    fn declared_cover_takes_precedence() {
        let mut m = model(&[("cover", "cover.xhtml"), ("img1", "images/front.png")]);
        m.cover_id = Some("img1".into());
        assert_eq!(get_cover(&m, &memory(), ""), Some(Location::Entry("images/front.png".into())));
    }

    #[test]
    fn dangling_declaration_falls_back_to_conventional_ids() {
        let mut m = model(&[("my-cover-image", "c.jpg")]);
        m.cover_id = Some("nope".into());
        assert_eq!(get_cover(&m, &memory(), ""), Some(Location::Entry("c.jpg".into())));
    }

    #[test]
    fn no_candidate_means_no_cover() {
        let m = model(&[("ch1", "ch1.xhtml"), ("Cover", "upper.jpg")]);
        assert_eq!(get_cover(&m, &memory(), ""), None);
    }
}
