//! `META-INF/container.xml`: find the package document.

use crate::archive::ExtractedContent;
use crate::error::EpubError;
use crate::location::resolve_href;
use crate::xml::{Namespace, QueryContext};

/// Fixed location of the container descriptor inside every EPUB.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

const ROOTFILE: &[(Namespace, &str)] = &[
    (Namespace::Container, "container"),
    (Namespace::Container, "rootfiles"),
    (Namespace::Container, "rootfile"),
];

/// Archive-internal path of the package document named by the first
/// declared root file.
pub fn parse_container(content: &ExtractedContent) -> Result<String, EpubError> {
    let xml = match content.read_to_string(CONTAINER_PATH) {
        Ok(xml) => xml,
        Err(EpubError::ResourceNotFound(_)) => {
            return Err(EpubError::NoMetadata(format!("missing {CONTAINER_PATH}")));
        }
        Err(e) => return Err(e),
    };
    package_path_from_xml(&xml)
}

pub(crate) fn package_path_from_xml(xml: &str) -> Result<String, EpubError> {
    let ctx = QueryContext::parse(xml)
        .map_err(|e| EpubError::NoMetadata(format!("unparsable {CONTAINER_PATH}: {e}")))?;

    let rootfile = ctx
        .select_first(ROOTFILE)
        .ok_or_else(|| EpubError::NoMetadata(format!("no rootfile declared in {CONTAINER_PATH}")))?;

    let full_path = rootfile
        .attr("full-path")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| EpubError::NoMetadata("first rootfile has no full-path".to_string()))?;

    // Package path is archive-relative: `.`/`..` are folded and a leading `/`
    // is dropped. Anything above the archive root is refused.
    resolve_href("", full_path).ok_or_else(|| {
        EpubError::NoMetadata(format!("rootfile full-path `{full_path}' leaves the archive"))
    })
}
