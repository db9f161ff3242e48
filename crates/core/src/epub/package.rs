//! Package document (OPF) parsing: metadata, manifest, spine.

use std::collections::HashMap;

use serde::Serialize;

use crate::archive::ExtractedContent;
use crate::error::EpubError;
use crate::xml::{Element, Namespace, QueryContext, XmlError};

/// Dublin Core element names a package may carry in its metadata.
pub const DC_FIELDS: &[&str] = &[
    "title",
    "creator",
    "contributor",
    "subject",
    "description",
    "publisher",
    "date",
    "type",
    "format",
    "identifier",
    "source",
    "language",
    "relation",
    "coverage",
    "rights",
];

const PACKAGE: (Namespace, &str) = (Namespace::Package, "package");
const METADATA: (Namespace, &str) = (Namespace::Package, "metadata");
const MANIFEST_ITEM: &[(Namespace, &str)] = &[
    PACKAGE,
    (Namespace::Package, "manifest"),
    (Namespace::Package, "item"),
];
const SPINE_ITEMREF: &[(Namespace, &str)] = &[
    PACKAGE,
    (Namespace::Package, "spine"),
    (Namespace::Package, "itemref"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestItem {
    /// Path relative to the package document, as written (possibly percent-encoded).
    pub href: String,
    pub media_type: Option<String>,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|p| p.split_whitespace().any(|t| t == property))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageModel {
    /// Dublin Core field name → every value, in document order.
    pub metadata: HashMap<String, Vec<String>>,
    /// Item id → item. The first declaration of an id wins.
    pub manifest: HashMap<String, ManifestItem>,
    /// Item ids in reading order.
    pub spine: Vec<String>,
    pub version: Option<String>,
    /// Item id named by an explicit cover declaration.
    pub cover_id: Option<String>,
}

impl PackageModel {
    pub fn href(&self, id: &str) -> Option<&str> {
        self.manifest.get(id).map(|item| item.href.as_str())
    }

    pub fn meta(&self, field: &str) -> Option<&str> {
        get_meta(self, field)
    }
}

/// Text of the first `dc:<field>` element. `None` if there is no such
/// element or its text is empty.
pub fn get_meta<'a>(model: &'a PackageModel, field: &str) -> Option<&'a str> {
    model
        .metadata
        .get(field)
        .and_then(|values| values.first())
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Every value of `dc:<field>` in document order.
pub fn get_meta_all<'a>(model: &'a PackageModel, field: &str) -> &'a [String] {
    model.metadata.get(field).map(Vec::as_slice).unwrap_or(&[])
}

/// Read and parse the package document at `package_path`.
pub fn parse_package(content: &ExtractedContent, package_path: &str) -> Result<PackageModel, EpubError> {
    let xml = match content.read_to_string(package_path) {
        Ok(xml) => xml,
        Err(EpubError::ResourceNotFound(_)) => {
            return Err(EpubError::NoMetadata(format!(
                "package document {package_path} is missing"
            )));
        }
        Err(e) => return Err(e),
    };
    parse_package_str(&xml).map_err(|e| {
        EpubError::NoMetadata(format!("unparsable package document {package_path}: {e}"))
    })
}

pub(crate) fn parse_package_str(xml: &str) -> Result<PackageModel, XmlError> {
    let ctx = QueryContext::parse(xml)?;
    let mut model = PackageModel {
        version: ctx
            .select_first(&[PACKAGE])
            .and_then(|p| p.attr("version"))
            .map(str::to_string),
        ..PackageModel::default()
    };

    if let Some(metadata) = ctx.select_first(&[PACKAGE, METADATA]) {
        read_metadata(metadata, &mut model);
    }

    for item in ctx.select(MANIFEST_ITEM) {
        let (Some(id), Some(href)) = (item.attr("id"), item.attr("href")) else {
            tracing::debug!("Ignoring manifest item without id or href");
            continue;
        };
        model
            .manifest
            .entry(id.to_string())
            .or_insert_with(|| ManifestItem {
                href: href.to_string(),
                media_type: item.attr("media-type").map(str::to_string),
                properties: item.attr("properties").map(str::to_string),
            });
    }

    model.spine = ctx
        .select(SPINE_ITEMREF)
        .into_iter()
        .filter_map(|itemref| itemref.attr("idref"))
        .map(str::to_string)
        .collect();

    if model.cover_id.is_none() {
        model.cover_id = ctx
            .select(MANIFEST_ITEM)
            .into_iter()
            .find(|item| {
                item.attr("properties")
                    .is_some_and(|p| p.split_whitespace().any(|t| t == "cover-image"))
            })
            .and_then(|item| item.attr("id"))
            .map(str::to_string);
    }

    Ok(model)
}

fn read_metadata(metadata: &Element, model: &mut PackageModel) {
    for field in metadata.children_in(Namespace::DublinCore) {
        model
            .metadata
            .entry(field.local_name().to_string())
            .or_default()
            .push(field.text().to_string());
    }

    // EPUB 2 cover declaration: <meta name="cover" content="item-id"/>
    model.cover_id = metadata
        .children_named(Namespace::Package, "meta")
        .find(|meta| meta.attr("name") == Some("cover"))
        .and_then(|meta| meta.attr("content"))
        .filter(|id| !id.is_empty())
        .map(str::to_string);
}
