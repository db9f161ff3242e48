//! Namespace-aware element tree with simple path queries.
//!
//! Element names are resolved to namespace URIs while parsing, so queries
//! match on `(namespace, local name)` no matter which prefix a document
//! happens to use. Queries name namespaces through the closed [`Namespace`]
//! enum; every namespace a query can mention is known up front.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace as XmlNamespace, ResolveResult};
use quick_xml::NsReader;

/// Namespaces used by EPUB container and package documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// `urn:oasis:names:tc:opendocument:xmlns:container`
    Container,
    /// `http://www.idpf.org/2007/opf`
    Package,
    /// `http://purl.org/dc/elements/1.1/`
    DublinCore,
}

impl Namespace {
    pub const fn uri(self) -> &'static str {
        match self {
            Namespace::Container => "urn:oasis:names:tc:opendocument:xmlns:container",
            Namespace::Package => "http://www.idpf.org/2007/opf",
            Namespace::DublinCore => "http://purl.org/dc/elements/1.1/",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("XML error at byte {position}: {detail}")]
pub struct XmlError {
    pub position: u64,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    namespace: Option<String>,
    local_name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is(&self, ns: Namespace, local_name: &str) -> bool {
        self.in_namespace(ns) && self.local_name == local_name
    }

    pub fn in_namespace(&self, ns: Namespace) -> bool {
        self.namespace.as_deref() == Some(ns.uri())
    }

    /// Attribute value by local name, ignoring any prefix.
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == local_name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of the element's direct text and CDATA children.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn children_in(&self, ns: Namespace) -> impl Iterator<Item = &Element> {
        self.children.iter().filter(move |c| c.in_namespace(ns))
    }

    pub fn children_named<'a>(
        &'a self,
        ns: Namespace,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.is(ns, local_name))
    }

    fn collect_descendants<'a>(&'a self, ns: Namespace, local_name: &str, out: &mut Vec<&'a Element>) {
        if self.is(ns, local_name) {
            out.push(self);
        }
        for child in &self.children {
            child.collect_descendants(ns, local_name, out);
        }
    }
}

/// Parse a document into its root element.
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let err = |detail: String| XmlError { position, detail };

        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| err(e.to_string()))?;
        let namespace = match ns {
            ResolveResult::Bound(XmlNamespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
            _ => None,
        };

        match event {
            Event::Start(start) => stack.push(element_from(namespace, &start).map_err(err)?),
            Event::Empty(start) => {
                let element = element_from(namespace, &start).map_err(err)?;
                attach(&mut stack, &mut root, element).map_err(err)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| err("unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, element).map_err(err)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| err(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError {
            position: reader.buffer_position() as u64,
            detail: format!("unclosed element <{}>", open.local_name),
        });
    }
    root.ok_or_else(|| XmlError {
        position: 0,
        detail: "document has no root element".to_string(),
    })
}

fn element_from(namespace: Option<String>, start: &BytesStart<'_>) -> Result<Element, String> {
    let local_name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        attributes.push((name, value));
    }

    Ok(Element {
        namespace,
        local_name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err("more than one root element".to_string()),
    }
    Ok(())
}

/// A parsed document ready for path queries.
#[derive(Debug, Clone)]
pub struct QueryContext {
    root: Element,
}

impl QueryContext {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        parse(xml).map(Self::new)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Elements matching `//s0/s1/.../sn`: the first step matches any element
    /// in the document, later steps match children. Results are in document
    /// order; an empty path selects nothing.
    pub fn select(&self, path: &[(Namespace, &str)]) -> Vec<&Element> {
        let Some(((ns, name), rest)) = path.split_first() else {
            return Vec::new();
        };

        let mut current = Vec::new();
        self.root.collect_descendants(*ns, name, &mut current);

        for &(ns, name) in rest {
            current = current
                .into_iter()
                .flat_map(|el| el.children.iter().filter(move |c| c.is(ns, name)))
                .collect();
        }
        current
    }

    pub fn select_first(&self, path: &[(Namespace, &str)]) -> Option<&Element> {
        self.select(path).into_iter().next()
    }
}
