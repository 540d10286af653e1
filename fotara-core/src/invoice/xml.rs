//! Namespace-aware XML document handling for UBL invoices.
//!
//! [`InvoiceDocument`] wraps a parsed libxml tree and exposes the XPath-targeted
//! reads and in-place text replacement used by the signing pipeline.
pub mod constants;

use constants::{
    CAC_NS, CBC_NS, DEFAULT_NS_ALIAS, DS_NS, EXT_NS, INVOICE_NS, SAC_NS, SBC_NS, SIG_NS, XADES_NS,
};
use libxml::{
    parser::{Parser, ParserOptions},
    tree::{Document, Namespace, Node, SaveOptions},
    xpath,
};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

pub(crate) const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML parse error: {message}")]
    Parse { message: String },
    #[error("document has no root element")]
    MissingRoot,
    #[error("failed to create XPath context")]
    XPathContext,
    #[error("failed to register namespace prefix '{prefix}'")]
    RegisterNamespace { prefix: String },
    #[error("XPath evaluation failed for {xpath}")]
    XPath { xpath: String },
    #[error("failed to update node at {xpath}: {message}")]
    Mutation { xpath: String, message: String },
    #[error("failed to declare namespace prefix '{prefix}' on root: {message}")]
    DeclareNamespace { prefix: String, message: String },
    #[error("failed to copy document")]
    Copy,
    #[error("failed to create text node")]
    TextNode,
    #[error("invalid cleanup pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Prefix to URI bindings used for every XPath expression.
///
/// The invoice default namespace is bound to [`DEFAULT_NS_ALIAS`] since
/// XPath 1.0 cannot address an unprefixed default namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMap {
    entries: Vec<(String, String)>,
}

impl NamespaceMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.insert(prefix, uri);
        self
    }

    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        let uri = uri.into();
        match self.entries.iter_mut().find(|(p, _)| *p == prefix) {
            Some(entry) => entry.1 = uri,
            None => self.entries.push((prefix, uri)),
        }
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    fn context(&self, doc: &Document) -> Result<xpath::Context, XmlError> {
        let ctx = xpath::Context::new(doc).map_err(|_| XmlError::XPathContext)?;
        for (prefix, uri) in self.iter() {
            ctx.register_namespace(prefix, uri)
                .map_err(|_| XmlError::RegisterNamespace {
                    prefix: prefix.to_string(),
                })?;
        }
        Ok(ctx)
    }
}

impl Default for NamespaceMap {
    /// The fixed UBL invoice bindings.
    fn default() -> Self {
        Self::new()
            .with(DEFAULT_NS_ALIAS, INVOICE_NS)
            .with("cac", CAC_NS)
            .with("cbc", CBC_NS)
            .with("ext", EXT_NS)
            .with("sig", SIG_NS)
            .with("sac", SAC_NS)
            .with("sbc", SBC_NS)
            .with("ds", DS_NS)
            .with("xades", XADES_NS)
    }
}

/// Normalizes raw invoice text before it is parsed.
///
/// Strips BOM/zero-width/NUL characters, synthesizes a missing XML
/// declaration and drops empty-valued namespace declarations such as
/// `xmlns=""`.
#[derive(Debug, Clone)]
pub struct XmlCleaner {
    empty_default_ns: Regex,
    empty_prefixed_ns: Regex,
}

impl XmlCleaner {
    pub fn new() -> Result<Self, XmlError> {
        Ok(Self {
            empty_default_ns: Regex::new(r#"(?i)\s+xmlns\s*=\s*["']\s*["']"#)?,
            empty_prefixed_ns: Regex::new(r#"(?i)\s+xmlns:[^=\s]+\s*=\s*["']\s*["']"#)?,
        })
    }

    pub fn clean(&self, xml: &str) -> String {
        let trimmed = xml
            .trim_matches(|c| c == '\u{FEFF}' || c == '\u{200B}' || c == '\0')
            .trim_start();

        let mut cleaned = if trimmed.starts_with("<?xml") {
            trimmed.to_string()
        } else {
            format!("{XML_DECLARATION}\n{trimmed}")
        };
        cleaned = self
            .empty_default_ns
            .replace_all(&cleaned, "")
            .into_owned();
        self.empty_prefixed_ns
            .replace_all(&cleaned, "")
            .into_owned()
    }
}

/// A parsed invoice tree plus the namespace bindings used to address it.
pub struct InvoiceDocument {
    doc: Document,
    namespaces: NamespaceMap,
}

impl InvoiceDocument {
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        Self::parse_with(xml, NamespaceMap::default())
    }

    pub fn parse_with(xml: &str, namespaces: NamespaceMap) -> Result<Self, XmlError> {
        let options = ParserOptions {
            recover: false,
            ..ParserOptions::default()
        };
        let doc = Parser::default()
            .parse_string_with_options(xml, options)
            .map_err(|e| XmlError::Parse {
                message: format!("{e:?}"),
            })?;
        if doc.get_root_element().is_none() {
            return Err(XmlError::MissingRoot);
        }
        Ok(Self { doc, namespaces })
    }

    pub fn namespaces(&self) -> &NamespaceMap {
        &self.namespaces
    }

    pub(crate) fn document(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub(crate) fn root(&self) -> Result<Node, XmlError> {
        self.doc.get_root_element().ok_or(XmlError::MissingRoot)
    }

    /// Deep copy, so exclusions can be applied without touching `self`.
    pub fn duplicate(&self) -> Result<Self, XmlError> {
        let doc = self.doc.dup().map_err(|_| XmlError::Copy)?;
        Ok(Self {
            doc,
            namespaces: self.namespaces.clone(),
        })
    }

    /// All nodes matched by `xpath`, in document order.
    pub fn select(&self, xpath: &str) -> Result<Vec<Node>, XmlError> {
        let ctx = self.namespaces.context(&self.doc)?;
        let nodes = ctx
            .evaluate(xpath)
            .map_err(|_| XmlError::XPath {
                xpath: xpath.to_string(),
            })?
            .get_nodes_as_vec();
        Ok(nodes)
    }

    /// Replaces the text content of every element matched by `xpath`.
    ///
    /// `value` is stored as literal text, so `&` and `<` survive unchanged.
    /// Returns how many elements were updated. Zero matches leave the
    /// document untouched and are not an error.
    pub fn replace_node_text(&mut self, xpath: &str, value: &str) -> Result<usize, XmlError> {
        let mut replaced = 0;
        for mut node in self.select(xpath)? {
            if !node.is_element_node() {
                continue;
            }
            for mut child in node.get_child_nodes() {
                child.unlink();
            }
            node.append_text(value).map_err(|e| XmlError::Mutation {
                xpath: xpath.to_string(),
                message: e.to_string(),
            })?;
            replaced += 1;
        }
        debug!(xpath, replaced, "replaced node text");
        Ok(replaced)
    }

    /// Sets `name` on every element matched by `xpath`.
    pub fn set_attribute(&mut self, xpath: &str, name: &str, value: &str) -> Result<usize, XmlError> {
        let mut updated = 0;
        for mut node in self.select(xpath)? {
            if !node.is_element_node() {
                continue;
            }
            node.set_attribute(name, value)
                .map_err(|e| XmlError::Mutation {
                    xpath: xpath.to_string(),
                    message: e.to_string(),
                })?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Trimmed text of the first match, `None` when absent or blank.
    pub fn text(&self, xpath: &str) -> Result<Option<String>, XmlError> {
        let value = self
            .select(xpath)?
            .first()
            .map(|node| node.get_content().trim().to_string())
            .filter(|value| !value.is_empty());
        Ok(value)
    }

    /// Markup of the first match, standalone.
    ///
    /// Each element whose prefix is bound outside the fragment gets its own
    /// declaration, at the outermost element of the fragment that uses it.
    /// The document itself is not modified.
    pub fn detached_outer_xml(&self, xpath: &str) -> Result<Option<String>, XmlError> {
        let copy = self.duplicate()?;
        let Some(mut node) = copy.select(xpath)?.into_iter().next() else {
            return Ok(None);
        };
        declare_used_prefixes(&mut node, &[])?;
        Ok(Some(copy.doc.node_to_string(&node)))
    }

    /// Unlinks every node matched by `xpath`, returning the count.
    pub fn remove_nodes(&mut self, xpath: &str) -> Result<usize, XmlError> {
        let nodes = self.select(xpath)?;
        let count = nodes.len();
        for mut node in nodes {
            node.unlink();
        }
        Ok(count)
    }

    /// Declares `prefix` on the root element unless already declared there.
    pub fn ensure_root_namespace(&mut self, prefix: &str, uri: &str) -> Result<bool, XmlError> {
        let mut root = self.root()?;
        let declared = root
            .get_namespace_declarations()
            .iter()
            .any(|ns| ns.get_prefix() == prefix);
        if declared {
            return Ok(false);
        }
        Namespace::new(prefix, uri, &mut root).map_err(|e| XmlError::DeclareNamespace {
            prefix: prefix.to_string(),
            message: e.to_string(),
        })?;
        Ok(true)
    }

    /// Serializes with the `<?xml ...?>` declaration.
    pub fn to_xml(&self) -> String {
        self.doc.to_string()
    }

    /// Serializes without a declaration, as fed between pipeline steps.
    pub fn to_xml_without_declaration(&self) -> String {
        self.doc.to_string_with_options(SaveOptions {
            no_declaration: true,
            ..SaveOptions::default()
        })
    }
}

/// Escapes `value` for use as element text, as libxml serializes text nodes.
pub fn escape_text(value: &str) -> Result<String, XmlError> {
    let doc = Document::new().map_err(|_| XmlError::TextNode)?;
    let node = Node::new_text(value, &doc).map_err(|_| XmlError::TextNode)?;
    Ok(doc.node_to_string(&node))
}

fn declare_used_prefixes(node: &mut Node, in_scope: &[String]) -> Result<(), XmlError> {
    let mut scope = in_scope.to_vec();
    if let Some(ns) = node.get_namespace() {
        let prefix = ns.get_prefix();
        if !prefix.is_empty() && !scope.contains(&prefix) {
            Namespace::new(&prefix, &ns.get_href(), node).map_err(|e| {
                XmlError::DeclareNamespace {
                    prefix: prefix.clone(),
                    message: e.to_string(),
                }
            })?;
            scope.push(prefix);
        }
    }
    for mut child in node.get_child_elements() {
        declare_used_prefixes(&mut child, &scope)?;
    }
    Ok(())
}
