//! Ordered document transforms applied before hashing and signing.
//!
//! Each step parses its (cleaned) input, edits the tree, and serializes the
//! result without an XML declaration. Injection steps only insert a
//! placeholder token; the token is then swapped for a template fragment by
//! plain string replacement so the fragment never has to be escaped.
use super::xml::constants::{
    CAC_NS, CBC_NS, EXT_NS, QR_PLACEHOLDER, QR_TEMPLATE, SIGNATURE_PLACEHOLDER,
    SIGNATURE_TEMPLATE, UBL_PLACEHOLDER, UBL_TEMPLATE,
};
use super::xml::{InvoiceDocument, XmlCleaner, XmlError};
use libxml::tree::Node;
use thiserror::Error;
use tracing::{debug, error};

const REMOVE_ELEMENTS: [&str; 3] = [
    "/def:Invoice/ext:UBLExtensions",
    "/def:Invoice/cac:Signature",
    "/def:Invoice/cac:AdditionalDocumentReference[cbc:ID='QR']",
];

const NORMALIZATION_EXCLUSIONS: [&str; 3] = [
    "/*[local-name()='Invoice']//*[local-name()='UBLExtensions']",
    "//*[local-name()='AdditionalDocumentReference'][cbc:ID[normalize-space(text())='QR']]",
    "/*[local-name()='Invoice']//*[local-name()='Signature']",
];

/// Every prefix the injection steps may declare on the invoice root.
const INJECTED_ROOT_NAMESPACES: [(&str, &str); 3] =
    [("ext", EXT_NS), ("cac", CAC_NS), ("cbc", CBC_NS)];

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{step} failed: {source}")]
    Xml {
        step: Stylesheet,
        #[source]
        source: XmlError,
    },
    #[error("{step} failed: no {anchor} element to anchor the placeholder")]
    MissingAnchor {
        step: Stylesheet,
        anchor: &'static str,
    },
    #[error("{step} failed: could not insert placeholder: {message}")]
    Insert { step: Stylesheet, message: String },
    #[error("failed to prepare XML cleaner: {0}")]
    Cleaner(#[source] XmlError),
}

/// One transform step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stylesheet {
    /// Drops `ext:UBLExtensions`, the invoice-level `cac:Signature` and the QR
    /// document reference.
    RemoveElements,
    /// Applies the hash exclusions used for the invoice digest, and declares
    /// the root prefixes the injection steps add, so a signed document hashes
    /// the same as its source.
    InvoiceNormalization,
    AddUblElement,
    AddQrElement,
    AddSignatureElement,
}

impl Stylesheet {
    /// The transform pair used for the invoice hash.
    pub const HASH: [Stylesheet; 2] = [Stylesheet::RemoveElements, Stylesheet::InvoiceNormalization];

    /// The four steps that prepare a document for signing.
    pub const SIGNING: [Stylesheet; 4] = [
        Stylesheet::RemoveElements,
        Stylesheet::AddUblElement,
        Stylesheet::AddQrElement,
        Stylesheet::AddSignatureElement,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stylesheet::RemoveElements => "remove-elements",
            Stylesheet::InvoiceNormalization => "invoice-normalization",
            Stylesheet::AddUblElement => "add-ubl-element",
            Stylesheet::AddQrElement => "add-qr-element",
            Stylesheet::AddSignatureElement => "add-signature-element",
        }
    }

    fn placeholder(&self) -> Option<&'static str> {
        match self {
            Stylesheet::AddUblElement => Some(UBL_PLACEHOLDER),
            Stylesheet::AddQrElement => Some(QR_PLACEHOLDER),
            Stylesheet::AddSignatureElement => Some(SIGNATURE_PLACEHOLDER),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stylesheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fragments substituted for the placeholder tokens.
#[derive(Debug, Clone)]
pub struct Templates {
    ubl: String,
    qr: String,
    signature: String,
}

impl Templates {
    pub fn new(ubl: impl Into<String>, qr: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            ubl: ubl.into().trim().to_string(),
            qr: qr.into().trim().to_string(),
            signature: signature.into().trim().to_string(),
        }
    }

    fn fragment(&self, step: Stylesheet) -> Option<&str> {
        match step {
            Stylesheet::AddUblElement => Some(&self.ubl),
            Stylesheet::AddQrElement => Some(&self.qr),
            Stylesheet::AddSignatureElement => Some(&self.signature),
            _ => None,
        }
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new(UBL_TEMPLATE, QR_TEMPLATE, SIGNATURE_TEMPLATE)
    }
}

/// Loaded once and shared read-only across signing calls.
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    cleaner: XmlCleaner,
    templates: Templates,
}

impl TransformPipeline {
    pub fn new() -> Result<Self, TransformError> {
        Self::with_templates(Templates::default())
    }

    pub fn with_templates(templates: Templates) -> Result<Self, TransformError> {
        Ok(Self {
            cleaner: XmlCleaner::new().map_err(TransformError::Cleaner)?,
            templates,
        })
    }

    pub fn cleaner(&self) -> &XmlCleaner {
        &self.cleaner
    }

    /// Runs `steps` in order, each consuming the previous step's output.
    pub fn apply_all(&self, xml: &str, steps: &[Stylesheet]) -> Result<String, TransformError> {
        let mut current = xml.to_string();
        for step in steps {
            current = self.apply(&current, *step)?;
        }
        Ok(current)
    }

    pub fn apply(&self, xml: &str, step: Stylesheet) -> Result<String, TransformError> {
        let cleaned = self.cleaner.clean(xml);
        let result = self.apply_to_tree(&cleaned, step);
        if let Err(err) = &result {
            error!(step = step.name(), error = %err, "transform step failed");
        }
        let mut output = result?;

        if let (Some(token), Some(fragment)) = (step.placeholder(), self.templates.fragment(step)) {
            output = output.replace(token, fragment);
        }
        debug!(step = step.name(), "applied transform");
        Ok(output)
    }

    fn apply_to_tree(&self, xml: &str, step: Stylesheet) -> Result<String, TransformError> {
        let xml_err = |source| TransformError::Xml { step, source };
        let mut doc = InvoiceDocument::parse(xml).map_err(xml_err)?;

        match step {
            Stylesheet::RemoveElements => {
                for xpath in REMOVE_ELEMENTS {
                    doc.remove_nodes(xpath).map_err(xml_err)?;
                }
            }
            Stylesheet::InvoiceNormalization => {
                for xpath in NORMALIZATION_EXCLUSIONS {
                    doc.remove_nodes(xpath).map_err(xml_err)?;
                }
                for (prefix, uri) in INJECTED_ROOT_NAMESPACES {
                    doc.ensure_root_namespace(prefix, uri).map_err(xml_err)?;
                }
            }
            Stylesheet::AddUblElement => {
                doc.ensure_root_namespace("ext", EXT_NS).map_err(xml_err)?;
                doc.ensure_root_namespace("cbc", CBC_NS).map_err(xml_err)?;
                let root = doc.root().map_err(xml_err)?;
                match root.get_first_child() {
                    Some(first) => insert_placeholder(&doc, first, Position::Before, step)?,
                    None => append_placeholder(&doc, root, step)?,
                }
            }
            Stylesheet::AddQrElement => {
                declare_aggregate_namespaces(&mut doc).map_err(xml_err)?;
                let references = doc
                    .select("/def:Invoice/cac:AdditionalDocumentReference")
                    .map_err(xml_err)?;
                match references.into_iter().last() {
                    Some(last) => insert_placeholder(&doc, last, Position::After, step)?,
                    None => {
                        let supplier = supplier_party(&doc, step)?;
                        insert_placeholder(&doc, supplier, Position::Before, step)?
                    }
                }
            }
            Stylesheet::AddSignatureElement => {
                declare_aggregate_namespaces(&mut doc).map_err(xml_err)?;
                let supplier = supplier_party(&doc, step)?;
                insert_placeholder(&doc, supplier, Position::Before, step)?;
            }
        }

        Ok(doc.to_xml_without_declaration())
    }
}

enum Position {
    Before,
    After,
}

fn declare_aggregate_namespaces(doc: &mut InvoiceDocument) -> Result<(), XmlError> {
    doc.ensure_root_namespace("cac", CAC_NS)?;
    doc.ensure_root_namespace("cbc", CBC_NS)?;
    Ok(())
}

fn supplier_party(doc: &InvoiceDocument, step: Stylesheet) -> Result<Node, TransformError> {
    doc.select("/def:Invoice/cac:AccountingSupplierParty")
        .map_err(|source| TransformError::Xml { step, source })?
        .into_iter()
        .next()
        .ok_or(TransformError::MissingAnchor {
            step,
            anchor: "cac:AccountingSupplierParty",
        })
}

fn placeholder_node(doc: &InvoiceDocument, step: Stylesheet) -> Result<Node, TransformError> {
    let token = step.placeholder().unwrap_or_default();
    Node::new_text(token, doc.document()).map_err(|_| TransformError::Insert {
        step,
        message: "could not create text node".into(),
    })
}

fn insert_placeholder(
    doc: &InvoiceDocument,
    mut anchor: Node,
    position: Position,
    step: Stylesheet,
) -> Result<(), TransformError> {
    let mut token = placeholder_node(doc, step)?;
    let inserted = match position {
        Position::Before => anchor.add_prev_sibling(&mut token),
        Position::After => anchor.add_next_sibling(&mut token),
    };
    inserted.map_err(|e| TransformError::Insert {
        step,
        message: e.to_string(),
    })
}

fn append_placeholder(
    doc: &InvoiceDocument,
    mut parent: Node,
    step: Stylesheet,
) -> Result<(), TransformError> {
    let mut token = placeholder_node(doc, step)?;
    parent
        .add_child(&mut token)
        .map_err(|e| TransformError::Insert {
            step,
            message: e.to_string(),
        })
}
