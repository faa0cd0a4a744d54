//! Minimal owned XML element tree on top of `quick-xml`.
//!
//! BOSH responses are small, complete documents, so instead of streaming
//! events like the stanza extractor in a socket proxy would, each response is
//! parsed into an owned [`Element`] tree with namespaces resolved at parse
//! time. That keeps namespace-qualified lookups valid after a child stanza is
//! detached from its `<body>` wrapper (where the `xmlns:stream` declaration
//! usually lives).

use std::fmt;

use quick_xml::escape::escape;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use thiserror::Error;

/// Failure to turn a response body into an element tree.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("malformed attribute: {0}")]
    Attribute(#[from] AttrError),

    /// The document ended before a root element was closed (or started).
    #[error("document has no complete root element")]
    NoRoot,

    #[error("closing tag without matching opening tag")]
    UnbalancedEnd,

    #[error("invalid UTF-8 in document: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its resolved namespace, attributes and children.
///
/// Attribute keys are kept exactly as written (`xmpp:restart`, `xmlns:stream`),
/// namespace declarations included, so serialization reproduces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    prefix: Option<String>,
    name: String,
    namespace: Option<String>,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

/// In-scope namespace declaration: `None` prefix is the default namespace.
type Declaration = (Option<String>, String);

fn utf8(bytes: &[u8]) -> Result<String, XmlError> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

fn lookup<'a>(scope: &'a [Declaration], prefix: Option<&str>) -> Option<&'a str> {
    scope
        .iter()
        .rev()
        .find(|(p, _)| p.as_deref() == prefix)
        .map(|(_, ns)| ns.as_str())
}

impl Element {
    /// Create an element from a possibly prefixed name (`body`, `stream:features`).
    pub fn new(qualified_name: &str) -> Self {
        let (prefix, name) = match qualified_name.split_once(':') {
            Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
            None => (None, qualified_name.to_string()),
        };
        Self {
            prefix,
            name,
            namespace: None,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Put the element in `namespace` and declare it (`xmlns` or `xmlns:prefix`).
    pub fn with_ns(mut self, namespace: &str) -> Self {
        let key = match &self.prefix {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        self.namespace = Some(namespace.to_string());
        self.set_attr(&key, namespace);
        let mut scope = self.child_scope();
        for child in self.children_mut() {
            child.qualify(&mut scope);
        }
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl ToString) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.append_child(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Set an attribute, replacing any previous value for the same key.
    pub fn set_attr(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Append a child. Unqualified elements in the child's subtree take the
    /// namespace they inherit from this element on the wire.
    pub fn append_child(&mut self, mut child: Element) {
        let mut scope = self.child_scope();
        child.qualify(&mut scope);
        self.children.push(Node::Element(child));
    }

    fn children_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// `xmlns` / `xmlns:p` attributes declared on this element.
    fn declarations(&self) -> Vec<Declaration> {
        self.attributes
            .iter()
            .filter_map(|(key, value)| {
                if key == "xmlns" {
                    Some((None, value.clone()))
                } else {
                    key.strip_prefix("xmlns:")
                        .map(|prefix| (Some(prefix.to_string()), value.clone()))
                }
            })
            .collect()
    }

    /// Declarations a child of this element sees, as far as this element knows.
    fn child_scope(&self) -> Vec<Declaration> {
        let mut scope = self.declarations();
        if let (None, Some(ns)) = (&self.prefix, &self.namespace) {
            scope.push((None, ns.clone()));
        }
        scope
    }

    /// Resolve missing namespaces in this subtree against `scope`.
    fn qualify(&mut self, scope: &mut Vec<Declaration>) {
        let mark = scope.len();
        scope.extend(self.declarations());
        if self.namespace.is_none() {
            self.namespace = lookup(scope, self.prefix.as_deref()).map(str::to_string);
        }
        if let (None, Some(ns)) = (&self.prefix, &self.namespace) {
            scope.push((None, ns.clone()));
        }
        for child in self.children_mut() {
            child.qualify(scope);
        }
        scope.truncate(mark);
    }

    /// Add the declarations a detached subtree relied on its ancestors for,
    /// each on the topmost element that needs it.
    fn declare_namespaces(&mut self, scope: &mut Vec<Declaration>) {
        let mark = scope.len();
        scope.extend(self.declarations());
        if let Some(ns) = self.namespace.clone() {
            if lookup(scope, self.prefix.as_deref()) != Some(ns.as_str()) {
                let key = match &self.prefix {
                    Some(prefix) => format!("xmlns:{prefix}"),
                    None => "xmlns".to_string(),
                };
                self.attributes.push((key, ns.clone()));
                scope.push((self.prefix.clone(), ns));
            }
        }
        for child in self.children_mut() {
            child.declare_namespaces(scope);
        }
        scope.truncate(mark);
    }

    /// Local name, without prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// True if this element is `{namespace}name`.
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Attribute value by key as written in the document (`sid`, `xmpp:version`).
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    /// Child elements, skipping text.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn first_child(&self) -> Option<&Element> {
        self.children().next()
    }

    /// Detach and return the first child element. Namespace declarations it
    /// inherited are copied onto it, so it serializes as a standalone document.
    pub fn into_first_child(self) -> Option<Element> {
        let mut child = self.children.into_iter().find_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })?;
        child.declare_namespaces(&mut Vec::new());
        Some(child)
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Follow a path of `(namespace, local name)` steps through child elements,
    /// the equivalent of XPath `./a:x/b:y` with prefix bindings. Returns the
    /// first match.
    pub fn find(&self, path: &[(&str, &str)]) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }

    /// Every element reachable through `path`, in document order.
    pub fn find_all(&self, path: &[(&str, &str)]) -> Vec<&Element> {
        let mut current = vec![self];
        for (namespace, name) in path {
            current = current
                .into_iter()
                .flat_map(|el| el.children().filter(|child| child.is(namespace, name)))
                .collect();
            if current.is_empty() {
                break;
            }
        }
        current
    }

    /// Serialize without an XML declaration, single-quoting attributes.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        let qualified = self.qualified_name();
        out.push('<');
        out.push_str(&qualified);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("='");
            out.push_str(&escape(value.as_str()));
            out.push('\'');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(el) => el.write_xml(out),
                Node::Text(text) => out.push_str(&escape(text.as_str())),
            }
        }
        out.push_str("</");
        out.push_str(&qualified);
        out.push('>');
    }

    fn from_start(namespace: ResolveResult<'_>, start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let qname = start.name();
        let mut element = Element {
            prefix: qname.prefix().map(|p| utf8(p.as_ref())).transpose()?,
            name: utf8(qname.local_name().as_ref())?,
            namespace: match namespace {
                ResolveResult::Bound(ns) => Some(utf8(ns.as_ref())?),
                // Undeclared prefixes are tolerated; the element is just unqualified
                ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
            },
            attributes: Vec::new(),
            children: Vec::new(),
        };
        for attr in start.attributes() {
            let attr = attr?;
            let key = utf8(attr.key.as_ref())?;
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

/// Attach a finished element to its parent, or hand it back if it is the root.
/// Parsed namespaces are already resolved, so the child is pushed as-is.
fn attach(stack: &mut [Element], element: Element) -> Option<Element> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            None
        }
        None => Some(element),
    }
}

/// Parse a complete document and return its root element.
///
/// Whitespace-only text between elements is dropped; anything after the root
/// closes is ignored.
pub fn parse(text: &str) -> Result<Element, XmlError> {
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();

    loop {
        match reader.read_resolved_event()? {
            (ns, Event::Start(e)) => {
                stack.push(Element::from_start(ns, &e)?);
            }
            (ns, Event::Empty(e)) => {
                let element = Element::from_start(ns, &e)?;
                if let Some(root) = attach(&mut stack, element) {
                    return Ok(root);
                }
            }
            (_, Event::End(_)) => {
                let element = stack.pop().ok_or(XmlError::UnbalancedEnd)?;
                if let Some(root) = attach(&mut stack, element) {
                    return Ok(root);
                }
            }
            (_, Event::Text(e)) => {
                let text = e.unescape()?;
                if let Some(parent) = stack.last_mut() {
                    if !text.trim().is_empty() {
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                }
            }
            (_, Event::CData(e)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(utf8(&e)?));
                }
            }
            (_, Event::Eof) => return Err(XmlError::NoRoot),
            // Declarations, comments, processing instructions
            _ => {}
        }
    }
}
