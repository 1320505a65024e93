//! A small element tree for parts the codecs keep opaque
//!
//! Drawings, comments, VML shapes and slicers are only edited, never
//! modelled. They are parsed into [`Element`]s whose start tags are kept as
//! read, so everything an edit does not touch serializes back unchanged.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{self, Attrs};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Element(Element),
    /// Character data, still escaped
    Text(String),
    /// Comments, CDATA sections and processing instructions
    Markup(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element {
    /// Qualified name
    pub name: String,
    attrs: Attrs,
    /// Start tag content as read; dropped once an attribute changes
    tag: Option<String>,
    pub children: Vec<Node>,
    /// Read as `<x/>`
    empty: bool,
}

/// A parsed part
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Document {
    /// Declaration and anything else before the root element
    prolog: String,
    pub root: Element,
}

impl Document {
    pub(crate) fn parse(part: &str, bytes: &[u8]) -> XlsxResult<Self> {
        let mut reader = xml::reader(bytes);
        let mut buf = Vec::new();
        let mut prolog = String::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            buf.clear();
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| XlsxError::xml(part, e))?;
            let node = match event {
                Event::Start(e) => {
                    stack.push(Element::from_start(&e, part, false)?);
                    continue;
                }
                Event::Empty(e) => Node::Element(Element::from_start(&e, part, true)?),
                Event::End(_) => match stack.pop() {
                    Some(element) => Node::Element(element),
                    None => return Err(XlsxError::invalid_part(part, "xml", "unbalanced end tag")),
                },
                Event::Text(t) => Node::Text(String::from_utf8_lossy(&t).into_owned()),
                Event::CData(t) => Node::Markup(format!(
                    "<![CDATA[{}]]>",
                    String::from_utf8_lossy(&t)
                )),
                Event::Comment(t) => Node::Markup(format!("<!--{}-->", String::from_utf8_lossy(&t))),
                Event::Decl(d) => Node::Markup(format!("<?{}?>", String::from_utf8_lossy(&d))),
                Event::PI(p) => Node::Markup(format!("<?{}?>", String::from_utf8_lossy(&p))),
                Event::DocType(t) => Node::Markup(format!("<!DOCTYPE {}>", String::from_utf8_lossy(&t))),
                Event::Eof => break,
            };
            match (stack.last_mut(), node) {
                (Some(parent), node) => parent.children.push(node),
                (None, Node::Element(element)) => {
                    if root.is_some() {
                        return Err(XlsxError::invalid_part(part, &element.name, "second root element"));
                    }
                    root = Some(element);
                }
                (None, Node::Text(s) | Node::Markup(s)) => {
                    if root.is_none() {
                        prolog.push_str(&s);
                    }
                }
            }
        }

        if !stack.is_empty() {
            return Err(XlsxError::invalid_part(part, "xml", "unexpected end of part"));
        }
        let root = root.ok_or_else(|| XlsxError::invalid_part(part, "root", "no root element"))?;
        Ok(Self { prolog, root })
    }

    /// A document with the standard declaration
    pub(crate) fn with_root(root: Element) -> Self {
        Self {
            prolog: xml::XML_DECLARATION.to_string(),
            root,
        }
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.prolog.clone();
        self.root.write(&mut out);
        out.into_bytes()
    }

    /// Prefixes the root binds to the relationships namespace
    pub(crate) fn rel_prefixes(&self) -> Vec<String> {
        xml::relationship_prefixes(&self.root.attrs)
    }
}

impl Element {
    fn from_start(e: &BytesStart<'_>, part: &str, empty: bool) -> XlsxResult<Self> {
        Ok(Self {
            name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            attrs: xml::attributes(e, part)?,
            tag: Some(String::from_utf8_lossy(e).into_owned()),
            children: Vec::new(),
            empty,
        })
    }

    /// A new element with no children
    pub(crate) fn new(name: &str, attrs: Attrs) -> Self {
        Self {
            name: name.to_string(),
            attrs,
            tag: None,
            children: Vec::new(),
            empty: true,
        }
    }

    /// Parse a standalone fragment
    pub(crate) fn parse(part: &str, fragment: &str) -> XlsxResult<Self> {
        Ok(Document::parse(part, fragment.as_bytes())?.root)
    }

    pub(crate) fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub(crate) fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub(crate) fn attr(&self, key: &str) -> Option<&str> {
        xml::attr(&self.attrs, key)
    }

    /// Value of an attribute by local name, whatever its prefix
    pub(crate) fn attr_local(&self, local: &str) -> Option<&str> {
        self.attrs.iter().find_map(|(k, v)| {
            let name = k.rsplit(':').next().unwrap_or(k);
            (name == local && !k.starts_with("xmlns")).then_some(v.as_str())
        })
    }

    pub(crate) fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        xml::set_attr(&mut self.attrs, key, value);
        self.tag = None;
    }

    /// Declare `namespace` on this element if needed; returns the prefix bound to it
    pub(crate) fn ensure_namespace(&mut self, prefix: &str, namespace: &str) -> String {
        let before = self.attrs.len();
        let prefix = xml::ensure_namespace(&mut self.attrs, prefix, namespace);
        if self.attrs.len() != before {
            self.tag = None;
        }
        prefix
    }

    /// Child elements
    pub(crate) fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First child element with a local name
    pub(crate) fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == local)
    }

    pub(crate) fn child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.local_name() == local => Some(e),
            _ => None,
        })
    }

    /// Every element below this one, depth first
    pub(crate) fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.elements().collect();
        stack.reverse();
        while let Some(e) = stack.pop() {
            out.push(e);
            let before = stack.len();
            stack.extend(e.elements());
            stack[before..].reverse();
        }
        out
    }

    /// First descendant with a local name
    pub(crate) fn find(&self, local: &str) -> Option<&Element> {
        self.descendants().into_iter().find(|e| e.local_name() == local)
    }

    /// Unescaped text of the direct children
    pub(crate) fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(raw) = node {
                match unescape(raw) {
                    Ok(text) => out.push_str(&text),
                    Err(_) => out.push_str(raw),
                }
            }
        }
        out
    }

    pub(crate) fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Drop the child elements `keep` rejects; returns how many went
    pub(crate) fn retain_elements(&mut self, mut keep: impl FnMut(&Element) -> bool) -> usize {
        let before = self.children.len();
        self.children.retain(|n| match n {
            Node::Element(e) => keep(e),
            _ => true,
        });
        before - self.children.len()
    }

    /// Drop every element below this one that `remove` selects
    pub(crate) fn remove_descendants(&mut self, remove: &dyn Fn(&Element) -> bool) -> usize {
        let mut count = 0;
        self.children.retain_mut(|n| match n {
            Node::Element(e) if remove(e) => {
                count += 1;
                false
            }
            Node::Element(e) => {
                count += e.remove_descendants(remove);
                true
            }
            _ => true,
        });
        count
    }

    /// Relationship ids referenced by this element and its subtree
    ///
    /// `inherited` are the relationship prefixes in scope; declarations on
    /// inner elements (common in drawings) are picked up on the way down.
    pub(crate) fn rel_ids(&self, inherited: &[String]) -> Vec<String> {
        let mut prefixes = inherited.to_vec();
        prefixes.extend(
            self.attrs
                .iter()
                .filter(|(_, v)| v == xml::NS_RELATIONSHIPS)
                .filter_map(|(k, _)| k.strip_prefix("xmlns:").map(str::to_string)),
        );
        let mut ids: Vec<String> = self
            .attrs
            .iter()
            .filter_map(|(k, v)| {
                let (prefix, _) = k.split_once(':')?;
                (prefix != "xmlns" && prefixes.iter().any(|p| p == prefix) && !v.is_empty())
                    .then(|| v.clone())
            })
            .collect();
        for child in self.elements() {
            ids.extend(child.rel_ids(&prefixes));
        }
        ids
    }

    pub(crate) fn write(&self, out: &mut String) {
        out.push('<');
        match &self.tag {
            Some(tag) => out.push_str(tag),
            None => {
                out.push_str(&self.name);
                xml::write_attrs(out, &self.attrs);
            }
        }
        if self.children.is_empty() && self.empty {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(e) => e.write(out),
                Node::Text(s) | Node::Markup(s) => out.push_str(s),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }
}
