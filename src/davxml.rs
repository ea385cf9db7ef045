//! Namespaced tag names and a small XML emitter.
//!
//! Everything the engine writes as XML (fault bodies, property values)
//! goes through [`XmlEmit`]. The namespace implementation registers its
//! namespaces up front with [`XmlEmit::add_namespace`], they are declared
//! on the root element.

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use crate::util::MemBuffer;
use crate::DavResult;

/// A namespaced XML tag name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    ns: Cow<'static, str>,
    local: Cow<'static, str>,
}

impl QName {
    /// Tag name from static strings, usable in constants.
    pub const fn from_static(ns: &'static str, local: &'static str) -> QName {
        QName {
            ns: Cow::Borrowed(ns),
            local: Cow::Borrowed(local),
        }
    }

    pub fn new(ns: impl Into<String>, local: impl Into<String>) -> QName {
        QName {
            ns: Cow::Owned(ns.into()),
            local: Cow::Owned(local.into()),
        }
    }

    /// Tag name of a parsed element. Elements without a namespace
    /// get the empty namespace.
    pub fn of_element(elem: &xmltree::Element) -> QName {
        QName::new(
            elem.namespace.clone().unwrap_or_default(),
            elem.name.clone(),
        )
    }

    /// Namespace URI.
    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// Local part of the name.
    pub fn local(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.ns, self.local)
    }
}

/// Streaming XML writer with namespace prefix bookkeeping.
pub struct XmlEmit {
    writer: EventWriter<MemBuffer>,
    namespaces: Vec<(String, String)>,
    // number of namespaces declared on the root element.
    declared: Option<usize>,
}

impl XmlEmit {
    pub fn new() -> XmlEmit {
        let writer = EmitterConfig::new()
            .perform_indent(false)
            .write_document_declaration(true)
            .create_writer(MemBuffer::new());
        XmlEmit {
            writer,
            namespaces: Vec::new(),
            declared: None,
        }
    }

    /// Register a namespace under a prefix. Registering the same
    /// namespace twice keeps the first prefix.
    pub fn add_namespace(&mut self, uri: &str, prefix: &str) {
        if self.namespaces.iter().any(|(_, u)| u == uri) {
            return;
        }
        self.namespaces.push((prefix.to_string(), uri.to_string()));
    }

    /// Prefix of a namespace, if it has been registered.
    pub fn prefix(&self, uri: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(_, u)| u == uri)
            .map(|(p, _)| p.as_str())
    }

    fn qualified(&mut self, tag: &QName) -> String {
        if tag.ns().is_empty() {
            return tag.local().to_string();
        }
        if self.prefix(tag.ns()).is_none() {
            // namespaces seen after the root element was written get
            // declared on the element that uses them.
            let prefix = format!("ns{}", self.namespaces.len());
            self.namespaces.push((prefix, tag.ns().to_string()));
        }
        match self.prefix(tag.ns()) {
            Some(p) => format!("{}:{}", p, tag.local()),
            None => tag.local().to_string(),
        }
    }

    fn start(&mut self, tag: &QName) -> DavResult<()> {
        let name = self.qualified(tag);
        let mut decls = Vec::new();
        match self.declared {
            None => {
                decls.extend(self.namespaces.iter().cloned());
                self.declared = Some(self.namespaces.len());
            }
            Some(n) => {
                if let Some(pos) = self.namespaces.iter().position(|(_, u)| u == tag.ns()) {
                    if pos >= n {
                        decls.push(self.namespaces[pos].clone());
                    }
                }
            }
        }
        let mut event = XmlEvent::start_element(name.as_str());
        for (prefix, uri) in &decls {
            event = event.ns(prefix.as_str(), uri.as_str());
        }
        self.writer.write(event)?;
        Ok(())
    }

    /// Write a start tag.
    pub fn open_tag(&mut self, tag: &QName) -> DavResult<()> {
        self.start(tag)
    }

    /// Close the innermost open tag.
    pub fn close_tag(&mut self, _tag: &QName) -> DavResult<()> {
        self.writer.write(XmlEvent::end_element())?;
        Ok(())
    }

    /// Write `<tag/>`.
    pub fn empty_tag(&mut self, tag: &QName) -> DavResult<()> {
        self.start(tag)?;
        self.close_tag(tag)
    }

    /// Write `<tag>value</tag>`.
    pub fn property(&mut self, tag: &QName, value: &str) -> DavResult<()> {
        self.start(tag)?;
        self.value(value)?;
        self.close_tag(tag)
    }

    /// Write escaped character data.
    pub fn value(&mut self, text: &str) -> DavResult<()> {
        self.writer.write(XmlEvent::characters(text))?;
        Ok(())
    }

    /// Finish and return the document.
    pub fn into_bytes(self) -> Bytes {
        let mut buf = self.writer.into_inner();
        buf.take()
    }
}

impl Default for XmlEmit {
    fn default() -> Self {
        XmlEmit::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags;

    fn render(f: impl FnOnce(&mut XmlEmit) -> DavResult<()>) -> String {
        let mut xml = XmlEmit::new();
        xml.add_namespace(tags::DAV_NS, "D");
        f(&mut xml).unwrap();
        String::from_utf8(xml.into_bytes().to_vec()).unwrap()
    }

    #[test]
    fn root_declares_namespaces() {
        let s = render(|x| {
            x.open_tag(&tags::ERROR)?;
            x.empty_tag(&tags::NEED_PRIVILEGES)?;
            x.close_tag(&tags::ERROR)
        });
        assert!(s.contains("<D:error xmlns:D=\"DAV:\">"), "{s}");
        assert!(s.contains("<D:need-privileges"), "{s}");
        assert!(s.ends_with("</D:error>"), "{s}");
    }

    #[test]
    fn unregistered_namespace_gets_prefix() {
        let other = QName::from_static("urn:example", "thing");
        let s = render(|x| {
            x.open_tag(&tags::ERROR)?;
            x.property(&other, "a < b")?;
            x.close_tag(&tags::ERROR)
        });
        assert!(s.contains("xmlns:ns1=\"urn:example\""), "{s}");
        assert!(s.contains("<ns1:thing"), "{s}");
        assert!(s.contains("a &lt; b"), "{s}");
    }

    #[test]
    fn qname_display() {
        assert_eq!(tags::ERROR.to_string(), "{DAV:}error");
        assert_eq!(QName::new("DAV:", "error"), tags::ERROR);
    }
}
