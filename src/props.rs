//! Property resolution.
//!
//! Every node type has an ordered chain of [`PropertyProvider`]s. A
//! provider owns the tags in its [`PropertyRegistry`]; resolving a tag
//! asks the first provider in the chain that owns it, and nobody else.
//! A more specialized node type puts its own provider in front of the
//! generic ones.
//!
//! "Nobody owns this tag" is not an error: `generate_property_value`
//! returns `Ok(false)` and the caller reports the property as not found.

use std::collections::HashMap;

use http::StatusCode;
use xmltree::Element;

use crate::davxml::{QName, XmlEmit};
use crate::node::DavNode;
use crate::tags;
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339};
use crate::DavResult;

/// Descriptor of a property a provider knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTagEntry {
    pub tag: QName,
    /// Returned for a `DAV:allprop` request.
    pub in_prop_all: bool,
}

/// Set of properties owned by one provider. Built once per provider.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    entries: HashMap<QName, PropertyTagEntry>,
}

impl PropertyRegistry {
    pub fn new() -> PropertyRegistry {
        PropertyRegistry::default()
    }

    /// Add a property.
    pub fn add(mut self, tag: QName, in_prop_all: bool) -> Self {
        self.entries
            .insert(tag.clone(), PropertyTagEntry { tag, in_prop_all });
        self
    }

    pub fn get(&self, tag: &QName) -> Option<&PropertyTagEntry> {
        self.entries.get(tag)
    }

    pub fn contains(&self, tag: &QName) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyTagEntry> {
        self.entries.values()
    }
}

/// Outcome of a single PROPPATCH set or remove.
#[derive(Debug, Clone)]
pub struct SetPropertyResult {
    /// The property element from the request.
    pub prop: Element,
    pub status: StatusCode,
    pub condition: Option<QName>,
    pub message: Option<String>,
}

impl SetPropertyResult {
    pub fn new(prop: &Element) -> SetPropertyResult {
        SetPropertyResult {
            prop: prop.clone(),
            status: StatusCode::OK,
            condition: None,
            message: None,
        }
    }

    /// Record a failure for this property.
    pub fn fail(&mut self, status: StatusCode, condition: Option<QName>, message: Option<&str>) {
        self.status = status;
        self.condition = condition;
        self.message = message.map(|m| m.to_string());
    }
}

/// One link of a node type's property chain.
pub trait PropertyProvider: Send + Sync {
    /// The tags this provider answers for.
    fn registry(&self) -> &PropertyRegistry;

    /// Emit the value of `tag` for `node`.
    ///
    /// Returns `false` if there is no value, e.g. a node without a
    /// content type.
    fn generate(
        &self,
        node: &dyn DavNode,
        tag: &QName,
        xml: &mut XmlEmit,
        all_prop: bool,
    ) -> DavResult<bool>;

    /// Set a property. `false` means "not applicable here".
    fn set_property(
        &self,
        _node: &dyn DavNode,
        _val: &Element,
        _spr: &mut SetPropertyResult,
    ) -> DavResult<bool> {
        Ok(false)
    }

    /// Remove a property. `false` means "not applicable here".
    fn remove_property(
        &self,
        _node: &dyn DavNode,
        _val: &Element,
        _spr: &mut SetPropertyResult,
    ) -> DavResult<bool> {
        Ok(false)
    }
}

impl<'n> dyn DavNode + 'n {
    // first provider in the chain that owns the tag.
    fn provider_for(&self, tag: &QName) -> Option<&dyn PropertyProvider> {
        self.property_providers()
            .iter()
            .copied()
            .find(|p| p.registry().contains(tag))
    }

    /// Some provider in the chain owns this tag.
    pub fn known_property(&self, tag: &QName) -> bool {
        self.provider_for(tag).is_some()
    }

    /// Emit the value of `tag`. `Ok(false)` if nobody recognizes it
    /// or there is no value.
    pub fn generate_property_value(
        &self,
        tag: &QName,
        xml: &mut XmlEmit,
        all_prop: bool,
    ) -> DavResult<bool> {
        match self.provider_for(tag) {
            Some(p) => p.generate(self, tag, xml, all_prop),
            None => Ok(false),
        }
    }

    /// Set the property `val`.
    pub fn set_property(&self, val: &Element, spr: &mut SetPropertyResult) -> DavResult<bool> {
        match self.provider_for(&QName::of_element(val)) {
            Some(p) => p.set_property(self, val, spr),
            None => Ok(false),
        }
    }

    /// Remove the property `val`.
    pub fn remove_property(&self, val: &Element, spr: &mut SetPropertyResult) -> DavResult<bool> {
        match self.provider_for(&QName::of_element(val)) {
            Some(p) => p.remove_property(self, val, spr),
            None => Ok(false),
        }
    }

    /// Tags returned for `DAV:allprop`, sorted.
    pub fn all_prop_names(&self) -> Vec<QName> {
        let mut names: Vec<QName> = self
            .property_providers()
            .iter()
            .flat_map(|p| p.registry().iter())
            .filter(|e| e.in_prop_all)
            .map(|e| e.tag.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

lazy_static! {
    static ref LIVE_PROPERTIES: PropertyRegistry = PropertyRegistry::new()
        .add(tags::CREATIONDATE, true)
        .add(tags::DISPLAYNAME, true)
        .add(tags::GETCONTENTLANGUAGE, true)
        .add(tags::GETCONTENTLENGTH, true)
        .add(tags::GETCONTENTTYPE, true)
        .add(tags::GETETAG, true)
        .add(tags::GETLASTMODIFIED, true)
        .add(tags::RESOURCETYPE, true);
}

/// The RFC4918 live properties every node has. They are computed
/// from the node and cannot be changed with PROPPATCH.
pub struct LiveProperties;

impl LiveProperties {
    fn protected(spr: &mut SetPropertyResult) -> DavResult<bool> {
        spr.fail(
            StatusCode::FORBIDDEN,
            Some(tags::CANNOT_MODIFY_PROTECTED_PROPERTY),
            None,
        );
        Ok(true)
    }
}

impl PropertyProvider for LiveProperties {
    fn registry(&self) -> &PropertyRegistry {
        &LIVE_PROPERTIES
    }

    fn generate(
        &self,
        node: &dyn DavNode,
        tag: &QName,
        xml: &mut XmlEmit,
        _all_prop: bool,
    ) -> DavResult<bool> {
        let value = match tag {
            t if *t == tags::CREATIONDATE => node.creation_date().map(systemtime_to_rfc3339),
            t if *t == tags::DISPLAYNAME => node.display_name(),
            t if *t == tags::GETCONTENTLANGUAGE => node.content_lang(),
            t if *t == tags::GETCONTENTLENGTH => Some(node.content_len().to_string()),
            t if *t == tags::GETCONTENTTYPE => node.content_type(),
            t if *t == tags::GETETAG => node.etag_value(true),
            t if *t == tags::GETLASTMODIFIED => node.last_modified().map(systemtime_to_httpdate),
            t if *t == tags::RESOURCETYPE => {
                if node.is_collection() {
                    xml.open_tag(tag)?;
                    xml.empty_tag(&tags::COLLECTION)?;
                    xml.close_tag(tag)?;
                } else {
                    xml.empty_tag(tag)?;
                }
                return Ok(true);
            }
            _ => return Ok(false),
        };
        match value {
            Some(v) => {
                xml.property(tag, &v)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_property(
        &self,
        _node: &dyn DavNode,
        _val: &Element,
        spr: &mut SetPropertyResult,
    ) -> DavResult<bool> {
        LiveProperties::protected(spr)
    }

    fn remove_property(
        &self,
        _node: &dyn DavNode,
        _val: &Element,
        spr: &mut SetPropertyResult,
    ) -> DavResult<bool> {
        LiveProperties::protected(spr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::davpath::DavPath;
    use crate::node::Principal;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[derive(Debug)]
    struct FileNode {
        path: DavPath,
    }

    impl DavNode for FileNode {
        fn path(&self) -> &DavPath {
            &self.path
        }
        fn is_collection(&self) -> bool {
            false
        }
        fn exists(&self) -> bool {
            true
        }
        fn owner(&self) -> Option<&Principal> {
            None
        }
        fn etag(&self) -> Option<String> {
            Some("abc".into())
        }
        fn content_len(&self) -> u64 {
            42
        }
        fn content_type(&self) -> Option<String> {
            Some("text/calendar".into())
        }
        fn last_modified(&self) -> Option<SystemTime> {
            Some(UNIX_EPOCH + Duration::from_secs(784111777))
        }
    }

    fn emit(node: &dyn DavNode, tag: &QName) -> (bool, String) {
        let mut xml = XmlEmit::new();
        xml.add_namespace(tags::DAV_NS, "D");
        xml.open_tag(&tags::ERROR).unwrap();
        let found = node.generate_property_value(tag, &mut xml, false).unwrap();
        xml.close_tag(&tags::ERROR).unwrap();
        (found, String::from_utf8(xml.into_bytes().to_vec()).unwrap())
    }

    fn file() -> FileNode {
        FileNode {
            path: DavPath::new("/cal/event.ics").unwrap(),
        }
    }

    #[test]
    fn live_properties() {
        let f = file();
        let node: &dyn DavNode = &f;
        assert!(node.known_property(&tags::GETETAG));
        let (found, s) = emit(node, &tags::GETETAG);
        assert!(found);
        assert!(s.contains("<D:getetag>"), "{s}");
        assert!(s.contains("abc"), "{s}");
        assert!(emit(node, &tags::GETCONTENTLENGTH).1.contains(">42<"));
        assert!(emit(node, &tags::DISPLAYNAME).1.contains(">event.ics<"));
        assert!(emit(node, &tags::GETLASTMODIFIED)
            .1
            .contains("Sun, 06 Nov 1994 08:49:37 GMT"));
        let (found, s) = emit(node, &tags::RESOURCETYPE);
        assert!(found);
        assert!(s.contains("<D:resourcetype"), "{s}");
        assert!(!s.contains("collection"), "{s}");
    }

    #[test]
    fn missing_value_is_not_handled() {
        let f = file();
        let node: &dyn DavNode = &f;
        assert!(node.known_property(&tags::GETCONTENTLANGUAGE));
        assert!(!emit(node, &tags::GETCONTENTLANGUAGE).0);
        assert!(!emit(node, &tags::CREATIONDATE).0);
    }

    #[test]
    fn root_has_no_display_name() {
        let root = FileNode {
            path: DavPath::new("/").unwrap(),
        };
        let node: &dyn DavNode = &root;
        assert_eq!(node.display_name(), None);
        assert!(!emit(node, &tags::DISPLAYNAME).0);

        let escaped = FileNode {
            path: DavPath::new("/a%2Fb").unwrap(),
        };
        assert_eq!(escaped.display_name().as_deref(), Some("a/b"));
    }

    #[test]
    fn unknown_property() {
        let f = file();
        let node: &dyn DavNode = &f;
        let tag = QName::from_static("urn:example", "color");
        assert!(!node.known_property(&tag));
        assert!(!emit(node, &tag).0);
        assert!(!node.known_property(&tags::GROUP_MEMBERSHIP));
    }

    #[test]
    fn live_properties_are_protected() {
        let f = file();
        let node: &dyn DavNode = &f;
        let mut elem = Element::new("getetag");
        elem.namespace = Some("DAV:".into());
        let mut spr = SetPropertyResult::new(&elem);
        assert!(node.set_property(&elem, &mut spr).unwrap());
        assert_eq!(spr.status, StatusCode::FORBIDDEN);
        assert_eq!(spr.condition, Some(tags::CANNOT_MODIFY_PROTECTED_PROPERTY));

        let mut other = Element::new("color");
        other.namespace = Some("urn:example".into());
        let mut spr = SetPropertyResult::new(&other);
        assert!(!node.remove_property(&other, &mut spr).unwrap());
        assert_eq!(spr.status, StatusCode::OK);
    }

    #[test]
    fn allprop_names() {
        let f = file();
        let node: &dyn DavNode = &f;
        let names = node.all_prop_names();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&tags::GETETAG));
    }
}
