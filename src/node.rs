//! Nodes: the resources of a namespace.
//!
//! A node is created by [`DavNamespace::resolve`](crate::ns::DavNamespace::resolve)
//! and is only valid for the request that created it.

use std::fmt::Debug;
use std::time::SystemTime;

use percent_encoding::percent_decode_str;
use xmltree::Element;

use crate::davpath::DavPath;
use crate::davxml::{QName, XmlEmit};
use crate::props::{LiveProperties, PropertyProvider, PropertyRegistry, SetPropertyResult};
use crate::tags;
use crate::DavResult;

const LIVE_ONLY: &[&dyn PropertyProvider] = &[&LiveProperties];
const PRINCIPAL_CHAIN: &[&dyn PropertyProvider] = &[&PrincipalProperties, &LiveProperties];

/// Format an entity tag value, `"v"` or `W/"v"`.
pub fn format_etag(value: &str, strong: bool) -> String {
    if strong {
        format!("\"{value}\"")
    } else {
        format!("W/\"{value}\"")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalKind {
    User,
    Group,
}

/// A user or group identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    pub kind: PrincipalKind,
    /// Account name, e.g. `bob`.
    pub account: String,
    /// Path of the principal resource.
    pub href: String,
}

impl Principal {
    pub fn user(account: impl Into<String>, href: impl Into<String>) -> Principal {
        Principal {
            kind: PrincipalKind::User,
            account: account.into(),
            href: href.into(),
        }
    }

    pub fn group(account: impl Into<String>, href: impl Into<String>) -> Principal {
        Principal {
            kind: PrincipalKind::Group,
            account: account.into(),
            href: href.into(),
        }
    }
}

/// One addressable resource, collection or leaf.
pub trait DavNode: Debug + Send + Sync {
    fn path(&self) -> &DavPath;

    fn is_collection(&self) -> bool;

    /// A node that does not exist stands for a resource that may be
    /// created, e.g. the target of a PUT.
    fn exists(&self) -> bool;

    fn owner(&self) -> Option<&Principal>;

    /// Raw entity tag value, without quotes.
    fn etag(&self) -> Option<String>;

    /// Entity tag as sent on the wire.
    fn etag_value(&self, strong: bool) -> Option<String> {
        self.etag().map(|v| format_etag(&v, strong))
    }

    /// Always display the href with a trailing slash.
    fn trail_slash(&self) -> bool {
        false
    }

    fn content_len(&self) -> u64 {
        0
    }

    fn content_type(&self) -> Option<String> {
        None
    }

    fn content_lang(&self) -> Option<String> {
        None
    }

    fn content_binary(&self) -> bool {
        false
    }

    fn creation_date(&self) -> Option<SystemTime> {
        None
    }

    fn last_modified(&self) -> Option<SystemTime> {
        None
    }

    /// Last path segment, decoded. `None` for the root.
    fn display_name(&self) -> Option<String> {
        match self.path().file_name() {
            "" => None,
            name => Some(percent_decode_str(name).decode_utf8_lossy().into_owned()),
        }
    }

    /// The property chain of this node type, most specific first.
    fn property_providers(&self) -> &[&dyn PropertyProvider] {
        LIVE_ONLY
    }

    /// Href of the node, prefix included.
    fn href(&self) -> String {
        let mut href = self.path().with_prefix_url_string();
        if (self.trail_slash() || self.is_collection()) && !href.ends_with('/') {
            href.push('/');
        }
        href
    }
}

lazy_static! {
    static ref PRINCIPAL_PROPERTIES: PropertyRegistry = PropertyRegistry::new()
        .add(tags::GROUP_MEMBER_SET, false)
        .add(tags::GROUP_MEMBERSHIP, false)
        .add(tags::RESOURCETYPE, true);
}

/// Properties of principal resources.
///
/// Group membership is not resolved, both group properties are
/// returned empty.
pub struct PrincipalProperties;

impl PropertyProvider for PrincipalProperties {
    fn registry(&self) -> &PropertyRegistry {
        &PRINCIPAL_PROPERTIES
    }

    fn generate(
        &self,
        node: &dyn DavNode,
        tag: &QName,
        xml: &mut XmlEmit,
        _all_prop: bool,
    ) -> DavResult<bool> {
        if *tag == tags::GROUP_MEMBER_SET || *tag == tags::GROUP_MEMBERSHIP {
            xml.empty_tag(tag)?;
            return Ok(true);
        }
        if *tag == tags::RESOURCETYPE {
            xml.open_tag(tag)?;
            if node.is_collection() {
                xml.empty_tag(&tags::COLLECTION)?;
            }
            xml.empty_tag(&tags::PRINCIPAL)?;
            xml.close_tag(tag)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn remove_property(
        &self,
        _node: &dyn DavNode,
        val: &Element,
        _spr: &mut SetPropertyResult,
    ) -> DavResult<bool> {
        warn!("Unimplemented - removeProperty {}", QName::of_element(val));
        Ok(false)
    }
}

/// A principal (user or group) exposed as a node.
///
/// Principals have no content: zero length, no content type or
/// language, and a fixed entity tag.
#[derive(Debug, Clone)]
pub struct PrincipalNode {
    path: DavPath,
    account: Principal,
    collection: bool,
}

impl PrincipalNode {
    pub const ETAG: &'static str = "1234567890";

    pub fn new(path: DavPath, account: Principal, collection: bool) -> PrincipalNode {
        PrincipalNode {
            path,
            account,
            collection,
        }
    }

    pub fn account(&self) -> &Principal {
        &self.account
    }
}

impl DavNode for PrincipalNode {
    fn path(&self) -> &DavPath {
        &self.path
    }

    fn is_collection(&self) -> bool {
        self.collection
    }

    fn exists(&self) -> bool {
        true
    }

    fn owner(&self) -> Option<&Principal> {
        Some(&self.account)
    }

    fn etag(&self) -> Option<String> {
        Some(PrincipalNode::ETAG.to_string())
    }

    fn trail_slash(&self) -> bool {
        true
    }

    fn display_name(&self) -> Option<String> {
        Some(self.account.account.clone())
    }

    fn property_providers(&self) -> &[&dyn PropertyProvider] {
        PRINCIPAL_CHAIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn bob() -> PrincipalNode {
        PrincipalNode::new(
            DavPath::new("/principals/users/bob").unwrap(),
            Principal::user("bob", "/principals/users/bob/"),
            false,
        )
    }

    fn emit(node: &dyn DavNode, tag: &QName) -> (bool, String) {
        let mut xml = XmlEmit::new();
        xml.add_namespace(tags::DAV_NS, "D");
        xml.open_tag(&tags::ERROR).unwrap();
        let found = node.generate_property_value(tag, &mut xml, false).unwrap();
        xml.close_tag(&tags::ERROR).unwrap();
        (found, String::from_utf8(xml.into_bytes().to_vec()).unwrap())
    }

    #[test]
    fn principal_basics() {
        let p = bob();
        assert!(p.exists());
        assert_eq!(p.content_len(), 0);
        assert_eq!(p.content_type(), None);
        assert_eq!(p.content_lang(), None);
        assert!(!p.content_binary());
        assert_eq!(p.owner().unwrap().account, "bob");
        assert_eq!(p.display_name().as_deref(), Some("bob"));
        assert_eq!(p.href(), "/principals/users/bob/");
    }

    #[test]
    fn principal_etag() {
        let p = bob();
        assert_eq!(p.etag_value(true).as_deref(), Some("\"1234567890\""));
        assert_eq!(p.etag_value(false).as_deref(), Some("W/\"1234567890\""));
    }

    #[test]
    fn group_properties_are_empty() {
        let p = bob();
        let node: &dyn DavNode = &p;
        for tag in [tags::GROUP_MEMBER_SET, tags::GROUP_MEMBERSHIP] {
            assert!(node.known_property(&tag));
            let (found, s) = emit(node, &tag);
            assert!(found);
            assert!(s.contains(&format!("<D:{}", tag.local())), "{s}");
            assert!(!s.contains(&format!("</D:{}>", tag.local())), "{s}");
        }
    }

    #[test]
    fn delegates_to_live_properties() {
        let p = bob();
        let node: &dyn DavNode = &p;
        let (found, s) = emit(node, &tags::DISPLAYNAME);
        assert!(found);
        assert!(s.contains(">bob<"), "{s}");
        let (found, s) = emit(node, &tags::RESOURCETYPE);
        assert!(found);
        assert!(s.contains("<D:principal"), "{s}");
        assert!(!emit(node, &tags::GETCONTENTTYPE).0);
        let unknown = QName::from_static("urn:example", "x");
        assert!(!node.known_property(&unknown));
    }

    #[test]
    fn group_properties_not_in_allprop() {
        let p = bob();
        let node: &dyn DavNode = &p;
        let names = node.all_prop_names();
        assert!(!names.contains(&tags::GROUP_MEMBERSHIP));
        assert!(names.contains(&tags::RESOURCETYPE));
    }

    #[test]
    fn group_property_mutation() {
        let p = bob();
        let node: &dyn DavNode = &p;
        let mut elem = Element::new("group-membership");
        elem.namespace = Some("DAV:".into());
        let mut spr = SetPropertyResult::new(&elem);
        assert!(!node.remove_property(&elem, &mut spr).unwrap());
        assert!(!node.set_property(&elem, &mut spr).unwrap());
        assert_eq!(spr.status, StatusCode::OK);
    }
}
