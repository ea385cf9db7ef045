//! `DAV:` tag names used by the engine itself.
//!
//! Namespace layers (CalDAV etc.) define their own constants next to
//! their code, with [`QName::from_static`].

use crate::davxml::QName;

pub const DAV_NS: &str = "DAV:";

const fn dav(local: &'static str) -> QName {
    QName::from_static(DAV_NS, local)
}

// error body.
pub const ERROR: QName = dav("error");
pub const NEED_PRIVILEGES: QName = dav("need-privileges");
pub const CANNOT_MODIFY_PROTECTED_PROPERTY: QName = dav("cannot-modify-protected-property");

// live properties.
pub const CREATIONDATE: QName = dav("creationdate");
pub const DISPLAYNAME: QName = dav("displayname");
pub const GETCONTENTLANGUAGE: QName = dav("getcontentlanguage");
pub const GETCONTENTLENGTH: QName = dav("getcontentlength");
pub const GETCONTENTTYPE: QName = dav("getcontenttype");
pub const GETETAG: QName = dav("getetag");
pub const GETLASTMODIFIED: QName = dav("getlastmodified");
pub const RESOURCETYPE: QName = dav("resourcetype");

pub const COLLECTION: QName = dav("collection");
pub const PRINCIPAL: QName = dav("principal");

// RFC3744 group properties.
pub const GROUP_MEMBER_SET: QName = dav("group-member-set");
pub const GROUP_MEMBERSHIP: QName = dav("group-membership");
