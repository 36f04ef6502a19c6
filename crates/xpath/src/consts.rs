//! Namespace URIs the engine knows about.

pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
/// Extension functions that need injected capabilities (selector compiler, node factory).
pub const EXT_NS: &str = "urn:xselect:functions";
