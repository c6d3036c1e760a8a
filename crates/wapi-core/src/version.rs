//! Static version records

/// Highest N-API version the bridge implements
pub const NAPI_VERSION: u32 = 8;

/// Host release the bridge reports itself as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub release: &'static str,
}

pub const NODE_VERSION: NodeVersion = NodeVersion {
    major: 16,
    minor: 15,
    patch: 0,
    release: "node",
};

pub fn node_version() -> &'static NodeVersion {
    &NODE_VERSION
}

pub fn napi_version() -> u32 {
    NAPI_VERSION
}
