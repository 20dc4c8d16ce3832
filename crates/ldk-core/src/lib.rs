pub mod bridge_ipc;
pub mod link;
pub mod normalize;

pub use link::{Link, LinkMetadata, LinkPatch, LinkPriority, LinkStatus};
pub use normalize::{normalize_link, RawLinkPayload, RawMetadataPayload};
