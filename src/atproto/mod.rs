//! AT Protocol plumbing: URIs, XRPC calls, identity resolution.
//!
//! Only the slice of the protocol this service consumes lives here; repository
//! structure and record signatures are left to the PDS.

pub mod did_doc;
pub mod identity;
pub mod memory;
pub mod repo;
pub mod uri;
pub mod xrpc;

pub use memory::MemoryRepo;
pub use repo::{ListedRecord, RecordPage, RepoReader};
pub use uri::AtUri;
pub use xrpc::XrpcClient;
