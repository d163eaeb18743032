//! Remote entity-query source.
//!
//! The caches never talk HTTP themselves. They go through a [`Loader`] bound
//! to one REST method, which calls a [`RemoteSource`] and turns whatever comes
//! back (including transport failures) into a typed reply carrying an
//! `err`/`errstr` status.

mod http;
mod loader;
#[cfg(test)]
pub(crate) mod mock;
mod types;

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::Value;

pub use http::HttpSource;
pub use loader::Loader;
pub use types::{
  Node, NodeId, PageReply, ParamValue, Params, Reply, SortDirection, Status, TreeReply, GROUP,
  ROOT,
};

/// Method returning (part of) the entity tree.
pub const GET_TREE: &str = "getTree";

/// Method returning a page of datasets.
pub const GET_DATASETS: &str = "getDatasets";

/// Something that can execute a named REST method.
///
/// An `Err` means the call never produced a reply (connection refused,
/// malformed body, ...). Application errors are reported inside the returned
/// value through its `err` field.
#[async_trait]
pub trait RemoteSource: Send + Sync + 'static {
  async fn call(&self, method: &str, params: &Params) -> Result<Value>;
}
