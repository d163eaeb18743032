use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::types::{Params, Reply, Status};
use super::RemoteSource;
use crate::cache::lock;

/// Binds a REST method name to a [`RemoteSource`].
///
/// The only state is the last reply, shared between clones.
pub struct Loader<S, R> {
  method: &'static str,
  source: Arc<S>,
  last: Arc<Mutex<Option<R>>>,
}

impl<S: RemoteSource, R: Reply> Loader<S, R> {
  pub fn new(method: &'static str, source: Arc<S>) -> Self {
    Self {
      method,
      source,
      last: Arc::new(Mutex::new(None)),
    }
  }

  /// Call the method and decode the reply.
  ///
  /// Never fails: a transport error or an undecodable body becomes a reply
  /// with `err = 1` and the error text in `errstr`.
  pub async fn load(&self, params: Params) -> R {
    debug!(method = self.method, ?params, "Calling remote source");

    let reply = match self.source.call(self.method, &params).await {
      Ok(value) => serde_json::from_value::<R>(value).unwrap_or_else(|e| {
        R::failed(Status::failed(format!(
          "Failed to decode {} reply: {}",
          self.method, e
        )))
      }),
      Err(e) => R::failed(Status::failed(format!("{} call failed: {}", self.method, e))),
    };

    let status = reply.status();
    if !status.is_ok() {
      warn!(
        method = self.method,
        err = status.err,
        errstr = %status.errstr,
        "Remote call reported an error"
      );
    }

    *lock(&self.last) = Some(reply.clone());
    reply
  }

  /// The reply of the most recent call, if any.
  pub fn last(&self) -> Option<R> {
    lock(&self.last).clone()
  }
}

impl<S, R> Clone for Loader<S, R> {
  fn clone(&self) -> Self {
    Self {
      method: self.method,
      source: Arc::clone(&self.source),
      last: Arc::clone(&self.last),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::mock::MockSource;
  use crate::remote::{PageReply, TreeReply, GET_DATASETS, GET_TREE, ROOT};

  #[tokio::test]
  async fn test_load_decodes_reply_and_remembers_it() {
    let source = Arc::new(MockSource::with_tree(&[(ROOT, 0, "GROUP"), (2, ROOT, "GROUP")]));
    let loader: Loader<_, TreeReply> = Loader::new(GET_TREE, source.clone());
    assert!(loader.last().is_none());

    let reply = loader
      .load(Params {
        id: Some(ROOT),
        ..Default::default()
      })
      .await;

    assert!(reply.status().is_ok());
    assert_eq!(reply.tree.len(), 2);
    assert_eq!(loader.last(), Some(reply));
    assert_eq!(source.calls(GET_TREE), 1);
  }

  #[tokio::test]
  async fn test_transport_failure_becomes_status() {
    let source = Arc::new(MockSource::with_datasets(5));
    source.set_offline(true);
    let loader: Loader<_, PageReply> = Loader::new(GET_DATASETS, source);

    let reply = loader.load(Params::default()).await;

    assert_eq!(reply.err, 1);
    assert!(reply.errstr.contains("getDatasets call failed"));
    assert!(reply.datasets.is_empty());
  }

  #[tokio::test]
  async fn test_application_error_is_passed_through() {
    let source = Arc::new(MockSource::with_datasets(5));
    source.fail_with(42, "permission denied");
    let loader: Loader<_, PageReply> = Loader::new(GET_DATASETS, source);

    let reply = loader.load(Params::default()).await;

    assert_eq!(reply.err, 42);
    assert_eq!(reply.errstr, "permission denied");
  }
}
