//! Client-side caching for an AURORA REST server.
//!
//! [`cache::TreeCache`] serves the entity tree and [`cache::RecordPageCache`]
//! pages through the dataset listing. Both talk to the server through a
//! [`remote::RemoteSource`], normally [`remote::HttpSource`].

pub mod cache;
pub mod config;
pub mod remote;
