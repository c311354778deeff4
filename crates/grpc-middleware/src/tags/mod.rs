//! Per-call tags.
//!
//! A [`Tags`] set lives in the request extensions for the duration of a call.
//! Anything running in the call (interceptors, auth functions, handlers) can
//! add tags, and every record emitted through the call's
//! [`CtxLogger`](crate::logging::CtxLogger) includes them.
//!
//! Tags are installed by [`TagsInterceptor`] or, for transport-level use
//! together with the logging layer, by [`TagsLayer`].

mod extractor;
mod layer;

pub use extractor::{
    ExtractLogFields, REQUEST_FIELD_PREFIX, code_gen_request_field_extractor, tag_request_fields,
};
pub use layer::{TagsLayer, TagsService};

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use tonic::{Request, Status};

use crate::logging::Field;

/// Tag recording the remote peer of a call.
pub const PEER_ADDRESS_TAG: &str = "peer.address";

/// A shared, per-call set of string tags.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct Tags {
    values: Arc<RwLock<BTreeMap<String, String>>>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the call's tags, or a detached empty set when no tags were
    /// installed. Writes to a detached set are not seen by anyone else.
    pub fn extract<T>(request: &Request<T>) -> Tags {
        request
            .extensions()
            .get::<Tags>()
            .cloned()
            .unwrap_or_default()
    }

    /// Sets a tag, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// A snapshot of all tags.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The tags as log fields, ordered by key.
    pub fn fields(&self) -> Vec<Field> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| Field::new(k.clone(), v.clone()))
            .collect()
    }
}

fn install(extensions: &mut http::Extensions, remote_addr: Option<SocketAddr>) {
    if extensions.get::<Tags>().is_some() {
        return;
    }
    let tags = Tags::new();
    if let Some(addr) = remote_addr {
        tags.set(PEER_ADDRESS_TAG, addr.to_string());
    }
    extensions.insert(tags);
}

/// Interceptor that installs a fresh [`Tags`] set on every request.
#[derive(Debug, Clone, Default)]
pub struct TagsInterceptor;

impl TagsInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl tonic::service::Interceptor for TagsInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if request.extensions().get::<Tags>().is_none() {
            let tags = Tags::new();
            if let Some(addr) = request.remote_addr() {
                tags.set(PEER_ADDRESS_TAG, addr.to_string());
            }
            request.extensions_mut().insert(tags);
        }
        Ok(request)
    }
}
