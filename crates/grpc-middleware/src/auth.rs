//! Authentication helpers for tonic services.
//!
//! An auth function inspects the incoming request and either rejects it or
//! returns it, possibly enriched with typed extensions and tags. Tags set
//! here show up in the call's summary record.

use std::fmt;

use tonic::{Request, Status};

use crate::tags::Tags;

/// Metadata key of the authorization header.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Tag naming the authenticated subject.
pub const AUTH_SUBJECT_TAG: &str = "auth.sub";

/// Reads the credentials of `scheme` from the `authorization` metadata.
///
/// The scheme is compared case-insensitively, so `Bearer` and `bearer` are
/// both accepted for `"bearer"`.
#[allow(clippy::result_large_err)]
pub fn auth_from_metadata<T>(request: &Request<T>, scheme: &str) -> Result<String, Status> {
    let unauthenticated = || Status::unauthenticated(format!("Request unauthenticated with {scheme}"));

    let value = request
        .metadata()
        .get(AUTHORIZATION_HEADER)
        .ok_or_else(unauthenticated)?;
    let value = value
        .to_str()
        .map_err(|_| Status::unauthenticated("Bad authorization string"))?;

    let (given, credentials) = value
        .split_once(' ')
        .ok_or_else(|| Status::unauthenticated("Bad authorization string"))?;
    if !given.eq_ignore_ascii_case(scheme) {
        return Err(unauthenticated());
    }
    Ok(credentials.to_string())
}

/// Interceptor running an auth function on every request.
///
/// # Example
///
/// ```
/// use grpc_middleware::auth::{AuthInterceptor, auth_from_metadata};
/// use grpc_middleware::tags::Tags;
/// use tonic::Status;
///
/// let interceptor = AuthInterceptor::new(|request: tonic::Request<()>| {
///     let token = auth_from_metadata(&request, "bearer")?;
///     if token != "secret" {
///         return Err(Status::unauthenticated("invalid token"));
///     }
///     Tags::extract(&request).set("auth.sub", "service-account");
///     Ok(request)
/// });
/// # let _ = interceptor;
/// ```
#[derive(Clone)]
pub struct AuthInterceptor<F> {
    auth: F,
}

impl<F> AuthInterceptor<F>
where
    F: Fn(Request<()>) -> Result<Request<()>, Status>,
{
    pub fn new(auth: F) -> Self {
        Self { auth }
    }
}

impl<F> fmt::Debug for AuthInterceptor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInterceptor").finish_non_exhaustive()
    }
}

impl<F> tonic::service::Interceptor for AuthInterceptor<F>
where
    F: Fn(Request<()>) -> Result<Request<()>, Status>,
{
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        (self.auth)(request)
    }
}

/// Subject of a request authenticated by [`static_token_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSubject(pub String);

/// An auth function accepting a single static token under `scheme`.
///
/// Accepted requests get an [`AuthSubject`] extension and the `auth.sub` tag
/// set to `subject`.
pub fn static_token_auth(
    scheme: impl Into<String>,
    token: impl Into<String>,
    subject: impl Into<String>,
) -> impl Fn(Request<()>) -> Result<Request<()>, Status> + Clone + Send + Sync + 'static {
    let scheme = scheme.into();
    let token = token.into();
    let subject = subject.into();
    move |mut request: Request<()>| {
        let given = auth_from_metadata(&request, &scheme)?;
        if given != token {
            return Err(Status::unauthenticated("Invalid auth token"));
        }
        Tags::extract(&request).set(AUTH_SUBJECT_TAG, subject.clone());
        request
            .extensions_mut()
            .insert(AuthSubject(subject.clone()));
        Ok(request)
    }
}
