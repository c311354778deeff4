//! Request field extraction into tags.

use std::collections::BTreeMap;

use tonic::Request;

use super::Tags;

/// Prefix of tags copied from request message fields.
pub const REQUEST_FIELD_PREFIX: &str = "grpc.request.";

/// Implemented by request messages that expose fields worth logging.
///
/// Usually written next to the generated message type:
///
/// ```
/// use std::collections::BTreeMap;
/// use grpc_middleware::tags::ExtractLogFields;
///
/// struct PingRequest {
///     value: String,
/// }
///
/// impl ExtractLogFields for PingRequest {
///     fn extract_log_fields(&self) -> BTreeMap<String, String> {
///         BTreeMap::from([("value".to_string(), self.value.clone())])
///     }
/// }
/// ```
pub trait ExtractLogFields {
    fn extract_log_fields(&self) -> BTreeMap<String, String>;
}

/// Returns the loggable fields a message declares about itself.
pub fn code_gen_request_field_extractor<M: ExtractLogFields>(
    _full_method: &str,
    message: &M,
) -> BTreeMap<String, String> {
    message.extract_log_fields()
}

/// Copies a request's loggable fields into the call's tags as
/// `grpc.request.<field>`.
///
/// Does nothing when the call has no tags installed.
pub fn tag_request_fields<M: ExtractLogFields>(request: &Request<M>) {
    let Some(tags) = request.extensions().get::<Tags>() else {
        return;
    };
    for (key, value) in request.get_ref().extract_log_fields() {
        tags.set(format!("{REQUEST_FIELD_PREFIX}{key}"), value);
    }
}
