//! Request encoding and response decoding for the engine protocol.
//!
//! The one-shot runner reads a single JSON request from stdin and prints a
//! single JSON array to stdout. The persistent server exchanges one framed
//! object per request (see [`crate::codec`]).

use lintbridge_types::{AnalysisRequest, AnalysisResponse, ContextualRequest};

use crate::error::WireError;

/// Serialize a batch request for the runner's stdin.
pub fn encode_request(request: &AnalysisRequest) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(request)
}

pub fn encode_contextual(request: &ContextualRequest) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(request)
}

/// Decode the runner's stdout.
///
/// Empty output and a literal `null` both mean the engine produced nothing
/// for the batch; callers treat that as a unit failure, never as "no issues".
pub fn decode_responses(raw: &[u8]) -> Result<Vec<AnalysisResponse>, WireError> {
    if is_empty_output(raw) {
        return Err(WireError::EmptyOutput);
    }
    let responses: Option<Vec<AnalysisResponse>> = serde_json::from_slice(raw)?;
    responses.ok_or(WireError::EmptyOutput)
}

/// Decode one persistent-server reply.
pub fn decode_response(raw: &[u8]) -> Result<AnalysisResponse, WireError> {
    if is_empty_output(raw) {
        return Err(WireError::EmptyOutput);
    }
    let response: Option<AnalysisResponse> = serde_json::from_slice(raw)?;
    response.ok_or(WireError::EmptyOutput)
}

fn is_empty_output(raw: &[u8]) -> bool {
    raw.iter().all(u8::is_ascii_whitespace)
}
