//! HTTP layer: request building, auth, the client, and responses.
//!
//! - [`request::build_request`] - AST + resolved variables to wire form
//! - [`auth`] - basic/bearer/apikey/digest/AWS SigV4 computation
//! - [`HttpClient`] - executes built requests with timeout/TLS/proxy/redirect policy
//! - [`HttpResponse`] - status, headers, body, timing

pub mod auth;
pub mod client;
pub mod request;
pub mod response;

pub use client::{ClientOptions, HttpClient};
pub use request::{build_request, BuiltBody, BuiltRequest, PartKind, RequestDefaults};
pub use response::HttpResponse;
