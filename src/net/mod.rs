//! Networking: wire types, errors, the transport seam and the request
//! pipeline.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` is the only module that issues HTTP calls; `csrf` holds the
//! anti-forgery token it attaches, and `transport` abstracts the socket so
//! tests can script responses.

pub mod api;
pub mod csrf;
pub mod error;
pub mod transport;
pub mod types;

pub use api::{ApiClient, RequestOptions};
pub use error::{ApiError, ClientBuildError, TransportError};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
