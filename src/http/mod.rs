//! HTTP protocol layer module
//!
//! Cookie, body and response plumbing shared by the dispatcher and the
//! built-in static directory handler.

pub mod body;
pub mod cookie;
pub mod mime;
pub mod response;

pub use body::{parse_body, parse_query, PostData, UploadedFile};
pub use cookie::{CookieJar, CookieValue};
pub use response::{build_404_response, build_500_response, build_handler_response};
