//! Handler module
//!
//! Handler specs (immutable route templates), per-request handler
//! instances, and the dispatcher that connects them.

mod dispatcher;
mod instance;
mod render;
mod spec;
mod static_files;

pub use dispatcher::{Dispatcher, Stage};
pub use instance::{Handler, Params};
pub use render::{Renderer, TemplateEngine};
pub use spec::{BoxFuture, HandlerMethod, HandlerSpec, MethodCallback};
