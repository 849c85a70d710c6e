pub mod body;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod path_matcher;
pub mod route_table;
pub mod sse;

pub use body::{Blob, HandlerResponse, RequestBody, ResponseValue};
pub use context::{MatchedRoute, RequestContext};
pub use dispatcher::{CorsHeaders, Dispatcher};
pub use error::{HandlerError, HttpError};
pub use handler::{Handler, HandlerRegistry, HandlerResult};
pub use path_matcher::{MatcherError, PathMatcher, PathVars};
pub use route_table::{RouteSource, RouteTable, RouteTableError};
pub use sse::{SseChannel, SseError, SseSender};
