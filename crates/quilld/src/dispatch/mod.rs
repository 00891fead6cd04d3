//! Request dispatch and static asset publishing.
//!
//! Every inbound request resolves to exactly one outcome, in fixed priority:
//!
//! 1. an exact route on the path;
//! 2. a published static file (leading `/` ignored);
//! 3. the nearest registered ancestor subtree, found by stripping one path
//!    segment at a time;
//! 4. a WebSocket route on the path, for upgrade requests only;
//! 5. a fixed-body 404.
//!
//! Handler tables are frozen once serving starts. Static trees may be
//! published at any time, for example after a plugin upload.

mod content_type;
mod errors;
mod request;
mod response;
mod router;
mod routes;
mod statics;

pub use self::content_type::{FALLBACK_CONTENT_TYPE, content_type_for};
pub use self::errors::{DispatchError, WalkLimitKind};
pub use self::request::Request;
pub use self::response::{APPLICATION_NDJSON, JsonLines, Response};
pub use self::router::{Dispatcher, DispatcherBuilder, Resolution};
pub use self::routes::{Handler, RouteEntry, RouteKind};
pub use self::statics::{PublishReport, StaticAsset, StaticIndex, WalkLimits};
