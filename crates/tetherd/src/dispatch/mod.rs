//! JSONL request dispatch.
//!
//! Drivers send one request per line naming a method and its arguments:
//!
//! ```json
//! {"method":"dictionary_create","args":{"content":{"a":1}}}
//! ```
//!
//! Every request line is answered by exactly one response line. Values are
//! returned inline, objects as handles the driver passes back in later
//! requests, and failures as a stable code plus message:
//!
//! ```json
//! {"kind":"ok","type":"dictionary","handle":"@1"}
//! {"kind":"ok","type":"number","value":1}
//! {"kind":"ok","type":"void"}
//! {"kind":"error","code":"unknown_handle","message":"argument 'dictionary' refers to unknown handle @9"}
//! ```
//!
//! The [`Dispatcher`] is assembled once at start-up: the built-in methods are
//! installed first, then every [`FeatureModule`](crate::FeatureModule) in
//! order.

mod builtin;
mod dispatcher;
mod errors;
mod handler;
mod outcome;
mod request;
mod response;
mod router;

pub use self::builtin::{FLUSH_MEMORY, RELEASE};
pub use self::dispatcher::{Dispatcher, DispatcherBuilder};
pub use self::errors::{DispatchError, ErrorCode};
pub use self::handler::{DispatchConnectionHandler, MAX_REQUEST_BYTES};
pub use self::outcome::{Outcome, Reply};
pub use self::request::CommandRequest;
pub use self::response::{DaemonMessage, ResponseWriter};
pub use self::router::{HandlerFn, MethodEntry, MethodTable, Router, RouterError};
