//! # rill-core
//!
//! Building blocks shared by the rill rendering engine:
//!
//! - [`Value`] and [`Target`]: a dynamically typed value model whose containers
//!   are shared, identity-carrying handles.
//! - [`observe`](observe::observe): attaches change observers to container
//!   graphs and delivers [`Change`] records synchronously.
//! - [`Scheduler`]: the next-tick queue that batches render requests.
//! - [`Document`]: a single-threaded, in-memory DOM arena plus an HTML
//!   fragment parser ([`html::parse_fragment`]).

pub mod dom;
mod error;
pub mod html;
pub mod observe;
pub mod scheduler;
pub mod target;
pub mod value;

pub use dom::{Document, Event, Listener, ListenerId, MutationStats, NodeId, NodeKind};
pub use error::Error;
pub use observe::{Change, ChangeKind, Compare, ObserveOptions, Subscriber, observe, observe_target};
pub use scheduler::Scheduler;
pub use target::Target;
pub use value::{Function, Value};
