#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]

mod config;
pub mod component;
pub mod debug;
pub mod directive;
mod error;
pub mod render;
mod runtime;

#[doc(inline)]
pub use component::{
    AttributeHook, Component, Definition, Hook, Method, RENDER_ERROR_EVENT, WatchId,
    WeakComponent,
};
pub use config::{DEBUG_ENV, Options};
pub use directive::DirectiveRegistry;
pub use error::{BoxError, Error, RenderError};
pub use runtime::{Runtime, is_custom_element_name};

pub use rill_core;
pub use rill_expr;

#[doc(inline)]
pub use rill_core::{Document, Event, NodeId, Target, Value};
#[doc(inline)]
pub use rill_expr::{Compiler, Locals};

pub mod prelude {
    //! Commonly used items in one import.
    //!
    //! ```rust
    //! use rill::prelude::*;
    //!
    //! let runtime = Runtime::new(Options::default());
    //! runtime
    //!     .define("x-hello", Definition::new("<p>{{ name }}</p>").state(serde_json::json!({"name": "rill"})))
    //!     .unwrap();
    //! ```
    pub use super::{
        Component, Definition, Document, Error, Event, NodeId, Options, Runtime, Target, Value,
    };
}
