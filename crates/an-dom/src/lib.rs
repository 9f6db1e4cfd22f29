//! # an-dom
//!
//! Page-side half of the annotation engine: selector generation, thread to
//! element reconciliation, the interaction state machine and the client for
//! the annotation endpoints. Everything works against the [`DomTree`] port;
//! [`HtmlDocument`] implements it over a parsed `scraper` document.

pub mod api;
pub mod dom;
pub mod html;
pub mod interaction;
pub mod reconcile;
pub mod runner;
pub mod selector;

pub use api::{AnnotationApi, ClientError, HttpApi};
pub use dom::{DomTree, SelectorError};
pub use html::HtmlDocument;
pub use interaction::{Effect, Event, InteractionMachine, Mode, Target, Viewer};
pub use reconcile::{reconcile, Badge, Reconciliation};
pub use selector::generate_selector;
