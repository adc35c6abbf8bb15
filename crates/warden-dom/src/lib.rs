//! Warden Host Page Model
//!
//! The consent layer never touches a real browser. Instead it runs against
//! this model of a page:
//! - A `Document` with `head`, `body` and a cookie jar
//! - `Element` handles with attributes, inline text and a `src` property
//! - A table of replaceable primitives (element creation, tree insertion,
//!   attribute mutation, cookie accessor) that every document call
//!   dispatches through
//!
//! Scripts that get connected to the document through the native insertion
//! primitive are recorded in an execution log.

mod cookie;
mod document;
mod element;
mod error;
mod primitives;

pub use cookie::{cookie_name, format_http_date, Cookie, CookieJar, SetCookie};
pub use document::{Document, ScriptExecution};
pub use element::{Element, SrcSetter, WeakElement};
pub use error::DomError;
pub use primitives::{
    AppendChildFn, CookieAccessor, CookieGetFn, CookieSetFn, CreateElementFn, InsertBeforeFn,
    Primitive, Primitives, SetAttributeFn,
};

pub type Result<T> = std::result::Result<T, DomError>;
