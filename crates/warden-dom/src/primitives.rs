//! Replaceable document primitives
//!
//! Every public `Document` operation dispatches through one of these slots.
//! Snapshotting the table captures the original function references, so an
//! interceptor can install wrappers and later put the originals back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::document::Document;
use crate::element::Element;
use crate::Result;

pub type CreateElementFn = Arc<dyn Fn(&Document, &str) -> Element + Send + Sync>;
pub type AppendChildFn = Arc<dyn Fn(&Document, &Element, &Element) -> Result<Element> + Send + Sync>;
pub type InsertBeforeFn =
    Arc<dyn Fn(&Document, &Element, &Element, Option<&Element>) -> Result<Element> + Send + Sync>;
pub type SetAttributeFn = Arc<dyn Fn(&Document, &Element, &str, &str) -> Result<()> + Send + Sync>;
pub type CookieGetFn = Arc<dyn Fn(&Document) -> String + Send + Sync>;
pub type CookieSetFn = Arc<dyn Fn(&Document, &str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    CreateElement,
    AppendChild,
    InsertBefore,
    SetAttribute,
    Cookie,
}

impl Primitive {
    pub const ALL: [Primitive; 5] = [
        Primitive::CreateElement,
        Primitive::AppendChild,
        Primitive::InsertBefore,
        Primitive::SetAttribute,
        Primitive::Cookie,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::CreateElement => "createElement",
            Primitive::AppendChild => "appendChild",
            Primitive::InsertBefore => "insertBefore",
            Primitive::SetAttribute => "setAttribute",
            Primitive::Cookie => "cookie",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Getter/setter pair backing `document.cookie`
#[derive(Clone)]
pub struct CookieAccessor {
    pub get: CookieGetFn,
    pub set: CookieSetFn,
}

#[derive(Clone)]
pub struct Primitives {
    pub create_element: CreateElementFn,
    pub append_child: AppendChildFn,
    pub insert_before: InsertBeforeFn,
    pub set_attribute: SetAttributeFn,
    pub cookie: CookieAccessor,
}

impl Primitives {
    /// The built-in behaviour of a fresh document
    pub fn native() -> Self {
        Self {
            create_element: Arc::new(|_doc: &Document, tag: &str| Element::new(tag)),
            append_child: Arc::new(|doc: &Document, parent: &Element, child: &Element| {
                doc.native_insert(parent, child, None)
            }),
            insert_before: Arc::new(
                |doc: &Document, parent: &Element, child: &Element, reference: Option<&Element>| {
                    doc.native_insert(parent, child, reference)
                },
            ),
            set_attribute: Arc::new(
                |_doc: &Document, element: &Element, name: &str, value: &str| {
                    validate_attribute_name(name)?;
                    element.write_attribute(name, value);
                    Ok(())
                },
            ),
            cookie: CookieAccessor {
                get: Arc::new(|doc: &Document| doc.native_cookie_header()),
                set: Arc::new(|doc: &Document, value: &str| doc.native_set_cookie(value)),
            },
        }
    }
}

impl fmt::Debug for Primitives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitives").finish_non_exhaustive()
    }
}

fn validate_attribute_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | '/' | '=' | '\0'));

    if valid {
        Ok(())
    } else {
        Err(crate::DomError::InvalidCharacter(name.to_string()))
    }
}
