//! Document state container

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use crate::cookie::{CookieJar, SetCookie};
use crate::element::Element;
use crate::error::DomError;
use crate::primitives::{
    AppendChildFn, CookieAccessor, CreateElementFn, InsertBeforeFn, Primitive, Primitives,
    SetAttributeFn,
};
use crate::Result;

/// A script that started running because it was connected to the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptExecution {
    pub element_id: u64,
    pub src: Option<String>,
    pub inline: Option<String>,
    pub executed_at: DateTime<Utc>,
}

pub struct Document {
    location: Url,
    document_element: Element,
    head: Option<Element>,
    body: Option<Element>,
    jar: Mutex<CookieJar>,
    primitives: RwLock<Primitives>,
    sealed: RwLock<HashSet<Primitive>>,
    executions: Mutex<Vec<ScriptExecution>>,
}

impl Document {
    /// Create a page at `location` with `<html><head/><body/></html>`.
    pub fn new(location: &str) -> Result<Arc<Self>> {
        Self::build(location, true)
    }

    /// Create a page that has a body but no head.
    pub fn without_head(location: &str) -> Result<Arc<Self>> {
        Self::build(location, false)
    }

    fn build(location: &str, with_head: bool) -> Result<Arc<Self>> {
        let location = Url::parse(location).map_err(|e| DomError::InvalidUrl(e.to_string()))?;

        let document_element = Element::new("html");
        let head = with_head.then(|| Element::new("head"));
        let body = Element::new("body");

        if let Some(head) = &head {
            document_element.insert_child_at(head, None);
        }
        document_element.insert_child_at(&body, None);

        Ok(Arc::new(Self {
            location,
            document_element,
            head,
            body: Some(body),
            jar: Mutex::new(CookieJar::new()),
            primitives: RwLock::new(Primitives::native()),
            sealed: RwLock::new(HashSet::new()),
            executions: Mutex::new(Vec::new()),
        }))
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn hostname(&self) -> &str {
        self.location.host_str().unwrap_or("")
    }

    pub fn document_element(&self) -> &Element {
        &self.document_element
    }

    pub fn head(&self) -> Option<&Element> {
        self.head.as_ref()
    }

    pub fn body(&self) -> Option<&Element> {
        self.body.as_ref()
    }

    pub fn is_connected(&self, element: &Element) -> bool {
        self.document_element.contains(element)
    }

    // === DOM operations (dispatch through the current primitives) ===

    pub fn create_element(&self, tag_name: &str) -> Element {
        let create = self.primitives.read().create_element.clone();
        create(self, tag_name)
    }

    pub fn append_child(&self, parent: &Element, child: &Element) -> Result<Element> {
        let append = self.primitives.read().append_child.clone();
        append(self, parent, child)
    }

    pub fn insert_before(
        &self,
        parent: &Element,
        child: &Element,
        reference: Option<&Element>,
    ) -> Result<Element> {
        let insert = self.primitives.read().insert_before.clone();
        insert(self, parent, child, reference)
    }

    pub fn set_attribute(&self, element: &Element, name: &str, value: &str) -> Result<()> {
        let set = self.primitives.read().set_attribute.clone();
        set(self, element, name, value)
    }

    /// Read `document.cookie`
    pub fn cookie(&self) -> String {
        let get = self.primitives.read().cookie.get.clone();
        get(self)
    }

    /// Assign `document.cookie`
    pub fn set_cookie(&self, assignment: &str) {
        let set = self.primitives.read().cookie.set.clone();
        set(self, assignment)
    }

    // === Primitive table ===

    /// Snapshot of the current primitives
    pub fn primitives(&self) -> Primitives {
        self.primitives.read().clone()
    }

    /// Make a primitive non-configurable; later replacements fail.
    pub fn seal(&self, primitive: Primitive) {
        self.sealed.write().insert(primitive);
    }

    pub fn is_sealed(&self, primitive: Primitive) -> bool {
        self.sealed.read().contains(&primitive)
    }

    fn ensure_configurable(&self, primitive: Primitive) -> Result<()> {
        if self.is_sealed(primitive) {
            return Err(DomError::NotConfigurable(primitive));
        }
        Ok(())
    }

    pub fn replace_create_element(&self, f: CreateElementFn) -> Result<CreateElementFn> {
        self.ensure_configurable(Primitive::CreateElement)?;
        Ok(std::mem::replace(&mut self.primitives.write().create_element, f))
    }

    pub fn replace_append_child(&self, f: AppendChildFn) -> Result<AppendChildFn> {
        self.ensure_configurable(Primitive::AppendChild)?;
        Ok(std::mem::replace(&mut self.primitives.write().append_child, f))
    }

    pub fn replace_insert_before(&self, f: InsertBeforeFn) -> Result<InsertBeforeFn> {
        self.ensure_configurable(Primitive::InsertBefore)?;
        Ok(std::mem::replace(&mut self.primitives.write().insert_before, f))
    }

    pub fn replace_set_attribute(&self, f: SetAttributeFn) -> Result<SetAttributeFn> {
        self.ensure_configurable(Primitive::SetAttribute)?;
        Ok(std::mem::replace(&mut self.primitives.write().set_attribute, f))
    }

    pub fn replace_cookie_accessor(&self, accessor: CookieAccessor) -> Result<CookieAccessor> {
        self.ensure_configurable(Primitive::Cookie)?;
        Ok(std::mem::replace(&mut self.primitives.write().cookie, accessor))
    }

    /// Put one primitive back from a snapshot.
    pub fn restore(&self, primitive: Primitive, snapshot: &Primitives) -> Result<()> {
        match primitive {
            Primitive::CreateElement => {
                self.replace_create_element(snapshot.create_element.clone())?;
            }
            Primitive::AppendChild => {
                self.replace_append_child(snapshot.append_child.clone())?;
            }
            Primitive::InsertBefore => {
                self.replace_insert_before(snapshot.insert_before.clone())?;
            }
            Primitive::SetAttribute => {
                self.replace_set_attribute(snapshot.set_attribute.clone())?;
            }
            Primitive::Cookie => {
                self.replace_cookie_accessor(snapshot.cookie.clone())?;
            }
        }
        Ok(())
    }

    // === Script execution log ===

    pub fn executed_scripts(&self) -> Vec<ScriptExecution> {
        self.executions.lock().clone()
    }

    pub fn was_executed(&self, src: &str) -> bool {
        self.executions
            .lock()
            .iter()
            .any(|e| e.src.as_deref() == Some(src))
    }

    // === Native behaviour ===

    pub(crate) fn native_insert(
        &self,
        parent: &Element,
        child: &Element,
        reference: Option<&Element>,
    ) -> Result<Element> {
        if child.contains(parent) {
            return Err(DomError::HierarchyRequest(
                "the new child is an ancestor of the parent".to_string(),
            ));
        }

        let index = match reference {
            Some(reference) => Some(parent.child_index(reference).ok_or(DomError::NotFound)?),
            None => None,
        };

        // Inserting before itself is a no-op move
        if let Some(reference) = reference {
            if reference.ptr_eq(child) {
                return Ok(child.clone());
            }
        }

        // Index shifts when the child is moved forward within the same parent
        let index = match (index, parent.child_index(child)) {
            (Some(target), Some(current)) if current < target => Some(target - 1),
            (index, _) => index,
        };

        parent.insert_child_at(child, index);

        if self.is_connected(child) {
            self.run_connected_scripts(child);
        }

        Ok(child.clone())
    }

    fn run_connected_scripts(&self, root: &Element) {
        let mut pending = vec![root.clone()];
        while let Some(element) = pending.pop() {
            if element.is_script() && element.has_script_content() && element.mark_executed() {
                let text = element.text();
                let execution = ScriptExecution {
                    element_id: element.id(),
                    src: element.get_attribute("src").filter(|s| !s.trim().is_empty()),
                    inline: (!text.trim().is_empty()).then_some(text),
                    executed_at: Utc::now(),
                };
                tracing::debug!(element_id = execution.element_id, src = ?execution.src, "Executed script");
                self.executions.lock().push(execution);
            }
            pending.extend(element.children());
        }
    }

    pub(crate) fn native_cookie_header(&self) -> String {
        self.jar
            .lock()
            .header(self.hostname(), self.location.path(), Utc::now())
    }

    pub(crate) fn native_set_cookie(&self, assignment: &str) {
        if let Some(set) = SetCookie::parse(assignment) {
            self.jar
                .lock()
                .apply(set, self.hostname(), self.location.path(), Utc::now());
        }
    }

    /// Snapshot of every stored cookie, regardless of scope
    pub fn cookie_jar(&self) -> CookieJar {
        self.jar.lock().clone()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("location", &self.location.as_str())
            .field("has_head", &self.head.is_some())
            .finish_non_exhaustive()
    }
}
