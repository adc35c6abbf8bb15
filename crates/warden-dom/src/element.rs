//! Element handles
//!
//! An `Element` is a shared node: cloning the handle never copies the node.
//! Identity is the node id, not the contents.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Per-element `src` setter override
pub type SrcSetter = Arc<dyn Fn(&Element, &str) + Send + Sync>;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

struct ElementData {
    attributes: Vec<(String, String)>,
    text: String,
    /// Value seen by the `src` property getter
    src: Option<String>,
    parent: Option<Weak<ElementNode>>,
    children: Vec<Element>,
    src_setter: Option<SrcSetter>,
    executed: bool,
}

struct ElementNode {
    id: u64,
    tag_name: String,
    data: RwLock<ElementData>,
}

#[derive(Clone)]
pub struct Element(Arc<ElementNode>);

/// Non-owning handle; does not keep the node alive
#[derive(Clone)]
pub struct WeakElement(Weak<ElementNode>);

impl WeakElement {
    pub fn upgrade(&self) -> Option<Element> {
        self.0.upgrade().map(Element)
    }
}

impl Element {
    /// Create a detached element. Tag names are stored upper-cased, like `tagName`.
    pub fn new(tag_name: &str) -> Self {
        Self(Arc::new(ElementNode {
            id: NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed),
            tag_name: tag_name.to_ascii_uppercase(),
            data: RwLock::new(ElementData {
                attributes: Vec::new(),
                text: String::new(),
                src: None,
                parent: None,
                children: Vec::new(),
                src_setter: None,
                executed: false,
            }),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn tag_name(&self) -> &str {
        &self.0.tag_name
    }

    pub fn is_script(&self) -> bool {
        self.0.tag_name == "SCRIPT"
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakElement {
        WeakElement(Arc::downgrade(&self.0))
    }

    // === Attributes ===

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.0
            .data
            .read()
            .attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    /// All attributes in insertion order
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.0.data.read().attributes.clone()
    }

    /// Store an attribute without going through any document primitive.
    ///
    /// `src` is reflected onto the `src` property.
    pub fn write_attribute(&self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let mut data = self.0.data.write();

        if name == "src" {
            data.src = Some(value.to_string());
        }

        match data.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => data.attributes.push((name, value.to_string())),
        }
    }

    pub fn remove_attribute(&self, name: &str) {
        let mut data = self.0.data.write();
        data.attributes.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        if name.eq_ignore_ascii_case("src") {
            data.src = None;
        }
    }

    // === Inline content ===

    pub fn text(&self) -> String {
        self.0.data.read().text.clone()
    }

    pub fn set_text(&self, text: &str) {
        self.0.data.write().text = text.to_string();
    }

    // === src property ===

    /// Current value of the `src` property
    pub fn src(&self) -> Option<String> {
        self.0.data.read().src.clone()
    }

    /// Assign the `src` property, honouring a per-element setter override.
    pub fn set_src(&self, value: &str) {
        let setter = self.0.data.read().src_setter.clone();
        match setter {
            Some(setter) => setter(self, value),
            None => self.write_src(value),
        }
    }

    /// The underlying `src` assignment: sets both property and attribute.
    pub fn write_src(&self, value: &str) {
        self.write_attribute("src", value);
    }

    /// Remember a requested `src` on the property without setting the
    /// attribute that would make the script load.
    pub fn hold_src(&self, value: &str) {
        self.0.data.write().src = Some(value.to_string());
    }

    pub fn set_src_setter(&self, setter: SrcSetter) {
        self.0.data.write().src_setter = Some(setter);
    }

    pub fn clear_src_setter(&self) {
        self.0.data.write().src_setter = None;
    }

    pub fn has_src_setter(&self) -> bool {
        self.0.data.read().src_setter.is_some()
    }

    /// Whether the script would fetch or evaluate anything when connected
    pub fn has_script_content(&self) -> bool {
        let data = self.0.data.read();
        let has_src = data
            .attributes
            .iter()
            .any(|(n, v)| n == "src" && !v.trim().is_empty());
        has_src || !data.text.trim().is_empty()
    }

    // === Tree ===

    pub fn parent(&self) -> Option<Element> {
        self.0
            .data
            .read()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Element)
    }

    pub fn children(&self) -> Vec<Element> {
        self.0.data.read().children.clone()
    }

    pub fn contains(&self, other: &Element) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.ptr_eq(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    pub(crate) fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent
                .0
                .data
                .write()
                .children
                .retain(|child| !child.ptr_eq(self));
        }
        self.0.data.write().parent = None;
    }

    /// Insert `child` at `index` (or at the end). Caller has validated the hierarchy.
    pub(crate) fn insert_child_at(&self, child: &Element, index: Option<usize>) {
        child.detach();
        {
            let mut data = self.0.data.write();
            match index {
                Some(index) if index <= data.children.len() => {
                    data.children.insert(index, child.clone())
                }
                _ => data.children.push(child.clone()),
            }
        }
        child.0.data.write().parent = Some(Arc::downgrade(&self.0));
    }

    pub(crate) fn child_index(&self, child: &Element) -> Option<usize> {
        self.0
            .data
            .read()
            .children
            .iter()
            .position(|c| c.ptr_eq(child))
    }

    /// Mark as executed; returns false if it already ran.
    pub(crate) fn mark_executed(&self) -> bool {
        let mut data = self.0.data.write();
        if data.executed {
            return false;
        }
        data.executed = true;
        true
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.data.read();
        f.debug_struct("Element")
            .field("id", &self.0.id)
            .field("tag_name", &self.0.tag_name)
            .field("attributes", &data.attributes)
            .field("src", &data.src)
            .field("children", &data.children.len())
            .finish()
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Element {}
