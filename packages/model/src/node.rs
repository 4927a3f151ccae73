//! Document tree nodes.
//!
//! An [`Element`] owns an ordered list of children: nested elements and
//! [`Text`] runs. Offsets inside an element count user-perceived items, not
//! child indices: an element child occupies exactly one offset while a text
//! run occupies one offset per grapheme cluster. All structural helpers work
//! in offset space and keep the tree normalized (no two adjacent text
//! children with identical attribute sets).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::ModelError;

/// Attribute map carried by elements and text runs.
pub type Attributes = HashMap<String, Value>;

/// A node in the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Node {
    Element(Element),
    Text(Text),
}

impl Node {
    /// Number of offsets this node occupies in its parent.
    pub fn offset_size(&self) -> usize {
        match self {
            Node::Element(_) => 1,
            Node::Text(text) => text.offset_size(),
        }
    }

    pub fn attrs(&self) -> &Attributes {
        match self {
            Node::Element(el) => &el.attrs,
            Node::Text(text) => &text.attrs,
        }
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut Attributes {
        match self {
            Node::Element(el) => &mut el.attrs,
            Node::Text(text) => &mut text.attrs,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Node::Text(text) => Some(text),
            Node::Element(_) => None,
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

impl From<Text> for Node {
    fn from(text: Text) -> Self {
        Node::Text(text)
    }
}

/// An element node: a name, an attribute map and ordered children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) attrs: Attributes,
    #[serde(default)]
    pub(crate) children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attributes::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter, for assembling detached trees.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Builder-style child append, for assembling detached trees.
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self.normalize();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Total number of offsets inside this element.
    pub fn offset_size(&self) -> usize {
        self.children.iter().map(Node::offset_size).sum()
    }

    /// Concatenated text of all direct text children, mostly for assertions.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| child.as_text().map(|t| t.data.as_str()))
            .collect()
    }

    /// Maps an offset to `(child index, offset within that child)`.
    ///
    /// `offset == offset_size()` maps to `(children.len(), 0)`, the slot
    /// after the last child.
    pub(crate) fn offset_to_index(&self, offset: usize) -> Result<(usize, usize), ModelError> {
        let mut remaining = offset;
        for (index, child) in self.children.iter().enumerate() {
            let size = child.offset_size();
            if remaining < size {
                return Ok((index, remaining));
            }
            remaining -= size;
        }
        if remaining == 0 {
            return Ok((self.children.len(), 0));
        }
        Err(ModelError::OffsetOutOfBounds {
            offset,
            max: self.offset_size(),
        })
    }

    /// Returns the child element starting exactly at `offset`.
    pub(crate) fn child_element_at(&self, offset: usize) -> Result<&Element, ModelError> {
        let (index, inner) = self.offset_to_index(offset)?;
        if inner != 0 {
            return Err(ModelError::NotAnElement);
        }
        match self.children.get(index) {
            Some(Node::Element(el)) => Ok(el),
            _ => Err(ModelError::NotAnElement),
        }
    }

    pub(crate) fn child_element_at_mut(&mut self, offset: usize) -> Result<&mut Element, ModelError> {
        let (index, inner) = self.offset_to_index(offset)?;
        if inner != 0 {
            return Err(ModelError::NotAnElement);
        }
        match self.children.get_mut(index) {
            Some(Node::Element(el)) => Ok(el),
            _ => Err(ModelError::NotAnElement),
        }
    }

    /// Splices `nodes` in at `offset`, splitting a text run when the offset
    /// falls inside one.
    pub(crate) fn insert_at(&mut self, offset: usize, nodes: Vec<Node>) -> Result<(), ModelError> {
        let (mut index, inner) = self.offset_to_index(offset)?;
        if inner > 0 {
            index = self.split_text_child(index, inner);
        }
        for (i, node) in nodes.into_iter().enumerate() {
            self.children.insert(index + i, node);
        }
        self.normalize();
        Ok(())
    }

    /// Removes `how_many` offsets starting at `offset` and returns the
    /// extracted run, splitting text runs at both boundaries.
    pub(crate) fn remove_range(
        &mut self,
        offset: usize,
        how_many: usize,
    ) -> Result<Vec<Node>, ModelError> {
        let size = self.offset_size();
        if offset + how_many > size {
            return Err(ModelError::OffsetOutOfBounds {
                offset: offset + how_many,
                max: size,
            });
        }
        let (start, end) = self.isolate(offset, how_many)?;
        let extracted: Vec<Node> = self.children.drain(start..end).collect();
        self.normalize();
        Ok(extracted)
    }

    /// Splits text runs so that `[offset, offset + how_many)` is covered by
    /// whole children, returning the covered child index range.
    pub(crate) fn isolate(
        &mut self,
        offset: usize,
        how_many: usize,
    ) -> Result<(usize, usize), ModelError> {
        let (mut start, start_inner) = self.offset_to_index(offset)?;
        if start_inner > 0 {
            start = self.split_text_child(start, start_inner);
        }
        let mut end = start;
        let mut covered = 0;
        while covered < how_many {
            let child_size = self.children[end].offset_size();
            if covered + child_size > how_many {
                self.split_text_child(end, how_many - covered);
                covered = how_many;
            } else {
                covered += child_size;
            }
            end += 1;
        }
        Ok((start, end))
    }

    /// Sets or removes an attribute across `[offset, offset + how_many)`,
    /// verifying the prior value is uniformly `old`.
    pub(crate) fn set_attribute_range(
        &mut self,
        offset: usize,
        how_many: usize,
        key: &str,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<(), ModelError> {
        let size = self.offset_size();
        if offset + how_many > size {
            return Err(ModelError::OffsetOutOfBounds {
                offset: offset + how_many,
                max: size,
            });
        }
        let (start, end) = self.isolate(offset, how_many)?;
        for child in &self.children[start..end] {
            if child.attrs().get(key) != old {
                return Err(ModelError::AttributeMismatch {
                    key: key.to_string(),
                });
            }
        }
        for child in &mut self.children[start..end] {
            match new {
                Some(value) => {
                    child.attrs_mut().insert(key.to_string(), value.clone());
                }
                None => {
                    child.attrs_mut().remove(key);
                }
            }
        }
        self.normalize();
        Ok(())
    }

    /// Reads the value of `key` across `[offset, offset + how_many)`,
    /// requiring it to be uniform over the whole span.
    pub(crate) fn range_attribute(
        &self,
        offset: usize,
        how_many: usize,
        key: &str,
    ) -> Result<Option<&Value>, ModelError> {
        let size = self.offset_size();
        if offset + how_many > size {
            return Err(ModelError::OffsetOutOfBounds {
                offset: offset + how_many,
                max: size,
            });
        }
        let mut uniform: Option<Option<&Value>> = None;
        let mut cursor = 0usize;
        for child in &self.children {
            let child_start = cursor;
            cursor += child.offset_size();
            if cursor <= offset {
                continue;
            }
            if child_start >= offset + how_many {
                break;
            }
            let value = child.attrs().get(key);
            match uniform {
                None => uniform = Some(value),
                Some(existing) if existing == value => {}
                Some(_) => {
                    return Err(ModelError::AttributeMismatch {
                        key: key.to_string(),
                    })
                }
            }
        }
        Ok(uniform.flatten())
    }

    /// Splits the text child at `index` at grapheme offset `inner`, returning
    /// the index of the right half.
    fn split_text_child(&mut self, index: usize, inner: usize) -> usize {
        let right = match &mut self.children[index] {
            Node::Text(text) => Node::Text(text.split_off(inner)),
            Node::Element(_) => unreachable!("offsets inside a child always address a text run"),
        };
        self.children.insert(index + 1, right);
        index + 1
    }

    /// Merges adjacent text children with identical attribute sets.
    pub(crate) fn normalize(&mut self) {
        let mut i = 1;
        while i < self.children.len() {
            let mergeable = matches!(
                (&self.children[i - 1], &self.children[i]),
                (Node::Text(a), Node::Text(b)) if a.attrs == b.attrs
            );
            if mergeable {
                let Node::Text(right) = self.children.remove(i) else {
                    unreachable!()
                };
                let Node::Text(left) = &mut self.children[i - 1] else {
                    unreachable!()
                };
                left.data.push_str(&right.data);
            } else {
                i += 1;
            }
        }
    }
}

/// A text run: grapheme-addressed character data plus formatting attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub(crate) data: String,
    #[serde(default)]
    pub(crate) attrs: Attributes,
}

impl Text {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            attrs: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Number of user-perceived characters, i.e. grapheme clusters. Never
    /// code units: `"நிலைக்கு"` has size 4.
    pub fn offset_size(&self) -> usize {
        self.data.graphemes(true).count()
    }

    /// Iterates the grapheme clusters of this run.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.data.graphemes(true)
    }

    /// Returns the substring covering `how_many` grapheme clusters starting
    /// at cluster `offset`.
    pub fn symbols_at(&self, offset: usize, how_many: usize) -> &str {
        let start = self.byte_index(offset);
        let end = self.byte_index(offset + how_many);
        &self.data[start..end]
    }

    fn byte_index(&self, grapheme_offset: usize) -> usize {
        if grapheme_offset == 0 {
            return 0;
        }
        self.data
            .grapheme_indices(true)
            .nth(grapheme_offset)
            .map(|(i, _)| i)
            .unwrap_or(self.data.len())
    }

    /// Splits this run at grapheme offset `inner`, keeping the left half in
    /// place and returning the right half with the same attributes.
    pub(crate) fn split_off(&mut self, inner: usize) -> Text {
        let at = self.byte_index(inner);
        Text {
            data: self.data.split_off(at),
            attrs: self.attrs.clone(),
        }
    }
}
