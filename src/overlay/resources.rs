//! Page resource and content helpers
//!
//! Resource dictionaries and content arrays may be inline, indirect or
//! inherited; these helpers locate them and add entries without touching
//! anything already present.

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::error::OverlayError;
use super::geometry::inherited_attribute;

/// Outcome of registering a resource under a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The key was already present; nothing changed
    Existing,
    /// A reference to this object was added under the key
    Added(ObjectId),
}

/// Where a page's `/Resources` dictionary lives
#[derive(Debug, Clone, Copy)]
enum ResourcesAt {
    PageEntry(ObjectId),
    Object(ObjectId),
}

/// Where a category sub-dictionary (`/Font`, `/ExtGState`) lives
#[derive(Debug, Clone, Copy)]
enum CategoryAt {
    Inline,
    Object(ObjectId),
    Missing,
}

/// Where a page's `/Contents` entry lives
#[derive(Debug, Clone, Copy)]
enum ContentsAt {
    Missing,
    Single(ObjectId),
    InlineArray,
    IndirectArray(ObjectId),
}

/// Make sure `/Resources/<category>/<key>` exists on the page.
///
/// `create` runs only when the key is absent and returns the object to
/// reference. Resources inherited from an ancestor are copied onto the page
/// first so the inherited entries stay visible.
pub fn ensure_resource<F>(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    key: &str,
    create: F,
) -> Result<Registration, OverlayError>
where
    F: FnOnce(&mut Document) -> Result<ObjectId, OverlayError>,
{
    let resources_at = locate_resources(doc, page_id)?;

    let category_at = match resources(doc, resources_at)?.get(category.as_bytes()) {
        Ok(Object::Reference(id)) => CategoryAt::Object(*id),
        Ok(Object::Dictionary(_)) => CategoryAt::Inline,
        _ => CategoryAt::Missing,
    };

    let exists = match category_at {
        CategoryAt::Inline => resources(doc, resources_at)?
            .get(category.as_bytes())?
            .as_dict()?
            .has(key.as_bytes()),
        CategoryAt::Object(id) => doc.get_dictionary(id)?.has(key.as_bytes()),
        CategoryAt::Missing => false,
    };
    if exists {
        return Ok(Registration::Existing);
    }

    let object_id = create(doc)?;

    match category_at {
        CategoryAt::Inline => {
            resources_mut(doc, resources_at)?
                .get_mut(category.as_bytes())?
                .as_dict_mut()?
                .set(key, Object::Reference(object_id));
        }
        CategoryAt::Object(id) => {
            doc.get_dictionary_mut(id)?
                .set(key, Object::Reference(object_id));
        }
        CategoryAt::Missing => {
            let mut entries = Dictionary::new();
            entries.set(key, Object::Reference(object_id));
            resources_mut(doc, resources_at)?.set(category, Object::Dictionary(entries));
        }
    }

    Ok(Registration::Added(object_id))
}

/// True when the page already references at least one content stream
pub fn has_content(doc: &Document, page_id: ObjectId) -> Result<bool, OverlayError> {
    Ok(match locate_contents(doc, page_id)? {
        ContentsAt::Missing => false,
        ContentsAt::Single(_) => true,
        ContentsAt::InlineArray => !doc
            .get_dictionary(page_id)?
            .get(b"Contents")?
            .as_array()?
            .is_empty(),
        ContentsAt::IndirectArray(id) => !doc.get_object(id)?.as_array()?.is_empty(),
    })
}

/// Reference new content streams from the page: `prefix` goes before the
/// existing streams, `suffix` after them. Existing stream objects are left as is.
pub fn attach_content_streams(
    doc: &mut Document,
    page_id: ObjectId,
    prefix: Option<ObjectId>,
    suffix: &[ObjectId],
) -> Result<(), OverlayError> {
    let location = locate_contents(doc, page_id)?;

    let existing: Vec<Object> = match location {
        ContentsAt::Missing => Vec::new(),
        ContentsAt::Single(id) => vec![Object::Reference(id)],
        ContentsAt::InlineArray => doc
            .get_dictionary(page_id)?
            .get(b"Contents")?
            .as_array()?
            .clone(),
        ContentsAt::IndirectArray(id) => doc.get_object(id)?.as_array()?.clone(),
    };

    let mut items = Vec::with_capacity(existing.len() + suffix.len() + 1);
    if let Some(id) = prefix {
        if !existing.is_empty() {
            items.push(Object::Reference(id));
        }
    }
    items.extend(existing);
    items.extend(suffix.iter().map(|id| Object::Reference(*id)));

    match location {
        ContentsAt::IndirectArray(id) => {
            *doc.get_object_mut(id)? = Object::Array(items);
        }
        _ if items.len() == 1 => {
            let only = items.remove(0);
            doc.get_dictionary_mut(page_id)?.set("Contents", only);
        }
        _ => {
            doc.get_dictionary_mut(page_id)?
                .set("Contents", Object::Array(items));
        }
    }

    Ok(())
}

/// Categories the text layer registers entries in
const OVERLAY_CATEGORIES: [&[u8]; 2] = [b"Font", b"ExtGState"];

/// Copy of every object a page overlay may write, taken before the first
/// write so a failed overlay can be rolled back.
///
/// Covers the page dictionary, an indirect `/Resources` (own or inherited),
/// indirect `/Font` and `/ExtGState` sub-dictionaries and an indirect
/// `/Contents` array. Objects added afterwards are dropped on restore.
#[derive(Debug)]
pub struct PageSnapshot {
    objects: Vec<(ObjectId, Option<Object>)>,
    max_id: u32,
}

impl PageSnapshot {
    pub fn capture(doc: &Document, page_id: ObjectId) -> Self {
        let mut ids = vec![page_id];

        if let Ok(Some(Object::Reference(id))) = inherited_attribute(doc, page_id, b"Resources") {
            ids.push(*id);
        }
        if let Some(resources) = page_resources(doc, page_id) {
            for category in OVERLAY_CATEGORIES {
                if let Ok(Object::Reference(id)) = resources.get(category) {
                    ids.push(*id);
                }
            }
        }
        if let Ok(Object::Reference(id)) = doc
            .get_dictionary(page_id)
            .and_then(|page| page.get(b"Contents"))
        {
            ids.push(*id);
        }

        ids.sort();
        ids.dedup();

        Self {
            objects: ids
                .into_iter()
                .map(|id| (id, doc.objects.get(&id).cloned()))
                .collect(),
            max_id: doc.max_id,
        }
    }

    /// Put every captured object back and drop objects created since capture
    pub fn restore(self, doc: &mut Document) {
        for (id, object) in self.objects {
            match object {
                Some(object) => {
                    doc.objects.insert(id, object);
                }
                None => {
                    doc.objects.remove(&id);
                }
            }
        }
        let max_id = self.max_id;
        doc.objects.retain(|id, _| id.0 <= max_id);
        doc.max_id = max_id;
    }
}

/// The page's effective `/Resources` dictionary, own or inherited
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    match inherited_attribute(doc, page_id, b"Resources").ok()?? {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

/// Dictionary registered under `/Resources/<category>/<key>`, references
/// resolved
pub fn resource_entry<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    category: &str,
    key: &str,
) -> Option<&'a Dictionary> {
    let entries = match page_resources(doc, page_id)?.get(category.as_bytes()).ok()? {
        Object::Dictionary(dict) => dict,
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        _ => return None,
    };
    match entries.get(key.as_bytes()).ok()? {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

fn locate_resources(doc: &mut Document, page_id: ObjectId) -> Result<ResourcesAt, OverlayError> {
    let found = match doc.get_dictionary(page_id)?.get(b"Resources") {
        Ok(Object::Reference(id)) => Some(ResourcesAt::Object(*id)),
        Ok(Object::Dictionary(_)) => Some(ResourcesAt::PageEntry(page_id)),
        _ => None,
    };
    if let Some(at) = found {
        return Ok(at);
    }

    let inherited = match inherited_attribute(doc, page_id, b"Resources")? {
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };

    doc.get_dictionary_mut(page_id)?
        .set("Resources", Object::Dictionary(inherited));

    Ok(ResourcesAt::PageEntry(page_id))
}

fn resources(doc: &Document, at: ResourcesAt) -> Result<&Dictionary, OverlayError> {
    match at {
        ResourcesAt::Object(id) => Ok(doc.get_dictionary(id)?),
        ResourcesAt::PageEntry(page_id) => Ok(doc
            .get_dictionary(page_id)?
            .get(b"Resources")?
            .as_dict()?),
    }
}

fn resources_mut(doc: &mut Document, at: ResourcesAt) -> Result<&mut Dictionary, OverlayError> {
    match at {
        ResourcesAt::Object(id) => Ok(doc.get_dictionary_mut(id)?),
        ResourcesAt::PageEntry(page_id) => Ok(doc
            .get_dictionary_mut(page_id)?
            .get_mut(b"Resources")?
            .as_dict_mut()?),
    }
}

fn locate_contents(doc: &Document, page_id: ObjectId) -> Result<ContentsAt, OverlayError> {
    Ok(match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(_)) => ContentsAt::IndirectArray(*id),
            Ok(Object::Stream(_)) => ContentsAt::Single(*id),
            _ => {
                return Err(OverlayError::MalformedPage(format!(
                    "/Contents {} {} R is neither a stream nor an array",
                    id.0, id.1
                )))
            }
        },
        Ok(Object::Array(_)) => ContentsAt::InlineArray,
        Ok(Object::Null) | Err(_) => ContentsAt::Missing,
        Ok(_) => {
            return Err(OverlayError::MalformedPage(
                "/Contents has an unexpected type".to_string(),
            ))
        }
    })
}
