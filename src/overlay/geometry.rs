//! Page geometry
//!
//! Reads the visible box and rotation of a page, following the `/Parent`
//! chain for inherited attributes.

use lopdf::{Document, Object, ObjectId};

use super::error::OverlayError;
use super::types::PageRotation;

/// US Letter, used when a page carries no usable box
const DEFAULT_PAGE_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Parent chain depth limit for malformed page trees
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Visible area and rotation of a page in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Lower-left corner of the visible box
    pub origin_x: f64,
    pub origin_y: f64,
    /// Unrotated box size in points
    pub width: f64,
    pub height: f64,
    pub rotation: PageRotation,
}

impl PageGeometry {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            width,
            height,
            rotation: PageRotation::None,
        }
    }

    pub fn with_origin(mut self, x: f64, y: f64) -> Self {
        self.origin_x = x;
        self.origin_y = y;
        self
    }

    pub fn with_rotation(mut self, rotation: PageRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Width and height as displayed, i.e. as a renderer rasterizes the page
    pub fn displayed_size(&self) -> (f64, f64) {
        if self.rotation.is_quarter_turn() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    /// Convert a displayed-space point (origin bottom-left) to user space
    pub fn to_user_space(&self, dx: f64, dy: f64) -> (f64, f64) {
        let (ux, uy) = match self.rotation {
            PageRotation::None => (dx, dy),
            PageRotation::Clockwise90 => (self.width - dy, dx),
            PageRotation::Clockwise180 => (self.width - dx, self.height - dy),
            PageRotation::Clockwise270 => (dy, self.height - dx),
        };
        (ux + self.origin_x, uy + self.origin_y)
    }

    /// Read the geometry of a page: `/CropBox`, else `/MediaBox`, plus `/Rotate`
    pub fn of_page(doc: &Document, page_id: ObjectId) -> Result<Self, OverlayError> {
        let bounds = inherited_attribute(doc, page_id, b"CropBox")?
            .and_then(|obj| read_rect(doc, obj))
            .or_else(|| {
                inherited_attribute(doc, page_id, b"MediaBox")
                    .ok()
                    .flatten()
                    .and_then(|obj| read_rect(doc, obj))
            })
            .unwrap_or(DEFAULT_PAGE_BOX);

        let rotation = inherited_attribute(doc, page_id, b"Rotate")?
            .and_then(|obj| resolve(doc, obj).as_i64().ok())
            .map(PageRotation::from_degrees)
            .unwrap_or_default();

        Ok(Self {
            origin_x: bounds[0],
            origin_y: bounds[1],
            width: bounds[2] - bounds[0],
            height: bounds[3] - bounds[1],
            rotation,
        })
    }
}

/// Look up an inheritable page attribute, walking up `/Parent` links
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, OverlayError> {
    let mut dict = doc.get_dictionary(page_id)?;

    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent_id) => match doc.get_dictionary(parent_id) {
                Ok(parent) => dict = parent,
                Err(_) => return Ok(None),
            },
            Err(_) => return Ok(None),
        }
    }

    Ok(None)
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn read_number(doc: &Document, obj: &Object) -> Option<f64> {
    match resolve(doc, obj) {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Read a rectangle array and normalise it to `[llx, lly, urx, ury]`
fn read_rect(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let array = resolve(doc, obj).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = read_number(doc, item)?;
    }

    let rect = [
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ];

    if rect[2] - rect[0] > 0.0 && rect[3] - rect[1] > 0.0 {
        Some(rect)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn document_with_page(
        page: lopdf::Dictionary,
        pages_extra: lopdf::Dictionary,
    ) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut page = page;
        page.set("Type", "Page");
        page.set("Parent", pages_id);
        let page_id = doc.add_object(page);

        let mut pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        for (key, value) in pages_extra.iter() {
            pages.set(key.clone(), value.clone());
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        (doc, page_id)
    }

    #[test]
    fn test_media_box_on_page() {
        let (doc, page_id) = document_with_page(
            dictionary! { "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()] },
            dictionary! {},
        );

        let geometry = PageGeometry::of_page(&doc, page_id).unwrap();
        assert_eq!(geometry.width, 595.0);
        assert_eq!(geometry.height, 842.0);
        assert_eq!(geometry.rotation, PageRotation::None);
    }

    #[test]
    fn test_inherited_media_box_and_rotation() {
        let (doc, page_id) = document_with_page(
            dictionary! {},
            dictionary! {
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Rotate" => 90,
            },
        );

        let geometry = PageGeometry::of_page(&doc, page_id).unwrap();
        assert_eq!(geometry.width, 612.0);
        assert_eq!(geometry.rotation, PageRotation::Clockwise90);
        assert_eq!(geometry.displayed_size(), (792.0, 612.0));
    }

    #[test]
    fn test_crop_box_wins_and_is_normalised() {
        let (doc, page_id) = document_with_page(
            dictionary! {
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "CropBox" => vec![500.into(), 700.into(), 100.into(), 50.into()],
            },
            dictionary! {},
        );

        let geometry = PageGeometry::of_page(&doc, page_id).unwrap();
        assert_eq!(geometry.origin_x, 100.0);
        assert_eq!(geometry.origin_y, 50.0);
        assert_eq!(geometry.width, 400.0);
        assert_eq!(geometry.height, 650.0);
    }

    #[test]
    fn test_missing_box_defaults_to_letter() {
        let (doc, page_id) = document_with_page(dictionary! {}, dictionary! {});

        let geometry = PageGeometry::of_page(&doc, page_id).unwrap();
        assert_eq!((geometry.width, geometry.height), (612.0, 792.0));
    }

    #[test]
    fn test_user_space_conversion() {
        let page = PageGeometry::new(600.0, 800.0);
        assert_eq!(page.to_user_space(10.0, 20.0), (10.0, 20.0));

        let rotated = page.with_rotation(PageRotation::Clockwise90);
        // Displayed bottom-left corner is the user-space bottom-right corner
        assert_eq!(rotated.to_user_space(0.0, 0.0), (600.0, 0.0));

        let upside_down = page.with_rotation(PageRotation::Clockwise180);
        assert_eq!(upside_down.to_user_space(0.0, 0.0), (600.0, 800.0));

        let rotated_back = page.with_rotation(PageRotation::Clockwise270);
        assert_eq!(rotated_back.to_user_space(0.0, 0.0), (0.0, 800.0));

        let shifted = page.with_origin(5.0, 7.0);
        assert_eq!(shifted.to_user_space(1.0, 1.0), (6.0, 8.0));
    }
}
