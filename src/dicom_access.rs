//
// dicom_access.rs
// dicom-ai-randomize
//
// Small accessor layer over in-memory DICOM objects that tells "absent" apart from "present but unusable".
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::InMemDicomObject;

/// An element exists but does not hold the shape the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnexpectedShape {
    pub tag: Tag,
}

pub fn format_tag(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}

/// Helper trait to read and replace values on decoded records.
pub trait ElementAccess {
    /// Text of a primitive element, trimmed. Empty values count as absent.
    fn text(&self, tag: Tag) -> Result<Option<String>, UnexpectedShape>;

    /// Items of a sequence element.
    fn sequence_items(&self, tag: Tag) -> Result<Option<&[InMemDicomObject]>, UnexpectedShape>;

    fn put_text(&mut self, tag: Tag, vr: VR, value: &str);

    fn put_items(&mut self, tag: Tag, items: Vec<InMemDicomObject>);

    fn element_str(&self, tag: Tag) -> Option<String> {
        self.text(tag).ok().flatten()
    }

    fn has_element(&self, tag: Tag) -> bool;
}

impl ElementAccess for InMemDicomObject {
    fn text(&self, tag: Tag) -> Result<Option<String>, UnexpectedShape> {
        let Ok(element) = self.element(tag) else {
            return Ok(None);
        };
        let text = element.to_str().map_err(|_| UnexpectedShape { tag })?;
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    fn sequence_items(&self, tag: Tag) -> Result<Option<&[InMemDicomObject]>, UnexpectedShape> {
        match self.element(tag) {
            Ok(element) => element.items().map(Some).ok_or(UnexpectedShape { tag }),
            Err(_) => Ok(None),
        }
    }

    fn put_text(&mut self, tag: Tag, vr: VR, value: &str) {
        self.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
    }

    fn put_items(&mut self, tag: Tag, items: Vec<InMemDicomObject>) {
        self.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
    }

    fn has_element(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_distinguishes_absent_empty_and_sequence() {
        let mut obj = InMemDicomObject::new_empty();
        obj.put_text(Tag(0x0010, 0x0020), VR::LO, "  PAT1 ");
        obj.put_text(Tag(0x0008, 0x0050), VR::SH, "");
        obj.put_items(Tag(0x0008, 0x1115), vec![InMemDicomObject::new_empty()]);

        assert_eq!(obj.text(Tag(0x0010, 0x0020)), Ok(Some("PAT1".to_string())));
        assert_eq!(obj.text(Tag(0x0008, 0x0050)), Ok(None));
        assert_eq!(obj.text(Tag(0x0020, 0x0010)), Ok(None));
        assert_eq!(
            obj.text(Tag(0x0008, 0x1115)),
            Err(UnexpectedShape {
                tag: Tag(0x0008, 0x1115)
            })
        );
    }

    #[test]
    fn sequence_items_rejects_primitives() {
        let mut obj = InMemDicomObject::new_empty();
        obj.put_text(Tag(0x0008, 0x1140), VR::UI, "1.2.3");
        obj.put_items(
            Tag(0x0008, 0x1115),
            vec![InMemDicomObject::new_empty(), InMemDicomObject::new_empty()],
        );

        assert!(obj.sequence_items(Tag(0x0008, 0x1140)).is_err());
        assert_eq!(
            obj.sequence_items(Tag(0x0008, 0x1115)).map(|i| i.map(<[_]>::len)),
            Ok(Some(2))
        );
        assert_eq!(obj.sequence_items(Tag(0x0008, 0x2112)).map(|i| i.is_some()), Ok(false));
    }

    #[test]
    fn tags_are_formatted_as_group_element() {
        assert_eq!(format_tag(Tag(0x0040, 0xA730)), "(0040,A730)");
    }
}
