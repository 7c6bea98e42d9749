//! PowerPoint extraction: one unit per slide with title and concatenated
//! text boxes.

use super::{read_core_author, read_zip_entry, zip_entry_names, ExtractUnit, Extraction};
use crate::error::{FinderError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

pub fn extract(path: &Path) -> Result<Extraction> {
    let mut slides: Vec<(u32, String)> = Vec::new();
    for name in zip_entry_names(path)? {
        if let Some(number) = slide_number(&name) {
            slides.push((number, name));
        }
    }
    slides.sort_by_key(|(number, _)| *number);

    let mut units = Vec::new();
    for (number, entry) in slides {
        let xml = read_zip_entry(path, &entry)?;
        let (title, boxes) =
            parse_slide(&xml).map_err(|reason| FinderError::extraction(path, reason))?;
        let mut body_parts: Vec<String> = Vec::new();
        if !title.is_empty() {
            body_parts.push(title.clone());
        }
        body_parts.extend(boxes);
        let body = body_parts.join("\n");
        if body.trim().is_empty() {
            continue;
        }
        units.push(ExtractUnit::Slide {
            slide_number: number,
            slide_title: title,
            body,
        });
    }

    Ok(Extraction {
        units,
        author: read_core_author(path),
    })
}

fn slide_number(entry_name: &str) -> Option<u32> {
    let rest = entry_name.strip_prefix("ppt/slides/slide")?;
    rest.strip_suffix(".xml")?.parse().ok()
}

/// Returns (title, non-title text boxes). The title is the text of the first
/// shape whose placeholder type is `title` or `ctrTitle`.
fn parse_slide(xml: &str) -> std::result::Result<(String, Vec<String>), String> {
    let mut reader = Reader::from_str(xml);

    let mut title = String::new();
    let mut boxes: Vec<String> = Vec::new();

    let mut in_shape = false;
    let mut shape_is_title = false;
    let mut shape_text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"p:sp" => {
                    in_shape = true;
                    shape_is_title = false;
                    shape_text.clear();
                }
                b"a:t" => in_text = true,
                b"p:ph" => {
                    if in_shape && placeholder_is_title(&e) {
                        shape_is_title = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"p:ph" => {
                if in_shape && placeholder_is_title(&e) {
                    shape_is_title = true;
                }
            }
            Ok(Event::Text(t)) if in_text => {
                shape_text.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"a:t" => in_text = false,
                // paragraph boundaries inside a text body become line breaks
                b"a:p" if in_shape => shape_text.push('\n'),
                b"p:sp" => {
                    in_shape = false;
                    let text = shape_text.trim().to_string();
                    if !text.is_empty() {
                        if shape_is_title && title.is_empty() {
                            title = text;
                        } else {
                            boxes.push(text);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed slide xml: {e}")),
            _ => {}
        }
    }

    Ok((title, boxes))
}

fn placeholder_is_title(e: &quick_xml::events::BytesStart<'_>) -> bool {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"type" {
            let value = attr.unescape_value().unwrap_or_default();
            return value == "title" || value == "ctrTitle";
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE: &str = r#"<?xml version="1.0"?>
<p:sld xmlns:p="p" xmlns:a="a">
  <p:cSld><p:spTree>
    <p:sp>
      <p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
      <p:txBody><a:p><a:r><a:t>Quarterly Review</a:t></a:r></a:p></p:txBody>
    </p:sp>
    <p:sp>
      <p:txBody>
        <a:p><a:r><a:t>Revenue fell</a:t></a:r></a:p>
        <a:p><a:r><a:t>Costs adjusted</a:t></a:r></a:p>
      </p:txBody>
    </p:sp>
  </p:spTree></p:cSld>
</p:sld>"#;

    #[test]
    fn title_placeholder_is_separated_from_body_boxes() {
        let (title, boxes) = parse_slide(SLIDE).unwrap();
        assert_eq!(title, "Quarterly Review");
        assert_eq!(boxes, vec!["Revenue fell\nCosts adjusted".to_string()]);
    }

    #[test]
    fn slide_entry_names_parse_to_numbers() {
        assert_eq!(slide_number("ppt/slides/slide1.xml"), Some(1));
        assert_eq!(slide_number("ppt/slides/slide12.xml"), Some(12));
        assert_eq!(slide_number("ppt/slides/_rels/slide1.xml.rels"), None);
        assert_eq!(slide_number("ppt/slideLayouts/slideLayout1.xml"), None);
    }
}
