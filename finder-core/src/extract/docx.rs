//! Word extraction: paragraphs tagged with a running `header_path` built from
//! Heading 1-4 styles.

use super::{read_core_author, read_zip_entry, ExtractUnit, Extraction};
use crate::error::{FinderError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

pub fn extract(path: &Path) -> Result<Extraction> {
    let xml = read_zip_entry(path, "word/document.xml")?;
    let units = parse_document(&xml)
        .map_err(|reason| FinderError::extraction(path, reason))?;
    Ok(Extraction {
        units,
        author: read_core_author(path),
    })
}

fn parse_document(xml: &str) -> std::result::Result<Vec<ExtractUnit>, String> {
    let mut reader = Reader::from_str(xml);
    let mut units = Vec::new();
    let mut heading_stack: Vec<String> = Vec::new();

    let mut in_text = false;
    let mut para_text = String::new();
    let mut para_style: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => {
                    para_text.clear();
                    para_style = None;
                }
                b"w:t" => in_text = true,
                b"w:pStyle" => para_style = style_val(&e),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:pStyle" => para_style = style_val(&e),
                b"w:tab" => para_text.push('\t'),
                b"w:br" => para_text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                para_text.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    finish_paragraph(&mut units, &mut heading_stack, &para_text, &para_style);
                    para_text.clear();
                    para_style = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed document.xml: {e}")),
            _ => {}
        }
    }

    Ok(units)
}

fn finish_paragraph(
    units: &mut Vec<ExtractUnit>,
    heading_stack: &mut Vec<String>,
    text: &str,
    style: &Option<String>,
) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if let Some(level) = style.as_deref().and_then(heading_level) {
        while heading_stack.len() >= level {
            heading_stack.pop();
        }
        heading_stack.push(text.to_string());
    }
    // Heading paragraphs are emitted too, so their text stays searchable
    // inside the section they open.
    units.push(ExtractUnit::Paragraph {
        header_path: heading_stack.clone(),
        text: text.to_string(),
    });
}

fn style_val(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"w:val" {
            return attr.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}

/// "Heading1".."Heading4" (any case) map to heading levels; everything else
/// is body text.
fn heading_level(style: &str) -> Option<usize> {
    let lower = style.to_ascii_lowercase();
    let rest = lower.strip_prefix("heading")?;
    match rest.trim().parse::<usize>() {
        Ok(level @ 1..=4) => Some(level),
        _ => None,
    }
}
