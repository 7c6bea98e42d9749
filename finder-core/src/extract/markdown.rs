//! Markdown extraction: split by ATX heading hierarchy, each section tagged
//! with its `header_path`. Fenced code blocks never terminate a section.

use super::{ExtractUnit, Extraction};
use crate::error::{FinderError, Result};
use std::path::Path;

pub fn extract(path: &Path) -> Result<Extraction> {
    let text = std::fs::read_to_string(path).map_err(|e| FinderError::io(path, e))?;
    Ok(Extraction {
        units: split_sections(&text),
        author: None,
    })
}

fn split_sections(text: &str) -> Vec<ExtractUnit> {
    let mut units = Vec::new();
    let mut heading_stack: Vec<String> = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        if !in_fence {
            if let Some((level, title)) = parse_heading(line) {
                flush(&mut units, &mut buf, &heading_stack);
                while heading_stack.len() >= level {
                    heading_stack.pop();
                }
                heading_stack.push(title);
                // the heading line itself stays searchable in its section
                buf.push(line);
                continue;
            }
        }

        buf.push(line);
    }
    flush(&mut units, &mut buf, &heading_stack);

    units
}

fn flush(units: &mut Vec<ExtractUnit>, buf: &mut Vec<&str>, heading_stack: &[String]) {
    let text = buf.join("\n").trim().to_string();
    buf.clear();
    if text.is_empty() {
        return;
    }
    units.push(ExtractUnit::Paragraph {
        header_path: heading_stack.to_vec(),
        text,
    });
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let rest = line.strip_prefix('#')?;
    let mut level = 1;
    let mut chars = rest.chars();
    let mut title_start = rest;
    while let Some(c) = chars.next() {
        match c {
            '#' if level < 6 => level += 1,
            ' ' | '\t' => {
                title_start = chars.as_str();
                break;
            }
            _ => return None,
        }
        title_start = chars.as_str();
    }
    let title = title_start.trim().to_string();
    (!title.is_empty()).then_some((level, title))
}
