//! Excel extraction: each sheet rendered as a Markdown table, capped at the
//! first 50 rows and 30 columns.

use super::{read_zip_entry, read_zip_entry_opt, read_core_author, ExtractUnit, Extraction};
use crate::error::{FinderError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

pub const MAX_RENDERED_ROWS: usize = 50;
pub const MAX_RENDERED_COLS: usize = 30;

pub fn extract(path: &Path) -> Result<Extraction> {
    let workbook_xml = read_zip_entry(path, "xl/workbook.xml")?;
    let sheets = parse_workbook(&workbook_xml)
        .map_err(|reason| FinderError::extraction(path, reason))?;

    let rels: HashMap<String, String> = match read_zip_entry_opt(path, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => parse_rels(&xml).map_err(|reason| FinderError::extraction(path, reason))?,
        None => HashMap::new(),
    };

    let shared = match read_zip_entry_opt(path, "xl/sharedStrings.xml")? {
        Some(xml) => {
            parse_shared_strings(&xml).map_err(|reason| FinderError::extraction(path, reason))?
        }
        None => Vec::new(),
    };

    let mut units = Vec::new();
    for (index, (name, rid)) in sheets.iter().enumerate() {
        let target = rels
            .get(rid)
            .cloned()
            .unwrap_or_else(|| format!("worksheets/sheet{}.xml", index + 1));
        let entry = if target.starts_with("xl/") {
            target
        } else {
            format!("xl/{target}")
        };
        let Some(sheet_xml) = read_zip_entry_opt(path, &entry)? else {
            continue;
        };
        let (raw_rows, total_rows) = parse_sheet(&sheet_xml, &shared)
            .map_err(|reason| FinderError::extraction(path, reason))?;
        if raw_rows.is_empty() {
            continue;
        }
        let (header_lines, rows) = render_table(&raw_rows);
        units.push(ExtractUnit::Sheet {
            sheet_name: name.clone(),
            header_lines,
            rows,
            total_rows,
        });
    }

    Ok(Extraction {
        units,
        author: read_core_author(path),
    })
}

/// Sheet order and relationship ids from `xl/workbook.xml`.
fn parse_workbook(xml: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut rid = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = attr.unescape_value().unwrap_or_default().into_owned(),
                        b"r:id" => rid = attr.unescape_value().unwrap_or_default().into_owned(),
                        _ => {}
                    }
                }
                if !name.is_empty() {
                    sheets.push((name, rid));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed workbook.xml: {e}")),
            _ => {}
        }
    }
    Ok(sheets)
}

fn parse_rels(xml: &str) -> std::result::Result<HashMap<String, String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                let mut target = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = attr.unescape_value().unwrap_or_default().into_owned(),
                        b"Target" => {
                            target = attr.unescape_value().unwrap_or_default().into_owned()
                        }
                        _ => {}
                    }
                }
                if !id.is_empty() {
                    rels.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed workbook rels: {e}")),
            _ => {}
        }
    }
    Ok(rels)
}

/// Shared strings, rich-text runs concatenated per entry.
fn parse_shared_strings(xml: &str) -> std::result::Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_t => current.push_str(&t.unescape().unwrap_or_default()),
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    in_si = false;
                    strings.push(current.clone());
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed sharedStrings.xml: {e}")),
            _ => {}
        }
    }
    Ok(strings)
}

/// Cell grid of the first 50 rows plus the total row count.
fn parse_sheet(
    xml: &str,
    shared: &[String],
) -> std::result::Result<(Vec<Vec<String>>, usize), String> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut total_rows = 0usize;

    let mut current_row: Vec<String> = Vec::new();
    let mut in_row = false;
    let mut cell_col = 0usize;
    let mut cell_type = String::new();
    let mut in_value = false;
    let mut value = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"row" => {
                total_rows += 1;
                in_row = total_rows <= MAX_RENDERED_ROWS;
                current_row.clear();
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"c" && in_row => {
                cell_col = current_row.len();
                cell_type = String::from("n");
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"r" => {
                            let cell_ref = attr.unescape_value().unwrap_or_default();
                            cell_col = column_index(&cell_ref);
                        }
                        b"t" => {
                            cell_type = attr.unescape_value().unwrap_or_default().into_owned()
                        }
                        _ => {}
                    }
                }
                value.clear();
            }
            Ok(Event::Start(e)) if in_row => {
                let name = e.name().as_ref().to_vec();
                if name == b"v" || name == b"t" {
                    in_value = true;
                }
            }
            Ok(Event::Text(t)) if in_value => value.push_str(&t.unescape().unwrap_or_default()),
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" if in_row => {
                    let resolved = resolve_cell(&cell_type, &value, shared);
                    while current_row.len() < cell_col {
                        current_row.push(String::new());
                    }
                    if current_row.len() == cell_col {
                        current_row.push(resolved);
                    }
                }
                b"row" => {
                    if in_row {
                        rows.push(std::mem::take(&mut current_row));
                        in_row = false;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed worksheet xml: {e}")),
            _ => {}
        }
    }

    // drop fully empty trailing rows so a sheet of blanks yields nothing
    while total_rows <= MAX_RENDERED_ROWS
        && rows
            .last()
            .map(|r| r.iter().all(|c| c.is_empty()))
            .unwrap_or(false)
    {
        rows.pop();
        total_rows = total_rows.saturating_sub(1);
    }

    Ok((rows, total_rows))
}

fn resolve_cell(cell_type: &str, value: &str, shared: &[String]) -> String {
    match cell_type {
        "s" => value
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default(),
        "b" => match value {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        // numeric and formula results come through as text; non-numbers
        // (NaN in the source sense) render empty
        _ => value.to_string(),
    }
}

/// "B3" -> 1, "AA1" -> 26.
fn column_index(cell_ref: &str) -> usize {
    let mut col = 0usize;
    for b in cell_ref.bytes() {
        if b.is_ascii_uppercase() {
            col = col * 26 + (b - b'A' + 1) as usize;
        } else {
            break;
        }
    }
    col.saturating_sub(1)
}

/// Render the grid as Markdown lines: header + separator, then one line per
/// data row. Columns beyond the cap are dropped from the right.
fn render_table(raw_rows: &[Vec<String>]) -> (Vec<String>, Vec<String>) {
    let width = raw_rows
        .iter()
        .map(|r| r.len())
        .max()
        .unwrap_or(0)
        .min(MAX_RENDERED_COLS)
        .max(1);

    let render_row = |row: &[String]| {
        let mut cells: Vec<String> = row
            .iter()
            .take(width)
            .map(|c| sanitize_cell(c))
            .collect();
        while cells.len() < width {
            cells.push(String::new());
        }
        format!("| {} |", cells.join(" | "))
    };

    let header = render_row(&raw_rows[0]);
    let separator = format!("|{}", " --- |".repeat(width));
    let rows = raw_rows[1..].iter().map(|r| render_row(r)).collect();
    (vec![header, separator], rows)
}

fn sanitize_cell(cell: &str) -> String {
    cell.replace(['\n', '\r'], " ").replace('|', "/").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_refs_decode() {
        assert_eq!(column_index("A1"), 0);
        assert_eq!(column_index("B3"), 1);
        assert_eq!(column_index("Z9"), 25);
        assert_eq!(column_index("AA1"), 26);
    }

    #[test]
    fn sheet_rows_resolve_shared_strings_and_gaps() {
        let shared = vec!["name".to_string(), "amount".to_string()];
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A2" t="str"><v>widget</v></c><c r="C2"><v>7</v></c></row>
        </sheetData></worksheet>"#;
        let (rows, total) = parse_sheet(xml, &shared).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0], vec!["name", "amount"]);
        // the gap at B2 is preserved as an empty cell
        assert_eq!(rows[1], vec!["widget", "", "7"]);
    }

    #[test]
    fn rendering_caps_columns_at_thirty() {
        let wide: Vec<String> = (0..40).map(|i| format!("c{i}")).collect();
        let (header_lines, rows) = render_table(&[wide.clone(), wide]);
        let cols = header_lines[0].matches(" | ").count() + 1;
        assert_eq!(cols, MAX_RENDERED_COLS);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains("c29"));
        assert!(!rows[0].contains("c30"));
    }

    #[test]
    fn only_the_first_fifty_rows_are_rendered() {
        let mut xml = String::from("<worksheet><sheetData>");
        for r in 1..=60 {
            xml.push_str(&format!(r#"<row r="{r}"><c r="A{r}"><v>{r}</v></c></row>"#));
        }
        xml.push_str("</sheetData></worksheet>");
        let (rows, total) = parse_sheet(&xml, &[]).unwrap();
        assert_eq!(total, 60);
        assert_eq!(rows.len(), MAX_RENDERED_ROWS);
        assert_eq!(rows[49], vec!["50"]);
    }
}
