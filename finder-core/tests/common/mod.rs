//! Shared helpers for the integration suite: a deterministic embedder, an
//! engine environment on temp dirs, and in-memory OOXML fixture builders.

#![allow(dead_code)]

use localfinder_core::embed::Embedder;
use localfinder_core::{
    AppPaths, EngineContext, IndexOptions, IndexSummary, Indexer, Result as FinderResult, Settings,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Deterministic bag-of-tokens embedder: texts sharing tokens get positive
/// cosine similarity, identical texts embed identically across runs.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> HashEmbedder {
        HashEmbedder { dim }
    }

    fn token_bucket(&self, token: &str) -> usize {
        // FNV-1a, stable across platforms
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dim as u64) as usize
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[&str]) -> FinderResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dim];
                for token in text
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    vector[self.token_bucket(token)] += 1.0;
                }
                let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut vector {
                        *x /= norm;
                    }
                } else {
                    // keep the unit-norm invariant even for token-free text
                    vector[0] = 1.0;
                }
                vector
            })
            .collect())
    }
}

pub struct TestEnv {
    pub data_dir: TempDir,
    pub docs_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> TestEnv {
        TestEnv {
            data_dir: TempDir::new().expect("data dir"),
            docs_dir: TempDir::new().expect("docs dir"),
        }
    }

    /// Fresh engine over this environment's data dir, as after a restart.
    pub fn open(&self) -> EngineContext {
        EngineContext::open(AppPaths::at(self.data_dir.path()), Settings::default())
            .expect("open engine")
            .with_embedder(Arc::new(HashEmbedder::new(64)))
    }

    pub fn open_with_embedder(&self, embedder: Arc<dyn Embedder>) -> EngineContext {
        EngineContext::open(AppPaths::at(self.data_dir.path()), Settings::default())
            .expect("open engine")
            .with_embedder(embedder)
    }

    pub fn doc_path(&self, name: &str) -> std::path::PathBuf {
        self.docs_dir.path().join(name)
    }
}

pub fn index(ctx: &EngineContext, env: &TestEnv) -> IndexSummary {
    Indexer::new(ctx)
        .run(&[env.docs_dir.path().to_path_buf()], &IndexOptions::default())
        .expect("indexing run")
}

pub fn write_text(path: &Path, content: &str) {
    std::fs::write(path, content).expect("write fixture");
}

fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).expect("create fixture archive");
    let mut zip = zip::ZipWriter::new(file);
    let options: zip::write::FileOptions = Default::default();
    for (name, content) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(content.as_bytes()).expect("write zip entry");
    }
    zip.finish().expect("finish fixture archive");
}

const CORE_XML: &str = r#"<?xml version="1.0"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:creator>Kim Minsoo</dc:creator>
</cp:coreProperties>"#;

/// Minimal docx: (heading_level, text) pairs become styled paragraphs;
/// level 0 means body text.
pub fn build_docx(path: &Path, paragraphs: &[(usize, &str)]) {
    let mut body = String::new();
    for (level, text) in paragraphs {
        if *level > 0 {
            body.push_str(&format!(
                r#"<w:p><w:pPr><w:pStyle w:val="Heading{level}"/></w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"#
            ));
        } else {
            body.push_str(&format!(r#"<w:p><w:r><w:t>{text}</w:t></w:r></w:p>"#));
        }
    }
    let document = format!(
        r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    write_zip(
        path,
        &[("word/document.xml", &document), ("docProps/core.xml", CORE_XML)],
    );
}

/// Minimal pptx: one entry per slide, (title, body lines).
pub fn build_pptx(path: &Path, slides: &[(&str, &[&str])]) {
    let mut entries: Vec<(String, String)> = Vec::new();
    for (index, (title, lines)) in slides.iter().enumerate() {
        let body_runs: String = lines
            .iter()
            .map(|line| format!("<a:p><a:r><a:t>{line}</a:t></a:r></a:p>"))
            .collect();
        let slide = format!(
            r#"<?xml version="1.0"?>
<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>{title}</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:txBody>{body_runs}</p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#
        );
        entries.push((format!("ppt/slides/slide{}.xml", index + 1), slide));
    }
    entries.push(("docProps/core.xml".to_string(), CORE_XML.to_string()));
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(name, content)| (name.as_str(), content.as_str()))
        .collect();
    write_zip(path, &borrowed);
}

/// Minimal xlsx with one sheet of inline-string rows.
pub fn build_xlsx(path: &Path, sheet_name: &str, rows: &[&[&str]]) {
    let workbook = format!(
        r#"<?xml version="1.0"?>
<workbook xmlns:r="r"><sheets><sheet name="{sheet_name}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    );
    let rels = r#"<?xml version="1.0"?>
<Relationships><Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;
    let mut sheet_rows = String::new();
    for (row_index, row) in rows.iter().enumerate() {
        sheet_rows.push_str(&format!("<row r=\"{}\">", row_index + 1));
        for (col_index, cell) in row.iter().enumerate() {
            let col_letter = (b'A' + col_index as u8) as char;
            sheet_rows.push_str(&format!(
                r#"<c r="{col_letter}{}" t="str"><v>{cell}</v></c>"#,
                row_index + 1
            ));
        }
        sheet_rows.push_str("</row>");
    }
    let sheet = format!(
        r#"<?xml version="1.0"?>
<worksheet><sheetData>{sheet_rows}</sheetData></worksheet>"#
    );
    write_zip(
        path,
        &[
            ("xl/workbook.xml", &workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/worksheets/sheet1.xml", &sheet),
        ],
    );
}
