#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn package(parts: Vec<(String, String)>) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, body) in parts {
        writer.start_file(name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A minimal DOCX package with one `<w:p>` per paragraph. Each paragraph is
/// split into two runs to exercise run concatenation.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| {
            let mid = p.char_indices().nth(p.chars().count() / 2).map_or(p.len(), |(i, _)| i);
            format!(
                r#"<w:p><w:pPr><w:pStyle w:val="Normal"/></w:pPr><w:r><w:t xml:space="preserve">{}</w:t></w:r><w:r><w:tab/><w:t>{}</w:t></w:r></w:p>"#,
                escape(&p[..mid]),
                escape(&p[mid..])
            )
        })
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );
    package(vec![
        ("[Content_Types].xml".to_string(), "<Types/>".to_string()),
        ("word/document.xml".to_string(), document),
    ])
}

/// A minimal PPTX package; `slides` pairs a slide number with its text, one
/// paragraph per line.
pub fn pptx_bytes(slides: &[(u32, &str)]) -> Vec<u8> {
    let mut parts = vec![("[Content_Types].xml".to_string(), "<Types/>".to_string())];
    for (number, text) in slides {
        let paragraphs: String = text
            .lines()
            .map(|line| format!(r#"<a:p><a:r><a:rPr lang="en-US"/><a:t>{}</a:t></a:r></a:p>"#, escape(line)))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:sp><p:txBody>{}</p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
            paragraphs
        );
        parts.push((format!("ppt/slides/slide{}.xml", number), xml));
    }
    parts.push((
        "ppt/slides/_rels/slide1.xml.rels".to_string(),
        "<Relationships/>".to_string(),
    ));
    package(parts)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
