use anyhow::{Context, Result};

/// Extract text from PDF bytes. Text items within a page are joined by a
/// single space; pages are joined by a blank line.
pub fn pdf_text(data: &[u8]) -> Result<String> {
    use lopdf::Document;

    let doc = Document::load_mem(data).context("failed to decode PDF")?;
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

    let mut pages = Vec::with_capacity(page_numbers.len());
    for page_number in page_numbers {
        if let Ok(text) = doc.extract_text(&[page_number]) {
            let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !joined.is_empty() {
                pages.push(joined);
            }
        }
    }

    Ok(pages.join("\n\n"))
}

/// Extract raw text from Word bytes, one line per paragraph.
pub fn word_text(data: &[u8]) -> Result<String> {
    use docx_rs::*;

    let docx = read_docx(data).context("failed to decode Word document")?;

    let mut content = String::new();
    for child in docx.document.children {
        if let DocumentChild::Paragraph(para) = child {
            for child in para.children {
                if let ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let RunChild::Text(text) = child {
                            content.push_str(&text.text);
                        }
                    }
                }
            }
            content.push('\n');
        }
    }

    Ok(content)
}
