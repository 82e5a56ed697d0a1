//! Paper text assembly from the CORD-19 document parses.

use serde::Deserialize;

use crate::models::PaperRecord;

/// The part of a CORD-19 document parse (`pdf_json` / `pmc_json`) needed to
/// rebuild the body text. All other keys are ignored.
#[derive(Debug, Deserialize)]
pub struct DocumentParse {
    pub body_text: Vec<Paragraph>,
}

#[derive(Debug, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub section: String,
    pub text: String,
}

/// Title and abstract, separated by a blank line.
pub fn title_abstract(paper: &PaperRecord) -> String {
    format!("{}\n\n{}", paper.title, paper.abstract_text)
}

/// Body text of one document.
///
/// Paragraphs end with a blank line. Whenever the section changes, the new
/// section name is emitted first as `<< section >>`.
pub fn body_text(document: &DocumentParse) -> String {
    let mut body = String::new();
    let mut last_section = "";

    for paragraph in &document.body_text {
        if paragraph.section != last_section {
            body.push_str("<< ");
            body.push_str(&paragraph.section);
            body.push_str(" >>\n");
        }
        body.push_str(&paragraph.text);
        body.push_str("\n\n");
        last_section = &paragraph.section;
    }
    body
}

/// Title, abstract and body, separated by blank lines.
pub fn full_text(paper: &PaperRecord, content: &str) -> String {
    format!("{}\n\n{}", title_abstract(paper), content)
}
