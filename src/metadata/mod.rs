//! Paper index built from the CORD-19 `metadata.csv`.
//!
//! The metadata file has one row per source document. Several rows can share a
//! `cord_uid` (the same paper coming from different sources); they are merged
//! into one [`PaperRecord`] that keeps the position of the first row.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::PaperRecord;
use crate::ordered::OrderedMap;

/// Separator used by multi-valued metadata columns.
const LIST_SEPARATOR: &str = "; ";

/// Errors that can occur while reading the metadata file.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Failed to read from the metadata source
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// A row is missing a required column or is not valid CSV
    #[error("Malformed metadata: {0}")]
    Malformed(String),
}

impl From<csv::Error> for MetadataError {
    fn from(error: csv::Error) -> Self {
        if error.is_io_error() {
            match error.into_kind() {
                csv::ErrorKind::Io(e) => MetadataError::IoError(e),
                other => MetadataError::Malformed(format!("{:?}", other)),
            }
        } else {
            MetadataError::Malformed(error.to_string())
        }
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// The columns of `metadata.csv` this crate uses. Other columns are ignored.
#[derive(Debug, Deserialize)]
struct MetadataRow {
    cord_uid: String,
    title: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
    publish_time: String,
    authors: String,
    pdf_json_files: String,
    pmc_json_files: String,
}

/// All papers of a CORD-19 release, keyed by `cord_uid`.
///
/// Papers keep the order in which they first appear in the metadata file.
/// Persisted as a JSON object `{cord_uid: record}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaperIndex {
    papers: OrderedMap<PaperRecord>,
}

impl PaperIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a metadata CSV (with its header row) into an index.
    ///
    /// # Errors
    /// Returns `MetadataError::Malformed` if a required column is missing or a
    /// row is not valid CSV, and `MetadataError::IoError` if reading fails
    pub fn from_csv<R: Read>(source: R) -> MetadataResult<Self> {
        let mut reader = csv::Reader::from_reader(source);
        let mut index = Self::new();
        let mut rows = 0;

        for row in reader.deserialize::<MetadataRow>() {
            index.merge_row(row?);
            rows += 1;
        }

        info!(rows, papers = index.len(), "parsed paper metadata");
        Ok(index)
    }

    /// Fold one metadata row into the index.
    ///
    /// A repeated `cord_uid` overwrites the text fields and authors, but only
    /// overwrites a document list when the new row actually lists files.
    fn merge_row(&mut self, row: MetadataRow) {
        let pdf_json_files = split_list(&row.pdf_json_files);
        let pmc_json_files = split_list(&row.pmc_json_files);
        let authors = split_list(&row.authors);

        match self.papers.get_mut(&row.cord_uid) {
            Some(paper) => {
                debug!(cord_uid = %row.cord_uid, "merging repeated metadata row");
                paper.title = row.title;
                paper.abstract_text = row.abstract_text;
                paper.publish_time = row.publish_time;
                paper.authors = authors;
                if !pdf_json_files.is_empty() {
                    paper.pdf_json_files = Some(pdf_json_files);
                }
                if !pmc_json_files.is_empty() {
                    paper.pmc_json_files = Some(pmc_json_files);
                }
            }
            None => {
                let paper = PaperRecord {
                    cord_uid: row.cord_uid.clone(),
                    title: row.title,
                    abstract_text: row.abstract_text,
                    publish_time: row.publish_time,
                    authors,
                    pdf_json_files: non_empty(pdf_json_files),
                    pmc_json_files: non_empty(pmc_json_files),
                };
                self.papers.insert_new(row.cord_uid, paper);
            }
        }
    }

    pub fn get(&self, cord_uid: &str) -> Option<&PaperRecord> {
        self.papers.get(cord_uid)
    }

    pub fn contains(&self, cord_uid: &str) -> bool {
        self.papers.contains_key(cord_uid)
    }

    /// Number of distinct papers.
    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    /// Paper at `position` in index order.
    pub fn get_index(&self, position: usize) -> Option<&PaperRecord> {
        self.papers.get_index(position).map(|(_, paper)| paper)
    }

    /// Identifiers in index order.
    pub fn ids(&self) -> impl ExactSizeIterator<Item = &str> {
        self.papers.keys()
    }

    /// Papers in index order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &PaperRecord> {
        self.papers.values()
    }
}

fn split_list(field: &str) -> Vec<String> {
    if field.is_empty() {
        return Vec::new();
    }
    field.split(LIST_SEPARATOR).map(str::to_string).collect()
}

fn non_empty(list: Vec<String>) -> Option<Vec<String>> {
    if list.is_empty() {
        None
    } else {
        Some(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "cord_uid,sha,source_x,title,doi,pmcid,pubmed_id,license,abstract,publish_time,authors,journal,pdf_json_files,pmc_json_files,url";

    fn metadata(rows: &[&str]) -> String {
        let mut csv = format!("{}\n", HEADER);
        for row in rows {
            csv.push_str(row);
            csv.push('\n');
        }
        csv
    }

    #[test]
    fn test_parses_basic_row() {
        let csv = metadata(&[
            r#"ug7v899j,d1aaf,PMC,"Clinical features of culture-proven Mycoplasma pneumoniae infections",10.1186/1471,PMC35282,11472636,no-cc,"OBJECTIVE: This retrospective chart review, with commas.",2001-07-04,"Madani, Tariq A; Al-Ghamdi, Aisha A",BMC Infect Dis,document_parses/pdf_json/d1aaf.json,document_parses/pmc_json/PMC35282.xml.json,https://x"#,
        ]);
        let index = PaperIndex::from_csv(csv.as_bytes()).unwrap();
        assert_eq!(index.len(), 1);

        let paper = index.get("ug7v899j").unwrap();
        assert_eq!(paper.title, "Clinical features of culture-proven Mycoplasma pneumoniae infections");
        assert_eq!(paper.abstract_text, "OBJECTIVE: This retrospective chart review, with commas.");
        assert_eq!(paper.publish_time, "2001-07-04");
        assert_eq!(paper.authors, vec!["Madani, Tariq A", "Al-Ghamdi, Aisha A"]);
        assert_eq!(
            paper.pdf_json_files.as_deref(),
            Some(&["document_parses/pdf_json/d1aaf.json".to_string()][..])
        );
        assert!(paper.pmc_json_files.is_some());
    }

    #[test]
    fn test_empty_file_columns_are_absent() {
        let csv = metadata(&["abc123,,WHO,Title,,,,unk,Abstract,2020,,Journal,,,"]);
        let index = PaperIndex::from_csv(csv.as_bytes()).unwrap();

        let paper = index.get("abc123").unwrap();
        assert!(paper.pdf_json_files.is_none());
        assert!(paper.pmc_json_files.is_none());
        assert!(paper.authors.is_empty());
    }

    #[test]
    fn test_repeated_uid_merges_and_keeps_position() {
        let csv = metadata(&[
            "aaa,,s,Old title,,,,l,Old abstract,2019,A,J,pdf/a.json,,u",
            "bbb,,s,Other,,,,l,Text,2020,B,J,,,u",
            "aaa,,s,New title,,,,l,New abstract,2020,A; C,J,,pmc/a.xml.json,u",
        ]);
        let index = PaperIndex::from_csv(csv.as_bytes()).unwrap();

        assert_eq!(index.ids().collect::<Vec<_>>(), vec!["aaa", "bbb"]);
        let paper = index.get("aaa").unwrap();
        assert_eq!(paper.title, "New title");
        assert_eq!(paper.abstract_text, "New abstract");
        assert_eq!(paper.authors, vec!["A", "C"]);
        // An empty list on the later row does not erase the earlier one.
        assert_eq!(paper.pdf_json_files, Some(vec!["pdf/a.json".to_string()]));
        assert_eq!(paper.pmc_json_files, Some(vec!["pmc/a.xml.json".to_string()]));
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let csv = "cord_uid,title\nabc,Title\n";
        match PaperIndex::from_csv(csv.as_bytes()) {
            Err(MetadataError::Malformed(message)) => {
                assert!(message.contains("missing field"), "unexpected message: {}", message)
            }
            other => panic!("Expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_json_round_trip_keeps_order() {
        let csv = metadata(&[
            "zzz,,s,Z,,,,l,Abs,2020,A,J,,,u",
            "aaa,,s,A,,,,l,Abs,2020,B,J,pdf/a.json,,u",
        ]);
        let index = PaperIndex::from_csv(csv.as_bytes()).unwrap();

        let json = serde_json::to_string(&index).unwrap();
        let reloaded: PaperIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, index);
        assert_eq!(reloaded.get_index(0).unwrap().cord_uid, "zzz");
        assert_eq!(reloaded.iter().count(), 2);
    }
}
