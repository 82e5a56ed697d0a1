//! Core data models for the CORD-19 paper index.
//!
//! This module contains the data structures shared across the crate: the
//! per-paper metadata record, the embedding vector type, and the configuration
//! describing where the corpus and the derived project data live on disk.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_SHARD_COUNT};

/// A precomputed document embedding.
///
/// The vector is opaque to this crate: it is read from the corpus, stored in a
/// shard, and handed back unchanged.
pub type Embedding = Vec<f32>;

/// Metadata for a single CORD-19 paper.
///
/// Built from one or more rows of `metadata.csv` sharing the same `cord_uid`.
/// The document file lists are only present when the corpus provides at least
/// one parsed full-text file for the paper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperRecord {
    /// Stable identifier shared by the metadata and the embeddings
    pub cord_uid: String,

    /// Paper title
    pub title: String,

    /// Abstract text (may be empty)
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// Publication date as written in the corpus (e.g. `2020-03-17` or `2020`)
    pub publish_time: String,

    /// Author names in the order the corpus lists them
    pub authors: Vec<String>,

    /// Relative paths of the parsed PDF documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_json_files: Option<Vec<String>>,

    /// Relative paths of the parsed PubMed Central documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmc_json_files: Option<Vec<String>>,
}

impl PaperRecord {
    /// Document files to read the body text from, PMC parses first.
    pub fn document_files(&self) -> impl Iterator<Item = &str> {
        self.pmc_json_files
            .iter()
            .chain(self.pdf_json_files.iter())
            .flatten()
            .map(String::as_str)
    }
}

/// On-disk layout of the corpus and of the derived project data.
///
/// The corpus side (`cord19_data_folder/current_dataset/...`) is read-only.
/// Everything this crate produces goes under `project_data_folder`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusLayout {
    /// Root folder holding the downloaded CORD-19 releases
    pub cord19_data_folder: PathBuf,

    /// Release folder name inside `cord19_data_folder`
    pub current_dataset: String,

    /// Metadata CSV file name inside the release folder
    pub metadata_file: String,

    /// Embeddings CSV file name inside the release folder
    pub embeddings_file: String,

    /// Folder for the indexes and shards built by this crate
    pub project_data_folder: PathBuf,

    /// Sub-folder of `project_data_folder` holding the embedding shards
    pub project_embeds_folder: String,

    /// File name of the persisted paper index
    pub papers_index_file: String,

    /// File name of the persisted shard index
    pub embeds_index_file: String,
}

impl Default for CorpusLayout {
    fn default() -> Self {
        Self {
            cord19_data_folder: PathBuf::from("cord19_data"),
            current_dataset: "2020-05-31".to_string(),
            metadata_file: "metadata.csv".to_string(),
            embeddings_file: "cord_19_embeddings_2020-05-31.csv".to_string(),
            project_data_folder: PathBuf::from("project_data"),
            project_embeds_folder: "embedding_dicts".to_string(),
            papers_index_file: "papers_index.json".to_string(),
            embeds_index_file: "embeddings_index.json".to_string(),
        }
    }
}

impl CorpusLayout {
    /// Folder of the active CORD-19 release.
    pub fn dataset_dir(&self) -> PathBuf {
        self.cord19_data_folder.join(&self.current_dataset)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dataset_dir().join(&self.metadata_file)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.dataset_dir().join(&self.embeddings_file)
    }

    pub fn papers_index_path(&self) -> PathBuf {
        self.project_data_folder.join(&self.papers_index_file)
    }

    pub fn embeds_index_path(&self) -> PathBuf {
        self.project_data_folder.join(&self.embeds_index_file)
    }

    /// Folder the shard files are written to and loaded from.
    pub fn shards_dir(&self) -> PathBuf {
        self.project_data_folder.join(&self.project_embeds_folder)
    }
}

/// Options for the one-off shard build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildOptions {
    /// Target number of shards to spread the embeddings over
    pub shard_count: usize,

    /// Required embedding length. When `None`, the first source row decides.
    pub expected_dimension: Option<usize>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            expected_dimension: Some(DEFAULT_EMBEDDING_DIMENSION),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pdf: Option<Vec<&str>>, pmc: Option<Vec<&str>>) -> PaperRecord {
        let to_owned = |files: Vec<&str>| files.into_iter().map(String::from).collect();
        PaperRecord {
            cord_uid: "ug7v899j".to_string(),
            title: "Clinical features".to_string(),
            abstract_text: "OBJECTIVE: ...".to_string(),
            publish_time: "2001-07-04".to_string(),
            authors: vec!["Madani, Tariq A".to_string()],
            pdf_json_files: pdf.map(to_owned),
            pmc_json_files: pmc.map(to_owned),
        }
    }

    #[test]
    fn test_document_files_prefers_pmc() {
        let paper = record(Some(vec!["pdf/a.json", "pdf/b.json"]), Some(vec!["pmc/a.xml.json"]));
        let files: Vec<&str> = paper.document_files().collect();
        assert_eq!(files, vec!["pmc/a.xml.json", "pdf/a.json", "pdf/b.json"]);
    }

    #[test]
    fn test_document_files_empty_when_absent() {
        let paper = record(None, None);
        assert_eq!(paper.document_files().count(), 0);
    }

    #[test]
    fn test_absent_file_lists_are_not_serialized() {
        let paper = record(None, Some(vec!["pmc/a.xml.json"]));
        let json = serde_json::to_value(&paper).unwrap();
        assert!(json.get("pdf_json_files").is_none());
        assert_eq!(json["abstract"], "OBJECTIVE: ...");

        let back: PaperRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, paper);
    }

    #[test]
    fn test_default_layout_paths() {
        let layout = CorpusLayout::default();
        assert_eq!(
            layout.metadata_path(),
            PathBuf::from("cord19_data/2020-05-31/metadata.csv")
        );
        assert_eq!(layout.shards_dir(), PathBuf::from("project_data/embedding_dicts"));
        assert_eq!(
            layout.embeds_index_path(),
            PathBuf::from("project_data/embeddings_index.json")
        );
    }
}
