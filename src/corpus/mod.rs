//! The CORD-19 corpus as one object.
//!
//! [`Corpus`] ties together the paper index (metadata), the paper texts (the
//! document parses shipped with the release) and the sharded embedding store.
//! Opening a corpus builds whichever of the two indexes is not on disk yet and
//! loads the other; after the first run, opening is cheap.

mod text;

pub use text::{body_text, full_text, title_abstract, DocumentParse, Paragraph};

use std::fs::{self, File};

use thiserror::Error;
use tracing::{debug, info};

use crate::metadata::{MetadataError, PaperIndex};
use crate::models::{BuildOptions, CorpusLayout, Embedding, PaperRecord};
use crate::shard::BuildStats;
use crate::storage::json::{read_json, read_json_if_exists, write_json, JsonShardStorage};
use crate::storage::StorageError;
use crate::store::{Embeddings, EmbeddingStore, StoreError};

/// Errors that can occur while opening or querying the corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// The identifier is not in the paper index
    #[error("Paper not found: {0}")]
    PaperNotFound(String),

    /// Reading `metadata.csv` failed
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Building or querying the embedding store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading or writing a project file or document parse failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for corpus operations.
pub type CorpusResult<T> = Result<T, CorpusError>;

/// What [`Corpus::open_with_progress`] had to build.
#[derive(Debug, Clone, Default)]
pub struct OpenReport {
    /// The paper index was parsed from `metadata.csv` (rather than loaded)
    pub papers_built: bool,

    /// Shard build statistics, if the embedding shards were built
    pub embeddings_built: Option<BuildStats>,
}

/// Indexed access to one CORD-19 release.
pub struct Corpus {
    layout: CorpusLayout,
    papers: PaperIndex,
    embeddings: EmbeddingStore<JsonShardStorage>,
}

impl Corpus {
    /// Open the corpus described by `layout`, building missing indexes.
    ///
    /// # Errors
    /// Returns `CorpusError` if a source file cannot be read or parsed, or if
    /// a project file cannot be written
    pub fn open(layout: CorpusLayout, options: BuildOptions) -> CorpusResult<Self> {
        Self::open_with_progress(layout, options, |_| {}).map(|(corpus, _)| corpus)
    }

    /// Open the corpus, reporting shard build progress through `on_shard`.
    ///
    /// The steps are:
    /// 1. Create the project data folders
    /// 2. Load `papers_index.json`, or parse `metadata.csv` and save it
    /// 3. Load `embeddings_index.json`, or shard the embeddings CSV (sized by
    ///    the number of papers) and save it
    pub fn open_with_progress<F>(
        layout: CorpusLayout,
        options: BuildOptions,
        on_shard: F,
    ) -> CorpusResult<(Self, OpenReport)>
    where
        F: FnMut(&BuildStats),
    {
        fs::create_dir_all(&layout.project_data_folder)
            .map_err(|e| StorageError::io(&layout.project_data_folder, e))?;

        let (papers, papers_built) = Self::load_or_build_papers(&layout)?;

        let storage = JsonShardStorage::new(layout.shards_dir(), layout.embeds_index_path());
        storage.ensure_dirs()?;

        let embeddings_path = layout.embeddings_path();
        let (embeddings, embeddings_built) = EmbeddingStore::open_or_build_with_progress(
            storage,
            papers.len(),
            &options,
            || File::open(&embeddings_path),
            on_shard,
        )?;

        info!(
            papers = papers.len(),
            embeddings = embeddings.index().len(),
            "corpus ready"
        );

        let report = OpenReport {
            papers_built,
            embeddings_built,
        };
        Ok((
            Self {
                layout,
                papers,
                embeddings,
            },
            report,
        ))
    }

    fn load_or_build_papers(layout: &CorpusLayout) -> CorpusResult<(PaperIndex, bool)> {
        let index_path = layout.papers_index_path();
        if let Some(papers) = read_json_if_exists::<PaperIndex>(&index_path)? {
            info!(papers = papers.len(), "loaded paper index");
            return Ok((papers, false));
        }

        let metadata_path = layout.metadata_path();
        info!(path = %metadata_path.display(), "no paper index found, parsing metadata");
        let file = File::open(&metadata_path).map_err(|e| StorageError::io(&metadata_path, e))?;
        let papers = PaperIndex::from_csv(file)?;

        write_json(&index_path, &papers)?;
        Ok((papers, true))
    }

    pub fn layout(&self) -> &CorpusLayout {
        &self.layout
    }

    /// The paper index.
    pub fn papers(&self) -> &PaperIndex {
        &self.papers
    }

    /// The embedding store.
    pub fn store(&self) -> &EmbeddingStore<JsonShardStorage> {
        &self.embeddings
    }

    /// Metadata of `cord_uid`.
    pub fn paper(&self, cord_uid: &str) -> CorpusResult<&PaperRecord> {
        self.papers
            .get(cord_uid)
            .ok_or_else(|| CorpusError::PaperNotFound(cord_uid.to_string()))
    }

    /// Title and abstract of `cord_uid`.
    pub fn title_abstract(&self, cord_uid: &str) -> CorpusResult<String> {
        self.paper(cord_uid).map(title_abstract)
    }

    /// Body text of `cord_uid`, without title and abstract.
    ///
    /// PMC parses are tried before PDF parses; the first document yielding any
    /// text is used. A paper without document parses has an empty body.
    ///
    /// # Errors
    /// - `CorpusError::PaperNotFound` if the paper is unknown
    /// - `CorpusError::Storage` if a listed document is missing or corrupt
    pub fn content(&self, cord_uid: &str) -> CorpusResult<String> {
        let paper = self.paper(cord_uid)?;
        let dataset_dir = self.layout.dataset_dir();

        for file in paper.document_files() {
            let path = dataset_dir.join(file);
            debug!(cord_uid, path = %path.display(), "reading document parse");

            let document: DocumentParse = read_json(&path)?;
            let body = body_text(&document);
            if !body.is_empty() {
                return Ok(body);
            }
        }
        Ok(String::new())
    }

    /// Title, abstract and body text of `cord_uid`.
    pub fn full_text(&self, cord_uid: &str) -> CorpusResult<String> {
        let content = self.content(cord_uid)?;
        Ok(full_text(self.paper(cord_uid)?, &content))
    }

    /// Embedding of `cord_uid`.
    pub fn embedding(&mut self, cord_uid: &str) -> CorpusResult<Embedding> {
        Ok(self.embeddings.embedding_for(cord_uid)?)
    }

    /// Title and abstract of every paper, in paper-index order.
    pub fn all_title_abstracts(&self) -> impl Iterator<Item = String> + '_ {
        self.papers.iter().map(title_abstract)
    }

    /// Body text of every paper, in paper-index order.
    pub fn all_contents(&self) -> impl Iterator<Item = CorpusResult<String>> + '_ {
        self.papers.ids().map(move |cord_uid| self.content(cord_uid))
    }

    /// Full text of every paper, in paper-index order.
    pub fn all_full_texts(&self) -> impl Iterator<Item = CorpusResult<String>> + '_ {
        self.papers.ids().map(move |cord_uid| self.full_text(cord_uid))
    }

    /// `(cord_uid, embedding)` for every embedded paper, in shard-index order.
    pub fn embeddings(&mut self) -> Embeddings<'_, JsonShardStorage> {
        self.embeddings.embeddings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    const METADATA: &str = "\
cord_uid,sha,title,abstract,publish_time,authors,pdf_json_files,pmc_json_files
p1,s1,First paper,First abstract,2020-01-01,A; B,pdf_json/p1.json,pmc_json/p1.xml.json
p2,s2,Second paper,Second abstract,2020-02-02,C,pdf_json/p2.json,
p3,s3,Third paper,Third abstract,2020,D,,
p4,s4,Fourth paper,Fourth abstract,2020,E,pdf_json/missing.json,
p5,s5,Fifth paper,Fifth abstract,2020,F,,
";

    const EMBEDDINGS: &str = "p1,0.1,0.2\np2,0.3,0.4\np3,0.5,0.6\np4,0.7,0.8\np5,0.9,1.0\n";

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn layout(dir: &TempDir) -> CorpusLayout {
        let layout = CorpusLayout {
            cord19_data_folder: dir.path().join("cord19_data"),
            project_data_folder: dir.path().join("project_data"),
            ..CorpusLayout::default()
        };

        let dataset = layout.dataset_dir();
        write(&layout.metadata_path(), METADATA);
        write(&layout.embeddings_path(), EMBEDDINGS);
        write(
            &dataset.join("pmc_json/p1.xml.json"),
            r#"{"body_text": [{"section": "Intro", "text": "PMC body."}]}"#,
        );
        write(
            &dataset.join("pdf_json/p1.json"),
            r#"{"body_text": [{"section": "Intro", "text": "PDF body."}]}"#,
        );
        write(
            &dataset.join("pdf_json/p2.json"),
            r#"{"body_text": [{"section": "", "text": "Plain."}, {"section": "End", "text": "Done."}]}"#,
        );
        layout
    }

    fn options() -> BuildOptions {
        BuildOptions {
            shard_count: 2,
            expected_dimension: Some(2),
        }
    }

    #[test]
    fn test_first_open_builds_everything() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);

        let (corpus, report) = Corpus::open_with_progress(layout.clone(), options(), |_| {}).unwrap();
        assert!(report.papers_built);

        // 5 / 2 + 1 = 3 per shard -> shards of 3 and 2.
        let stats = report.embeddings_built.unwrap();
        assert_eq!(stats.shards_written, 2);
        assert_eq!(stats.embeddings_written, 5);

        assert!(layout.papers_index_path().is_file());
        assert!(layout.embeds_index_path().is_file());
        assert!(layout.shards_dir().join("embeddings_dict_001").is_file());
        assert!(layout.shards_dir().join("embeddings_dict_002").is_file());
        assert_eq!(corpus.papers().len(), 5);
    }

    #[test]
    fn test_second_open_loads_same_indexes() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);

        let first = Corpus::open(layout.clone(), options()).unwrap();
        // The sources are no longer needed once the indexes exist.
        fs::remove_file(layout.embeddings_path()).unwrap();
        fs::remove_file(layout.metadata_path()).unwrap();

        let (second, report) = Corpus::open_with_progress(layout, options(), |_| {}).unwrap();
        assert!(!report.papers_built);
        assert!(report.embeddings_built.is_none());
        assert_eq!(second.papers(), first.papers());
        assert_eq!(second.store().index(), first.store().index());
    }

    #[test]
    fn test_paper_texts() {
        let dir = TempDir::new().unwrap();
        let corpus = Corpus::open(layout(&dir), options()).unwrap();

        assert_eq!(corpus.title_abstract("p2").unwrap(), "Second paper\n\nSecond abstract");
        // PMC parse wins over the PDF parse.
        assert_eq!(corpus.content("p1").unwrap(), "<< Intro >>\nPMC body.\n\n");
        assert_eq!(corpus.content("p2").unwrap(), "Plain.\n\n<< End >>\nDone.\n\n");
        assert_eq!(corpus.content("p3").unwrap(), "");
        assert_eq!(
            corpus.full_text("p2").unwrap(),
            "Second paper\n\nSecond abstract\n\nPlain.\n\n<< End >>\nDone.\n\n"
        );
    }

    #[test]
    fn test_unknown_paper_and_missing_document() {
        let dir = TempDir::new().unwrap();
        let corpus = Corpus::open(layout(&dir), options()).unwrap();

        assert!(matches!(
            corpus.title_abstract("nope"),
            Err(CorpusError::PaperNotFound(_))
        ));
        assert!(matches!(
            corpus.content("p4"),
            Err(CorpusError::Storage(StorageError::Io { .. }))
        ));
    }

    #[test]
    fn test_embeddings() {
        let dir = TempDir::new().unwrap();
        let mut corpus = Corpus::open(layout(&dir), options()).unwrap();

        assert_eq!(corpus.embedding("p4").unwrap(), vec![0.7, 0.8]);
        assert!(matches!(
            corpus.embedding("nope"),
            Err(CorpusError::Store(StoreError::NotFound(_)))
        ));

        let all: Vec<(String, Embedding)> = corpus.embeddings().map(Result::unwrap).collect();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0], ("p1".to_string(), vec![0.1, 0.2]));
        assert_eq!(all[4], ("p5".to_string(), vec![0.9, 1.0]));
    }

    #[test]
    fn test_bulk_text_iterators_follow_paper_order() {
        let dir = TempDir::new().unwrap();
        let corpus = Corpus::open(layout(&dir), options()).unwrap();

        let titles: Vec<String> = corpus.all_title_abstracts().collect();
        assert_eq!(titles.len(), 5);
        assert!(titles[0].starts_with("First paper"));

        let contents: Vec<bool> = corpus.all_contents().map(|c| c.is_ok()).collect();
        assert_eq!(contents, vec![true, true, true, false, true]);

        let full = corpus.all_full_texts().next().unwrap().unwrap();
        assert!(full.starts_with("First paper\n\nFirst abstract\n\n<< Intro >>"));
    }

    #[test]
    fn test_missing_metadata_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        fs::remove_file(layout.metadata_path()).unwrap();

        let result = Corpus::open(layout.clone(), options());
        assert!(matches!(result, Err(CorpusError::Storage(StorageError::Io { .. }))));
        assert!(!layout.papers_index_path().exists());
    }
}
