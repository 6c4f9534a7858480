//! Land-record digitization pipeline.
//!
//! Re-exports the workspace crates under one roof:
//!
//! - [`common`]: data model and error taxonomy
//! - [`preprocess`]: page enhancement
//! - [`table`]: table cell detection
//! - [`ocr`]: recognition engines and the dispatch pool
//! - [`extraction`]: field parsing and classification
//! - [`orchestrator`]: batch runs, corrections and storage hand-off

pub use landrec_common as common;
pub use landrec_extraction as extraction;
pub use landrec_ocr as ocr;
pub use landrec_orchestrator as orchestrator;
pub use landrec_preprocess as preprocess;
pub use landrec_table_detector as table;

pub use landrec_common::{ExtractedData, ProcessingError, TableStructure};
pub use landrec_extraction::FieldExtractor;
pub use landrec_ocr::OcrDispatchPool;
pub use landrec_orchestrator::{BatchOrchestrator, CorrectionSession};
pub use landrec_preprocess::{ImagePreprocessor, PreprocessOptions};
pub use landrec_table_detector::TableDetector;
