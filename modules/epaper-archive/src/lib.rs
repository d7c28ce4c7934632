pub mod compress;
pub mod error;
pub mod history;
pub mod layout;
pub mod retention;

pub use compress::{shrink_in_place, Compression, CompressionOutcome, Compressor, NoCompression, PdfCompressor};
pub use error::{ArchiveError, Result};
pub use history::{DownloadRecord, HistoryEntry, HistoryStore, Outcome};
pub use layout::ArchiveLayout;
pub use retention::{RetentionManager, RetentionReport};
