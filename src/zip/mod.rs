//! ZIP/ZIP64 format handling: locating and parsing the Central Directory,
//! extracting individual entries, and assembling new archives from a
//! selection of them.

pub mod archiver;
pub mod directory;
pub mod extractor;
pub mod structures;

pub use archiver::SurgicalArchiver;
pub use directory::DirectoryParser;
pub use extractor::EntryExtractor;
pub use structures::{CompressionMethod, Entry};
