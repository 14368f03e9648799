mod filesystem;

pub use filesystem::FsDocumentSource;
