mod documents;

pub use documents::SqliteDocumentRepo;
