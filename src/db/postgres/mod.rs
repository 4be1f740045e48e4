mod documents;

pub use documents::PostgresDocumentRepo;
