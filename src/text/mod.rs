// Text processing: linguistic filtering and phrase detection.

pub mod analyzer;
pub mod phrases;
pub mod preprocess;
pub mod stopwords;
