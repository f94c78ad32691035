// Corpus construction: document enumeration, dictionary, bag-of-words.

pub mod bow;
pub mod dictionary;
pub mod source;
