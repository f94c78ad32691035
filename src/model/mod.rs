// Topic modeling: trainer/scorer traits, the default LDA and coherence
// implementations, and the sweep that picks a topic count.

pub mod coherence;
pub mod lda;
pub mod special;
pub mod sweep;
pub mod traits;
