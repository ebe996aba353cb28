pub mod chunker;
pub mod graphemes;
pub mod markdown;
pub mod question;

pub use markdown::markdown_to_plaintext;
pub use question::extract_question;
