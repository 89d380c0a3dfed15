pub mod source_key;
pub mod time_text;
