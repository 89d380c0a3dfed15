pub mod browser;
pub mod db;
pub mod export;
pub mod markup;
pub mod sink;
