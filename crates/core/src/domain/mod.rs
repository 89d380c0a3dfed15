pub mod comments;
pub mod widgets;
