pub mod image_search;
pub mod web_search;
