pub mod attribute_extractor;
pub mod figure_searcher;
pub mod name_salvager;
pub mod person_researcher;
