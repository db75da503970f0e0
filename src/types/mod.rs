pub mod angle;
pub mod figure;
pub mod social_model;

pub use angle::{AngleKey, SearchAngle};
pub use figure::{
    FigureField, FigurePatch, FigureStatus, HistoricalFigure, ResearchAttempt, ResearchFindings,
};
pub use social_model::{Category, RawFacets, SocialModel};
