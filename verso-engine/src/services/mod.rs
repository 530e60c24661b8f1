//! External service interfaces

pub mod model_client;
pub mod translator;

pub use model_client::HttpTranslator;
pub use translator::{
    CandidateGroup, SelectBestRequest, SelectBestResponse, SelectedSegment, TranslateRequest,
    TranslateResponse, TranslationModelService,
};
