pub mod pipeline;
pub mod token;

pub use pipeline::{AuthenticationPipeline, LoginStep, SsoEndpoints};
pub use token::{TokenBundle, TokenManager};
