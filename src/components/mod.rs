mod connector;
mod trust_prompt;

pub use connector::SessionConnector;
pub use trust_prompt::TrustPrompt;
