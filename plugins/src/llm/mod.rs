//! Text generation backends used by the content stages.

mod http_client;
mod offline;

pub use http_client::{ChatCompletionsClient, GenerationHttpError, GenerationHttpErrorKind};
pub use offline::OfflineGenerator;

use async_trait::async_trait;
use taleforge_core::api::SubjectType;

/// One request for generated text.
///
/// `purpose` names the content being asked for (`world_building`,
/// `characters`, ...). Backends that do not talk to a model use it to pick
/// a template.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPrompt {
    pub purpose: String,
    pub subject_title: String,
    pub subject_type: SubjectType,
    pub system: String,
    pub user: String,
}

impl GenerationPrompt {
    pub fn new(
        purpose: impl Into<String>,
        subject_title: impl Into<String>,
        subject_type: SubjectType,
    ) -> Self {
        Self {
            purpose: purpose.into(),
            subject_title: subject_title.into(),
            subject_type,
            system: String::new(),
            user: String::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the raw model text. Callers are responsible for parsing it.
    async fn generate(&self, prompt: &GenerationPrompt) -> anyhow::Result<String>;
}
