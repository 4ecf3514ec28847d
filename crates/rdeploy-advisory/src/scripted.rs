//! Scripted advisory backend for tests.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use rdeploy_utils::error::AdvisoryError;

use crate::types::AdvisoryBackend;

#[derive(Debug, Clone)]
enum Behaviour {
    Reply(Result<String, AdvisoryError>),
    Hang,
}

/// Answers every prompt the same way and records the prompts it saw.
#[derive(Debug)]
pub struct ScriptedAdvisory {
    behaviour: Behaviour,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAdvisory {
    #[must_use]
    pub fn replying(text: &str) -> Self {
        Self::with(Behaviour::Reply(Ok(text.to_string())))
    }

    #[must_use]
    pub fn failing(error: AdvisoryError) -> Self {
        Self::with(Behaviour::Reply(Err(error)))
    }

    /// Never answers; exercises the caller's timeout.
    #[must_use]
    pub fn hanging() -> Self {
        Self::with(Behaviour::Hang)
    }

    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AdvisoryBackend for ScriptedAdvisory {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, AdvisoryError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        match &self.behaviour {
            Behaviour::Reply(reply) => reply.clone(),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}
