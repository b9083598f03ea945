#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::time::Instant;

use council::dispatch::{Generate, ProviderRequest, ProviderResult};
use council::error::CouncilError;

/// Backend that replays a fixed script of outcomes and records every attempt.
pub struct Scripted {
    script: Mutex<VecDeque<Result<String, CouncilError>>>,
    seen: Mutex<Vec<ProviderRequest>>,
    at: Mutex<Vec<Instant>>,
}

impl Scripted {
    pub fn new(script: Vec<Result<String, CouncilError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
            at: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Gaps between consecutive attempts, i.e. the sleeps taken.
    pub fn gaps(&self) -> Vec<std::time::Duration> {
        let at = self.at.lock().unwrap();
        at.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

impl Generate for Scripted {
    async fn generate(&self, req: &ProviderRequest) -> Result<ProviderResult, CouncilError> {
        self.seen.lock().unwrap().push(req.clone());
        self.at.lock().unwrap().push(Instant::now());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CouncilError::Other("script exhausted".to_string())));
        next.map(|text| ProviderResult {
            text,
            model: req.model.clone(),
            provider: "scripted".to_string(),
        })
    }
}

pub fn rate_limited() -> CouncilError {
    CouncilError::RateLimited {
        provider: "scripted".to_string(),
    }
}

pub fn forbidden() -> CouncilError {
    CouncilError::AuthFailed {
        provider: "scripted".to_string(),
        message: "403 Forbidden".to_string(),
    }
}

pub const PANEL_REPLY: &str = r#"Here is the review:
```json
{"legal": {"analyse": "Standard clauses.", "flag": "🟢"},
 "risk": {"analyse": "Penalty of 5% per day of delay.", "flag": "🔴"},
 "data": {"analyse": "Budget consistent.", "flag": "🟢"}}
```"#;
