use std::collections::HashMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::header::USER_AGENT;

use crate::domain::commands::{WizardCommand, WizardRequest};

/// Extracts a client [`WizardRequest`] from the JSON body as a
/// [`WizardCommand`], together with request metadata that is stored alongside
/// the resulting events.
pub struct CommandExtractor(pub HashMap<String, String>, pub WizardCommand);

impl<S> FromRequest<S> for CommandExtractor
where
    S: Send + Sync,
{
    type Rejection = JsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut metadata = HashMap::default();
        metadata.insert("time".to_string(), chrono::Utc::now().to_rfc3339());
        metadata.insert("uri".to_string(), req.uri().to_string());
        if let Some(user_agent) = req
            .headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
        {
            metadata.insert("User-Agent".to_string(), user_agent.to_string());
        }

        let Json(request) = Json::<WizardRequest>::from_request(req, state).await?;
        Ok(CommandExtractor(metadata, request.into()))
    }
}
