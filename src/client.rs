//! HTTP implementation of the remote collaborators.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::remote::{ExpenseCollection, ParticipantCollection};
use crate::schemas::{
    AddParticipant, CreateExpense, Credentials, Expense, ExpenseId, Participant, Registration,
    TokenResponse, UpdateExpense, UpdateParticipant, User,
};
use crate::session::Session;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct CreatedExpense {
    expense_id: ExpenseId,
}

#[derive(Deserialize)]
struct CreatedParticipant {
    participant_id: String,
}

pub struct ApiClient<'s> {
    http: Client,
    base_url: Url,
    session: &'s Session,
}

impl<'s> ApiClient<'s> {
    pub fn new(config: &ClientConfig, session: &'s Session) -> RemoteResult<Self> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| RemoteError::Network(format!("invalid API url {}: {e}", config.api_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Network(format!("invalid API url {}", config.api_url)));
        }
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        debug!(%method, %url, "remote call");
        let builder = self.http.request(method, url);
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> RemoteResult<Response> {
        let response = builder.send().await?;
        check(response, self.session.is_authenticated()).await
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> RemoteResult<T> {
        let response = self.send(builder).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn token<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> RemoteResult<String> {
        let response: TokenResponse = self
            .json(self.request(Method::POST, segments).json(body))
            .await?;
        Ok(response.token)
    }

    pub async fn register(&self, registration: &Registration) -> RemoteResult<String> {
        self.token(&["auth", "register"], registration).await
    }

    pub async fn login(&self, credentials: &Credentials) -> RemoteResult<String> {
        self.token(&["auth", "login"], credentials).await
    }

    pub async fn current_user(&self) -> RemoteResult<User> {
        if !self.session.is_authenticated() {
            return Err(RemoteError::Unauthenticated);
        }
        self.json(self.request(Method::GET, &["auth", "u"])).await
    }
}

/// Turns non-2xx responses into errors. A 401 only means the session
/// expired when a token was actually sent.
async fn check(response: Response, authenticated: bool) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED && authenticated {
        return Err(RemoteError::Unauthenticated);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[async_trait]
impl<'s> ParticipantCollection for ApiClient<'s> {
    async fn list_participants(&self, expense_id: &str) -> RemoteResult<Vec<Participant>> {
        self.json(self.request(Method::GET, &["participants", expense_id, "participants"]))
            .await
    }

    async fn add_participant(
        &self,
        expense_id: &str,
        payload: &AddParticipant,
    ) -> RemoteResult<String> {
        payload.validate()?;
        let created: CreatedParticipant = self
            .json(
                self.request(Method::POST, &["participants", expense_id, "add"])
                    .json(payload),
            )
            .await?;
        Ok(created.participant_id)
    }

    async fn update_participant(
        &self,
        expense_id: &str,
        username: &str,
        payload: &UpdateParticipant,
    ) -> RemoteResult<()> {
        payload.validate(username)?;
        self.send(
            self.request(Method::PUT, &["participants", expense_id, "update", username])
                .json(payload),
        )
        .await
        .map(drop)
    }

    async fn remove_participant(&self, expense_id: &str, username: &str) -> RemoteResult<()> {
        self.send(self.request(Method::DELETE, &["participants", expense_id, "remove", username]))
            .await
            .map(drop)
    }
}

#[async_trait]
impl<'s> ExpenseCollection for ApiClient<'s> {
    async fn list_expenses(&self) -> RemoteResult<Vec<Expense>> {
        self.json(self.request(Method::GET, &["expenses", ""])).await
    }

    async fn create_expense(&self, payload: &CreateExpense) -> RemoteResult<ExpenseId> {
        payload.validate()?;
        let created: CreatedExpense = self
            .json(self.request(Method::POST, &["expenses", ""]).json(payload))
            .await?;
        Ok(created.expense_id)
    }

    async fn update_expense(&self, expense_id: &str, payload: &UpdateExpense) -> RemoteResult<()> {
        payload.validate()?;
        self.send(self.request(Method::PUT, &["expenses", expense_id]).json(payload))
            .await
            .map(drop)
    }

    async fn delete_expense(&self, expense_id: &str) -> RemoteResult<()> {
        self.send(self.request(Method::DELETE, &["expenses", expense_id]))
            .await
            .map(drop)
    }

    async fn get_expense(&self, expense_id: &str) -> RemoteResult<Expense> {
        self.json(self.request(Method::GET, &["expenses", expense_id])).await
    }
}
