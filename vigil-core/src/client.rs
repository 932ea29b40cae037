use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;

use crate::api::{
    AuditLog, AuditQuery, CastVoteRequest, CastVoteResponse, ErrorBody, ListQuery, NewSubmission,
    RemoveVoteRequest, RemoveVoteResponse, SubmissionList, SubmissionView, VoteList,
};
use crate::submission::TargetRef;

/// Synchronous client for the Vigil HTTP API
#[derive(Clone)]
pub struct VigilClient {
    client: reqwest::blocking::Client,
    base_url: String,
    token: Option<String>,
}

impl VigilClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("vigil-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::RequestBuilder> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| anyhow!("This command requires a session token (--token or VIGIL_TOKEN)"))?;
        Ok(builder.header("Authorization", format!("Bearer {}", token)))
    }

    pub fn create_submission(&self, submission: &NewSubmission) -> Result<SubmissionView> {
        let request = self.authorized(self.client.post(self.url("/submissions")))?;
        let response = request
            .json(submission)
            .send()
            .context("Failed to send create submission request")?;
        parse_response(response, "create submission")
    }

    pub fn get_submission(&self, target: &TargetRef) -> Result<SubmissionView> {
        let response = self
            .client
            .get(self.url(&format!("/submissions/{}/{}", target.kind, target.id)))
            .send()
            .context("Failed to fetch submission")?;
        parse_response(response, "get submission")
    }

    pub fn list_submissions(&self, query: &ListQuery) -> Result<SubmissionList> {
        let response = self
            .client
            .get(self.url("/submissions"))
            .query(query)
            .send()
            .context("Failed to list submissions")?;
        parse_response(response, "list submissions")
    }

    pub fn submit_for_review(&self, target: &TargetRef) -> Result<SubmissionView> {
        let request = self.authorized(self.client.post(self.url(&format!(
            "/submissions/{}/{}/submit",
            target.kind, target.id
        ))))?;
        let response = request
            .send()
            .context("Failed to send submit-for-review request")?;
        parse_response(response, "submit for review")
    }

    pub fn cast_vote(&self, vote: &CastVoteRequest) -> Result<CastVoteResponse> {
        let request = self.authorized(self.client.post(self.url("/votes")))?;
        let response = request
            .json(vote)
            .send()
            .context("Failed to send vote")?;
        parse_response(response, "cast vote")
    }

    pub fn remove_vote(&self, vote: &RemoveVoteRequest) -> Result<RemoveVoteResponse> {
        let request = self.authorized(self.client.delete(self.url("/votes")))?;
        let response = request
            .json(vote)
            .send()
            .context("Failed to send vote removal")?;
        parse_response(response, "remove vote")
    }

    pub fn list_votes(&self, target: &TargetRef) -> Result<VoteList> {
        let response = self
            .client
            .get(self.url(&format!(
                "/submissions/{}/{}/votes",
                target.kind, target.id
            )))
            .send()
            .context("Failed to fetch votes")?;
        parse_response(response, "list votes")
    }

    pub fn audit_log(&self, target: &TargetRef, query: &AuditQuery) -> Result<AuditLog> {
        let response = self
            .client
            .get(self.url(&format!(
                "/submissions/{}/{}/audit",
                target.kind, target.id
            )))
            .query(query)
            .send()
            .context("Failed to fetch audit log")?;
        parse_response(response, "audit log")
    }
}

fn parse_response<T: DeserializeOwned>(
    response: reqwest::blocking::Response,
    operation: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .context("Failed to read error response body")?;
        let message = serde_json::from_str::<ErrorBody>(&error_text)
            .map(|body| body.error)
            .unwrap_or(error_text);
        return Err(anyhow!("Vigil {} error: {} - {}", operation, status, message));
    }

    response
        .json()
        .with_context(|| format!("Failed to parse {} response", operation))
}
