use crate::{RemoteConfig, RemoteError};
use serde_json::{json, Value};
use std::io::Read;
use tracing::debug;

/// What the catalog hands out for an install: the latest version number and
/// a signed download URL for its archive.
#[derive(Debug, Clone)]
pub struct InstallSource {
    pub version: u64,
    pub signed_url: String,
}

/// The remote catalog collaborator. The engine only ever needs these four
/// operations; everything else about the catalog transport is opaque.
pub trait Catalog {
    /// Latest published version of a dataset plus a signed download URL.
    fn latest_version(&self, name: &str) -> Result<InstallSource, RemoteError>;

    /// Create an upload session for a dataset, returning its identifier.
    fn create_upload_session(&self, name: &str) -> Result<String, RemoteError>;

    /// Signed upload target URL for a file within an upload session.
    fn upload_url(&self, session_id: &str, filename: &str) -> Result<String, RemoteError>;

    /// Complete an upload session; the catalog assigns and returns the new
    /// version number.
    fn complete_upload(&self, session_id: &str) -> Result<u64, RemoteError>;
}

const LATEST_VERSION_QUERY: &str = "\
query ($datasetName: String!) {
    dataset(name: $datasetName) {
        latestVersion {
            number
            signedUrl
        }
    }
}";

const CREATE_UPLOAD_SESSION_MUTATION: &str = "\
mutation ($datasetName: String!) {
    createUploadSession(input: {datasetName: $datasetName}) {
        uploadSession {
            id
        }
    }
}";

const UPLOAD_URL_QUERY: &str = "\
query ($id: ID!, $filename: String!) {
    uploadSession(id: $id) {
        signedUrl(filename: $filename)
    }
}";

const COMPLETE_UPLOAD_MUTATION: &str = "\
mutation ($id: ID!) {
    completeUploadSession(input: {id: $id}) {
        version {
            number
        }
    }
}";

/// HTTP implementation of [`Catalog`] over a GraphQL endpoint.
pub struct GraphqlCatalog {
    config: RemoteConfig,
    agent: ureq::Agent,
}

impl GraphqlCatalog {
    pub fn new(config: RemoteConfig) -> Self {
        let agent = ureq::Agent::new_with_defaults();
        Self { config, agent }
    }

    fn query(&self, query: &str, variables: Value) -> Result<Value, RemoteError> {
        let payload = json!({ "query": query, "variables": variables });
        let body = serde_json::to_vec(&payload).map_err(|e| RemoteError::Api(e.to_string()))?;

        debug!("POST {}", self.config.endpoint);
        let mut req = self
            .agent
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let resp = req
            .send(body.as_slice())
            .map_err(|e| RemoteError::Api(format!("unable to reach server: {e}")))?;

        let mut reader = resp.into_body().into_reader();
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| RemoteError::Api(e.to_string()))?;
        let parsed: Value = serde_json::from_str(&content)
            .map_err(|_| RemoteError::Api("invalid server response".to_owned()))?;
        parsed
            .get("data")
            .cloned()
            .ok_or_else(|| RemoteError::Api("invalid server response".to_owned()))
    }
}

fn invalid_response() -> RemoteError {
    RemoteError::Api("invalid server response".to_owned())
}

impl Catalog for GraphqlCatalog {
    fn latest_version(&self, name: &str) -> Result<InstallSource, RemoteError> {
        let data = self.query(LATEST_VERSION_QUERY, json!({ "datasetName": name }))?;
        let dataset = &data["dataset"];
        if dataset.is_null() {
            return Err(RemoteError::Api(format!("dataset '{name}' does not exist")));
        }
        let latest = &dataset["latestVersion"];
        let version = latest["number"].as_u64().ok_or_else(invalid_response)?;
        let signed_url = latest["signedUrl"]
            .as_str()
            .ok_or_else(invalid_response)?
            .to_owned();
        Ok(InstallSource {
            version,
            signed_url,
        })
    }

    fn create_upload_session(&self, name: &str) -> Result<String, RemoteError> {
        let data = self.query(
            CREATE_UPLOAD_SESSION_MUTATION,
            json!({ "datasetName": name }),
        )?;
        data["createUploadSession"]["uploadSession"]["id"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(invalid_response)
    }

    fn upload_url(&self, session_id: &str, filename: &str) -> Result<String, RemoteError> {
        let data = self.query(
            UPLOAD_URL_QUERY,
            json!({ "id": session_id, "filename": filename }),
        )?;
        data["uploadSession"]["signedUrl"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(invalid_response)
    }

    fn complete_upload(&self, session_id: &str) -> Result<u64, RemoteError> {
        let data = self.query(COMPLETE_UPLOAD_MUTATION, json!({ "id": session_id }))?;
        data["completeUploadSession"]["version"]["number"]
            .as_u64()
            .ok_or_else(invalid_response)
    }
}
