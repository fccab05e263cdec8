//! GitLab REST API v4 client.
//!
//! Only the two calls the pipeline needs are implemented: the paginated
//! project listing (global or per group, subgroups included) and the
//! single-project lookup. Pagination follows GitLab's offset scheme: the
//! `X-Next-Page` response header carries the next page number and is empty
//! on the last page.

use std::time::Duration;

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderValue};
use sbomer_core::config::GitLabConfig;
use sbomer_core::error::SourceError;
use sbomer_core::pipeline::ProjectSource;
use sbomer_core::types::{ProjectDetails, ProjectPage, ProjectSummary, Scope};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// Project as returned by `GET /projects/:id`.
#[derive(Debug, Deserialize)]
struct ApiProject {
    id: i64,
    name: String,
    path_with_namespace: String,
    #[serde(default)]
    topics: Vec<String>,
    /// `null` for empty repositories.
    #[serde(default)]
    default_branch: Option<String>,
}

/// [`ProjectSource`] backed by the GitLab REST API.
///
/// The token travels in the `PRIVATE-TOKEN` header, never in URLs, so
/// request errors and debug logs are safe to emit as-is.
#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    api_base: Url,
    web_base: String,
}

impl GitLabClient {
    /// Builds a client for `scheme://host/api/v4`.
    pub fn new(config: &GitLabConfig) -> Result<Self, SourceError> {
        let web_base = config.base_url();
        let api_base = Url::parse(&format!("{web_base}/api/v4")).map_err(|e| {
            SourceError::Request(format!("invalid GitLab base URL '{web_base}': {e}"))
        })?;

        let mut headers = HeaderMap::new();
        if !config.token.is_empty() {
            let mut token = HeaderValue::from_str(&config.token).map_err(|_| {
                SourceError::Request("GitLab token is not a valid header value".to_owned())
            })?;
            token.set_sensitive(true);
            headers.insert(TOKEN_HEADER, token);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SourceError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base,
            web_base,
        })
    }

    /// Credential-free clone URL, `scheme://host/<namespace>/<project>.git`.
    pub fn clone_url(&self, path_with_namespace: &str) -> String {
        format!("{}/{path_with_namespace}.git", self.web_base)
    }

    /// API URL with `segments` appended. Each segment is percent-encoded,
    /// so a group path like `acme/platform` becomes `acme%2Fplatform`.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, SourceError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| SourceError::Request(format!("'{}' cannot be a base URL", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn listing_url(&self, scope: &Scope, page: u32, per_page: u32) -> Result<Url, SourceError> {
        let mut url = match scope {
            Scope::All => self.endpoint(["projects"])?,
            Scope::Group(id) => self.endpoint(["groups", id.as_str(), "projects"])?,
        };

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &per_page.to_string());
            if matches!(scope, Scope::Group(_)) {
                query.append_pair("include_subgroups", "true");
            }
        }

        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<(T, HeaderMap), SourceError> {
        debug!(url = %url, "GitLab request");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let headers = response.headers().clone();
        let body = response
            .json::<T>()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        Ok((body, headers))
    }
}

/// Reads `X-Next-Page`. Missing, empty or zero means last page.
fn next_page(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(NEXT_PAGE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|&page| page > 0)
}

impl ProjectSource for GitLabClient {
    async fn list_projects(
        &self,
        scope: &Scope,
        page: u32,
        per_page: u32,
    ) -> Result<ProjectPage, SourceError> {
        let url = self.listing_url(scope, page, per_page)?;
        let (projects, headers) = self.get_json::<Vec<ProjectSummary>>(url).await?;

        Ok(ProjectPage {
            projects,
            next_page: next_page(&headers),
        })
    }

    async fn get_project(&self, project_id: i64) -> Result<ProjectDetails, SourceError> {
        let id = project_id.to_string();
        let url = self.endpoint(["projects", id.as_str()])?;
        let (project, _) = self.get_json::<ApiProject>(url).await?;

        Ok(ProjectDetails {
            id: project.id,
            clone_url: self.clone_url(&project.path_with_namespace),
            name: project.name,
            path: project.path_with_namespace,
            topics: project.topics,
            default_branch: project.default_branch.unwrap_or_default(),
        })
    }
}
