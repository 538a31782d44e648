//! HTTP adapter for remote RDF triplestore backends. The core talks
//! to backends exclusively through the [GraphStore] trait so handlers
//! can be driven against scripted stores in tests.

use std::{path::Path, time::Duration};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use ferry_client::entities::Endpoint;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// One repository as reported by the backend listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RepoInfo {
  pub id: String,
  #[serde(default)]
  pub title: String,
}

/// Backend operations the core dispatches against. Implementations
/// must be safe to share across concurrently running tasks.
#[async_trait]
pub trait GraphStore: Send + Sync {
  async fn list_repositories(
    &self,
    endpoint: &Endpoint,
  ) -> anyhow::Result<Vec<RepoInfo>>;

  async fn download_repo_config(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    dest: &Path,
  ) -> anyhow::Result<()>;

  async fn download_repo_data(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    dest: &Path,
  ) -> anyhow::Result<()>;

  async fn restore_repo_config(
    &self,
    endpoint: &Endpoint,
    config: &Path,
  ) -> anyhow::Result<()>;

  async fn restore_repo_data(
    &self,
    endpoint: &Endpoint,
    data: &Path,
  ) -> anyhow::Result<()>;

  async fn delete_repo(
    &self,
    endpoint: &Endpoint,
    repo: &str,
  ) -> anyhow::Result<()>;

  async fn list_graphs(
    &self,
    endpoint: &Endpoint,
    repo: &str,
  ) -> anyhow::Result<Vec<String>>;

  async fn export_graph(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    graph: &str,
    dest: &Path,
  ) -> anyhow::Result<()>;

  async fn import_graph(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    graph: &str,
    src: &Path,
  ) -> anyhow::Result<()>;

  async fn delete_graph(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    graph: &str,
  ) -> anyhow::Result<()>;
}

const CONFIG_CONTENT_TYPE: &str = "text/turtle";
const DATA_CONTENT_TYPE: &str = "application/x-binary-rdf";

/// reqwest backed [GraphStore]. One value is created at startup and
/// passed into every handler invocation; there is no global client
/// handle.
#[derive(Debug, Clone)]
pub struct StoreClient {
  client: reqwest::Client,
}

impl Default for StoreClient {
  fn default() -> Self {
    StoreClient::new(Duration::from_secs(120))
  }
}

impl StoreClient {
  pub fn new(timeout: Duration) -> StoreClient {
    StoreClient {
      client: reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("failed to build triplestore http client"),
    }
  }

  fn request(
    &self,
    method: reqwest::Method,
    endpoint: &Endpoint,
    path: &str,
  ) -> reqwest::RequestBuilder {
    let req =
      self.client.request(method, format!("{}{path}", endpoint.url));
    if endpoint.username.is_empty() {
      req
    } else {
      req.basic_auth(&endpoint.username, Some(&endpoint.password))
    }
  }

  async fn download(
    &self,
    req: reqwest::RequestBuilder,
    dest: &Path,
    operation: &str,
  ) -> anyhow::Result<()> {
    let res = ok_response(req.send().await, operation).await?;
    let mut file =
      tokio::fs::File::create(dest).await.with_context(|| {
        format!("failed to create download target at {dest:?}")
      })?;
    let mut stream = res.bytes_stream();
    while let Some(chunk) = stream
      .try_next()
      .await
      .with_context(|| format!("{operation}: download stream failed"))?
    {
      file.write_all(&chunk).await.with_context(|| {
        format!("failed to write download chunk to {dest:?}")
      })?;
    }
    file
      .flush()
      .await
      .with_context(|| format!("failed to flush {dest:?}"))
  }

  async fn upload_body(
    &self,
    path: &Path,
  ) -> anyhow::Result<reqwest::Body> {
    let file =
      tokio::fs::File::open(path).await.with_context(|| {
        format!("failed to open upload source at {path:?}")
      })?;
    Ok(reqwest::Body::wrap_stream(ReaderStream::new(file)))
  }
}

#[async_trait]
impl GraphStore for StoreClient {
  #[tracing::instrument(level = "debug", skip(self))]
  async fn list_repositories(
    &self,
    endpoint: &Endpoint,
  ) -> anyhow::Result<Vec<RepoInfo>> {
    let res = ok_response(
      self
        .request(reqwest::Method::GET, endpoint, "/rest/repositories")
        .header("accept", "application/json")
        .send()
        .await,
      "ListRepositories",
    )
    .await?;
    res
      .json()
      .await
      .context("failed to parse repository listing")
  }

  #[tracing::instrument(level = "debug", skip(self))]
  async fn download_repo_config(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    dest: &Path,
  ) -> anyhow::Result<()> {
    let req = self
      .request(
        reqwest::Method::GET,
        endpoint,
        &format!("/rest/repositories/{repo}/download-config"),
      )
      .header("accept", CONFIG_CONTENT_TYPE);
    self.download(req, dest, "DownloadRepoConfig").await
  }

  #[tracing::instrument(level = "debug", skip(self))]
  async fn download_repo_data(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    dest: &Path,
  ) -> anyhow::Result<()> {
    let req = self
      .request(
        reqwest::Method::GET,
        endpoint,
        &format!("/repositories/{repo}/statements"),
      )
      .header("accept", DATA_CONTENT_TYPE);
    self.download(req, dest, "DownloadRepoData").await
  }

  #[tracing::instrument(level = "debug", skip(self))]
  async fn restore_repo_config(
    &self,
    endpoint: &Endpoint,
    config: &Path,
  ) -> anyhow::Result<()> {
    let body = self.upload_body(config).await?;
    ok_response(
      self
        .request(reqwest::Method::POST, endpoint, "/rest/repositories")
        .header("content-type", CONFIG_CONTENT_TYPE)
        .body(body)
        .send()
        .await,
      "RestoreRepoConfig",
    )
    .await?;
    Ok(())
  }

  #[tracing::instrument(level = "debug", skip(self))]
  async fn restore_repo_data(
    &self,
    endpoint: &Endpoint,
    data: &Path,
  ) -> anyhow::Result<()> {
    let body = self.upload_body(data).await?;
    ok_response(
      self
        .request(
          reqwest::Method::POST,
          endpoint,
          "/rest/repositories/restore",
        )
        .header("content-type", DATA_CONTENT_TYPE)
        .body(body)
        .send()
        .await,
      "RestoreRepoData",
    )
    .await?;
    Ok(())
  }

  #[tracing::instrument(level = "debug", skip(self))]
  async fn delete_repo(
    &self,
    endpoint: &Endpoint,
    repo: &str,
  ) -> anyhow::Result<()> {
    ok_response(
      self
        .request(
          reqwest::Method::DELETE,
          endpoint,
          &format!("/rest/repositories/{repo}"),
        )
        .send()
        .await,
      "DeleteRepo",
    )
    .await?;
    Ok(())
  }

  #[tracing::instrument(level = "debug", skip(self))]
  async fn list_graphs(
    &self,
    endpoint: &Endpoint,
    repo: &str,
  ) -> anyhow::Result<Vec<String>> {
    let res = ok_response(
      self
        .request(
          reqwest::Method::GET,
          endpoint,
          &format!("/repositories/{repo}/contexts"),
        )
        .header("accept", "application/sparql-results+json")
        .send()
        .await,
      "ListGraphs",
    )
    .await?;
    let contexts: ContextResults = res
      .json()
      .await
      .context("failed to parse graph listing")?;
    Ok(parse_contexts(contexts))
  }

  #[tracing::instrument(level = "debug", skip(self))]
  async fn export_graph(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    graph: &str,
    dest: &Path,
  ) -> anyhow::Result<()> {
    let req = self
      .request(
        reqwest::Method::GET,
        endpoint,
        &format!(
          "/repositories/{repo}/statements?context={}",
          graph_context_param(graph)
        ),
      )
      .header("accept", DATA_CONTENT_TYPE);
    self.download(req, dest, "ExportGraph").await
  }

  #[tracing::instrument(level = "debug", skip(self))]
  async fn import_graph(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    graph: &str,
    src: &Path,
  ) -> anyhow::Result<()> {
    let body = self.upload_body(src).await?;
    ok_response(
      self
        .request(
          reqwest::Method::POST,
          endpoint,
          &format!(
            "/repositories/{repo}/statements?context={}",
            graph_context_param(graph)
          ),
        )
        .header("content-type", DATA_CONTENT_TYPE)
        .body(body)
        .send()
        .await,
      "ImportGraph",
    )
    .await?;
    Ok(())
  }

  #[tracing::instrument(level = "debug", skip(self))]
  async fn delete_graph(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    graph: &str,
  ) -> anyhow::Result<()> {
    ok_response(
      self
        .request(
          reqwest::Method::DELETE,
          endpoint,
          &format!(
            "/repositories/{repo}/statements?context={}",
            graph_context_param(graph)
          ),
        )
        .send()
        .await,
      "DeleteGraph",
    )
    .await?;
    Ok(())
  }
}

/// Graph URIs are passed as `<uri>` in the context query param.
fn graph_context_param(graph: &str) -> String {
  urlencoding::encode(&format!("<{graph}>")).into_owned()
}

#[derive(Debug, Deserialize)]
struct ContextResults {
  results: ContextBindings,
}

#[derive(Debug, Deserialize)]
struct ContextBindings {
  bindings: Vec<ContextBinding>,
}

#[derive(Debug, Deserialize)]
struct ContextBinding {
  #[serde(rename = "contextID")]
  context_id: ContextValue,
}

#[derive(Debug, Deserialize)]
struct ContextValue {
  value: String,
}

fn parse_contexts(results: ContextResults) -> Vec<String> {
  results
    .results
    .bindings
    .into_iter()
    .map(|binding| binding.context_id.value)
    .collect()
}

async fn ok_response(
  res: reqwest::Result<reqwest::Response>,
  operation: &str,
) -> anyhow::Result<reqwest::Response> {
  let res = res
    .with_context(|| format!("{operation} request failed to send"))?;
  let status = res.status();
  if status.is_success() {
    return Ok(res);
  }
  let body = res.text().await.unwrap_or_default();
  Err(anyhow!(
    "{operation} request failed | status: {status} | body: {body}"
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn graph_context_param_wraps_and_encodes() {
    assert_eq!(
      graph_context_param("http://g/1"),
      "%3Chttp%3A%2F%2Fg%2F1%3E"
    );
  }

  #[test]
  fn parses_sparql_context_listing() {
    let results: ContextResults = serde_json::from_value(serde_json::json!({
      "head": { "vars": ["contextID"] },
      "results": { "bindings": [
        { "contextID": { "type": "uri", "value": "http://g/1" } },
        { "contextID": { "type": "uri", "value": "http://g/2" } },
      ]},
    }))
    .unwrap();
    assert_eq!(parse_contexts(results), vec!["http://g/1", "http://g/2"]);
  }
}
