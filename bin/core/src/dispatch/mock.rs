//! Scriptable in-memory [GraphStore] used by handler and executor
//! tests. State is keyed by endpoint url so one store can stand in
//! for source and target backends at once.

use std::{
  collections::{HashMap, HashSet},
  path::Path,
  sync::Mutex,
};

use anyhow::anyhow;
use async_trait::async_trait;
use ferry_client::entities::Endpoint;
use store_client::{GraphStore, RepoInfo};

#[derive(Default)]
pub struct MockStore {
  state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
  /// endpoint url -> repository ids
  repos: HashMap<String, Vec<String>>,
  /// (endpoint url, repo) -> graph uris
  graphs: HashMap<(String, String), Vec<String>>,
  /// repo -> byte size of its data download
  data_sizes: HashMap<String, usize>,
  /// (repo, graph) -> byte size of its export
  export_sizes: HashMap<(String, String), usize>,
  /// operation names scripted to fail
  failures: HashSet<String>,
  /// operation names scripted to stall before returning
  delays: HashMap<String, std::time::Duration>,
  calls: Vec<String>,
}

impl MockStore {
  pub fn with_repo(self, url: &str, repo: &str) -> Self {
    self
      .state
      .lock()
      .unwrap()
      .repos
      .entry(url.into())
      .or_default()
      .push(repo.into());
    self
  }

  pub fn with_graph(self, url: &str, repo: &str, graph: &str) -> Self {
    self
      .state
      .lock()
      .unwrap()
      .graphs
      .entry((url.into(), repo.into()))
      .or_default()
      .push(graph.into());
    self
  }

  pub fn with_data_size(self, repo: &str, size: usize) -> Self {
    self
      .state
      .lock()
      .unwrap()
      .data_sizes
      .insert(repo.into(), size);
    self
  }

  pub fn with_export_size(
    self,
    repo: &str,
    graph: &str,
    size: usize,
  ) -> Self {
    self
      .state
      .lock()
      .unwrap()
      .export_sizes
      .insert((repo.into(), graph.into()), size);
    self
  }

  pub fn failing(self, operation: &str) -> Self {
    self.state.lock().unwrap().failures.insert(operation.into());
    self
  }

  pub fn stalling(
    self,
    operation: &str,
    delay: std::time::Duration,
  ) -> Self {
    self
      .state
      .lock()
      .unwrap()
      .delays
      .insert(operation.into(), delay);
    self
  }

  pub fn calls(&self) -> Vec<String> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn repos_at(&self, url: &str) -> Vec<String> {
    self
      .state
      .lock()
      .unwrap()
      .repos
      .get(url)
      .cloned()
      .unwrap_or_default()
  }

  pub fn graphs_at(&self, url: &str, repo: &str) -> Vec<String> {
    self
      .state
      .lock()
      .unwrap()
      .graphs
      .get(&(url.into(), repo.into()))
      .cloned()
      .unwrap_or_default()
  }

  async fn record(
    &self,
    call: impl Into<String>,
  ) -> anyhow::Result<()> {
    let call = call.into();
    let operation =
      call.split(' ').next().unwrap_or_default().to_string();
    let (fail, delay) = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(call);
      (
        state.failures.contains(&operation),
        state.delays.get(&operation).copied(),
      )
    };
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    if fail {
      return Err(anyhow!("scripted failure for {operation}"));
    }
    Ok(())
  }
}

#[async_trait]
impl GraphStore for MockStore {
  async fn list_repositories(
    &self,
    endpoint: &Endpoint,
  ) -> anyhow::Result<Vec<RepoInfo>> {
    self.record(format!("list_repositories {}", endpoint.url)).await?;
    Ok(
      self
        .repos_at(&endpoint.url)
        .into_iter()
        .map(|id| RepoInfo {
          id,
          title: String::new(),
        })
        .collect(),
    )
  }

  async fn download_repo_config(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    dest: &Path,
  ) -> anyhow::Result<()> {
    self
      .record(format!("download_repo_config {} {repo}", endpoint.url)).await?;
    std::fs::write(
      dest,
      format!(
        "@base <http://example.org/repositories#{repo}> .\nrep:repositoryID \"{repo}\" ;\n"
      ),
    )?;
    Ok(())
  }

  async fn download_repo_data(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    dest: &Path,
  ) -> anyhow::Result<()> {
    self
      .record(format!("download_repo_data {} {repo}", endpoint.url)).await?;
    let size = self
      .state
      .lock()
      .unwrap()
      .data_sizes
      .get(repo)
      .copied()
      .unwrap_or(64);
    std::fs::write(dest, vec![0u8; size])?;
    Ok(())
  }

  async fn restore_repo_config(
    &self,
    endpoint: &Endpoint,
    config: &Path,
  ) -> anyhow::Result<()> {
    self
      .record(format!("restore_repo_config {}", endpoint.url)).await?;
    // Restoring a config creates the repository it names.
    let content = std::fs::read_to_string(config)?;
    if let Some(rest) = content.split("rep:repositoryID \"").nth(1)
      && let Some(repo) = rest.split('"').next()
    {
      let mut state = self.state.lock().unwrap();
      let repos =
        state.repos.entry(endpoint.url.clone()).or_default();
      if !repos.iter().any(|id| id == repo) {
        repos.push(repo.to_string());
      }
    }
    Ok(())
  }

  async fn restore_repo_data(
    &self,
    endpoint: &Endpoint,
    data: &Path,
  ) -> anyhow::Result<()> {
    let size = std::fs::metadata(data).map(|m| m.len()).unwrap_or(0);
    self.record(format!(
      "restore_repo_data {} {size}",
      endpoint.url
    )).await?;
    Ok(())
  }

  async fn delete_repo(
    &self,
    endpoint: &Endpoint,
    repo: &str,
  ) -> anyhow::Result<()> {
    self.record(format!("delete_repo {} {repo}", endpoint.url)).await?;
    let mut state = self.state.lock().unwrap();
    if let Some(repos) = state.repos.get_mut(&endpoint.url) {
      repos.retain(|id| id != repo);
    }
    state
      .graphs
      .retain(|(url, graph_repo), _| {
        url != &endpoint.url || graph_repo != repo
      });
    Ok(())
  }

  async fn list_graphs(
    &self,
    endpoint: &Endpoint,
    repo: &str,
  ) -> anyhow::Result<Vec<String>> {
    self.record(format!("list_graphs {} {repo}", endpoint.url)).await?;
    Ok(self.graphs_at(&endpoint.url, repo))
  }

  async fn export_graph(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    graph: &str,
    dest: &Path,
  ) -> anyhow::Result<()> {
    self
      .record(format!("export_graph {} {repo} {graph}", endpoint.url)).await?;
    let size = self
      .state
      .lock()
      .unwrap()
      .export_sizes
      .get(&(repo.to_string(), graph.to_string()))
      .copied()
      .unwrap_or(32);
    std::fs::write(dest, vec![1u8; size])?;
    Ok(())
  }

  async fn import_graph(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    graph: &str,
    src: &Path,
  ) -> anyhow::Result<()> {
    let size = std::fs::metadata(src).map(|m| m.len()).unwrap_or(0);
    self.record(format!(
      "import_graph {} {repo} {graph} {size}",
      endpoint.url
    )).await?;
    let mut state = self.state.lock().unwrap();
    let graphs = state
      .graphs
      .entry((endpoint.url.clone(), repo.to_string()))
      .or_default();
    if !graphs.iter().any(|uri| uri == graph) {
      graphs.push(graph.to_string());
    }
    Ok(())
  }

  async fn delete_graph(
    &self,
    endpoint: &Endpoint,
    repo: &str,
    graph: &str,
  ) -> anyhow::Result<()> {
    self
      .record(format!("delete_graph {} {repo} {graph}", endpoint.url)).await?;
    let mut state = self.state.lock().unwrap();
    if let Some(graphs) = state
      .graphs
      .get_mut(&(endpoint.url.clone(), repo.to_string()))
    {
      graphs.retain(|uri| uri != graph);
    }
    Ok(())
  }
}
