use serde::{Deserialize, Serialize};

use crate::{
  entities::{
    JsonObject, JsonValue,
    task::{Task, TaskAction, TaskRef, WorkflowSpec},
    trim_trailing_slashes,
  },
  error::FerryError,
};

/// Node `@type` marking a repository.
pub const REPOSITORY_TYPE: &str = "DataCatalog";
/// Node `@type` marking a named graph.
pub const GRAPH_TYPE: &str = "Dataset";

pub const COMPLETED_STATUS: &str = "CompletedActionStatus";
pub const FAILED_STATUS: &str = "FailedActionStatus";
pub const ACTIVE_STATUS: &str = "ActiveActionStatus";

/// The semantic surface grammar. One variant per accepted `@type`;
/// the tag is carried in the JSON-LD `@type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum SemanticAction {
  TransferAction(TransferAction),
  CreateAction(CreateAction),
  DeleteAction(DeleteAction),
  UpdateAction(UpdateAction),
  UploadAction(UploadAction),
  ItemList(ItemList),
  ScheduledAction(ScheduledAction),
}

/// Fields shared by every action: execution status and outcome,
/// populated on the echoed response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionMeta {
  #[serde(
    rename = "actionStatus",
    default,
    skip_serializing_if = "String::is_empty"
  )]
  pub action_status: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<JsonValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferAction {
  #[serde(
    rename = "fromLocation",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub from_location: Option<SemanticNode>,
  #[serde(
    rename = "toLocation",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub to_location: Option<SemanticNode>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub object: Option<SemanticNode>,
  #[serde(flatten)]
  pub meta: ActionMeta,
}

/// The repository to create rides in `result` (the created thing);
/// the echo replaces it with the execution outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAction {
  #[serde(flatten)]
  pub meta: ActionMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteAction {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub object: Option<SemanticNode>,
  #[serde(flatten)]
  pub meta: ActionMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAction {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub object: Option<SemanticNode>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<SemanticNode>,
  #[serde(flatten)]
  pub meta: ActionMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadAction {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub object: Option<SemanticNode>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<SemanticNode>,
  #[serde(flatten)]
  pub meta: ActionMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemList {
  #[serde(rename = "itemListElement", default)]
  pub item_list_element: Vec<ListItem>,
  #[serde(default)]
  pub parallel: bool,
  #[serde(default = "default_concurrency")]
  pub concurrency: usize,
  #[serde(flatten)]
  pub meta: ActionMeta,
}

fn default_concurrency() -> usize {
  1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItem {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item: Option<Box<SemanticAction>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub position: Option<i64>,
}

/// Wrapper carrying an inner action as `body`; unwrapped before
/// dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledAction {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<Box<SemanticAction>>,
  #[serde(flatten)]
  pub meta: ActionMeta,
}

/// A nested JSON-LD node: a repository, graph or plain name holder.
/// Credentials ride in the additional-properties bag under
/// `serverUrl` / `username` / `password`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticNode {
  #[serde(
    rename = "@type",
    default,
    skip_serializing_if = "String::is_empty"
  )]
  pub node_type: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub identifier: String,
  #[serde(
    rename = "isPartOf",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub is_part_of: Option<Box<SemanticNode>>,
  #[serde(flatten)]
  pub additional: JsonObject,
}

impl SemanticNode {
  pub fn is_graph(&self) -> bool {
    self.node_type == GRAPH_TYPE
  }

  fn additional_str(&self, key: &str) -> &str {
    self
      .additional
      .get(key)
      .and_then(JsonValue::as_str)
      .unwrap_or_default()
  }

  pub fn server_url(&self) -> String {
    trim_trailing_slashes(self.additional_str("serverUrl").into())
  }

  pub fn username(&self) -> &str {
    self.additional_str("username")
  }

  pub fn password(&self) -> &str {
    self.additional_str("password")
  }

  /// Repository name: `name` with `identifier` as fallback.
  pub fn repo_name(&self) -> &str {
    if !self.name.is_empty() {
      &self.name
    } else {
      &self.identifier
    }
  }

  /// Graph URI: `identifier` with `name` as fallback.
  pub fn graph_uri(&self) -> &str {
    if !self.identifier.is_empty() {
      &self.identifier
    } else {
      &self.name
    }
  }

  pub fn to_repo_ref(&self) -> TaskRef {
    TaskRef {
      url: self.server_url(),
      username: self.username().into(),
      password: self.password().into(),
      repo: self.repo_name().into(),
      ..Default::default()
    }
  }

  /// Credentials from this node, falling back to `other` when this
  /// node carries none.
  fn creds_or(&self, other: Option<&SemanticNode>) -> TaskRef {
    if !self.server_url().is_empty() {
      return TaskRef {
        url: self.server_url(),
        username: self.username().into(),
        password: self.password().into(),
        ..Default::default()
      };
    }
    match other {
      Some(other) => TaskRef {
        url: other.server_url(),
        username: other.username().into(),
        password: other.password().into(),
        ..Default::default()
      },
      None => Default::default(),
    }
  }

  pub fn repository(repo: &str, endpoint: &TaskRef) -> SemanticNode {
    let mut additional = JsonObject::new();
    if !endpoint.url.is_empty() {
      additional
        .insert("serverUrl".into(), endpoint.url.clone().into());
    }
    if !endpoint.username.is_empty() {
      additional
        .insert("username".into(), endpoint.username.clone().into());
    }
    if !endpoint.password.is_empty() {
      additional
        .insert("password".into(), endpoint.password.clone().into());
    }
    SemanticNode {
      node_type: REPOSITORY_TYPE.into(),
      name: repo.into(),
      additional,
      ..Default::default()
    }
  }

  pub fn graph(
    graph: &str,
    catalog: Option<SemanticNode>,
  ) -> SemanticNode {
    SemanticNode {
      node_type: GRAPH_TYPE.into(),
      identifier: graph.into(),
      is_part_of: catalog.map(Box::new),
      ..Default::default()
    }
  }

  pub fn named(name: &str) -> SemanticNode {
    SemanticNode {
      name: name.into(),
      ..Default::default()
    }
  }
}

impl SemanticAction {
  /// Normalize the semantic form into the internal task model.
  pub fn into_task(self) -> Result<Task, FerryError> {
    self.into_task_inner(true)
  }

  fn into_task_inner(
    self,
    allow_list: bool,
  ) -> Result<Task, FerryError> {
    let mut task = match self {
      SemanticAction::ScheduledAction(scheduled) => {
        let body = scheduled.body.ok_or_else(|| {
          FerryError::validation(
            "body",
            "ScheduledAction requires an inner action",
          )
        })?;
        return body.into_task_inner(allow_list);
      }
      SemanticAction::ItemList(list) => {
        if !allow_list {
          return Err(FerryError::validation(
            "itemListElement",
            "nested ItemList is not supported",
          ));
        }
        let items = list
          .item_list_element
          .into_iter()
          .map(|element| {
            element
              .item
              .ok_or_else(|| {
                FerryError::validation(
                  "item",
                  "ListItem requires an item",
                )
              })?
              .into_task_inner(false)
          })
          .collect::<Result<Vec<_>, _>>()?;
        let mut task = Task::new(TaskAction::Workflow);
        task.workflow = Some(WorkflowSpec {
          parallel: list.parallel,
          concurrency: list.concurrency,
          items,
        });
        task
      }
      SemanticAction::TransferAction(transfer) => {
        let from = transfer.from_location.ok_or_else(|| {
          FerryError::validation(
            "fromLocation",
            "TransferAction requires a source location",
          )
        })?;
        let to = transfer.to_location.ok_or_else(|| {
          FerryError::validation(
            "toLocation",
            "TransferAction requires a target location",
          )
        })?;
        let mut src = from.to_repo_ref();
        let mut tgt = to.to_repo_ref();
        let action = match &transfer.object {
          Some(object) => {
            let graph = object.graph_uri();
            if graph.is_empty() {
              return Err(FerryError::validation(
                "object",
                "graph transfer requires an object identifier",
              ));
            }
            src.graph = graph.into();
            tgt.graph = graph.into();
            TaskAction::GraphMigration
          }
          None => TaskAction::RepoMigration,
        };
        let mut task = Task::new(action);
        task.src = Some(src);
        task.tgt = Some(tgt);
        task
      }
      SemanticAction::CreateAction(create) => {
        let result = create.meta.result.ok_or_else(|| {
          FerryError::validation(
            "result",
            "CreateAction requires the repository to create",
          )
        })?;
        let node: SemanticNode = serde_json::from_value(result)
          .map_err(|e| {
            FerryError::validation(
              "result",
              format!("invalid repository node: {e}"),
            )
          })?;
        let mut task = Task::new(TaskAction::RepoCreate);
        task.tgt = Some(node.to_repo_ref());
        task
      }
      SemanticAction::DeleteAction(delete) => {
        let object = delete.object.ok_or_else(|| {
          FerryError::validation(
            "object",
            "DeleteAction requires an object",
          )
        })?;
        if object.is_graph() {
          let catalog = object.is_part_of.as_deref().ok_or_else(|| {
            FerryError::validation(
              "isPartOf",
              "graph delete requires the owning repository",
            )
          })?;
          let mut tgt = object.creds_or(Some(catalog));
          tgt.repo = catalog.repo_name().into();
          tgt.graph = object.graph_uri().into();
          let mut task = Task::new(TaskAction::GraphDelete);
          task.tgt = Some(tgt);
          task
        } else {
          let mut task = Task::new(TaskAction::RepoDelete);
          task.tgt = Some(object.to_repo_ref());
          task
        }
      }
      SemanticAction::UpdateAction(update) => {
        let object = update.object.ok_or_else(|| {
          FerryError::validation(
            "object",
            "UpdateAction requires an object",
          )
        })?;
        let target = update.target.ok_or_else(|| {
          FerryError::validation(
            "target",
            "UpdateAction requires the new name in target",
          )
        })?;
        if object.is_graph() {
          let catalog = object.is_part_of.as_deref().ok_or_else(|| {
            FerryError::validation(
              "isPartOf",
              "graph rename requires the owning repository",
            )
          })?;
          let mut tgt = object.creds_or(Some(catalog));
          tgt.repo = catalog.repo_name().into();
          tgt.graph_old = object.graph_uri().into();
          tgt.graph_new = target.graph_uri().into();
          let mut task = Task::new(TaskAction::GraphRename);
          task.tgt = Some(tgt);
          task
        } else {
          let mut tgt = object.creds_or(None);
          tgt.repo_old = object.repo_name().into();
          tgt.repo_new = target.repo_name().into();
          let mut task = Task::new(TaskAction::RepoRename);
          task.tgt = Some(tgt);
          task
        }
      }
      SemanticAction::UploadAction(upload) => {
        let target = upload.target.ok_or_else(|| {
          FerryError::validation(
            "target",
            "UploadAction requires a target repository",
          )
        })?;
        let mut tgt = target.to_repo_ref();
        let action = match &upload.object {
          Some(object) => {
            tgt.graph = object.graph_uri().into();
            TaskAction::GraphImport
          }
          None => TaskAction::RepoImport,
        };
        let mut task = Task::new(action);
        task.tgt = Some(tgt);
        task
      }
    };
    task.normalize();
    Ok(task)
  }

  /// Re-emit the semantic form of an internal task. Used for the
  /// response echo and the grammar round trip.
  pub fn from_task(task: &Task) -> SemanticAction {
    let src = task.src.clone().unwrap_or_default();
    let tgt = task.tgt.clone().unwrap_or_default();
    match task.action {
      TaskAction::RepoMigration => {
        SemanticAction::TransferAction(TransferAction {
          from_location: Some(SemanticNode::repository(
            &src.repo, &src,
          )),
          to_location: Some(SemanticNode::repository(
            &tgt.repo, &tgt,
          )),
          ..Default::default()
        })
      }
      TaskAction::GraphMigration => {
        SemanticAction::TransferAction(TransferAction {
          from_location: Some(SemanticNode::repository(
            &src.repo, &src,
          )),
          to_location: Some(SemanticNode::repository(
            &tgt.repo, &tgt,
          )),
          object: Some(SemanticNode::graph(&src.graph, None)),
          ..Default::default()
        })
      }
      TaskAction::RepoCreate => {
        SemanticAction::CreateAction(CreateAction {
          meta: ActionMeta {
            result: serde_json::to_value(SemanticNode::repository(
              &tgt.repo, &tgt,
            ))
            .ok(),
            ..Default::default()
          },
        })
      }
      TaskAction::RepoDelete => {
        SemanticAction::DeleteAction(DeleteAction {
          object: Some(SemanticNode::repository(&tgt.repo, &tgt)),
          ..Default::default()
        })
      }
      TaskAction::GraphDelete => {
        SemanticAction::DeleteAction(DeleteAction {
          object: Some(SemanticNode::graph(
            &tgt.graph,
            Some(SemanticNode::repository(&tgt.repo, &tgt)),
          )),
          ..Default::default()
        })
      }
      TaskAction::RepoRename => {
        SemanticAction::UpdateAction(UpdateAction {
          object: Some(SemanticNode::repository(
            &tgt.repo_old,
            &tgt,
          )),
          target: Some(SemanticNode::named(&tgt.repo_new)),
          ..Default::default()
        })
      }
      TaskAction::GraphRename => {
        SemanticAction::UpdateAction(UpdateAction {
          object: Some(SemanticNode::graph(
            &tgt.graph_old,
            Some(SemanticNode::repository(&tgt.repo, &tgt)),
          )),
          target: Some(SemanticNode::graph(&tgt.graph_new, None)),
          ..Default::default()
        })
      }
      TaskAction::GraphImport => {
        SemanticAction::UploadAction(UploadAction {
          target: Some(SemanticNode::repository(&tgt.repo, &tgt)),
          object: Some(SemanticNode::graph(&tgt.graph, None)),
          ..Default::default()
        })
      }
      TaskAction::RepoImport => {
        SemanticAction::UploadAction(UploadAction {
          target: Some(SemanticNode::repository(&tgt.repo, &tgt)),
          object: None,
          ..Default::default()
        })
      }
      TaskAction::Workflow => {
        let workflow = task.workflow.clone().unwrap_or(WorkflowSpec {
          parallel: false,
          concurrency: 1,
          items: Vec::new(),
        });
        SemanticAction::ItemList(ItemList {
          item_list_element: workflow
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| ListItem {
              item: Some(Box::new(SemanticAction::from_task(item))),
              position: Some(i as i64),
            })
            .collect(),
          parallel: workflow.parallel,
          concurrency: workflow.concurrency,
          meta: Default::default(),
        })
      }
    }
  }

  pub fn meta_mut(&mut self) -> &mut ActionMeta {
    match self {
      SemanticAction::TransferAction(a) => &mut a.meta,
      SemanticAction::CreateAction(a) => &mut a.meta,
      SemanticAction::DeleteAction(a) => &mut a.meta,
      SemanticAction::UpdateAction(a) => &mut a.meta,
      SemanticAction::UploadAction(a) => &mut a.meta,
      SemanticAction::ItemList(a) => &mut a.meta,
      SemanticAction::ScheduledAction(a) => &mut a.meta,
    }
  }

  /// Populate `actionStatus` / `result` / `error` on the echoed
  /// response.
  pub fn set_outcome(
    &mut self,
    status: &str,
    result: Option<JsonValue>,
    error: Option<String>,
  ) {
    let meta = self.meta_mut();
    meta.action_status = status.into();
    meta.result = result;
    meta.error = error;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn repo_node(url: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
      "@type": "DataCatalog",
      "name": name,
      "serverUrl": url,
      "username": "admin",
      "password": "secret",
    })
  }

  #[test]
  fn transfer_action_maps_to_repo_migration() {
    let action: SemanticAction =
      serde_json::from_value(serde_json::json!({
        "@type": "TransferAction",
        "fromLocation": repo_node("http://s:7200/", "r1"),
        "toLocation": repo_node("http://t:7200", "r1"),
      }))
      .unwrap();
    let task = action.into_task().unwrap();
    assert_eq!(task.action, TaskAction::RepoMigration);
    let src = task.src.unwrap();
    assert_eq!(src.url, "http://s:7200");
    assert_eq!(src.username, "admin");
    assert_eq!(src.password, "secret");
    assert_eq!(src.repo, "r1");
  }

  #[test]
  fn transfer_action_with_object_maps_to_graph_migration() {
    let action: SemanticAction =
      serde_json::from_value(serde_json::json!({
        "@type": "TransferAction",
        "fromLocation": repo_node("http://s:7200", "r1"),
        "toLocation": repo_node("http://t:7200", "r2"),
        "object": { "@type": "Dataset", "identifier": "http://g/1" },
      }))
      .unwrap();
    let task = action.into_task().unwrap();
    assert_eq!(task.action, TaskAction::GraphMigration);
    assert_eq!(task.src.unwrap().graph, "http://g/1");
    assert_eq!(task.tgt.unwrap().graph, "http://g/1");
  }

  #[test]
  fn delete_action_discriminates_repo_and_graph() {
    let action: SemanticAction =
      serde_json::from_value(serde_json::json!({
        "@type": "DeleteAction",
        "object": repo_node("http://t:7200", "r1"),
      }))
      .unwrap();
    assert_eq!(
      action.into_task().unwrap().action,
      TaskAction::RepoDelete
    );

    let action: SemanticAction =
      serde_json::from_value(serde_json::json!({
        "@type": "DeleteAction",
        "object": {
          "@type": "Dataset",
          "identifier": "http://g/1",
          "isPartOf": repo_node("http://t:7200", "r1"),
        },
      }))
      .unwrap();
    let task = action.into_task().unwrap();
    assert_eq!(task.action, TaskAction::GraphDelete);
    let tgt = task.tgt.unwrap();
    assert_eq!(tgt.repo, "r1");
    assert_eq!(tgt.graph, "http://g/1");
    assert_eq!(tgt.url, "http://t:7200");
  }

  #[test]
  fn update_action_maps_to_renames() {
    let action: SemanticAction =
      serde_json::from_value(serde_json::json!({
        "@type": "UpdateAction",
        "object": repo_node("http://t:7200", "old"),
        "target": { "name": "new" },
      }))
      .unwrap();
    let task = action.into_task().unwrap();
    assert_eq!(task.action, TaskAction::RepoRename);
    let tgt = task.tgt.unwrap();
    assert_eq!(tgt.repo_old, "old");
    assert_eq!(tgt.repo_new, "new");
  }

  #[test]
  fn missing_from_location_is_a_validation_error() {
    let action: SemanticAction =
      serde_json::from_value(serde_json::json!({
        "@type": "TransferAction",
        "toLocation": repo_node("http://t:7200", "r1"),
      }))
      .unwrap();
    let err = action.into_task().unwrap_err();
    assert!(
      matches!(err, FerryError::Validation { ref field, .. } if field == "fromLocation")
    );
  }

  #[test]
  fn scheduled_action_unwraps_body() {
    let action: SemanticAction =
      serde_json::from_value(serde_json::json!({
        "@type": "ScheduledAction",
        "body": {
          "@type": "DeleteAction",
          "object": repo_node("http://t:7200", "r1"),
        },
      }))
      .unwrap();
    assert_eq!(
      action.into_task().unwrap().action,
      TaskAction::RepoDelete
    );
  }

  #[test]
  fn item_list_maps_to_workflow_and_rejects_nesting() {
    let action: SemanticAction =
      serde_json::from_value(serde_json::json!({
        "@type": "ItemList",
        "parallel": true,
        "concurrency": 2,
        "itemListElement": [
          { "item": {
            "@type": "DeleteAction",
            "object": repo_node("http://t:7200", "r1"),
          }},
          { "item": {
            "@type": "ScheduledAction",
            "body": {
              "@type": "DeleteAction",
              "object": repo_node("http://t:7200", "r2"),
            },
          }},
        ],
      }))
      .unwrap();
    let task = action.into_task().unwrap();
    assert_eq!(task.action, TaskAction::Workflow);
    let workflow = task.workflow.unwrap();
    assert!(workflow.parallel);
    assert_eq!(workflow.concurrency, 2);
    assert_eq!(workflow.items.len(), 2);
    assert_eq!(workflow.items[1].action, TaskAction::RepoDelete);

    let nested: SemanticAction =
      serde_json::from_value(serde_json::json!({
        "@type": "ItemList",
        "itemListElement": [
          { "item": { "@type": "ItemList", "itemListElement": [] } },
        ],
      }))
      .unwrap();
    let err = nested.into_task().unwrap_err();
    assert!(matches!(err, FerryError::Validation { .. }));
  }

  #[test]
  fn repo_migration_round_trips_through_semantic_form() {
    let task: Task = serde_json::from_value(serde_json::json!({
      "action": "repo-migration",
      "src": { "url": "http://s:7200", "username": "a", "password": "p", "repo": "r1" },
      "tgt": { "url": "http://t:7200", "username": "b", "password": "q", "repo": "r2" },
    }))
    .unwrap();
    let emitted = SemanticAction::from_task(&task);
    let round = emitted.into_task().unwrap();
    assert_eq!(round.action, task.action);
    assert_eq!(round.src, task.src);
    assert_eq!(round.tgt, task.tgt);
  }

  #[test]
  fn graph_rename_round_trips_through_semantic_form() {
    let task: Task = serde_json::from_value(serde_json::json!({
      "action": "graph-rename",
      "tgt": {
        "url": "http://t:7200", "username": "a", "password": "p",
        "repo": "r1", "graphOld": "http://g/old", "graphNew": "http://g/new",
      },
    }))
    .unwrap();
    let emitted = SemanticAction::from_task(&task);
    let round = emitted.into_task().unwrap();
    assert_eq!(round.action, TaskAction::GraphRename);
    assert_eq!(round.tgt, task.tgt);
  }
}
