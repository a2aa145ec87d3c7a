// ABOUTME: Metadata resolver expanding a workbook or datasource into the entities to pause
// ABOUTME: Builds a petgraph graph from one dependency query and walks it for published datasources

use indexmap::IndexSet;
use petgraph::graph::NodeIndex;
use petgraph::visit::Bfs;
use petgraph::Graph;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::{PauseError, Result};
use crate::client::{DependencyGraphPayload, GraphNode, GraphNodeType, TableauApi};
use crate::model::{Entity, EntityKind, EntityRef};

/// Upstream dependency graph of one workbook. Edges point from a node to the
/// node it draws data from.
pub struct UpstreamGraph {
    graph: Graph<GraphNode, ()>,
    node_indices: HashMap<String, NodeIndex>,
}

/// The root entity plus every entity whose tasks a pause must remove
#[derive(Debug, Clone)]
pub struct Resolution {
    pub root: Entity,
    /// Root first, then upstream datasources in discovery order
    pub targets: Vec<Entity>,
}

impl UpstreamGraph {
    /// Build and validate a graph from a raw payload.
    ///
    /// Any inconsistency is an error: a partial payload must never read as
    /// "no dependencies".
    pub fn from_payload(payload: &DependencyGraphPayload) -> Result<Self> {
        let mut graph = Graph::new();
        let mut node_indices: HashMap<String, NodeIndex> = HashMap::new();

        for node in &payload.nodes {
            if node.id.is_empty() {
                return Err(PauseError::upstream(format!(
                    "graph node '{}' has an empty id",
                    node.name
                )));
            }

            if let Some(&existing) = node_indices.get(&node.id) {
                let existing_node: &GraphNode = &graph[existing];
                if existing_node.node_type != node.node_type {
                    return Err(PauseError::upstream(format!(
                        "graph node '{}' is reported as both {:?} and {:?}",
                        node.id, existing_node.node_type, node.node_type
                    )));
                }
                continue;
            }

            let index = graph.add_node(node.clone());
            node_indices.insert(node.id.clone(), index);
        }

        for edge in &payload.edges {
            let (Some(&from), Some(&to)) = (node_indices.get(&edge.from), node_indices.get(&edge.to))
            else {
                return Err(PauseError::upstream(format!(
                    "graph edge {} -> {} references an unknown node",
                    edge.from, edge.to
                )));
            };

            if from == to {
                warn!("Ignoring self-dependency on graph node '{}'", edge.from);
                continue;
            }

            graph.update_edge(from, to, ());
        }

        Ok(Self {
            graph,
            node_indices,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Published datasources reachable from `root_id`, directly or
    /// transitively, each reported once
    pub fn published_upstream_of(&self, root_id: &str) -> Result<Vec<&GraphNode>> {
        let &root = self.node_indices.get(root_id).ok_or_else(|| {
            PauseError::upstream(format!(
                "dependency graph does not contain workbook '{}'",
                root_id
            ))
        })?;

        if self.graph[root].node_type != GraphNodeType::Workbook {
            return Err(PauseError::upstream(format!(
                "graph node '{}' is not a workbook",
                root_id
            )));
        }

        let mut found = Vec::new();
        let mut bfs = Bfs::new(&self.graph, root);
        while let Some(index) = bfs.next(&self.graph) {
            let node = &self.graph[index];
            if index != root && node.node_type == GraphNodeType::PublishedDatasource {
                found.push(node);
            }
        }

        Ok(found)
    }
}

pub struct MetadataResolver {
    api: Arc<dyn TableauApi>,
}

impl MetadataResolver {
    pub fn new(api: Arc<dyn TableauApi>) -> Self {
        Self { api }
    }

    /// Look up a single entity by luid or exact, case-sensitive name
    pub async fn lookup(&self, entity_ref: &EntityRef) -> Result<Entity> {
        match entity_ref {
            EntityRef::Id { kind, id } => self
                .api
                .get_entity_by_id(*kind, id)
                .await?
                .ok_or_else(|| PauseError::not_found(kind, entity_ref)),
            EntityRef::Name { kind, name } => {
                let matches: IndexSet<Entity> = self
                    .api
                    .find_entities_by_name(*kind, name)
                    .await?
                    .into_iter()
                    .filter(|e| e.kind == *kind && e.name == *name)
                    .collect();

                if matches.len() > 1 {
                    let candidates: Vec<Entity> = matches.into_iter().collect();
                    return Err(PauseError::ambiguous_entities(*kind, name, &candidates));
                }

                matches
                    .into_iter()
                    .next()
                    .ok_or_else(|| PauseError::not_found(kind, entity_ref))
            }
        }
    }

    /// Resolve a reference into the full set of entities to pause.
    ///
    /// A datasource resolves to itself. A workbook also pulls in every
    /// published datasource upstream of it unless `include_upstream` is off.
    pub async fn resolve(&self, entity_ref: &EntityRef, include_upstream: bool) -> Result<Resolution> {
        let root = self.lookup(entity_ref).await?;

        let targets = match root.kind {
            EntityKind::Datasource => vec![root.clone()],
            EntityKind::Workbook if !include_upstream => vec![root.clone()],
            EntityKind::Workbook => {
                let mut targets: IndexSet<Entity> = IndexSet::new();
                targets.insert(root.clone());
                targets.extend(self.upstream_datasources(&root).await?);
                targets.into_iter().collect()
            }
        };

        info!("Resolved {} into {} target(s)", root, targets.len());

        Ok(Resolution { root, targets })
    }

    /// Published datasources upstream of a workbook, from one graph query
    pub async fn upstream_datasources(&self, workbook: &Entity) -> Result<Vec<Entity>> {
        let payload = self
            .api
            .query_dependency_graph(&workbook.id)
            .await
            .map_err(|e| PauseError::upstream(e.to_string()))?;

        let graph = UpstreamGraph::from_payload(&payload)?;
        debug!(
            "Dependency graph for {} has {} nodes",
            workbook,
            graph.node_count()
        );

        let upstream = graph
            .published_upstream_of(&workbook.id)?
            .into_iter()
            .map(|node| Entity::datasource(node.id.clone(), node.name.clone()))
            .collect::<IndexSet<Entity>>();

        Ok(upstream.into_iter().collect())
    }
}

impl Resolution {
    pub fn upstream(&self) -> &[Entity] {
        &self.targets[1..]
    }
}
