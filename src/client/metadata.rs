// ABOUTME: Metadata API (GraphQL) query for workbook upstream datasources
// ABOUTME: Flattens the nested GraphQL response into a node/edge dependency graph payload

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::error::{ClientError, Result};

/// Published datasources can sit on top of other published datasources; the
/// query follows that chain this many levels deep. The deepest level still
/// asks for the luids of its upstreams so a longer chain is detected rather
/// than cut off.
pub const UPSTREAM_QUERY_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GraphNodeType {
    Workbook,
    PublishedDatasource,
    EmbeddedDatasource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub node_type: GraphNodeType,
    #[serde(default)]
    pub has_extracts: bool,
}

/// Directed edge from a downstream node to the node it draws data from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraphPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: GraphNodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            has_extracts: false,
        }
    }

    pub fn with_extracts(mut self) -> Self {
        self.has_extracts = true;
        self
    }
}

impl GraphEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl DependencyGraphPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node unless one with the same id is already present
    pub fn add_node(&mut self, node: GraphNode) {
        if !self.nodes.iter().any(|n| n.id == node.id) {
            self.nodes.push(node);
        }
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.push(GraphEdge::new(from, to));
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Build the GraphQL document for the upstream datasource query
pub fn upstream_datasources_query() -> String {
    fn published_selection(depth: usize) -> String {
        if depth == 0 {
            return "luid name hasExtracts upstreamDatasources { luid }".to_string();
        }
        format!(
            "luid name hasExtracts upstreamDatasources {{ {} }}",
            published_selection(depth - 1)
        )
    }

    let published = published_selection(UPSTREAM_QUERY_DEPTH - 1);
    format!(
        "query upstreamDatasources($luid: String!) {{ \
           workbooks(filter: {{ luid: $luid }}) {{ \
             luid name \
             embeddedDatasources {{ id name hasExtracts upstreamDatasources {{ {published} }} }} \
             upstreamDatasources {{ {published} }} \
           }} \
         }}"
    )
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<WorkbooksData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WorkbooksData {
    workbooks: Option<Vec<WorkbookNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkbookNode {
    luid: Option<String>,
    name: Option<String>,
    #[serde(default)]
    embedded_datasources: Vec<EmbeddedNode>,
    #[serde(default)]
    upstream_datasources: Vec<PublishedNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddedNode {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    has_extracts: bool,
    #[serde(default)]
    upstream_datasources: Vec<PublishedNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishedNode {
    luid: Option<String>,
    name: Option<String>,
    #[serde(default)]
    has_extracts: bool,
    #[serde(default)]
    upstream_datasources: Vec<PublishedNode>,
}

/// Convert a raw Metadata API response into a dependency graph payload.
///
/// GraphQL reports partial failures in `errors` next to (possibly partial)
/// `data`, so any reported error fails the whole conversion.
pub fn parse_upstream_response(body: serde_json::Value) -> Result<DependencyGraphPayload> {
    let response: GraphQlResponse = serde_json::from_value(body)?;

    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(ClientError::InvalidResponse(format!(
            "Metadata API returned errors: {}",
            messages.join("; ")
        )));
    }

    let workbooks = response
        .data
        .and_then(|data| data.workbooks)
        .ok_or_else(|| {
            ClientError::InvalidResponse("Metadata API response has no workbooks field".to_string())
        })?;

    let mut payload = DependencyGraphPayload::new();
    let mut seen_edges = HashSet::new();

    for workbook in workbooks {
        let workbook_id = required(workbook.luid, "workbook luid")?;
        payload.add_node(GraphNode::new(
            workbook_id.clone(),
            workbook.name.unwrap_or_default(),
            GraphNodeType::Workbook,
        ));

        for embedded in workbook.embedded_datasources {
            let embedded_id = required(embedded.id, "embedded datasource id")?;
            let mut node = GraphNode::new(
                embedded_id.clone(),
                embedded.name.unwrap_or_default(),
                GraphNodeType::EmbeddedDatasource,
            );
            node.has_extracts = embedded.has_extracts;
            payload.add_node(node);
            push_edge(&mut payload, &mut seen_edges, &workbook_id, &embedded_id);

            for upstream in embedded.upstream_datasources {
                flatten_published(&mut payload, &mut seen_edges, &embedded_id, upstream, 1)?;
            }
        }

        for upstream in workbook.upstream_datasources {
            flatten_published(&mut payload, &mut seen_edges, &workbook_id, upstream, 1)?;
        }
    }

    Ok(payload)
}

fn flatten_published(
    payload: &mut DependencyGraphPayload,
    seen_edges: &mut HashSet<(String, String)>,
    parent_id: &str,
    published: PublishedNode,
    level: usize,
) -> Result<()> {
    let id = required(published.luid, "published datasource luid")?;

    if level >= UPSTREAM_QUERY_DEPTH && !published.upstream_datasources.is_empty() {
        return Err(ClientError::InvalidResponse(format!(
            "Published datasource {} has upstream datasources beyond the {} levels the Metadata API query covers",
            id, UPSTREAM_QUERY_DEPTH
        )));
    }

    let mut node = GraphNode::new(
        id.clone(),
        published.name.unwrap_or_default(),
        GraphNodeType::PublishedDatasource,
    );
    node.has_extracts = published.has_extracts;
    payload.add_node(node);
    push_edge(payload, seen_edges, parent_id, &id);

    for upstream in published.upstream_datasources {
        flatten_published(payload, seen_edges, &id, upstream, level + 1)?;
    }

    Ok(())
}

fn push_edge(
    payload: &mut DependencyGraphPayload,
    seen_edges: &mut HashSet<(String, String)>,
    from: &str,
    to: &str,
) {
    if seen_edges.insert((from.to_string(), to.to_string())) {
        payload.add_edge(from, to);
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ClientError::InvalidResponse(format!(
            "Metadata API node is missing its {}",
            field
        ))),
    }
}
