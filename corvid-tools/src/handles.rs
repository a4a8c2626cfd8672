//! The result-handle registry.
//!
//! SPARQL tools never dump full result sets into the REPL: they store
//! under a caller-chosen name and return a bounded summary. The bounded
//! view operations (`head`, `sample`, `where`, `group`, `distinct`) live
//! here so every inspector tool is a thin wrapper.
//!
//! The registry is created at driver entry and dropped at driver exit;
//! a second write to the same name silently replaces the entry.

use crate::error::{ToolError, ToolErrorKind};
use corvid_graph::TermRepr;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Where a handle's rows came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleProvenance {
    /// Executed against the loaded ontology.
    LocalOntology,
    /// Executed against a remote SPARQL endpoint.
    RemoteEndpoint(String),
    /// Derived from another handle by a view operation.
    Derived(String),
}

impl HandleProvenance {
    /// Short note rendered into summaries.
    pub fn note(&self) -> String {
        match self {
            HandleProvenance::LocalOntology => "local-ontology".into(),
            HandleProvenance::RemoteEndpoint(e) => format!("remote-endpoint:{e}"),
            HandleProvenance::Derived(from) => format!("derived:{from}"),
        }
    }
}

/// A stored result set.
#[derive(Debug, Clone)]
pub enum ResultSet {
    /// SELECT rows.
    Rows {
        /// Projected column names.
        columns: Vec<String>,
        /// Solution rows.
        rows: Vec<Vec<TermRepr>>,
    },
    /// CONSTRUCT/DESCRIBE triples.
    Graph {
        /// Collected triples (capped by the executing tool).
        triples: Vec<(TermRepr, TermRepr, TermRepr)>,
        /// Total triples before capping.
        total: usize,
    },
    /// ASK result.
    Boolean(bool),
}

impl ResultSet {
    /// Row count (rows for SELECT, collected triples for graphs, 1 for
    /// booleans).
    pub fn row_count(&self) -> usize {
        match self {
            ResultSet::Rows { rows, .. } => rows.len(),
            ResultSet::Graph { triples, .. } => triples.len(),
            ResultSet::Boolean(_) => 1,
        }
    }

    /// The kind tag rendered into summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ResultSet::Rows { .. } => "select",
            ResultSet::Graph { .. } => "graph",
            ResultSet::Boolean(_) => "boolean",
        }
    }
}

/// A named entry in the registry.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    /// The caller-chosen name.
    pub name: String,
    /// The query text that produced the result.
    pub query: String,
    /// The stored result set.
    pub result: ResultSet,
    /// Where the result came from.
    pub provenance: HandleProvenance,
}

impl ResultHandle {
    /// Per-column term kinds: `iri`, `literal`, `blank`, `mixed`, or
    /// `unknown` for empty columns.
    pub fn schema(&self) -> Vec<(String, &'static str)> {
        let ResultSet::Rows { columns, rows } = &self.result else {
            return Vec::new();
        };
        columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut kind: Option<&'static str> = None;
                for row in rows {
                    let cell_kind = match row.get(i) {
                        Some(TermRepr::Iri { .. }) => "iri",
                        Some(TermRepr::Literal { .. }) => "literal",
                        Some(TermRepr::Blank { .. }) => "blank",
                        Some(TermRepr::Unbound) | None => continue,
                    };
                    kind = match kind {
                        None => Some(cell_kind),
                        Some(k) if k == cell_kind => Some(k),
                        Some(_) => Some("mixed"),
                    };
                    if kind == Some("mixed") {
                        break;
                    }
                }
                (name.clone(), kind.unwrap_or("unknown"))
            })
            .collect()
    }

    /// The bounded summary returned by the executing tool:
    /// `{name, kind, row_count, columns|graph_size, preview}`.
    pub fn summary(&self) -> Value {
        let mut out = Map::new();
        out.insert("name".into(), json!(self.name));
        out.insert("kind".into(), json!(self.result.kind()));
        out.insert("row_count".into(), json!(self.result.row_count()));
        out.insert("source".into(), json!(self.provenance.note()));
        match &self.result {
            ResultSet::Rows { columns, rows } => {
                out.insert("columns".into(), json!(columns));
                let preview: Vec<Value> = rows
                    .iter()
                    .take(5)
                    .map(|row| row_to_json(columns, row))
                    .collect();
                out.insert("preview".into(), json!(preview));
            }
            ResultSet::Graph { triples, total } => {
                out.insert("graph_size".into(), json!(total));
                let preview: Vec<Value> = triples
                    .iter()
                    .take(5)
                    .map(|(s, p, o)| json!([cell_to_json(s), cell_to_json(p), cell_to_json(o)]))
                    .collect();
                out.insert("preview".into(), json!(preview));
            }
            ResultSet::Boolean(b) => {
                out.insert("value".into(), json!(b));
            }
        }
        Value::Object(out)
    }
}

/// Render one solution row as a `{column: value}` object.
pub fn row_to_json(columns: &[String], row: &[TermRepr]) -> Value {
    let mut out = Map::new();
    for (i, column) in columns.iter().enumerate() {
        out.insert(
            column.clone(),
            row.get(i).map(cell_to_json).unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

/// Render one term as a JSON cell: IRIs and blank labels as strings,
/// literals as their lexical value, unbound as null.
pub fn cell_to_json(term: &TermRepr) -> Value {
    match term {
        TermRepr::Iri { iri } => json!(iri),
        TermRepr::Literal { value, .. } => json!(value),
        TermRepr::Blank { label } => json!(format!("_:{label}")),
        TermRepr::Unbound => Value::Null,
    }
}

fn cell_to_string(term: &TermRepr) -> String {
    match term {
        TermRepr::Iri { iri } => iri.clone(),
        TermRepr::Literal { value, .. } => value.clone(),
        TermRepr::Blank { label } => format!("_:{label}"),
        TermRepr::Unbound => String::new(),
    }
}

/// One name's storage cell. The slot outlives any particular result
/// stored under the name, so rewrites of a name contend only on this
/// lock, never on the registry map.
type Slot = Arc<RwLock<Option<Arc<ResultHandle>>>>;

/// Process-local mapping from handle names to full result sets.
///
/// The map hands out per-name slots; concurrent tool calls that write
/// (replace-semantics) serialise on the slot of the name they touch,
/// so two names never contend and a rewrite of one name is atomic.
/// The registry is created at driver entry and dropped at driver exit.
pub struct HandleRegistry {
    slots: RwLock<HashMap<String, Slot>>,
}

impl HandleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// The slot for a name, created on first touch.
    fn slot(&self, name: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .expect("handle registry poisoned")
            .get(name)
        {
            return slot.clone();
        }
        self.slots
            .write()
            .expect("handle registry poisoned")
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Store a handle, replacing any previous entry under the same name.
    pub fn insert(&self, handle: ResultHandle) -> Arc<ResultHandle> {
        let slot = self.slot(&handle.name);
        let handle = Arc::new(handle);
        *slot.write().expect("handle slot poisoned") = Some(handle.clone());
        handle
    }

    /// Fetch a handle.
    pub fn get(&self, name: &str) -> Result<Arc<ResultHandle>, ToolError> {
        self.slots
            .read()
            .expect("handle registry poisoned")
            .get(name)
            .and_then(|slot| slot.read().expect("handle slot poisoned").clone())
            .ok_or_else(|| ToolError::unknown_handle(name))
    }

    /// Registered handle names, sorted. Names whose slot was touched
    /// but never written do not appear.
    pub fn names(&self) -> Vec<String> {
        let map = self.slots.read().expect("handle registry poisoned");
        let mut names: Vec<String> = map
            .iter()
            .filter(|(_, slot)| slot.read().expect("handle slot poisoned").is_some())
            .map(|(name, _)| name.clone())
            .collect();
        drop(map);
        names.sort();
        names
    }

    /// The first `n` rows, in the stored (engine) order.
    pub fn head(&self, name: &str, n: usize) -> Result<Value, ToolError> {
        let handle = self.get(name)?;
        let ResultSet::Rows { columns, rows } = &handle.result else {
            return Err(non_row_handle(name));
        };
        let out: Vec<Value> = rows.iter().take(n).map(|r| row_to_json(columns, r)).collect();
        Ok(json!(out))
    }

    /// Up to `n` rows sampled at a deterministic stride across the set.
    pub fn sample(&self, name: &str, n: usize) -> Result<Value, ToolError> {
        let handle = self.get(name)?;
        let ResultSet::Rows { columns, rows } = &handle.result else {
            return Err(non_row_handle(name));
        };
        if rows.is_empty() || n == 0 {
            return Ok(json!([]));
        }
        let stride = (rows.len() / n).max(1);
        let out: Vec<Value> = rows
            .iter()
            .step_by(stride)
            .take(n)
            .map(|r| row_to_json(columns, r))
            .collect();
        Ok(json!(out))
    }

    /// Rows whose `column` value satisfies `op value`
    /// (`eq`, `ne`, `contains`, `gt`, `lt`). When `store` is given the
    /// matching rows are registered as a derived handle under that name.
    pub fn where_filter(
        &self,
        name: &str,
        column: &str,
        op: &str,
        value: &str,
        limit: usize,
        store: Option<&str>,
    ) -> Result<Value, ToolError> {
        let handle = self.get(name)?;
        let ResultSet::Rows { columns, rows } = &handle.result else {
            return Err(non_row_handle(name));
        };
        let idx = column_index(columns, column, name)?;
        if !["eq", "ne", "contains", "gt", "lt"].contains(&op) {
            return Err(ToolError::bad_input(
                format!("unknown predicate `{op}`"),
                "use one of eq, ne, contains, gt, lt",
            ));
        }
        let matched: Vec<Vec<TermRepr>> = rows
            .iter()
            .filter(|row| {
                let cell = row.get(idx).map(cell_to_string).unwrap_or_default();
                match op {
                    "eq" => cell == value,
                    "ne" => cell != value,
                    "contains" => cell.to_lowercase().contains(&value.to_lowercase()),
                    "gt" => both_numbers(&cell, value).map(|(a, b)| a > b).unwrap_or(false),
                    "lt" => both_numbers(&cell, value).map(|(a, b)| a < b).unwrap_or(false),
                    _ => false,
                }
            })
            .cloned()
            .collect();
        let match_count = matched.len();
        let preview: Vec<Value> = matched
            .iter()
            .take(limit)
            .map(|r| row_to_json(columns, r))
            .collect();
        if let Some(store_name) = store {
            self.insert(ResultHandle {
                name: store_name.to_string(),
                query: handle.query.clone(),
                result: ResultSet::Rows {
                    columns: columns.clone(),
                    rows: matched,
                },
                provenance: HandleProvenance::Derived(name.to_string()),
            });
        }
        Ok(json!({
            "match_count": match_count,
            "rows": preview,
        }))
    }

    /// Count rows grouped by `column`'s rendered value.
    pub fn group(&self, name: &str, column: &str, limit: usize) -> Result<Value, ToolError> {
        let handle = self.get(name)?;
        let ResultSet::Rows { columns, rows } = &handle.result else {
            return Err(non_row_handle(name));
        };
        let idx = column_index(columns, column, name)?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for row in rows {
            let cell = row.get(idx).map(cell_to_string).unwrap_or_default();
            *counts.entry(cell).or_insert(0) += 1;
        }
        let total_groups = counts.len();
        let groups: Map<String, Value> = counts
            .into_iter()
            .take(limit)
            .map(|(k, v)| (k, json!(v)))
            .collect();
        Ok(json!({"group_count": total_groups, "groups": groups}))
    }

    /// Distinct rendered values of `column`.
    pub fn distinct(&self, name: &str, column: &str, limit: usize) -> Result<Value, ToolError> {
        let handle = self.get(name)?;
        let ResultSet::Rows { columns, rows } = &handle.result else {
            return Err(non_row_handle(name));
        };
        let idx = column_index(columns, column, name)?;
        let mut seen = Vec::new();
        for row in rows {
            let cell = row.get(idx).map(cell_to_string).unwrap_or_default();
            if !seen.contains(&cell) {
                seen.push(cell);
            }
        }
        let distinct_count = seen.len();
        seen.truncate(limit);
        Ok(json!({"distinct_count": distinct_count, "values": seen}))
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn column_index(columns: &[String], column: &str, handle: &str) -> Result<usize, ToolError> {
    columns.iter().position(|c| c == column).ok_or_else(|| {
        ToolError::bad_input(
            format!("handle `{handle}` has no column `{column}`"),
            format!("available columns: {}", columns.join(", ")),
        )
    })
}

fn non_row_handle(name: &str) -> ToolError {
    ToolError::new(
        ToolErrorKind::BadInput,
        format!("handle `{name}` does not hold SELECT rows"),
        "row inspectors only apply to SELECT results",
    )
}

fn both_numbers(a: &str, b: &str) -> Option<(f64, f64)> {
    Some((a.parse().ok()?, b.parse().ok()?))
}
