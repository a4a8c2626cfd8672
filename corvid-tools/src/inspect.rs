//! Bounded inspectors over stored result handles.
//!
//! Thin wrappers: the view semantics live on [`HandleRegistry`].

use crate::args::ToolArgs;
use crate::error::ToolError;
use crate::handles::HandleRegistry;
use crate::registry::ToolDyn;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

macro_rules! inspector {
    ($tool:ident, $name:literal, $summary:literal, $signature:literal, $body:expr) => {
        #[doc = concat!("`", $signature, "`")]
        pub struct $tool {
            handles: Arc<HandleRegistry>,
        }

        impl $tool {
            /// Build over the per-run handle registry.
            pub fn new(handles: Arc<HandleRegistry>) -> Self {
                Self { handles }
            }
        }

        impl ToolDyn for $tool {
            fn name(&self) -> &str {
                $name
            }
            fn summary(&self) -> &str {
                $summary
            }
            fn signature(&self) -> &str {
                $signature
            }
            fn call(
                &self,
                args: ToolArgs,
            ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
                Box::pin(async move {
                    #[allow(clippy::redundant_closure_call)]
                    ($body)(&self.handles, &args)
                })
            }
        }
    };
}

inspector!(
    ResHeadTool,
    "res_head",
    "First n rows of a stored result, in engine order.",
    "res_head(name, n=10)",
    |handles: &Arc<HandleRegistry>, args: &ToolArgs| {
        let name = args.require_str(0, "name")?;
        let n = args.opt_usize(1, "n", 10)?;
        handles.head(name, n)
    }
);

inspector!(
    ResSampleTool,
    "res_sample",
    "Up to n rows sampled evenly across a stored result.",
    "res_sample(name, n=10)",
    |handles: &Arc<HandleRegistry>, args: &ToolArgs| {
        let name = args.require_str(0, "name")?;
        let n = args.opt_usize(1, "n", 10)?;
        handles.sample(name, n)
    }
);

inspector!(
    ResWhereTool,
    "res_where",
    "Rows whose column satisfies a predicate (eq/ne/contains/gt/lt).",
    "res_where(name, column, op, value, limit=10, store=None)",
    |handles: &Arc<HandleRegistry>, args: &ToolArgs| {
        let name = args.require_str(0, "name")?;
        let column = args.require_str(1, "column")?;
        let op = args.require_str(2, "op")?;
        let value = args.require_str(3, "value")?;
        let limit = args.opt_usize(4, "limit", 10)?;
        let store = args.opt_str(5, "store")?;
        handles.where_filter(name, column, op, value, limit, store)
    }
);

inspector!(
    ResGroupTool,
    "res_group",
    "Row counts grouped by one column's values.",
    "res_group(name, by_column, limit=20)",
    |handles: &Arc<HandleRegistry>, args: &ToolArgs| {
        let name = args.require_str(0, "name")?;
        let column = args.require_str(1, "by_column")?;
        let limit = args.opt_usize(2, "limit", 20)?;
        handles.group(name, column, limit)
    }
);

inspector!(
    ResDistinctTool,
    "res_distinct",
    "Distinct values of one column of a stored result.",
    "res_distinct(name, column, limit=20)",
    |handles: &Arc<HandleRegistry>, args: &ToolArgs| {
        let name = args.require_str(0, "name")?;
        let column = args.require_str(1, "column")?;
        let limit = args.opt_usize(2, "limit", 20)?;
        handles.distinct(name, column, limit)
    }
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::{HandleProvenance, ResultHandle, ResultSet};
    use corvid_graph::TermRepr;
    use serde_json::json;

    fn registry_with_rows() -> Arc<HandleRegistry> {
        let handles = Arc::new(HandleRegistry::new());
        handles.insert(ResultHandle {
            name: "subs".into(),
            query: "SELECT ?c WHERE { }".into(),
            result: ResultSet::Rows {
                columns: vec!["c".into()],
                rows: (0..6)
                    .map(|i| {
                        vec![TermRepr::Iri {
                            iri: format!("http://e/c{i}"),
                        }]
                    })
                    .collect(),
            },
            provenance: HandleProvenance::LocalOntology,
        });
        handles
    }

    #[tokio::test]
    async fn head_tool_roundtrip() {
        let tool = ResHeadTool::new(registry_with_rows());
        let out = tool
            .call(ToolArgs::new(
                vec![json!("subs")],
                [("n".to_string(), json!(2))].into_iter().collect(),
            ))
            .await
            .unwrap();
        assert_eq!(out.as_array().unwrap().len(), 2);
        assert_eq!(out[0]["c"], "http://e/c0");
    }

    #[tokio::test]
    async fn unknown_handle_surfaces_as_error() {
        let tool = ResDistinctTool::new(Arc::new(HandleRegistry::new()));
        let e = tool
            .call(ToolArgs::new(
                vec![json!("missing"), json!("c")],
                Default::default(),
            ))
            .await
            .unwrap_err();
        assert_eq!(e.kind, crate::ToolErrorKind::UnknownHandle);
    }

    #[tokio::test]
    async fn where_tool_passes_through() {
        let tool = ResWhereTool::new(registry_with_rows());
        let out = tool
            .call(ToolArgs::new(
                vec![json!("subs"), json!("c"), json!("contains"), json!("c3")],
                Default::default(),
            ))
            .await
            .unwrap();
        assert_eq!(out["match_count"], 1);
    }
}
