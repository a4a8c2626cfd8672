//! The evaluator: a persistent namespace plus dispatch into the bounded
//! tool registry.

use crate::outcome::ExecutionOutcome;
use crate::parser::{parse, BinOp, Expr, Stmt};
use corvid_tools::{ToolArgs, ToolRegistry};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Default cap on captured output per `execute` call, in chars.
pub const OUTPUT_LIMIT_DEFAULT: usize = 10_000;

/// Internal control flow: errors and the termination sentinel. This
/// never escapes the crate — `execute` converts it into an
/// [`ExecutionOutcome`].
enum Flow {
    Error { class: String, message: String },
    Terminal(BTreeMap<String, Value>),
}

impl Flow {
    fn error(class: &str, message: impl Into<String>) -> Self {
        Flow::Error {
            class: class.into(),
            message: message.into(),
        }
    }
}

type EvalFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, Flow>> + Send + 'a>>;

/// A persistent evaluation namespace for one run.
///
/// Not reentrant: one interpreter per run, `execute` takes `&mut self`.
pub struct Interpreter {
    tools: Arc<ToolRegistry>,
    namespace: BTreeMap<String, Value>,
    output_limit: usize,
    started: bool,
}

impl Interpreter {
    /// Build over a tool registry with the default output cap.
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self::with_output_limit(tools, OUTPUT_LIMIT_DEFAULT)
    }

    /// Build with a custom output cap.
    pub fn with_output_limit(tools: Arc<ToolRegistry>, output_limit: usize) -> Self {
        Self {
            tools,
            namespace: BTreeMap::new(),
            output_limit,
            started: false,
        }
    }

    /// Initialise the namespace. Idempotent.
    pub fn start(&mut self) {
        self.started = true;
    }

    /// Clear the namespace.
    pub fn shutdown(&mut self) {
        self.namespace.clear();
        self.started = false;
    }

    /// Current value of a namespace variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.namespace.get(name)
    }

    /// Execute one snippet. `variables` are merged into the namespace
    /// first (the driver passes fresh input fields here on each call).
    pub async fn execute(
        &mut self,
        code: &str,
        variables: BTreeMap<String, Value>,
    ) -> ExecutionOutcome {
        self.start();
        self.namespace.extend(variables);

        let statements = match parse(code) {
            Ok(statements) => statements,
            Err(e) => {
                return ExecutionOutcome::RecoverableError {
                    class: "SyntaxError".into(),
                    message: e.to_string(),
                    output: String::new(),
                };
            }
        };

        let mut out = String::new();
        for statement in &statements {
            match self.eval_stmt(statement, &mut out).await {
                Ok(()) => {}
                Err(Flow::Terminal(payload)) => {
                    tracing::debug!(fields = payload.len(), "terminal call");
                    return ExecutionOutcome::Terminal(payload);
                }
                Err(Flow::Error { class, message }) => {
                    return ExecutionOutcome::RecoverableError {
                        class,
                        message,
                        output: self.bounded(out),
                    };
                }
            }
        }
        ExecutionOutcome::Text(self.bounded(out))
    }

    fn bounded(&self, out: String) -> String {
        match out.char_indices().nth(self.output_limit) {
            Some((i, _)) => format!(
                "{}[...truncated at {} chars]",
                &out[..i],
                self.output_limit
            ),
            None => out,
        }
    }

    async fn eval_stmt(&mut self, statement: &Stmt, out: &mut String) -> Result<(), Flow> {
        match statement {
            Stmt::Assign(name, expr) => {
                let value = self.eval_expr(expr, out).await?;
                // Error dicts and verification feedback are echoed even
                // when assigned, so a silent binding cannot hide them.
                if value.get("error").is_some() {
                    push_line(out, &render(&value));
                } else if let Some(block) = value.get("verification").and_then(Value::as_str) {
                    push_line(out, &format!("verification:\n{block}"));
                }
                self.namespace.insert(name.clone(), value);
                Ok(())
            }
            Stmt::Expr(expr) => {
                let value = self.eval_expr(expr, out).await?;
                if !value.is_null() {
                    push_line(out, &render(&value));
                }
                Ok(())
            }
        }
    }

    fn eval_expr<'a>(&'a mut self, expr: &'a Expr, out: &'a mut String) -> EvalFuture<'a> {
        Box::pin(async move {
            match expr {
                Expr::Str(s) => Ok(json!(s)),
                Expr::Int(n) => Ok(json!(n)),
                Expr::Float(f) => Ok(json!(f)),
                Expr::Bool(b) => Ok(json!(b)),
                Expr::Null => Ok(Value::Null),
                Expr::Var(name) => self.namespace.get(name).cloned().ok_or_else(|| {
                    Flow::error("NameError", format!("unknown variable `{name}`"))
                }),
                Expr::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval_expr(item, out).await?);
                    }
                    Ok(Value::Array(values))
                }
                Expr::Dict(pairs) => {
                    let mut map = serde_json::Map::new();
                    for (key, value_expr) in pairs {
                        map.insert(key.clone(), self.eval_expr(value_expr, out).await?);
                    }
                    Ok(Value::Object(map))
                }
                Expr::Index(base, index) => {
                    let base = self.eval_expr(base, out).await?;
                    let index = self.eval_expr(index, out).await?;
                    index_value(&base, &index)
                }
                Expr::Neg(inner) => {
                    let value = self.eval_expr(inner, out).await?;
                    match value.as_f64() {
                        Some(f) => {
                            if value.is_i64() {
                                Ok(json!(-value.as_i64().unwrap_or_default()))
                            } else {
                                Ok(json!(-f))
                            }
                        }
                        None => Err(Flow::error("TypeError", "unary minus needs a number")),
                    }
                }
                Expr::Binary(op, left, right) => {
                    let left = self.eval_expr(left, out).await?;
                    let right = self.eval_expr(right, out).await?;
                    binary(*op, &left, &right)
                }
                Expr::Call { name, args, kwargs } => {
                    let mut positional = Vec::with_capacity(args.len());
                    for arg in args {
                        positional.push(self.eval_expr(arg, out).await?);
                    }
                    let mut keywords = BTreeMap::new();
                    for (key, value_expr) in kwargs {
                        keywords.insert(key.clone(), self.eval_expr(value_expr, out).await?);
                    }
                    self.eval_call(name, positional, keywords, out).await
                }
            }
        })
    }

    async fn eval_call(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        out: &mut String,
    ) -> Result<Value, Flow> {
        match name {
            "print" => {
                let line = args
                    .iter()
                    .map(render)
                    .collect::<Vec<_>>()
                    .join(" ");
                push_line(out, &line);
                Ok(Value::Null)
            }
            "len" => {
                let value = args.first().ok_or_else(|| {
                    Flow::error("TypeError", "len() takes exactly one argument")
                })?;
                let n = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(a) => a.len(),
                    Value::Object(o) => o.len(),
                    _ => {
                        return Err(Flow::error(
                            "TypeError",
                            "len() needs a string, list, or dict",
                        ));
                    }
                };
                Ok(json!(n))
            }
            "str" => {
                let value = args.first().ok_or_else(|| {
                    Flow::error("TypeError", "str() takes exactly one argument")
                })?;
                Ok(json!(render(value)))
            }
            "SUBMIT" => {
                if !args.is_empty() {
                    return Err(Flow::error(
                        "TypeError",
                        "SUBMIT takes keyword arguments only, e.g. SUBMIT(answer=..., sparql=..., evidence=...)",
                    ));
                }
                Err(Flow::Terminal(kwargs))
            }
            "FINAL" => {
                let text = args.first().map(render).unwrap_or_default();
                let mut payload = BTreeMap::new();
                payload.insert("answer".to_string(), json!(text));
                Err(Flow::Terminal(payload))
            }
            "FINAL_VAR" => {
                let var = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Flow::error("TypeError", "FINAL_VAR takes a variable name string")
                    })?
                    .to_string();
                let value = self.namespace.get(&var).cloned().ok_or_else(|| {
                    Flow::error("NameError", format!("unknown variable `{var}`"))
                })?;
                let payload = match value {
                    Value::Object(map) => map.into_iter().collect(),
                    other => {
                        let mut payload = BTreeMap::new();
                        payload.insert("answer".to_string(), json!(render(&other)));
                        payload
                    }
                };
                Err(Flow::Terminal(payload))
            }
            _ => match self.tools.get(name) {
                Some(tool) => match tool.call(ToolArgs::new(args, kwargs)).await {
                    Ok(value) => Ok(value),
                    Err(tool_error) => Ok(tool_error.to_dict()),
                },
                None => Err(Flow::error(
                    "NameError",
                    format!("unknown function or tool `{name}`"),
                )),
            },
        }
    }
}

fn push_line(out: &mut String, line: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(line);
}

/// Render a value for printing: strings bare, containers as pretty JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

fn index_value(base: &Value, index: &Value) -> Result<Value, Flow> {
    match (base, index) {
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().ok_or_else(|| {
            Flow::error("KeyError", format!("no key `{key}`"))
        }),
        (Value::Array(items), Value::Number(n)) => {
            let i = n
                .as_i64()
                .ok_or_else(|| Flow::error("TypeError", "list index must be an integer"))?;
            let len = items.len() as i64;
            let i = if i < 0 { i + len } else { i };
            if i < 0 || i >= len {
                return Err(Flow::error(
                    "IndexError",
                    format!("index {i} out of range for list of {len}"),
                ));
            }
            Ok(items[i as usize].clone())
        }
        (Value::String(s), Value::Number(n)) => {
            let i = n
                .as_i64()
                .ok_or_else(|| Flow::error("TypeError", "string index must be an integer"))?;
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let i = if i < 0 { i + len } else { i };
            if i < 0 || i >= len {
                return Err(Flow::error(
                    "IndexError",
                    format!("index {i} out of range for string of {len}"),
                ));
            }
            Ok(json!(chars[i as usize].to_string()))
        }
        _ => Err(Flow::error(
            "TypeError",
            "indexing needs dict[str], list[int], or str[int]",
        )),
    }
}

fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, Flow> {
    match op {
        BinOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(json!(format!("{a}{b}"))),
            (Value::Array(a), Value::Array(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                Ok(Value::Array(joined))
            }
            (Value::Number(_), Value::Number(_)) => numeric(op, left, right),
            _ => Err(Flow::error(
                "TypeError",
                "`+` needs two numbers, two strings, or two lists",
            )),
        },
        BinOp::Sub => match (left, right) {
            (Value::Number(_), Value::Number(_)) => numeric(op, left, right),
            _ => Err(Flow::error("TypeError", "`-` needs two numbers")),
        },
    }
}

fn numeric(op: BinOp, left: &Value, right: &Value) -> Result<Value, Flow> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return Ok(match op {
            BinOp::Add => json!(a + b),
            BinOp::Sub => json!(a - b),
        });
    }
    let (a, b) = (
        left.as_f64().unwrap_or_default(),
        right.as_f64().unwrap_or_default(),
    );
    Ok(match op {
        BinOp::Add => json!(a + b),
        BinOp::Sub => json!(a - b),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_tools::{ToolDyn, ToolError};

    struct EchoTool;

    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn summary(&self) -> &str {
            "Echoes its first argument."
        }
        fn signature(&self) -> &str {
            "echo(value)"
        }
        fn call(
            &self,
            args: ToolArgs,
        ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
            Box::pin(async move {
                Ok(args.get(0, "value").cloned().unwrap_or(Value::Null))
            })
        }
    }

    struct FailTool;

    impl ToolDyn for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn summary(&self) -> &str {
            "Always fails."
        }
        fn signature(&self) -> &str {
            "fail()"
        }
        fn call(
            &self,
            _args: ToolArgs,
        ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
            Box::pin(async move {
                Err(ToolError::bad_input("it always fails", "do not call it"))
            })
        }
    }

    fn interpreter() -> Interpreter {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FailTool));
        Interpreter::new(Arc::new(registry))
    }

    async fn run(interp: &mut Interpreter, code: &str) -> ExecutionOutcome {
        interp.execute(code, BTreeMap::new()).await
    }

    #[tokio::test]
    async fn print_and_arithmetic() {
        let mut interp = interpreter();
        let out = run(&mut interp, "print(\"hi\", 1 + 2)").await;
        assert_eq!(out, ExecutionOutcome::Text("hi 3".into()));
    }

    #[tokio::test]
    async fn namespace_persists_across_calls() {
        let mut interp = interpreter();
        run(&mut interp, "x = 41").await;
        let out = run(&mut interp, "print(x + 1)").await;
        assert_eq!(out, ExecutionOutcome::Text("42".into()));
    }

    #[tokio::test]
    async fn variables_are_injected() {
        let mut interp = interpreter();
        let vars: BTreeMap<String, Value> =
            [("query".to_string(), json!("What is Activity?"))].into();
        let out = interp.execute("print(query)", vars).await;
        assert_eq!(out, ExecutionOutcome::Text("What is Activity?".into()));
    }

    #[tokio::test]
    async fn expression_statement_auto_prints() {
        let mut interp = interpreter();
        let out = run(&mut interp, "echo(\"seen\")").await;
        assert_eq!(out, ExecutionOutcome::Text("seen".into()));
        // Assignments stay silent.
        let out = run(&mut interp, "x = echo(\"silent\")").await;
        assert_eq!(out, ExecutionOutcome::Text(String::new()));
    }

    #[tokio::test]
    async fn tool_error_becomes_dict_and_is_echoed() {
        let mut interp = interpreter();
        let out = run(&mut interp, "x = fail()").await;
        let ExecutionOutcome::Text(text) = out else {
            panic!("tool errors must not abort the snippet");
        };
        assert!(text.contains("\"error\": \"bad-input\""));
        // The dict landed in the namespace too.
        assert_eq!(interp.get("x").unwrap()["error"], "bad-input");
    }

    #[tokio::test]
    async fn submit_is_terminal() {
        let mut interp = interpreter();
        let out = run(
            &mut interp,
            "SUBMIT(answer=\"done\", evidence={\"k\": \"v\"})",
        )
        .await;
        let ExecutionOutcome::Terminal(payload) = out else {
            panic!("expected terminal");
        };
        assert_eq!(payload["answer"], "done");
        assert_eq!(payload["evidence"]["k"], "v");
    }

    #[tokio::test]
    async fn submit_with_positional_is_recoverable() {
        let mut interp = interpreter();
        let out = run(&mut interp, "SUBMIT(\"oops\")").await;
        assert!(matches!(
            out,
            ExecutionOutcome::RecoverableError { ref class, .. } if class == "TypeError"
        ));
    }

    #[tokio::test]
    async fn final_and_final_var() {
        let mut interp = interpreter();
        let out = run(&mut interp, "FINAL(\"the answer\")").await;
        let ExecutionOutcome::Terminal(payload) = out else {
            panic!("expected terminal");
        };
        assert_eq!(payload["answer"], "the answer");

        run(&mut interp, "result = {\"answer\": \"a\", \"sparql\": \"s\"}").await;
        let out = run(&mut interp, "FINAL_VAR(\"result\")").await;
        let ExecutionOutcome::Terminal(payload) = out else {
            panic!("expected terminal");
        };
        assert_eq!(payload["sparql"], "s");
    }

    #[tokio::test]
    async fn name_error_keeps_partial_output() {
        let mut interp = interpreter();
        let out = run(&mut interp, "print(\"before\")\nprint(missing)").await;
        let ExecutionOutcome::RecoverableError {
            class,
            message,
            output,
        } = out
        else {
            panic!("expected error");
        };
        assert_eq!(class, "NameError");
        assert!(message.contains("`missing`"));
        assert_eq!(output, "before");
    }

    #[tokio::test]
    async fn syntax_error_class() {
        let mut interp = interpreter();
        let out = run(&mut interp, "x = = 1").await;
        assert!(matches!(
            out,
            ExecutionOutcome::RecoverableError { ref class, .. } if class == "SyntaxError"
        ));
    }

    #[tokio::test]
    async fn indexing_and_len() {
        let mut interp = interpreter();
        run(&mut interp, "xs = [10, 20, 30]").await;
        let out = run(&mut interp, "print(xs[-1], len(xs))").await;
        assert_eq!(out, ExecutionOutcome::Text("30 3".into()));
        let out = run(&mut interp, "xs[9]").await;
        assert!(matches!(
            out,
            ExecutionOutcome::RecoverableError { ref class, .. } if class == "IndexError"
        ));
    }

    #[tokio::test]
    async fn output_is_truncated_with_marker() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let mut interp = Interpreter::with_output_limit(Arc::new(registry), 50);
        let out = interp
            .execute("print(\"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\")", BTreeMap::new())
            .await;
        let ExecutionOutcome::Text(text) = out else {
            panic!("expected text");
        };
        assert!(text.contains("[...truncated at 50 chars]"));
    }

    #[tokio::test]
    async fn verification_field_is_echoed_on_assignment() {
        struct VerifiedTool;
        impl ToolDyn for VerifiedTool {
            fn name(&self) -> &str {
                "verified"
            }
            fn summary(&self) -> &str {
                "Returns a dict with a verification block."
            }
            fn signature(&self) -> &str {
                "verified()"
            }
            fn call(
                &self,
                _args: ToolArgs,
            ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
                Box::pin(async move {
                    Ok(json!({"row_count": 0, "verification": "✗ empty: filter too strict"}))
                })
            }
        }
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(VerifiedTool));
        let mut interp = Interpreter::new(Arc::new(registry));
        let out = interp.execute("h = verified()", BTreeMap::new()).await;
        let ExecutionOutcome::Text(text) = out else {
            panic!("expected text");
        };
        assert!(text.contains("✗ empty"));
    }

    #[tokio::test]
    async fn shutdown_clears_namespace() {
        let mut interp = interpreter();
        run(&mut interp, "x = 1").await;
        interp.shutdown();
        assert!(interp.get("x").is_none());
    }
}
