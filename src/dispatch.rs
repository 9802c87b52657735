//! Operation dispatch and the JSON response envelope.
//!
//! Callers name an operation and pass its arguments as a JSON object. Every
//! outcome, success or failure, comes back as a [`Response`].

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{Agent, SortKey};
use crate::error::{Error, Failure, Result};
use crate::runner::Runner;

/// Every operation the agent exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SetWorkspace,
    GetState,
    CreateFile,
    RenameFile,
    SetPrimaryFile,
    AppendCode,
    WriteCode,
    RunScript,
    RunExpression,
    ListExports,
    ReadExport,
    PreviewTable,
    InspectObjects,
    WhichInterpreter,
    ListScriptFiles,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Operation::SetWorkspace,
        Operation::GetState,
        Operation::CreateFile,
        Operation::RenameFile,
        Operation::SetPrimaryFile,
        Operation::AppendCode,
        Operation::WriteCode,
        Operation::RunScript,
        Operation::RunExpression,
        Operation::ListExports,
        Operation::ReadExport,
        Operation::PreviewTable,
        Operation::InspectObjects,
        Operation::WhichInterpreter,
        Operation::ListScriptFiles,
    ];

    /// Wire name of the operation.
    pub fn name(self) -> &'static str {
        match self {
            Operation::SetWorkspace => "set_workspace",
            Operation::GetState => "get_state",
            Operation::CreateFile => "create_file",
            Operation::RenameFile => "rename_file",
            Operation::SetPrimaryFile => "set_primary_file",
            Operation::AppendCode => "append_code",
            Operation::WriteCode => "write_code",
            Operation::RunScript => "run_script",
            Operation::RunExpression => "run_expression",
            Operation::ListExports => "list_exports",
            Operation::ReadExport => "read_export",
            Operation::PreviewTable => "preview_table",
            Operation::InspectObjects => "inspect_objects",
            Operation::WhichInterpreter => "which_interpreter",
            Operation::ListScriptFiles => "list_script_files",
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| Error::UnknownOperation(name.to_string()))
    }
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetWorkspaceArgs {
    path: String,
    #[serde(default = "yes")]
    create: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateFileArgs {
    name: String,
    #[serde(default)]
    overwrite: bool,
    #[serde(default = "yes")]
    scaffold: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RenameFileArgs {
    old_name: String,
    new_name: String,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NameArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AppendCodeArgs {
    code: String,
    name: Option<String>,
    #[serde(default = "yes")]
    ensure_trailing_newline: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteCodeArgs {
    code: String,
    name: Option<String>,
    #[serde(default)]
    overwrite: bool,
    #[serde(default = "yes")]
    use_scaffold_header: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunScriptArgs {
    name: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    timeout_secs: Option<u64>,
    #[serde(default = "yes")]
    save_session: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunExpressionArgs {
    expr: String,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListExportsArgs {
    #[serde(default = "default_pattern")]
    pattern: String,
    #[serde(default)]
    sort_by: SortKey,
    #[serde(default = "yes")]
    descending: bool,
    limit: Option<usize>,
}

fn default_pattern() -> String {
    "*".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadExportArgs {
    name: String,
    max_bytes: Option<u64>,
    #[serde(default = "yes")]
    as_text: bool,
    #[serde(default = "default_encoding")]
    encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PreviewTableArgs {
    name: String,
    delimiter: Option<String>,
    max_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InspectObjectsArgs {
    #[serde(default)]
    names: Vec<String>,
    #[serde(default = "default_detail_level")]
    detail_level: u32,
    timeout_secs: Option<u64>,
}

fn default_detail_level() -> u32 {
    1
}

/// Response envelope: `{"ok": true, "data": ..}` or `{"ok": false, "error": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: Error) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(Failure::from(error)),
        }
    }
}

/// One request line of the stdio protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub op: String,
    #[serde(default)]
    pub args: Value,
}

/// One response line of the stdio protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: Value,
    #[serde(flatten)]
    pub response: Response,
}

/// Runs `op` with `args` against the agent.
pub async fn dispatch<R: Runner>(agent: &Agent<R>, op: &str, args: Value) -> Response {
    match execute(agent, op, args).await {
        Ok(data) => Response::success(data),
        Err(e) => {
            tracing::warn!(op = %op, code = ?e.code(), error = %e, "operation failed");
            Response::failure(e)
        }
    }
}

/// Parses one protocol line and dispatches it.
pub async fn handle_line<R: Runner>(agent: &Agent<R>, line: &str) -> Reply {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => Reply {
            response: dispatch(agent, &request.op, request.args).await,
            id: request.id,
        },
        Err(e) => Reply {
            id: Value::Null,
            response: Response::failure(Error::InvalidArgument(format!(
                "malformed request: {}",
                e
            ))),
        },
    }
}

async fn execute<R: Runner>(agent: &Agent<R>, op: &str, args: Value) -> Result<Value> {
    let operation: Operation = op.parse()?;
    let limits = &agent.config().limits;
    tracing::debug!(op = operation.name(), "dispatching");

    match operation {
        Operation::SetWorkspace => {
            let a: SetWorkspaceArgs = parse(args)?;
            to_data(agent.set_workspace(&a.path, a.create)?)
        }
        Operation::GetState => {
            let _: NoArgs = parse(args)?;
            to_data(agent.get_state()?)
        }
        Operation::CreateFile => {
            let a: CreateFileArgs = parse(args)?;
            to_data(agent.create_file(&a.name, a.overwrite, a.scaffold)?)
        }
        Operation::RenameFile => {
            let a: RenameFileArgs = parse(args)?;
            to_data(agent.rename_file(&a.old_name, &a.new_name, a.overwrite)?)
        }
        Operation::SetPrimaryFile => {
            let a: NameArgs = parse(args)?;
            to_data(agent.set_primary_file(&a.name)?)
        }
        Operation::AppendCode => {
            let a: AppendCodeArgs = parse(args)?;
            to_data(agent.append_code(&a.code, a.name.as_deref(), a.ensure_trailing_newline)?)
        }
        Operation::WriteCode => {
            let a: WriteCodeArgs = parse(args)?;
            to_data(agent.write_code(
                &a.code,
                a.name.as_deref(),
                a.overwrite,
                a.use_scaffold_header,
            )?)
        }
        Operation::RunScript => {
            let a: RunScriptArgs = parse(args)?;
            let timeout = a.timeout_secs.unwrap_or(limits.script_timeout_secs);
            to_data(
                agent
                    .run_script(a.name.as_deref(), &a.args, timeout, a.save_session)
                    .await?,
            )
        }
        Operation::RunExpression => {
            let a: RunExpressionArgs = parse(args)?;
            let timeout = a.timeout_secs.unwrap_or(limits.expression_timeout_secs);
            to_data(agent.run_expression(&a.expr, timeout).await?)
        }
        Operation::ListExports => {
            let a: ListExportsArgs = parse(args)?;
            to_data(agent.list_exports(
                &a.pattern,
                a.sort_by,
                a.descending,
                a.limit.unwrap_or(limits.list_limit),
            )?)
        }
        Operation::ReadExport => {
            let a: ReadExportArgs = parse(args)?;
            to_data(agent.read_export(
                &a.name,
                a.max_bytes.unwrap_or(limits.read_max_bytes),
                a.as_text,
                &a.encoding,
            )?)
        }
        Operation::PreviewTable => {
            let a: PreviewTableArgs = parse(args)?;
            to_data(agent.preview_table(
                &a.name,
                a.delimiter.as_deref(),
                a.max_rows.unwrap_or(limits.preview_max_rows),
            )?)
        }
        Operation::InspectObjects => {
            let a: InspectObjectsArgs = parse(args)?;
            let timeout = a.timeout_secs.unwrap_or(limits.inspect_timeout_secs);
            to_data(
                agent
                    .inspect_objects(&a.names, a.detail_level, timeout)
                    .await?,
            )
        }
        Operation::WhichInterpreter => {
            let _: NoArgs = parse(args)?;
            to_data(agent.which_interpreter()?)
        }
        Operation::ListScriptFiles => {
            let _: NoArgs = parse(args)?;
            to_data(agent.list_script_files()?)
        }
    }
}

/// Decodes arguments. A missing `args` is an empty object.
fn parse<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = match args {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| Error::InvalidArgument(e.to_string()))
}

fn to_data<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| Error::Internal(format!("failed to serialize result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::FakeRunner;
    use crate::config::Config;
    use crate::error::ErrorCode;
    use serde_json::json;
    use tempfile::TempDir;

    fn agent() -> Agent<FakeRunner> {
        Agent::with_runner(Config::default(), FakeRunner::succeeding())
    }

    fn code(response: &Response) -> ErrorCode {
        response.error.as_ref().expect("expected failure").code
    }

    #[test]
    fn operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.name().parse::<Operation>().unwrap(), op);
        }
        assert!(matches!(
            "drop_tables".parse::<Operation>(),
            Err(Error::UnknownOperation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_operation() {
        let response = dispatch(&agent(), "format_disk", json!({})).await;

        assert!(!response.ok);
        assert_eq!(code(&response), ErrorCode::UnknownOperation);
    }

    #[tokio::test]
    async fn bad_arguments_are_invalid() {
        let agent = agent();

        let missing = dispatch(&agent, "set_workspace", json!({})).await;
        assert_eq!(code(&missing), ErrorCode::InvalidArgument);

        let wrong_type = dispatch(&agent, "set_workspace", json!({"path": 7})).await;
        assert_eq!(code(&wrong_type), ErrorCode::InvalidArgument);

        let extra = dispatch(&agent, "get_state", json!({"verbose": true})).await;
        assert_eq!(code(&extra), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn unbound_operations_report_no_workspace_with_hint() {
        let response = dispatch(&agent(), "get_state", Value::Null).await;

        let failure = response.error.unwrap();
        assert_eq!(failure.code, ErrorCode::NoWorkspace);
        assert!(failure.hints.iter().any(|h| h.contains("set_workspace")));
    }

    #[tokio::test]
    async fn defaults_flow_through() {
        let dir = TempDir::new().unwrap();
        let agent = agent();
        let root = dir.path().join("fresh");

        let bound = dispatch(&agent, "set_workspace", json!({"path": root})).await;
        assert!(bound.ok, "{:?}", bound.error);
        assert_eq!(bound.data.unwrap()["created"], json!(true));

        let created = dispatch(&agent, "create_file", json!({"name": "second"})).await;
        assert_eq!(created.data.unwrap()["file"], json!("second.r"));

        let listed = dispatch(&agent, "list_script_files", json!({})).await;
        assert_eq!(
            listed.data.unwrap()["files"],
            json!(["agent.r", "second.r"])
        );

        dispatch(&agent, "run_script", json!({})).await;
        assert_eq!(
            agent.runner().last_call().timeout,
            std::time::Duration::from_secs(120)
        );
    }

    #[tokio::test]
    async fn envelope_shape() {
        let ok = serde_json::to_value(Response::success(json!({"a": 1}))).unwrap();
        assert_eq!(ok, json!({"ok": true, "data": {"a": 1}}));

        let err = serde_json::to_value(Response::failure(Error::FileNotFound("x.r".into())))
            .unwrap();
        assert_eq!(err["ok"], json!(false));
        assert_eq!(err["error"]["code"], json!("FILE_NOT_FOUND"));
        assert!(err.get("data").is_none());
    }

    #[tokio::test]
    async fn protocol_lines_echo_ids() {
        let agent = agent();

        let reply = handle_line(&agent, r#"{"id": 42, "op": "get_state"}"#).await;
        assert_eq!(reply.id, json!(42));
        assert_eq!(code(&reply.response), ErrorCode::NoWorkspace);

        let malformed = handle_line(&agent, "{not json").await;
        assert_eq!(malformed.id, Value::Null);
        assert_eq!(code(&malformed.response), ErrorCode::InvalidArgument);

        let line = serde_json::to_string(&reply).unwrap();
        assert!(line.starts_with(r#"{"id":42,"ok":false"#));
    }
}
