//! Persistent Python session driven over JSON lines
//!
//! The child runs an embedded driver script. Requests go to its stdin; its
//! replies, captured output and host function calls come back one JSON
//! object per line on a private copy of its stdout.

use std::io::{stdout, Write};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use super::{CallArgs, Completeness, ExecOutput, HostHandler, Interpreter};

const DRIVER: &str = include_str!("driver.py");

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverRequest<'a> {
    Check {
        source: &'a str,
    },
    Exec {
        source: &'a str,
    },
    Reply {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "String::is_empty")]
        printed: String,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Complete,
    Incomplete,
    Invalid,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DriverMessage {
    Ready,
    Check {
        status: CheckStatus,
    },
    Output {
        text: String,
    },
    Call {
        function: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        kwargs: Map<String, Value>,
    },
    Done {
        error: Option<String>,
    },
    Error {
        message: String,
    },
}

struct DriverProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl DriverProcess {
    async fn spawn(program: &str) -> Result<Self> {
        let mut child = Command::new(program)
            .arg("-u")
            .arg("-c")
            .arg(DRIVER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start Python interpreter '{}'", program))?;

        let stdin = child
            .stdin
            .take()
            .context("Failed to capture stdin of Python interpreter")?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to capture stdout of Python interpreter")?;

        let mut process = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        match process.recv().await? {
            DriverMessage::Ready => {
                info!(program, "Python session started");
                Ok(process)
            }
            other => bail!("Python driver sent {:?} before ready", other),
        }
    }

    async fn send(&mut self, request: &DriverRequest<'_>) -> Result<()> {
        let json = serde_json::to_string(request)?;
        self.stdin.write_all(json.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<DriverMessage> {
        let mut line = String::new();
        self.stdout
            .read_line(&mut line)
            .await
            .context("Failed to read from Python interpreter")?;

        if line.is_empty() {
            bail!("Python interpreter exited");
        }

        serde_json::from_str(&line).context("Failed to parse message from Python interpreter")
    }
}

/// A `python3` child process holding the agent's namespace
pub struct PythonInterpreter {
    program: String,
    process: Option<DriverProcess>,
}

impl PythonInterpreter {
    /// The process is started on first use
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            process: None,
        }
    }

    async fn process(&mut self) -> Result<&mut DriverProcess> {
        if self.process.is_none() {
            self.process = Some(DriverProcess::spawn(&self.program).await?);
        }
        self.process
            .as_mut()
            .context("Python interpreter not running")
    }
}

#[async_trait]
impl Interpreter for PythonInterpreter {
    async fn check(&mut self, source: &str) -> Result<Completeness> {
        let process = self.process().await?;
        process.send(&DriverRequest::Check { source }).await?;

        match process.recv().await? {
            DriverMessage::Check { status } => Ok(match status {
                CheckStatus::Complete => Completeness::Complete,
                CheckStatus::Incomplete => Completeness::Incomplete,
                CheckStatus::Invalid => Completeness::Invalid,
            }),
            DriverMessage::Error { message } => bail!("Python driver error: {}", message),
            other => bail!("unexpected reply to check: {:?}", other),
        }
    }

    async fn execute(&mut self, source: &str, host: &mut dyn HostHandler) -> Result<ExecOutput> {
        let process = self.process().await?;
        process.send(&DriverRequest::Exec { source }).await?;

        let mut output = String::new();
        loop {
            match process.recv().await? {
                DriverMessage::Output { text } => {
                    print!("{}", text);
                    let _ = stdout().flush();
                    output.push_str(&text);
                }
                DriverMessage::Call {
                    function,
                    args,
                    kwargs,
                } => {
                    debug!(function = %function, "Host call from Python");
                    let result = host.call(&function, CallArgs::new(args, kwargs)).await;
                    let printed = host.take_printed();
                    let reply = match result {
                        Ok(value) => DriverRequest::Reply {
                            ok: true,
                            value: Some(value),
                            error: None,
                            printed,
                        },
                        Err(e) => DriverRequest::Reply {
                            ok: false,
                            value: None,
                            error: Some(format!("{:#}", e)),
                            printed,
                        },
                    };
                    process.send(&reply).await?;
                }
                DriverMessage::Done { error } => return Ok(ExecOutput { output, error }),
                DriverMessage::Error { message } => bail!("Python driver error: {}", message),
                other => bail!("unexpected message during exec: {:?}", other),
            }
        }
    }

    async fn restart(&mut self) -> Result<()> {
        if let Some(mut process) = self.process.take() {
            let _ = process.child.kill().await;
        }
        self.process = Some(DriverProcess::spawn(&self.program).await?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::split_statements;
    use crate::executor::testing::EchoHost;
    use serde_json::json;

    fn python() -> Option<PythonInterpreter> {
        which::which("python3")
            .ok()
            .map(|_| PythonInterpreter::new("python3"))
    }

    #[tokio::test]
    async fn test_check_statuses() {
        let Some(mut py) = python() else { return };
        assert_eq!(py.check("x = 1").await.unwrap(), Completeness::Complete);
        assert_eq!(py.check("def f():").await.unwrap(), Completeness::Incomplete);
        assert_eq!(py.check("x = = 1").await.unwrap(), Completeness::Invalid);
    }

    #[tokio::test]
    async fn test_namespace_persists_and_output_is_captured() {
        let Some(mut py) = python() else { return };
        let mut host = EchoHost::default();

        let first = py.execute("x = 40", &mut host).await.unwrap();
        assert_eq!(first, ExecOutput::default());

        let second = py.execute("print(x + 2)", &mut host).await.unwrap();
        assert_eq!(second.output, "42\n");
        assert!(second.error.is_none());
    }

    #[tokio::test]
    async fn test_exception_is_reported_not_fatal() {
        let Some(mut py) = python() else { return };
        let mut host = EchoHost::default();

        let result = py.execute("print('before')\n1 / 0", &mut host).await.unwrap();
        assert_eq!(result.output, "before\n");
        assert_eq!(result.error.as_deref(), Some("division by zero"));

        let after = py.execute("print('still alive')", &mut host).await.unwrap();
        assert_eq!(after.output, "still alive\n");
    }

    #[tokio::test]
    async fn test_host_functions_round_trip() {
        let Some(mut py) = python() else { return };
        let mut host = EchoHost::default();

        let result = py
            .execute("print(call_llm('What is 1 + 1?', model='olmo'))", &mut host)
            .await
            .unwrap();
        assert_eq!(host.calls, vec!["call_llm"]);
        assert_eq!(result.output, "call_llm\n");
    }

    #[tokio::test]
    async fn test_host_error_raises_in_python() {
        struct FailingHost;

        #[async_trait]
        impl HostHandler for FailingHost {
            async fn call(&mut self, _function: &str, _args: CallArgs) -> Result<Value> {
                bail!("no API key")
            }
        }

        let Some(mut py) = python() else { return };
        let result = py
            .execute("read_file_contents('notes.txt')", &mut FailingHost)
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("no API key"));
    }

    #[tokio::test]
    async fn test_host_receives_keyword_arguments() {
        struct RecordingHost(Vec<CallArgs>);

        #[async_trait]
        impl HostHandler for RecordingHost {
            async fn call(&mut self, _function: &str, args: CallArgs) -> Result<Value> {
                self.0.push(args);
                Ok(json!([{"q": "1+1?", "a": "2"}]))
            }
        }

        let Some(mut py) = python() else { return };
        let mut host = RecordingHost(Vec::new());
        let result = py
            .execute(
                "rows = [{'q': '1+1?'}]\nmap_dataframe(rows, 'Answer: {q}', 'a')\nprint(rows)",
                &mut host,
            )
            .await
            .unwrap();
        assert_eq!(result.output, "[{'q': '1+1?', 'a': '2'}]\n");
        assert_eq!(host.0[0].kwargs["output_col"], json!("a"));
        assert_eq!(host.0[0].kwargs["dataframe"], json!([{"q": "1+1?"}]));
    }

    #[tokio::test]
    async fn test_nan_arguments_keep_session_in_step() {
        struct RecordingHost(Vec<CallArgs>);

        #[async_trait]
        impl HostHandler for RecordingHost {
            async fn call(&mut self, _function: &str, args: CallArgs) -> Result<Value> {
                self.0.push(args);
                Ok(json!([{"title": "everything", "score": null}]))
            }
        }

        let Some(mut py) = python() else { return };
        let mut host = RecordingHost(Vec::new());
        py.execute("x = 7", &mut host).await.unwrap();

        let result = py
            .execute(
                "score_categories([{'c': [0], 'm': float('nan')}, {'c': [0], 'm': float('inf')}], \
                 [{'title': 'everything'}], data_cat_col='c', data_metric_col='m', cat_score_col='score')",
                &mut host,
            )
            .await
            .unwrap();
        assert!(result.error.is_none());
        assert_eq!(
            host.0[0].kwargs["dataset"],
            json!([{"c": [0], "m": null}, {"c": [0], "m": null}])
        );

        let after = py.execute("print(x)", &mut host).await.unwrap();
        assert_eq!(after.output, "7\n");
        assert!(after.error.is_none());
    }

    #[tokio::test]
    async fn test_host_messages_reach_output() {
        use crate::host::Workbench;
        use crate::research::testing::ScriptedModel;
        use crate::session::ResearchSession;

        let Some(mut py) = python() else { return };
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("notes.txt");
        let mut bench = Workbench::new(
            Box::new(ScriptedModel::default()),
            ResearchSession::new("system", dir.path()),
        );

        let source = format!("print(read_file_contents({:?}))", missing.display().to_string());
        let result = py.execute(&source, &mut bench).await.unwrap();
        assert_eq!(
            result.output,
            format!("Error: File '{}' not found.\nNone\n", missing.display())
        );
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_restart_clears_namespace() {
        let Some(mut py) = python() else { return };
        let mut host = EchoHost::default();
        py.execute("y = 1", &mut host).await.unwrap();
        py.restart().await.unwrap();
        let result = py.execute("print(y)", &mut host).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("name 'y' is not defined"));
    }

    #[tokio::test]
    async fn test_split_statements_with_real_compiler() {
        let Some(mut py) = python() else { return };
        let code = "\nimport math\ndef area(r):\n    return math.pi * r * r\n\nprint(round(area(1), 2))\n";
        let blocks = split_statements(code, &mut py).await.unwrap();
        assert_eq!(
            blocks,
            vec![
                "import math",
                "def area(r):\n    return math.pi * r * r\n",
                "print(round(area(1), 2))",
            ]
        );
    }
}
