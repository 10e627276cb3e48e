//! Built-in command table
//!
//! A small executor used by the binary: handlers run on the Tokio
//! blocking pool and the callback fires from a runtime task, never from
//! the session's own task.

use super::{CommandExecutor, JobCallback, JobResult};
use crate::error::JobFault;
use crate::leader::Leadership;
use crate::protocol::Request;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error};

/// Longest pause accepted by `sleep`
const MAX_SLEEP_MS: u64 = 10_000;

type Handler = fn(&[String], &dyn Leadership) -> Result<Vec<String>, JobFault>;

struct CommandSpec {
    name: &'static str,
    usage: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    /// Followers do not serve it; clients get redirected
    leader_only: bool,
    handler: Handler,
}

static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "echo",
        usage: "echo <message>...",
        min_args: 1,
        max_args: None,
        leader_only: true,
        handler: echo,
    },
    CommandSpec {
        name: "help",
        usage: "help",
        min_args: 0,
        max_args: Some(0),
        leader_only: false,
        handler: help,
    },
    CommandSpec {
        name: "leader",
        usage: "leader",
        min_args: 0,
        max_args: Some(0),
        leader_only: false,
        handler: leader,
    },
    CommandSpec {
        name: "ping",
        usage: "ping",
        min_args: 0,
        max_args: Some(0),
        leader_only: false,
        handler: ping,
    },
    CommandSpec {
        name: "sleep",
        usage: "sleep <milliseconds>",
        min_args: 1,
        max_args: Some(1),
        leader_only: false,
        handler: sleep,
    },
];

fn ping(_: &[String], _: &dyn Leadership) -> Result<Vec<String>, JobFault> {
    Ok(vec!["+PONG".to_string()])
}

fn echo(args: &[String], _: &dyn Leadership) -> Result<Vec<String>, JobFault> {
    Ok(args.to_vec())
}

fn help(_: &[String], _: &dyn Leadership) -> Result<Vec<String>, JobFault> {
    let names: Vec<&str> = COMMANDS.iter().map(|c| c.name).collect();
    serde_json::to_string(&names)
        .map(|json| vec![json])
        .map_err(|e| JobFault::Io(e.to_string()))
}

fn leader(_: &[String], leadership: &dyn Leadership) -> Result<Vec<String>, JobFault> {
    let address = leadership
        .current_leader()
        .and_then(|address| address.to_json())
        .map_err(|e| JobFault::Coordination(e.to_string()))?;
    Ok(vec![address])
}

fn sleep(args: &[String], _: &dyn Leadership) -> Result<Vec<String>, JobFault> {
    let millis: u64 = args[0]
        .parse()
        .map_err(|_| JobFault::Other(format!("invalid milliseconds '{}'", args[0])))?;
    std::thread::sleep(Duration::from_millis(millis.min(MAX_SLEEP_MS)));
    Ok(vec!["+OK".to_string()])
}

/// Run one request against the table
fn execute(request: &Request, leadership: &dyn Leadership) -> JobResult {
    let result = JobResult::new(request.text());
    let name = request.command();

    let Some(spec) = COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name)) else {
        return result.with_fault(JobFault::CommandNotFound);
    };

    if spec.leader_only && !leadership.is_leader() {
        return result.with_fault(JobFault::CommandNotFound);
    }

    let args = &request.args()[1..];
    if args.len() < spec.min_args || spec.max_args.is_some_and(|max| args.len() > max) {
        return result.with_fault(JobFault::WrongArguments {
            usage: spec.usage.to_string(),
        });
    }

    match (spec.handler)(args, leadership) {
        Ok(messages) => messages
            .into_iter()
            .fold(result, |result, message| result.with_message(message)),
        Err(fault) => result.with_fault(fault),
    }
}

/// Executor backed by the built-in command table
pub struct BuiltinCommands {
    leadership: Arc<dyn Leadership>,
    runtime: Handle,
}

impl BuiltinCommands {
    pub fn new(leadership: Arc<dyn Leadership>, runtime: Handle) -> Self {
        Self {
            leadership,
            runtime,
        }
    }
}

impl CommandExecutor for BuiltinCommands {
    fn perform(&self, request: Request, callback: JobCallback) {
        let started = Instant::now();
        let text = request.text().to_owned();
        let leadership = Arc::clone(&self.leadership);

        let job = self
            .runtime
            .spawn_blocking(move || execute(&request, leadership.as_ref()));

        self.runtime.spawn(async move {
            let result = match job.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Command '{}' did not complete: {}", text, e);
                    JobResult::new(text).with_fault(JobFault::Interrupted)
                }
            };
            let result = result.started_at(started).finish();
            debug!(
                "Command '{}' finished in {:?}",
                result.request(),
                result.elapsed()
            );
            callback.complete(result);
        });
    }
}
