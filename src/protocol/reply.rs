//! Reply encoding: job results to JSON-shaped wire replies
//!
//! Replies are built by string concatenation rather than a serializer
//! because message text is passed through as-is (structured payloads
//! starting with `{` or `[` are embedded raw).

use crate::command::JobResult;
use crate::error::JobFault;
use crate::leader::Leadership;
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

/// Reply line terminator
pub const CRLF: &str = "\r\n";

/// Leading marker of error messages
pub const ERROR_MARKER: &str = "-ERR";

pub const COMMAND_NOT_FOUND: &str = "-ERR command not found";
pub const WRONG_NUMBER_ARGUMENTS: &str = "-ERR wrong number of arguments";
pub const INTERNAL_ERROR: &str = "-ERR internal error";
pub const COORDINATION_ERROR: &str = "-ERR coordination service error";
pub const CONVERT_ERROR: &str = "-ERR Can not convert raw-data to json-format";

/// How a raw reply is wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Normal,
    Redirect,
}

/// Encoded reply text, CRLF-terminated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

impl Reply {
    fn normal(raw: &str) -> Self {
        Self {
            kind: ReplyKind::Normal,
            text: envelope(Some(raw), ReplyKind::Normal),
        }
    }

    /// Error reply for a failure while building the reply itself
    pub fn fallback(err: &dyn fmt::Display) -> Self {
        Self::normal(&format!("{ERROR_MARKER} {err}"))
    }

    /// Reply sent when the command engine never answered
    pub fn internal_error() -> Self {
        Self::normal(INTERNAL_ERROR)
    }
}

/// Turn a job result into the reply for the client.
///
/// Rules are applied in order and the first match wins: command not found
/// (redirect when not leader), wrong arguments (usage text), invocation
/// fault, reply messages, remaining faults, internal error.
pub fn encode(result: &JobResult, leadership: &dyn Leadership) -> Reply {
    let faults = result.faults();

    if faults.iter().any(|f| matches!(f, JobFault::CommandNotFound)) {
        if leadership.is_leader() {
            return Reply::normal(COMMAND_NOT_FOUND);
        }
        return match leadership.current_leader().and_then(|leader| leader.to_json()) {
            Ok(leader) => Reply {
                kind: ReplyKind::Redirect,
                text: envelope(Some(&leader), ReplyKind::Redirect),
            },
            Err(e) => {
                debug!("Cannot redirect, leader lookup failed: {}", e);
                Reply::normal(WRONG_NUMBER_ARGUMENTS)
            }
        };
    }

    for fault in faults {
        if let JobFault::WrongArguments { usage } = fault {
            return Reply {
                kind: ReplyKind::Normal,
                text: format!("{usage}{CRLF}"),
            };
        }
    }

    for fault in faults {
        if let JobFault::Invocation(_) = fault {
            return Reply::normal(&format!("-{fault}"));
        }
    }

    if !result.messages().is_empty() {
        return Reply::normal(&result.messages().join(" "));
    }

    if !faults.is_empty() {
        let text = faults
            .iter()
            .map(fault_message)
            .collect::<Vec<_>>()
            .join(" ");
        return Reply::normal(&text);
    }

    Reply::normal(INTERNAL_ERROR)
}

/// Fixed reply text for a fault that reached the catch-all rule
fn fault_message(fault: &JobFault) -> Cow<'_, str> {
    match fault {
        JobFault::Coordination(_) => Cow::Borrowed(COORDINATION_ERROR),
        JobFault::Interrupted => Cow::Borrowed(INTERNAL_ERROR),
        JobFault::Io(_) => Cow::Borrowed(CONVERT_ERROR),
        JobFault::Other(message) if message.starts_with(ERROR_MARKER) => {
            Cow::Borrowed(message.as_str())
        }
        other => Cow::Owned(format!("{ERROR_MARKER} {other}")),
    }
}

/// Wrap a raw reply in the state envelope and terminate it.
///
/// `{`/`[` payloads become `data`, `+`/`-` lines become `msg` with the
/// marker stripped, anything else passes through. Redirects always carry
/// their payload as `data`.
pub fn envelope(raw: Option<&str>, kind: ReplyKind) -> String {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return CRLF.to_string();
    };

    let body = if raw.starts_with(['{', '[']) {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(raw.replace('"', "\\\""))
    };

    let mut out = String::with_capacity(body.len() + 40);
    match kind {
        ReplyKind::Redirect => {
            out.push_str(r#"{"state":"redirect","data":"#);
            out.push_str(&body);
            out.push('}');
        }
        ReplyKind::Normal => match body.as_bytes()[0] {
            b'{' | b'[' => {
                out.push_str(r#"{"state":"success","data":"#);
                out.push_str(&body);
                out.push('}');
            }
            b'+' => {
                out.push_str(r#"{"state":"success","msg":""#);
                out.push_str(&body[1..]);
                out.push_str(r#""}"#);
            }
            b'-' => {
                out.push_str(r#"{"state":"error","msg":""#);
                out.push_str(&body[1..]);
                out.push_str(r#""}"#);
            }
            _ => out.push_str(&body),
        },
    }
    out.push_str(CRLF);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leader::{LeaderAddress, StaticLeadership};

    fn follower() -> StaticLeadership {
        StaticLeadership::new(false, Some(LeaderAddress::new("10.0.0.2", 1122)))
    }

    fn leader() -> StaticLeadership {
        StaticLeadership::new(true, None)
    }

    #[test]
    fn test_envelope_shapes() {
        assert_eq!(
            envelope(Some("+OK"), ReplyKind::Normal),
            "{\"state\":\"success\",\"msg\":\"OK\"}\r\n"
        );
        assert_eq!(
            envelope(Some("-ERR bad arg"), ReplyKind::Normal),
            "{\"state\":\"error\",\"msg\":\"ERR bad arg\"}\r\n"
        );
        assert_eq!(
            envelope(Some(r#"{"k":1}"#), ReplyKind::Normal),
            "{\"state\":\"success\",\"data\":{\"k\":1}}\r\n"
        );
        assert_eq!(
            envelope(Some("[1,2]"), ReplyKind::Normal),
            "{\"state\":\"success\",\"data\":[1,2]}\r\n"
        );
        assert_eq!(envelope(Some("plain text"), ReplyKind::Normal), "plain text\r\n");
        assert_eq!(envelope(Some(""), ReplyKind::Normal), "\r\n");
        assert_eq!(envelope(None, ReplyKind::Normal), "\r\n");
        assert_eq!(envelope(None, ReplyKind::Redirect), "\r\n");
    }

    #[test]
    fn test_envelope_escapes_quotes_outside_json() {
        assert_eq!(
            envelope(Some(r#"-ERR "c1" missing"#), ReplyKind::Normal),
            "{\"state\":\"error\",\"msg\":\"ERR \\\"c1\\\" missing\"}\r\n"
        );
        assert_eq!(
            envelope(Some(r#"{"a":"b"}"#), ReplyKind::Normal),
            "{\"state\":\"success\",\"data\":{\"a\":\"b\"}}\r\n"
        );
    }

    #[test]
    fn test_redirect_ignores_leading_character() {
        assert_eq!(
            envelope(Some("+x"), ReplyKind::Redirect),
            "{\"state\":\"redirect\",\"data\":+x}\r\n"
        );
    }

    #[test]
    fn test_command_not_found_on_follower_redirects() {
        let result = JobResult::new("cluster_add c1").with_fault(JobFault::CommandNotFound);
        let reply = encode(&result, &follower());
        assert_eq!(reply.kind, ReplyKind::Redirect);
        assert_eq!(
            reply.text,
            "{\"state\":\"redirect\",\"data\":{\"ip\":\"10.0.0.2\",\"port\":1122}}\r\n"
        );
    }

    #[test]
    fn test_command_not_found_on_leader() {
        let result = JobResult::new("nope").with_fault(JobFault::CommandNotFound);
        let reply = encode(&result, &leader());
        assert_eq!(reply.kind, ReplyKind::Normal);
        assert_eq!(
            reply.text,
            "{\"state\":\"error\",\"msg\":\"ERR command not found\"}\r\n"
        );
    }

    #[test]
    fn test_command_not_found_without_known_leader() {
        let result = JobResult::new("nope").with_fault(JobFault::CommandNotFound);
        let reply = encode(&result, &StaticLeadership::new(false, None));
        assert_eq!(
            reply.text,
            "{\"state\":\"error\",\"msg\":\"ERR wrong number of arguments\"}\r\n"
        );
    }

    #[test]
    fn test_command_not_found_beats_other_faults() {
        let result = JobResult::new("x")
            .with_fault(JobFault::WrongArguments {
                usage: "usage: x".to_string(),
            })
            .with_fault(JobFault::CommandNotFound);
        assert_eq!(encode(&result, &leader()).text, envelope(Some(COMMAND_NOT_FOUND), ReplyKind::Normal));
    }

    #[test]
    fn test_wrong_arguments_sends_usage_verbatim() {
        let result = JobResult::new("pg_add")
            .with_message("+ignored")
            .with_fault(JobFault::WrongArguments {
                usage: "pg_add <cluster> <pgid>".to_string(),
            });
        assert_eq!(encode(&result, &leader()).text, "pg_add <cluster> <pgid>\r\n");
    }

    #[test]
    fn test_invocation_fault() {
        let result = JobResult::new("x").with_fault(JobFault::Invocation("boom".to_string()));
        assert_eq!(
            encode(&result, &leader()).text,
            "{\"state\":\"error\",\"msg\":\"invocation error: boom\"}\r\n"
        );
    }

    #[test]
    fn test_messages_joined() {
        let result = JobResult::new("x")
            .with_message("+OK")
            .with_message("done")
            .with_fault(JobFault::Interrupted);
        assert_eq!(
            encode(&result, &leader()).text,
            "{\"state\":\"success\",\"msg\":\"OK done\"}\r\n"
        );
    }

    #[test]
    fn test_faults_classified() {
        let result = JobResult::new("x")
            .with_fault(JobFault::Coordination("session expired".to_string()))
            .with_fault(JobFault::Interrupted)
            .with_fault(JobFault::Io("bad json".to_string()))
            .with_fault(JobFault::Other("-ERR already exists".to_string()))
            .with_fault(JobFault::Other("no such pg".to_string()));
        assert_eq!(
            encode(&result, &leader()).text,
            "{\"state\":\"error\",\"msg\":\"ERR coordination service error -ERR internal error \
             -ERR Can not convert raw-data to json-format -ERR already exists -ERR no such pg\"}\r\n"
        );
    }

    #[test]
    fn test_empty_result_is_internal_error() {
        let result = JobResult::new("x");
        assert_eq!(
            encode(&result, &leader()).text,
            "{\"state\":\"error\",\"msg\":\"ERR internal error\"}\r\n"
        );
    }

    #[test]
    fn test_fallback() {
        let reply = Reply::fallback(&"Reply is not representable in windows-1252");
        assert_eq!(
            reply.text,
            "{\"state\":\"error\",\"msg\":\"ERR Reply is not representable in windows-1252\"}\r\n"
        );
    }
}
