//! Purpose: Provide a stable, serializable report for parse-and-validate checks.
//! Exports: `CheckReport`, `CheckStatus`.
//! Role: Shared contract for `Loader::check`, the `safelit check` command, and API users.
//! Invariants: A rejected report always names the error kind and carries its diagnostic when one exists.
//! Invariants: Reports never embed the evaluated value; checking stops before evaluation.

use serde::Serialize;

use crate::core::diagnostic::Diagnostic;
use crate::core::error::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Rejected,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CheckReport {
    pub source_name: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl CheckReport {
    pub fn ok(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            status: CheckStatus::Ok,
            kind: None,
            message: None,
            diagnostic: None,
        }
    }

    pub fn rejected(source_name: impl Into<String>, err: &Error) -> Self {
        Self {
            source_name: source_name.into(),
            status: CheckStatus::Rejected,
            kind: Some(format!("{:?}", err.kind())),
            message: err.message().map(str::to_string),
            diagnostic: err.diagnostic().cloned(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::{CheckReport, CheckStatus};
    use crate::core::diagnostic::SourceMap;
    use crate::core::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn ok_report_serializes_without_error_fields() {
        let report = CheckReport::ok("conf.lit");
        assert!(report.is_ok());
        assert_eq!(
            serde_json::to_value(&report).expect("json"),
            json!({"source_name": "conf.lit", "status": "ok"})
        );
    }

    #[test]
    fn rejected_report_carries_diagnostic() {
        let source = SourceMap::new("conf.lit", "[1, os]");
        let err = source.error(
            ErrorKind::NameNotAllowed,
            source.pos(4),
            "'os' is not allowed name",
        );
        let report = CheckReport::rejected("conf.lit", &err);
        assert_eq!(report.status, CheckStatus::Rejected);
        assert_eq!(report.kind.as_deref(), Some("NameNotAllowed"));
        let value = serde_json::to_value(&report).expect("json");
        assert_eq!(value["status"], json!("rejected"));
        assert_eq!(value["diagnostic"]["line"], json!(1));
        assert_eq!(value["diagnostic"]["column"], json!(5));
        assert_eq!(value["diagnostic"]["source_line_text"], json!("[1, os]"));
    }
}
