#![forbid(unsafe_code)]

use flowguard_ast::Span;
use flowguard_core::{TransformError, TransformStats};
use miette::IntoDiagnostic;
use serde::Serialize;

pub const CHECK_SCHEMA: &str = "flowguard.check.v1";

#[derive(Debug, Clone, Serialize)]
pub struct SpanRange {
    pub offset: usize,
    pub len: usize,
}

impl From<Span> for SpanRange {
    fn from(s: Span) -> Self {
        Self {
            offset: s.offset(),
            len: s.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub schema: &'static str,
    pub input: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    /// `parse`, `contract` or `internal`.
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SpanRange>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsReport {
    pub functions: usize,
    pub guards_inserted: usize,
    pub statically_verified: usize,
}

impl From<&TransformStats> for StatsReport {
    fn from(s: &TransformStats) -> Self {
        Self {
            functions: s.functions,
            guards_inserted: s.guards_inserted,
            statically_verified: s.statically_verified,
        }
    }
}

impl CheckReport {
    pub fn success(input: &str, stats: &TransformStats) -> Self {
        Self {
            schema: CHECK_SCHEMA,
            input: input.to_string(),
            ok: true,
            error: None,
            stats: Some(stats.into()),
        }
    }

    pub fn transform_failure(input: &str, err: &TransformError) -> Self {
        let kind = if err.is_contract() { "contract" } else { "internal" };
        Self::failure(
            input,
            ErrorReport {
                kind,
                message: err.message().to_string(),
                span: Some(err.span().into()),
            },
        )
    }

    pub fn parse_failure(input: &str, err: &miette::Report) -> Self {
        Self::failure(
            input,
            ErrorReport {
                kind: "parse",
                message: err.to_string(),
                span: None,
            },
        )
    }

    fn failure(input: &str, error: ErrorReport) -> Self {
        Self {
            schema: CHECK_SCHEMA,
            input: input.to_string(),
            ok: false,
            error: Some(error),
            stats: None,
        }
    }

    pub fn to_json(&self) -> miette::Result<String> {
        serde_json::to_string_pretty(self).into_diagnostic()
    }
}

/// One-line human summary for `check`.
pub fn summary(input: &str, stats: &TransformStats) -> String {
    format!(
        "{input}: ok ({} {}, {} {} inserted, {} {} statically verified)",
        stats.functions,
        plural(stats.functions, "function", "functions"),
        stats.guards_inserted,
        plural(stats.guards_inserted, "guard", "guards"),
        stats.statically_verified,
        plural(stats.statically_verified, "site", "sites"),
    )
}

fn plural(n: usize, one: &'static str, many: &'static str) -> &'static str {
    if n == 1 { one } else { many }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_count_with_plurals() {
        let stats = TransformStats {
            functions: 1,
            guards_inserted: 2,
            statically_verified: 0,
        };
        assert_eq!(
            summary("a.js", &stats),
            "a.js: ok (1 function, 2 guards inserted, 0 sites statically verified)"
        );
    }

    #[test]
    fn failures_carry_kind_and_span() {
        let program = flowguard_parse::parse_source("function h(): string { return 1; }")
            .expect("parse");
        let err = flowguard_core::transform_program(&program).unwrap_err();
        let report = CheckReport::transform_failure("h.js", &err);
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json().expect("json")).expect("valid json");
        assert_eq!(json["schema"], CHECK_SCHEMA);
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["kind"], "contract");
        assert_eq!(
            json["error"]["message"],
            "Invalid return type, expected string, got number."
        );
        assert!(json["error"]["span"]["len"].as_u64().is_some());
        assert!(json.get("stats").is_none());
    }
}
