//! # Módulo de Coleta de Resultados - Agregador e Máscara de Dados Sensíveis (C9)
//!
//! Agrega a lista ordenada de `StepResult`s de um `TestCase` num único
//! `TestCaseResult`, calcula as estatísticas agregadas, e serializa o
//! contrato JSON externo (§6), aplicando o mascaramento de dados sensíveis
//! sobre respostas e dumps de variáveis.
//!
//! ## Para todos entenderem:
//!
//! Depois que todos os steps rodaram, alguém precisa responder: "no total,
//! esse caso de teste passou?", "quanto tempo levou?", "quais variáveis
//! sobraram no final?". É isso que este módulo faz — e é também o último
//! lugar onde um valor passa antes de sair da engine, então é aqui que
//! senhas e tokens são trocados por `"***"`.
//!
//! Grounding: `original_source/.../result/collector.py`'s `ResultCollector`
//! (`collect`, `to_v2_json`, `_mask_variables`/`_mask_sensitive_data` por
//! substring de chave, lista fixa de padrões) — grounding direto e
//! definitivo para este módulo, sem equivalente no professor (UTDL não tem
//! coletor separado do `main.rs`).

use serde_json::{Map, Value};

use crate::model::{StepResult, StepStatus, TestCase, TestCaseResult, TestCaseStatus};

/// Padrões de nome de chave que disparam o mascaramento (§4.9): qualquer
/// chave cujo nome, em minúsculas, contenha um destes substrings tem seu
/// valor substituído por `"***"`, recursivamente, em respostas e dumps de
/// variáveis.
pub const SENSITIVE_PATTERNS: &[&str] = &["password", "pwd", "token", "secret", "key", "auth"];

/// Agrega `step_results` (já na ordem de execução) num `TestCaseResult`:
/// calcula `status`, janela `start_time`/`end_time`, contadores, e a união
/// de variáveis finais (step posterior vence em colisão de nome).
pub fn collect(test_case: &TestCase, step_results: Vec<StepResult>) -> TestCaseResult {
    let start_time = step_results
        .iter()
        .map(|sr| sr.start_time.as_str())
        .min()
        .unwrap_or_default()
        .to_string();
    let end_time = step_results
        .iter()
        .map(|sr| sr.end_time.as_str())
        .max()
        .unwrap_or_default()
        .to_string();

    let duration = duration_seconds(&start_time, &end_time);

    let total_steps = step_results.len();
    let passed_steps = step_results
        .iter()
        .filter(|sr| sr.status == StepStatus::Success)
        .count();
    let failed_steps = step_results
        .iter()
        .filter(|sr| matches!(sr.status, StepStatus::Failure | StepStatus::Error))
        .count();
    let skipped_steps = step_results
        .iter()
        .filter(|sr| sr.status == StepStatus::Skipped)
        .count();

    let status = if failed_steps > 0 {
        TestCaseStatus::Failed
    } else if total_steps > 0 && skipped_steps == total_steps {
        TestCaseStatus::Skipped
    } else {
        TestCaseStatus::Passed
    };

    let mut final_variables = std::collections::HashMap::new();
    for sr in &step_results {
        for (k, v) in &sr.extracted_vars {
            final_variables.insert(k.clone(), v.clone());
        }
    }

    let error_info = step_results
        .iter()
        .find(|sr| matches!(sr.status, StepStatus::Failure | StepStatus::Error) && sr.error_info.is_some())
        .and_then(|sr| sr.error_info.clone());

    TestCaseResult {
        name: test_case.name.clone(),
        status,
        start_time,
        end_time,
        duration,
        total_steps,
        passed_steps,
        failed_steps,
        skipped_steps,
        step_results,
        final_variables,
        error_info,
    }
}

/// Diferença em segundos entre dois timestamps ISO-8601; `0.0` se algum
/// dos dois não parsear (caso de teste sem steps, por exemplo).
fn duration_seconds(start: &str, end: &str) -> f64 {
    let parsed_start = chrono::DateTime::parse_from_rfc3339(start).ok();
    let parsed_end = chrono::DateTime::parse_from_rfc3339(end).ok();
    match (parsed_start, parsed_end) {
        (Some(s), Some(e)) => (e - s).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    }
}

/// Serializa `result` no contrato JSON externo estável de §6, aplicando
/// mascaramento de dados sensíveis quando `mask_sensitive` é `true`.
pub fn to_report_json(result: &TestCaseResult, mask_sensitive: bool) -> Value {
    let pass_rate = if result.total_steps > 0 {
        result.passed_steps as f64 / result.total_steps as f64 * 100.0
    } else {
        0.0
    };

    let mut report = serde_json::json!({
        "test_case": {
            "name": result.name,
            "status": status_str(result.status),
            "start_time": result.start_time,
            "end_time": result.end_time,
            "duration": result.duration,
        },
        "statistics": {
            "total_steps": result.total_steps,
            "passed_steps": result.passed_steps,
            "failed_steps": result.failed_steps,
            "skipped_steps": result.skipped_steps,
            "pass_rate": pass_rate,
        },
        "steps": result.step_results.iter().map(|sr| step_json(sr, mask_sensitive)).collect::<Vec<_>>(),
        "final_variables": mask_value(&serde_json::to_value(&result.final_variables).unwrap_or(Value::Null), mask_sensitive),
    });

    if let Some(err) = &result.error_info {
        report["error_info"] = serde_json::to_value(err).unwrap_or(Value::Null);
    }

    report
}

fn step_json(step: &StepResult, mask_sensitive: bool) -> Value {
    serde_json::json!({
        "name": step.name,
        "status": status_str_step(step.status),
        "start_time": step.start_time,
        "end_time": step.end_time,
        "retry_count": step.retry_count,
        "performance": step.performance,
        "response": mask_value(&step.response, mask_sensitive),
        "extracted_vars": mask_value(&serde_json::to_value(&step.extracted_vars).unwrap_or(Value::Null), mask_sensitive),
        "validations": step.validation_results,
        "error_info": step.error_info,
    })
}

fn status_str(status: TestCaseStatus) -> &'static str {
    match status {
        TestCaseStatus::Passed => "passed",
        TestCaseStatus::Failed => "failed",
        TestCaseStatus::Skipped => "skipped",
    }
}

fn status_str_step(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Success => "success",
        StepStatus::Failure => "failure",
        StepStatus::Skipped => "skipped",
        StepStatus::Error => "error",
        StepStatus::Pending => "pending",
    }
}

/// Mascara recursivamente qualquer chave de objeto cujo nome (minúsculas)
/// contenha um padrão de `SENSITIVE_PATTERNS`, substituindo o valor por
/// `"***"`. Arrays são percorridos elemento a elemento; valores escalares
/// não-objeto/array são devolvidos inalterados.
pub fn mask_value(value: &Value, enabled: bool) -> Value {
    if !enabled {
        return value.clone();
    }
    match value {
        Value::Object(map) => {
            let mut masked = Map::with_capacity(map.len());
            for (k, v) in map {
                if is_sensitive_key(k) {
                    masked.insert(k.clone(), Value::String("***".to_string()));
                } else {
                    masked.insert(k.clone(), mask_value(v, enabled));
                }
            }
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| mask_value(v, enabled)).collect()),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorCategory, ErrorInfo, GlobalConfig, PerformanceMetrics, ValidationOutcome};
    use serde_json::json;
    use std::collections::HashMap;

    fn test_case() -> TestCase {
        TestCase {
            name: "demo".to_string(),
            description: None,
            tags: Vec::new(),
            enabled: true,
            setup: None,
            teardown: None,
            config: GlobalConfig::default(),
            steps: Vec::new(),
        }
    }

    fn step(name: &str, status: StepStatus, start: &str, end: &str) -> StepResult {
        StepResult {
            name: name.to_string(),
            status,
            response: Value::Null,
            extracted_vars: HashMap::new(),
            validation_results: Vec::new(),
            performance: PerformanceMetrics::default(),
            error_info: None,
            start_time: start.to_string(),
            end_time: end.to_string(),
            retry_count: 0,
            variables_snapshot: HashMap::new(),
        }
    }

    #[test]
    fn status_is_passed_when_all_steps_succeed() {
        let results = vec![
            step("a", StepStatus::Success, "2026-01-01T00:00:00Z", "2026-01-01T00:00:01Z"),
            step("b", StepStatus::Success, "2026-01-01T00:00:01Z", "2026-01-01T00:00:02Z"),
        ];
        let aggregated = collect(&test_case(), results);
        assert_eq!(aggregated.status, TestCaseStatus::Passed);
        assert_eq!(aggregated.passed_steps, 2);
    }

    #[test]
    fn status_is_failed_when_any_step_fails() {
        let results = vec![
            step("a", StepStatus::Success, "2026-01-01T00:00:00Z", "2026-01-01T00:00:01Z"),
            step("b", StepStatus::Failure, "2026-01-01T00:00:01Z", "2026-01-01T00:00:02Z"),
        ];
        let aggregated = collect(&test_case(), results);
        assert_eq!(aggregated.status, TestCaseStatus::Failed);
        assert_eq!(aggregated.failed_steps, 1);
    }

    #[test]
    fn status_is_skipped_when_every_step_is_skipped() {
        let results = vec![
            step("a", StepStatus::Skipped, "2026-01-01T00:00:00Z", "2026-01-01T00:00:00Z"),
            step("b", StepStatus::Skipped, "2026-01-01T00:00:00Z", "2026-01-01T00:00:00Z"),
        ];
        let aggregated = collect(&test_case(), results);
        assert_eq!(aggregated.status, TestCaseStatus::Skipped);
    }

    #[test]
    fn duration_is_computed_from_step_window() {
        let results = vec![step(
            "a",
            StepStatus::Success,
            "2026-01-01T00:00:00Z",
            "2026-01-01T00:00:02.500Z",
        )];
        let aggregated = collect(&test_case(), results);
        assert!((aggregated.duration - 2.5).abs() < 0.01);
    }

    #[test]
    fn later_step_wins_on_final_variable_name_clash() {
        let mut a = step("a", StepStatus::Success, "2026-01-01T00:00:00Z", "2026-01-01T00:00:01Z");
        a.extracted_vars.insert("tok".to_string(), json!("first"));
        let mut b = step("b", StepStatus::Success, "2026-01-01T00:00:01Z", "2026-01-01T00:00:02Z");
        b.extracted_vars.insert("tok".to_string(), json!("second"));
        let aggregated = collect(&test_case(), vec![a, b]);
        assert_eq!(aggregated.final_variables.get("tok"), Some(&json!("second")));
    }

    #[test]
    fn first_failing_step_error_info_is_surfaced_on_case() {
        let mut a = step("a", StepStatus::Failure, "2026-01-01T00:00:00Z", "2026-01-01T00:00:01Z");
        a.error_info = Some(ErrorInfo {
            error_type: "AssertionError".to_string(),
            category: ErrorCategory::Assertion,
            message: "boom".to_string(),
            suggestion: String::new(),
            stack_trace: String::new(),
        });
        let aggregated = collect(&test_case(), vec![a]);
        assert!(aggregated.error_info.is_some());
        assert_eq!(aggregated.error_info.unwrap().message, "boom");
    }

    #[test]
    fn masking_replaces_sensitive_keys_recursively() {
        let value = json!({
            "user": "ana",
            "password": "hunter2",
            "nested": {"api_key": "xyz", "ok": true},
            "tokens": [{"auth_token": "abc"}],
        });
        let masked = mask_value(&value, true);
        assert_eq!(masked["user"], "ana");
        assert_eq!(masked["password"], "***");
        assert_eq!(masked["nested"]["api_key"], "***");
        assert_eq!(masked["nested"]["ok"], true);
        assert_eq!(masked["tokens"][0]["auth_token"], "***");
    }

    #[test]
    fn masking_disabled_leaves_values_untouched() {
        let value = json!({"password": "hunter2"});
        let masked = mask_value(&value, false);
        assert_eq!(masked["password"], "hunter2");
    }

    #[test]
    fn report_json_matches_external_schema_shape() {
        let results = vec![step("a", StepStatus::Success, "2026-01-01T00:00:00Z", "2026-01-01T00:00:01Z")];
        let aggregated = collect(&test_case(), results);
        let report = to_report_json(&aggregated, true);
        assert!(report["test_case"]["name"].is_string());
        assert!(report["statistics"]["pass_rate"].is_number());
        assert!(report["steps"].is_array());
        assert!(report["final_variables"].is_object());
    }

    #[test]
    fn validation_outcomes_round_trip_into_report() {
        let mut a = step("a", StepStatus::Failure, "2026-01-01T00:00:00Z", "2026-01-01T00:00:01Z");
        a.validation_results.push(ValidationOutcome {
            passed: false,
            rule_type: "eq".to_string(),
            path: "$.body.ok".to_string(),
            actual: json!(false),
            expected: json!(true),
            description: String::new(),
            error: String::new(),
        });
        let aggregated = collect(&test_case(), vec![a]);
        let report = to_report_json(&aggregated, true);
        assert_eq!(report["steps"][0]["validations"][0]["passed"], false);
    }
}
