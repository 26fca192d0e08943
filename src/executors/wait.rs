//! # Executor de Espera (variante `wait` do step)
//!
//! Duas formas, mutuamente exclusivas pela presença de `condition`:
//!
//! - **Fixa**: aguarda `seconds` e termina. Falha se `seconds` for negativo
//!   ou maior que o timeout do step.
//! - **Condicional**: reavalia `condition` (uma expressão C1) a cada
//!   `interval` segundos até ela ficar verdadeira ou `max_wait` se esgotar,
//!   quando então falha com categoria `timeout`.
//!
//! Grounding: o antigo `executors/wait.rs` (pausa simples via
//! `tokio::time::sleep`, span OTEL com duração real medida) para o caso
//! fixo; o polling condicional é um "supplement" do §4.7.3 sem equivalente
//! no professor, desenhado na mesma disciplina de erro tipado do resto do
//! motor.

use std::time::{Duration, Instant};

use crate::errors::{ErrorCode, StructuredError};
use crate::model::{PerformanceMetrics, Step};
use crate::variables::VariableManager;

use super::{self_envelope, PerformOutcome};

const DEFAULT_POLL_INTERVAL_SECS: f64 = 0.5;

pub async fn perform(
    step: &Step,
    vm: &VariableManager,
    timeout: Duration,
) -> Result<PerformOutcome, StructuredError> {
    let (seconds, condition, interval, max_wait) = match step {
        Step::Wait {
            seconds,
            condition,
            interval,
            max_wait,
            ..
        } => (*seconds, condition, *interval, *max_wait),
        _ => unreachable!("dispatch_perform só chama wait::perform para Step::Wait"),
    };

    if let Some(expr) = condition {
        perform_conditional(step, vm, expr, interval, max_wait, timeout).await
    } else {
        perform_fixed(step, seconds.unwrap_or(0.0), timeout).await
    }
}

async fn perform_fixed(
    step: &Step,
    seconds: f64,
    timeout: Duration,
) -> Result<PerformOutcome, StructuredError> {
    if seconds < 0.0 {
        return Err(
            StructuredError::new(ErrorCode::MISSING_VARIANT_FIELD, "seconds não pode ser negativo")
                .with_step_name(step.name()),
        );
    }
    if seconds > timeout.as_secs_f64() {
        return Err(StructuredError::new(
            ErrorCode::STEP_TIMEOUT,
            format!("seconds ({}) excede o timeout do step ({}s)", seconds, timeout.as_secs_f64()),
        )
        .with_step_name(step.name()));
    }

    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    let actual_wait_seconds = start.elapsed().as_secs_f64();
    let total_time = actual_wait_seconds * 1000.0;

    Ok(PerformOutcome::new(
        self_envelope(serde_json::json!({
            "wait_type": "fixed",
            "actual_wait_seconds": actual_wait_seconds,
        })),
        PerformanceMetrics {
            total_time,
            ..Default::default()
        },
    ))
}

async fn perform_conditional(
    step: &Step,
    vm: &VariableManager,
    condition: &str,
    interval: Option<f64>,
    max_wait: Option<f64>,
    timeout: Duration,
) -> Result<PerformOutcome, StructuredError> {
    let interval_secs = interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS).max(0.01);
    let max_wait_secs = max_wait.unwrap_or(timeout.as_secs_f64());

    if max_wait_secs > timeout.as_secs_f64() {
        return Err(StructuredError::new(
            ErrorCode::STEP_TIMEOUT,
            format!("max_wait ({}) excede o timeout do step ({}s)", max_wait_secs, timeout.as_secs_f64()),
        )
        .with_step_name(step.name()));
    }

    let start = Instant::now();
    loop {
        if vm.eval_condition(condition) {
            let actual_wait_seconds = start.elapsed().as_secs_f64();
            let total_time = actual_wait_seconds * 1000.0;
            return Ok(PerformOutcome::new(
                self_envelope(serde_json::json!({
                    "wait_type": "conditional",
                    "condition_met": true,
                    "actual_wait_seconds": actual_wait_seconds,
                })),
                PerformanceMetrics {
                    total_time,
                    ..Default::default()
                },
            ));
        }

        if start.elapsed().as_secs_f64() >= max_wait_secs {
            return Err(StructuredError::new(
                ErrorCode::WAIT_TIMEOUT,
                format!("condição '{}' não ficou verdadeira em {}s", condition, max_wait_secs),
            )
            .with_step_name(step.name()));
        }

        tokio::time::sleep(Duration::from_secs_f64(interval_secs)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepCommon;
    use serde_json::json;

    fn fixed_wait(seconds: f64) -> Step {
        Step::Wait {
            name: "w".to_string(),
            common: StepCommon::default(),
            seconds: Some(seconds),
            condition: None,
            interval: None,
            max_wait: None,
        }
    }

    #[tokio::test]
    async fn fixed_wait_succeeds_within_timeout() {
        let step = fixed_wait(0.01);
        let vm = VariableManager::new();
        let outcome = perform(&step, &vm, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome.response["wait_type"], "fixed");
        assert!(outcome.response["actual_wait_seconds"].as_f64().unwrap() >= 0.01);
    }

    #[tokio::test]
    async fn fixed_wait_rejects_negative_seconds() {
        let step = fixed_wait(-1.0);
        let vm = VariableManager::new();
        let result = perform(&step, &vm, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fixed_wait_rejects_seconds_above_timeout() {
        let step = fixed_wait(5.0);
        let vm = VariableManager::new();
        let result = perform(&step, &vm, Duration::from_millis(100)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn conditional_wait_succeeds_when_condition_is_already_true() {
        let mut vm = VariableManager::new();
        vm.set("ready", json!(true));
        let step = Step::Wait {
            name: "poll".to_string(),
            common: StepCommon::default(),
            seconds: None,
            condition: Some("{{ready}}".to_string()),
            interval: Some(0.01),
            max_wait: Some(1.0),
        };
        let outcome = perform(&step, &vm, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.response["condition_met"], true);
    }

    #[tokio::test]
    async fn conditional_wait_times_out_with_timeout_category() {
        let vm = VariableManager::new();
        let step = Step::Wait {
            name: "poll".to_string(),
            common: StepCommon::default(),
            seconds: None,
            condition: Some("{{never}}".to_string()),
            interval: Some(0.01),
            max_wait: Some(0.05),
        };
        let result = perform(&step, &vm, Duration::from_secs(5)).await;
        let err = result.unwrap_err();
        assert_eq!(err.code.category(), crate::model::ErrorCategory::Timeout);
    }

    #[tokio::test]
    async fn max_wait_above_timeout_is_rejected_upfront() {
        let vm = VariableManager::new();
        let step = Step::Wait {
            name: "poll".to_string(),
            common: StepCommon::default(),
            seconds: None,
            condition: Some("{{never}}".to_string()),
            interval: Some(0.01),
            max_wait: Some(10.0),
        };
        let result = perform(&step, &vm, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
