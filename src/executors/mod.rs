//! # Módulo de Executores - Ciclo de Vida Compartilhado de Step (C7)
//!
//! Implementa o ciclo de vida descrito em §4.7 como uma única função
//! (`execute_step`) parametrizada sobre a variante de `Step`: cada tipo de
//! step contribui apenas a sua lógica de "renderizar + executar I/O"
//! (`perform`, um por submódulo); gate, setup/teardown, laço de tentativas,
//! validação, extração e classificação de erro são os mesmos para todos.
//!
//! ## Para todos entenderem:
//!
//! Pense numa linha de montagem que é igual para qualquer produto: só a
//! peça específica (HTTP, banco, espera, laço, bloco concorrente, script)
//! muda. É por isso que existe só uma função `execute_step`, e seis
//! módulos pequenos (`request`, `database`, `wait`, `loop_exec`,
//! `concurrent`, `script`) que sabem fazer apenas a parte deles.
//!
//! Grounding: a reescrita de §9 ("re-model as a single lifecycle function
//! parameterised over an Executor capability") e o ciclo de vida de
//! `original_source/.../executor/step_executor.py`'s `execute()`
//! (`_should_execute`, laço de tentativas com `time.sleep(min(2**attempt,10))`,
//! teardown, `_extract_variables`, `_create_error_info`). O antigo
//! `StepExecutor` trait + `DagPlanner` (despacho por `can_handle`) não se
//! aplica mais: a variante do `Step` já identifica o executor certo em
//! tempo de compilação.

pub mod concurrent;
pub mod database;
pub mod loop_exec;
pub mod request;
pub mod script;
pub mod wait;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::errors::{ErrorCode, StructuredError};
use crate::model::{
    ErrorCategory, Extractor, GlobalConfig, Hook, PerformanceMetrics, Step, StepResult,
    StepStatus, ValidationOutcome,
};
use crate::retry;
use crate::validation;
use crate::variables::VariableManager;

/// O que um `perform` de variante devolve ao ciclo de vida comum: o
/// envelope de resposta (contra o qual validações/extrações rodam),
/// métricas de desempenho, e variáveis extras que a variante quer gravar
/// na camada `extracted` além dos extractors declarados (usado por
/// `loop`/`concurrent`/`script`, que produzem bindings por natureza).
#[derive(Debug, Default)]
pub struct PerformOutcome {
    pub response: Value,
    pub performance: PerformanceMetrics,
    pub extra_vars: HashMap<String, Value>,
}

impl PerformOutcome {
    pub fn new(response: Value, performance: PerformanceMetrics) -> Self {
        Self {
            response,
            performance,
            extra_vars: HashMap::new(),
        }
    }
}

/// Envelopa `details` (um objeto JSON) também sob a chave `body`, para que
/// extractors/validations escritos contra `$.body.<campo>` funcionem do
/// mesmo jeito em steps que não têm uma "resposta" de verdade (wait, loop,
/// concurrent) quanto em request/database.
pub(super) fn self_envelope(details: Value) -> Value {
    let mut envelope = details.clone();
    if let Some(obj) = envelope.as_object_mut() {
        obj.insert("body".to_string(), details);
    }
    envelope
}

/// Executa um step (de qualquer variante) aplicando o ciclo de vida
/// completo de §4.7. Recursiva para `loop`/`concurrent` (cujo corpo é,
/// ele mesmo, uma lista de `Step`), por isso devolve um future "boxado":
/// sem isso o tamanho do future seria infinito (um `Step::Loop` contém
/// `Vec<Step>`, cujo `execute_step` contém outro `Step::Loop`...).
#[instrument(skip(step, vm, previous, config), fields(step = %step.name(), kind = %step.kind()))]
pub fn execute_step<'a>(
    step: &'a Step,
    vm: &'a mut VariableManager,
    previous: &'a HashMap<String, StepStatus>,
    config: &'a GlobalConfig,
) -> Pin<Box<dyn Future<Output = StepResult> + Send + 'a>> {
    Box::pin(async move {
        let start_time = Utc::now();
        let common = step.common();

        if let Some(reason) = gate(step, vm, previous) {
            return skipped_result(step, start_time, reason);
        }

        if let Some(hook) = &common.setup {
            run_hook(hook, vm, config).await;
        }

        let timeout = Duration::from_secs_f64(common.timeout.unwrap_or(config.timeout).max(0.0));
        let retry_times = common.retry_times.unwrap_or(config.retry_times);

        let mut last_response: Value = Value::Null;
        let mut last_performance = PerformanceMetrics::default();
        let mut last_error: Option<StructuredError> = None;
        let mut validations: Vec<ValidationOutcome> = Vec::new();
        let mut extracted_this_step: HashMap<String, Value> = HashMap::new();
        let mut attempt_used: u32 = 0;
        let mut success = false;

        for attempt in 0..=retry_times {
            attempt_used = attempt;

            match dispatch_perform(step, vm, timeout, previous, config).await {
                Ok(outcome) => {
                    let results = validation::validate(&common.validations, &outcome.response);
                    let all_passed = results.iter().all(|r| r.passed);
                    if all_passed {
                        commit_extractors(&common.extractors, &outcome, vm, &mut extracted_this_step);
                    }
                    last_response = outcome.response;
                    last_performance = outcome.performance;
                    validations = results;
                    last_error = None;
                    if all_passed {
                        success = true;
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(e);
                    validations = Vec::new();
                }
            }

            if attempt < retry_times {
                retry::sleep_backoff(attempt).await;
            }
        }

        if let Some(hook) = &common.teardown {
            run_hook(hook, vm, config).await;
        }

        let status = if success {
            StepStatus::Success
        } else if last_error.is_some() {
            StepStatus::Error
        } else {
            StepStatus::Failure
        };

        let error_info = if success {
            None
        } else if let Some(err) = &last_error {
            Some(err.to_error_info(error_type_name(err.code.category())))
        } else {
            let failing: Vec<String> = validations
                .iter()
                .filter(|v| !v.passed)
                .map(|v| v.error.clone())
                .collect();
            let message = if failing.is_empty() {
                "validação falhou".to_string()
            } else {
                failing.join("; ")
            };
            Some(
                StructuredError::new(ErrorCode::VALIDATION_FAILED, message)
                    .with_step_name(step.name())
                    .to_error_info(error_type_name(ErrorCategory::Assertion)),
            )
        };

        StepResult {
            name: step.name().to_string(),
            status,
            response: last_response,
            extracted_vars: extracted_this_step,
            validation_results: validations,
            performance: last_performance,
            error_info,
            start_time: start_time.to_rfc3339(),
            end_time: Utc::now().to_rfc3339(),
            retry_count: attempt_used,
            variables_snapshot: vm
                .all()
                .as_object()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect(),
        }
    })
}

async fn dispatch_perform<'a>(
    step: &'a Step,
    vm: &'a mut VariableManager,
    timeout: Duration,
    previous: &'a HashMap<String, StepStatus>,
    config: &'a GlobalConfig,
) -> Result<PerformOutcome, StructuredError> {
    match step {
        Step::Request { .. } => request::perform(step, vm, timeout).await,
        Step::Database { .. } => database::perform(step, vm, timeout).await,
        Step::Wait { .. } => wait::perform(step, vm, timeout).await,
        Step::Script { .. } => script::perform(step, vm).await,
        Step::Loop { .. } => loop_exec::perform(step, vm, config).await,
        Step::Concurrent { .. } => concurrent::perform(step, vm, config, previous).await,
    }
}

fn gate(step: &Step, vm: &VariableManager, previous: &HashMap<String, StepStatus>) -> Option<String> {
    let common = step.common();

    if let Some(expr) = &common.skip_if {
        if vm.eval_condition(expr) {
            return Some(format!("skip_if '{}' é verdadeiro", expr));
        }
    }

    if let Some(expr) = &common.only_if {
        if !vm.eval_condition(expr) {
            return Some(format!("only_if '{}' é falso", expr));
        }
    }

    for dep in &common.depends_on {
        match previous.get(dep) {
            Some(StepStatus::Success) => {}
            _ => return Some(format!("dependência '{}' não teve sucesso", dep)),
        }
    }

    None
}

fn skipped_result(step: &Step, start_time: DateTime<Utc>, reason: String) -> StepResult {
    warn!(step = %step.name(), reason = %reason, "step pulado");
    StepResult {
        name: step.name().to_string(),
        status: StepStatus::Skipped,
        response: Value::Null,
        extracted_vars: HashMap::new(),
        validation_results: Vec::new(),
        performance: PerformanceMetrics::default(),
        error_info: None,
        start_time: start_time.to_rfc3339(),
        end_time: Utc::now().to_rfc3339(),
        retry_count: 0,
        variables_snapshot: HashMap::new(),
    }
}

/// Roda um hook (setup/teardown): uma sequência de steps aninhados cujas
/// dependências são locais ao hook (não enxergam os steps do caso de
/// teste em volta).
async fn run_hook(hook: &Hook, vm: &mut VariableManager, config: &GlobalConfig) {
    let mut local_previous: HashMap<String, StepStatus> = HashMap::new();
    for step in &hook.steps {
        let result = execute_step(step, vm, &local_previous, config).await;
        local_previous.insert(result.name.clone(), result.status);
    }
}

fn commit_extractors(
    extractors: &[Extractor],
    outcome: &PerformOutcome,
    vm: &mut VariableManager,
    bucket: &mut HashMap<String, Value>,
) {
    for ex in extractors {
        match crate::extractors::extract(&ex.extractor_type, &ex.path, ex.index, &outcome.response) {
            Ok(Some(value)) => {
                vm.set(ex.name.clone(), value.clone());
                bucket.insert(ex.name.clone(), value);
            }
            Ok(None) => {
                warn!(extractor = %ex.name, "extractor não encontrou valor na resposta");
            }
            Err(e) => {
                warn!(extractor = %ex.name, error = %e, "falha ao aplicar extractor");
            }
        }
    }

    for (name, value) in &outcome.extra_vars {
        vm.set(name.clone(), value.clone());
        bucket.insert(name.clone(), value.clone());
    }
}

fn error_type_name(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Assertion => "AssertionError",
        ErrorCategory::Network => "NetworkError",
        ErrorCategory::Timeout => "TimeoutError",
        ErrorCategory::Parsing => "ParsingError",
        ErrorCategory::Business => "BusinessError",
        ErrorCategory::System => "SystemError",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LoopType, StepCommon};
    use serde_json::json;

    fn wait_step(name: &str, seconds: f64, depends_on: Vec<&str>) -> Step {
        Step::Wait {
            name: name.to_string(),
            common: StepCommon {
                depends_on: depends_on.into_iter().map(String::from).collect(),
                ..Default::default()
            },
            seconds: Some(seconds),
            condition: None,
            interval: None,
            max_wait: None,
        }
    }

    #[tokio::test]
    async fn successful_fixed_wait_is_success() {
        let step = wait_step("a", 0.01, vec![]);
        let mut vm = VariableManager::new();
        let previous = HashMap::new();
        let config = GlobalConfig::default();
        let result = execute_step(&step, &mut vm, &previous, &config).await;
        assert_eq!(result.status, StepStatus::Success);
        assert_eq!(result.retry_count, 0);
    }

    #[tokio::test]
    async fn depends_on_unsatisfied_is_skipped() {
        let step = wait_step("b", 0.01, vec!["a"]);
        let mut vm = VariableManager::new();
        let mut previous = HashMap::new();
        previous.insert("a".to_string(), StepStatus::Failure);
        let config = GlobalConfig::default();
        let result = execute_step(&step, &mut vm, &previous, &config).await;
        assert_eq!(result.status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn skip_if_truthy_skips_step() {
        let mut vm = VariableManager::new();
        vm.set("flag", json!("yes"));
        let step = Step::Wait {
            name: "c".to_string(),
            common: StepCommon {
                skip_if: Some("{{flag}}".to_string()),
                ..Default::default()
            },
            seconds: Some(0.01),
            condition: None,
            interval: None,
            max_wait: None,
        };
        let previous = HashMap::new();
        let config = GlobalConfig::default();
        let result = execute_step(&step, &mut vm, &previous, &config).await;
        assert_eq!(result.status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn negative_wait_seconds_fails_with_error_category() {
        let step = wait_step("d", -1.0, vec![]);
        let mut vm = VariableManager::new();
        let previous = HashMap::new();
        let config = GlobalConfig::default();
        let result = execute_step(&step, &mut vm, &previous, &config).await;
        assert_eq!(result.status, StepStatus::Error);
        assert!(result.error_info.is_some());
    }

    #[tokio::test]
    async fn failed_validation_does_not_commit_extracted_vars() {
        let step = Step::Wait {
            name: "e".to_string(),
            common: StepCommon {
                retry_times: Some(0),
                validations: vec![crate::model::ValidationRule {
                    rule_type: "eq".to_string(),
                    path: "$.wait_type".to_string(),
                    expect: json!("never-matches"),
                    description: String::new(),
                }],
                extractors: vec![crate::model::Extractor {
                    name: "wt".to_string(),
                    extractor_type: "jsonpath".to_string(),
                    path: "$.wait_type".to_string(),
                    index: 0,
                }],
                ..Default::default()
            },
            seconds: Some(0.01),
            condition: None,
            interval: None,
            max_wait: None,
        };
        let mut vm = VariableManager::new();
        let previous = HashMap::new();
        let config = GlobalConfig::default();
        let result = execute_step(&step, &mut vm, &previous, &config).await;
        assert_eq!(result.status, StepStatus::Failure);
        assert!(result.extracted_vars.is_empty());
        assert!(vm.get("wt").is_none());
    }

    #[tokio::test]
    async fn loop_step_is_dispatched_through_shared_lifecycle() {
        let step = Step::Loop {
            name: "repeat".to_string(),
            common: StepCommon::default(),
            loop_type: LoopType::For,
            loop_count: Some(2),
            loop_condition: None,
            loop_variable: "i".to_string(),
            loop_steps: vec![wait_step("inner", 0.01, vec![])],
        };
        let mut vm = VariableManager::new();
        let previous = HashMap::new();
        let config = GlobalConfig::default();
        let result = execute_step(&step, &mut vm, &previous, &config).await;
        assert_eq!(result.status, StepStatus::Success);
    }
}
