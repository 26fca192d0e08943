//! # Executor de Laço (variante `loop` do step)
//!
//! Duas formas, por `loop_type`:
//!
//! - **for**: repete `loop_count` vezes, vinculando o índice (0-based) a
//!   `loop_variable`.
//! - **while**: reavalia `loop_condition` no topo de cada iteração; para
//!   quando falsa ou ao atingir o teto de iterações `WHILE_ITERATION_CEILING`
//!   (protege contra um caso de teste que nunca convirja).
//!
//! Cada iteração roda num escopo isolado (`VariableManager::scope`): o
//! binding de `loop_variable` e qualquer variável extraída durante a
//! iteração são descartados ao sair do escopo, e então reaplicados
//! manualmente — "promovidos" — para a camada `extracted` externa, exceto
//! o próprio `loop_variable`. Isso é o que a §4.7.4 pede: nada do estado
//! interno do laço vaza, menos o que os steps do corpo extraíram de
//! verdade.
//!
//! Uma falha numa iteração não aborta o laço: cada iteração é registrada
//! (sucesso/falha) e a execução continua.
//!
//! Grounding: não há executor de laço no professor (UTDL não tem a noção);
//! desenhado a partir de §4.7.4 reaproveitando o `ScopeGuard` de
//! `crate::variables` e a própria função recursiva `execute_step` deste
//! crate para rodar o corpo do laço.

use std::collections::HashMap;

use serde_json::Value;

use crate::errors::StructuredError;
use crate::model::{GlobalConfig, LoopType, PerformanceMetrics, Step, StepResult, StepStatus};
use crate::variables::VariableManager;

use super::{execute_step, self_envelope, PerformOutcome};

const WHILE_ITERATION_CEILING: u64 = 1000;

pub async fn perform(
    step: &Step,
    vm: &mut VariableManager,
    config: &GlobalConfig,
) -> Result<PerformOutcome, StructuredError> {
    let (loop_type, loop_count, loop_condition, loop_variable, loop_steps) = match step {
        Step::Loop {
            loop_type,
            loop_count,
            loop_condition,
            loop_variable,
            loop_steps,
            ..
        } => (*loop_type, *loop_count, loop_condition, loop_variable, loop_steps),
        _ => unreachable!("dispatch_perform só chama loop_exec::perform para Step::Loop"),
    };

    let start = std::time::Instant::now();
    let mut iteration_results: Vec<Value> = Vec::new();
    let mut success_count = 0usize;
    let mut failure_count = 0usize;
    let mut index: u64 = 0;

    loop {
        match loop_type {
            LoopType::For => {
                if index >= loop_count.unwrap_or(0) {
                    break;
                }
            }
            LoopType::While => {
                if index >= WHILE_ITERATION_CEILING {
                    break;
                }
                let condition = loop_condition.as_deref().unwrap_or("false");
                if !vm.eval_condition(condition) {
                    break;
                }
            }
        }

        let (results, promoted) = run_iteration(loop_steps, loop_variable, index, vm, config).await;

        let iteration_passed = results
            .iter()
            .all(|r| matches!(r.status, StepStatus::Success | StepStatus::Skipped));
        if iteration_passed {
            success_count += 1;
        } else {
            failure_count += 1;
        }

        for (name, value) in promoted {
            vm.set(name, value);
        }

        iteration_results.push(serde_json::json!({
            "index": index,
            "passed": iteration_passed,
            "steps": results,
        }));

        index += 1;
    }

    let total_time = start.elapsed().as_secs_f64() * 1000.0;

    let envelope = self_envelope(serde_json::json!({
        "iteration_count": index,
        "success_count": success_count,
        "failure_count": failure_count,
        "iterations": iteration_results,
    }));

    Ok(PerformOutcome::new(
        envelope,
        PerformanceMetrics {
            total_time,
            ..Default::default()
        },
    ))
}

async fn run_iteration(
    loop_steps: &[Step],
    loop_variable: &str,
    index: u64,
    vm: &mut VariableManager,
    config: &GlobalConfig,
) -> (Vec<StepResult>, HashMap<String, Value>) {
    let mut results = Vec::new();
    let mut promoted: HashMap<String, Value> = HashMap::new();
    let mut local_previous: HashMap<String, StepStatus> = HashMap::new();

    {
        let mut guard = vm.scope();
        guard.manager().set(loop_variable.to_string(), Value::from(index));

        for inner in loop_steps {
            let result = execute_step(inner, guard.manager(), &local_previous, config).await;
            local_previous.insert(result.name.clone(), result.status);
            for (k, v) in &result.extracted_vars {
                promoted.insert(k.clone(), v.clone());
            }
            results.push(result);
        }
        // guard dropa aqui sem commit: loop_variable e qualquer extração
        // feita dentro do escopo são revertidas; só o que foi copiado para
        // `promoted` sobrevive.
    }

    (results, promoted)
}
