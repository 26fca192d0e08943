//! # Executor Concorrente (variante `concurrent` do step)
//!
//! Roda a lista `steps` em paralelo com um pool de tamanho limitado
//! (`concurrent_threads` do step, ou `GlobalConfig.concurrent_threads`).
//! Cada ramo recebe um clone independente do `VariableManager` — ramos não
//! competem pela camada `extracted` enquanto rodam. Quando todos terminam,
//! as variáveis extraídas por cada ramo são mescladas de volta na ordem
//! declarada em `steps` (não na ordem de conclusão), para que um ramo mais
//! à frente na lista vença em caso de colisão de nome, de forma
//! determinística independente de quem terminou primeiro.
//!
//! Cada ramo é tratado como independente dos demais ramos do mesmo bloco
//! (nenhum `depends_on` entre irmãos de um `concurrent` é resolvido aqui),
//! mas ainda enxerga o `previous` externo: um step dentro de um bloco
//! concorrente pode depender de um step do caso de teste que já rodou
//! antes do bloco.
//!
//! Grounding: o padrão de pool limitado com `Semaphore` + `JoinSet` vem do
//! antigo `planner/mod.rs`'s `DagPlanner::execute`; a diferença é que ali
//! o paralelismo nascia de um grafo de dependências entre TODOS os steps
//! do plano, e aqui é simplesmente "rode esta lista plana com no máximo N
//! ao mesmo tempo" — não há grafo para construir dentro de um bloco
//! `concurrent` (ver DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::errors::StructuredError;
use crate::model::{GlobalConfig, PerformanceMetrics, Step, StepResult, StepStatus};
use crate::variables::VariableManager;

use super::{execute_step, self_envelope, PerformOutcome};

pub async fn perform(
    step: &Step,
    vm: &mut VariableManager,
    config: &GlobalConfig,
    previous: &HashMap<String, StepStatus>,
) -> Result<PerformOutcome, StructuredError> {
    let (branch_steps, threads) = match step {
        Step::Concurrent {
            steps,
            concurrent_threads,
            ..
        } => (steps, concurrent_threads.unwrap_or(config.concurrent_threads)),
        _ => unreachable!("dispatch_perform só chama concurrent::perform para Step::Concurrent"),
    };

    let start = std::time::Instant::now();
    let semaphore = Arc::new(Semaphore::new(threads.max(1)));
    let mut join_set: JoinSet<(usize, StepResult, HashMap<String, Value>)> = JoinSet::new();

    for (index, branch) in branch_steps.iter().enumerate() {
        let branch_owned = branch.clone();
        let vm_snapshot = vm.clone();
        let config_owned = config.clone();
        let previous_owned = previous.clone();
        let semaphore_clone = Arc::clone(&semaphore);

        join_set.spawn(async move {
            let _permit = semaphore_clone.acquire_owned().await.expect("semáforo fechado");
            let mut branch_vm = vm_snapshot;
            let result = execute_step(&branch_owned, &mut branch_vm, &previous_owned, &config_owned).await;
            let extracted = result.extracted_vars.clone();
            (index, result, extracted)
        });
    }

    let mut by_index: Vec<Option<(StepResult, HashMap<String, Value>)>> =
        (0..branch_steps.len()).map(|_| None).collect();

    while let Some(joined) = join_set.join_next().await {
        let (index, result, extracted) = joined.map_err(|e| {
            StructuredError::new(crate::errors::ErrorCode::INTERNAL_ERROR, format!("ramo concorrente pânicou: {}", e))
                .with_step_name(step.name())
        })?;
        by_index[index] = Some((result, extracted));
    }

    let mut results = Vec::with_capacity(branch_steps.len());
    let mut success_count = 0usize;
    let mut failure_count = 0usize;

    // Mescla na ordem declarada (não na ordem de conclusão): um nome
    // repetido entre ramos é resolvido pelo ramo mais à frente na lista.
    for slot in by_index {
        let (result, extracted) = slot.expect("todo índice foi preenchido pelo join_set");
        if matches!(result.status, StepStatus::Success | StepStatus::Skipped) {
            success_count += 1;
        } else {
            failure_count += 1;
        }
        for (name, value) in extracted {
            vm.set(name, value);
        }
        results.push(result);
    }

    let total_time = start.elapsed().as_secs_f64() * 1000.0;

    let envelope = self_envelope(serde_json::json!({
        "branch_count": branch_steps.len(),
        "success_count": success_count,
        "failure_count": failure_count,
        "branches": results,
    }));

    Ok(PerformOutcome::new(
        envelope,
        PerformanceMetrics {
            total_time,
            ..Default::default()
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepCommon;

    fn wait_branch(name: &str) -> Step {
        Step::Wait {
            name: name.to_string(),
            common: StepCommon::default(),
            seconds: Some(0.01),
            condition: None,
            interval: None,
            max_wait: None,
        }
    }

    #[tokio::test]
    async fn runs_all_branches_and_counts_successes() {
        let step = Step::Concurrent {
            name: "block".to_string(),
            common: StepCommon::default(),
            concurrent_threads: Some(2),
            steps: vec![wait_branch("a"), wait_branch("b"), wait_branch("c")],
        };
        let mut vm = VariableManager::new();
        let config = GlobalConfig::default();
        let previous = HashMap::new();
        let outcome = perform(&step, &mut vm, &config, &previous).await.unwrap();
        assert_eq!(outcome.response["branch_count"], 3);
        assert_eq!(outcome.response["success_count"], 3);
    }

    #[tokio::test]
    async fn later_branch_wins_on_extracted_name_clash() {
        let mut common_a = StepCommon::default();
        common_a.extractors = vec![crate::model::Extractor {
            name: "winner".to_string(),
            extractor_type: "jsonpath".to_string(),
            path: "$.wait_type".to_string(),
            index: 0,
        }];
        let branch_a = Step::Wait {
            name: "a".to_string(),
            common: common_a,
            seconds: Some(0.01),
            condition: None,
            interval: None,
            max_wait: None,
        };

        let mut common_b = StepCommon::default();
        common_b.extractors = vec![crate::model::Extractor {
            name: "winner".to_string(),
            extractor_type: "jsonpath".to_string(),
            path: "$.condition_met".to_string(),
            index: 0,
        }];
        let branch_b = Step::Wait {
            name: "b".to_string(),
            common: common_b,
            seconds: None,
            condition: Some("true".to_string()),
            interval: Some(0.01),
            max_wait: Some(1.0),
        };

        let step = Step::Concurrent {
            name: "block".to_string(),
            common: StepCommon::default(),
            concurrent_threads: Some(2),
            steps: vec![branch_a, branch_b],
        };
        let mut vm = VariableManager::new();
        let config = GlobalConfig::default();
        let previous = HashMap::new();
        perform(&step, &mut vm, &config, &previous).await.unwrap();
        // ramo `b` está listado depois de `a`, então sua extração de
        // `winner` vence a colisão independente de quem terminou primeiro.
        assert_eq!(vm.get("winner"), Some(&serde_json::json!(true)));
    }
}
