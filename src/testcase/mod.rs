//! # Executor de Caso de Teste (C8)
//!
//! Orquestra um `TestCase` inteiro: monta o `VariableManager`, aplica o
//! perfil ativo, roda setup/teardown globais e despacha cada step de topo
//! sequencialmente através do ciclo de vida compartilhado de `crate::executors`
//! (§4.7), entregando a lista ordenada de `StepResult` ao coletor (C9).
//!
//! ## Para todos entenderem:
//!
//! Isto é o "maestro": não sabe nada sobre HTTP, banco ou templates — só
//! sabe montar o ambiente, chamar cada step na ordem certa, e decidir
//! quando parar (`fail_fast`) ou pular (`depends_on` já não satisfeito).
//! A concorrência vive só dentro de um step `concurrent`; aqui, de topo, é
//! sempre sequencial (§5 "Scheduling model").
//!
//! Grounding: `original_source/.../core/test_executor.py`'s `TestExecutor.execute`
//! (monta contexto, roda setup, itera steps, roda teardown, monta relatório)
//! e o ciclo setup/teardown de hook já usado por `executors::run_hook`.

use std::collections::HashMap;

use chrono::Utc;

use crate::executors::execute_step;
use crate::model::{GlobalConfig, Hook, StepResult, StepStatus, TestCase};
use crate::variables::VariableManager;

/// Roda `test_case` do início ao fim e devolve a lista ordenada de
/// `StepResult`s junto com o `VariableManager` final (para que o chamador
/// monte o `TestCaseResult` via `crate::collector`).
///
/// `profile_override`, quando presente, tem prioridade sobre
/// `test_case.config.active_profile`.
pub async fn run(test_case: &TestCase, profile_override: Option<&str>) -> (Vec<StepResult>, VariableManager) {
    let config = &test_case.config;
    let mut vm = VariableManager::new();
    vm.inject_config(config);

    let active_profile = profile_override.or(config.active_profile.as_deref());
    if let Some(profile_name) = active_profile {
        if let Some(profile) = config.profiles.get(profile_name) {
            let mut vars = profile.variables.clone();
            if let Some(base_url) = &profile.base_url {
                vars.entry("base_url".to_string())
                    .or_insert_with(|| serde_json::Value::String(base_url.clone()));
            }
            vm.set_profile(&vars);
        }
    }

    run_global_hook(test_case.setup.as_ref(), &mut vm, config).await;

    let mut previous: HashMap<String, StepStatus> = HashMap::new();
    let mut results: Vec<StepResult> = Vec::with_capacity(test_case.steps.len());

    for step in &test_case.steps {
        let result = execute_step(step, &mut vm, &previous, config).await;
        previous.insert(result.name.clone(), result.status);
        let should_stop = config.fail_fast && matches!(result.status, StepStatus::Failure | StepStatus::Error);
        results.push(result);
        if should_stop {
            break;
        }
    }

    run_global_hook(test_case.teardown.as_ref(), &mut vm, config).await;

    (results, vm)
}

/// Roda um hook de topo (`setup`/`teardown` do próprio `TestCase`): uma
/// sequência de steps cujas dependências são locais ao hook, exatamente
/// como `executors::run_hook` trata hooks de step.
async fn run_global_hook(hook: Option<&Hook>, vm: &mut VariableManager, config: &GlobalConfig) {
    let Some(hook) = hook else { return };
    let mut local_previous: HashMap<String, StepStatus> = HashMap::new();
    for step in &hook.steps {
        let result = execute_step(step, vm, &local_previous, config).await;
        local_previous.insert(result.name.clone(), result.status);
    }
}
