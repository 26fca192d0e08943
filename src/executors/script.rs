//! # Executor de Script (variante `script` do step)
//!
//! Não há um interpretador de propósito geral embarcado — o "script" é uma
//! sequência de atribuições `nome = expressão`, uma por linha, avaliada
//! contra o mapa de variáveis corrente e um conjunto fechado de funções
//! embutidas (`base64_encode`, `base64_decode`, `sha256`, `uuid`, `now`,
//! `len`, `upper`, `lower`, `concat`). O resultado de cada atribuição é
//! devolvido em `extra_vars` para ser mesclado na camada `extracted` pelo
//! chamador (§4.7, passo de extração).
//!
//! `allow_imports` libera duas funções adicionais que tocam o ambiente de
//! execução (`env`, `random`); sem a flag, chamá-las falha com
//! `IMPORT_NOT_ALLOWED`. Fora isso o dialeto é deliberadamente fechado: não
//! há laços, condicionais ou chamadas de função definidas pelo usuário — um
//! script é uma lista plana de atribuições, no mesmo espírito minimalista
//! do dialeto de template de C1.
//!
//! Linhas vazias e linhas iniciadas por `#` são ignoradas como comentários.
//!
//! Grounding: não há equivalente no professor (UTDL não tem passo de
//! script); desenhado a partir de §4.7.6 reaproveitando o avaliador de
//! caminho/literal de `crate::template` e as mesmas bibliotecas de
//! codificação (`base64`, `sha2`, `uuid`) já usadas pelos extractors/pelo
//! executor de requisição.

use std::collections::HashMap;

use serde_json::Value;

use crate::errors::{ErrorCode, StructuredError};
use crate::model::{PerformanceMetrics, Step};
use crate::variables::VariableManager;

use super::PerformOutcome;

pub async fn perform(step: &Step, vm: &VariableManager) -> Result<PerformOutcome, StructuredError> {
    let (source, allow_imports) = match step {
        Step::Script {
            source,
            allow_imports,
            ..
        } => (source, *allow_imports),
        _ => unreachable!("dispatch_perform só chama script::perform para Step::Script"),
    };

    let start = std::time::Instant::now();
    let mut bindings: HashMap<String, Value> = HashMap::new();

    for (line_no, raw_line) in source.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (target, expr) = line.split_once('=').ok_or_else(|| {
            StructuredError::new(
                ErrorCode::SCRIPT_ERROR,
                format!("linha {}: esperado 'nome = expressão', obtido '{}'", line_no + 1, line),
            )
            .with_step_name(step.name())
        })?;
        let target = target.trim();
        if target.is_empty() {
            return Err(StructuredError::new(
                ErrorCode::SCRIPT_ERROR,
                format!("linha {}: nome de atribuição vazio", line_no + 1),
            )
            .with_step_name(step.name()));
        }

        let value = eval_script_expr(expr.trim(), vm, &bindings, allow_imports)
            .map_err(|msg| StructuredError::new(ErrorCode::SCRIPT_ERROR, format!("linha {}: {}", line_no + 1, msg)).with_step_name(step.name()))?;

        bindings.insert(target.to_string(), value);
    }

    let total_time = start.elapsed().as_secs_f64() * 1000.0;
    let response = super::self_envelope(serde_json::to_value(&bindings).unwrap_or(Value::Null));

    let mut outcome = PerformOutcome::new(
        response,
        PerformanceMetrics {
            total_time,
            ..Default::default()
        },
    );
    outcome.extra_vars = bindings;
    Ok(outcome)
}

/// Avalia uma única expressão do dialeto de script: uma chamada de função
/// embutida (`fn(args...)`), um caminho/literal do dialeto de template de
/// C1, ou uma referência a um binding já produzido por uma linha anterior
/// do mesmo script.
fn eval_script_expr(
    expr: &str,
    vm: &VariableManager,
    bindings: &HashMap<String, Value>,
    allow_imports: bool,
) -> Result<Value, String> {
    if let Some((name, args_str)) = parse_call(expr) {
        let args: Vec<Value> = if args_str.trim().is_empty() {
            Vec::new()
        } else {
            args_str
                .split(',')
                .map(|a| eval_script_expr(a.trim(), vm, bindings, allow_imports))
                .collect::<Result<Vec<_>, _>>()?
        };
        return call_builtin(&name, &args, allow_imports);
    }

    if let Some(value) = bindings.get(expr) {
        return Ok(value.clone());
    }

    // Reaproveita o dialeto de C1 para caminhos e literais; `{{...}}` é
    // opcional aqui (o script já está num contexto de expressão).
    let wrapped = if expr.starts_with("{{") { expr.to_string() } else { format!("{{{{{}}}}}", expr) };
    let rendered = vm.render(&wrapped).map_err(|e| e.to_string())?;
    Ok(Value::String(rendered))
}

fn parse_call(expr: &str) -> Option<(String, String)> {
    let open = expr.find('(')?;
    if !expr.ends_with(')') {
        return None;
    }
    let name = expr[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let args = &expr[open + 1..expr.len() - 1];
    Some((name.to_string(), args.to_string()))
}

fn call_builtin(name: &str, args: &[Value], allow_imports: bool) -> Result<Value, String> {
    let as_str = |v: &Value| -> String {
        match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    };

    match name {
        "base64_encode" => {
            let arg = args.first().ok_or("base64_encode requer 1 argumento")?;
            use base64::Engine;
            Ok(Value::String(base64::engine::general_purpose::STANDARD.encode(as_str(arg))))
        }
        "base64_decode" => {
            let arg = args.first().ok_or("base64_decode requer 1 argumento")?;
            use base64::Engine;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(as_str(arg))
                .map_err(|e| format!("base64 inválido: {}", e))?;
            Ok(Value::String(String::from_utf8_lossy(&decoded).into_owned()))
        }
        "sha256" => {
            use sha2::{Digest, Sha256};
            let arg = args.first().ok_or("sha256 requer 1 argumento")?;
            let mut hasher = Sha256::new();
            hasher.update(as_str(arg).as_bytes());
            Ok(Value::String(format!("{:x}", hasher.finalize())))
        }
        "uuid" => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
        "len" => {
            let arg = args.first().ok_or("len requer 1 argumento")?;
            let n = match arg {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => return Err("len não se aplica a este tipo".to_string()),
            };
            Ok(Value::from(n))
        }
        "upper" => Ok(Value::String(as_str(args.first().ok_or("upper requer 1 argumento")?).to_uppercase())),
        "lower" => Ok(Value::String(as_str(args.first().ok_or("lower requer 1 argumento")?).to_lowercase())),
        "concat" => Ok(Value::String(args.iter().map(as_str).collect::<Vec<_>>().concat())),
        "env" if allow_imports => {
            let key = as_str(args.first().ok_or("env requer 1 argumento")?);
            Ok(Value::String(std::env::var(&key).unwrap_or_default()))
        }
        "random" if allow_imports => Ok(Value::from(rand::random::<f64>())),
        "env" | "random" => Err(format!("função '{}' requer allow_imports: true", name)),
        other => Err(format!("função desconhecida: '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepCommon;

    fn script_step(source: &str, allow_imports: bool) -> Step {
        Step::Script {
            name: "s".to_string(),
            common: StepCommon::default(),
            language: None,
            source: source.to_string(),
            allow_imports,
        }
    }

    #[tokio::test]
    async fn assignment_of_builtin_call_is_extracted() {
        let step = script_step("digest = sha256(\"abc\")", false);
        let vm = VariableManager::new();
        let outcome = perform(&step, &vm).await.unwrap();
        assert_eq!(
            outcome.extra_vars.get("digest").unwrap().as_str().unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn plain_variable_reference_is_rendered_from_vm() {
        let mut vm = VariableManager::new();
        vm.set("user_id", serde_json::json!(42));
        let step = script_step("copied = user_id", false);
        let outcome = perform(&step, &vm).await.unwrap();
        assert_eq!(outcome.extra_vars.get("copied").unwrap(), "42");
    }

    #[tokio::test]
    async fn comment_and_blank_lines_are_ignored() {
        let step = script_step("# comment\n\nx = \"ok\"", false);
        let vm = VariableManager::new();
        let outcome = perform(&step, &vm).await.unwrap();
        assert_eq!(outcome.extra_vars.len(), 1);
    }

    #[tokio::test]
    async fn env_without_allow_imports_fails_as_business_error() {
        let step = script_step("v = env(\"PATH\")", false);
        let vm = VariableManager::new();
        let err = perform(&step, &vm).await.unwrap_err();
        assert_eq!(err.code.category(), crate::model::ErrorCategory::Business);
    }

    #[tokio::test]
    async fn env_with_allow_imports_succeeds() {
        std::env::set_var("SCRIPT_TEST_VAR", "hello");
        let step = script_step("v = env(\"SCRIPT_TEST_VAR\")", true);
        let vm = VariableManager::new();
        let outcome = perform(&step, &vm).await.unwrap();
        assert_eq!(outcome.extra_vars.get("v").unwrap(), "hello");
    }

    #[tokio::test]
    async fn malformed_line_without_equals_is_rejected() {
        let step = script_step("not_an_assignment", false);
        let vm = VariableManager::new();
        let result = perform(&step, &vm).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn chained_bindings_reference_earlier_lines() {
        let step = script_step("a = \"abc\"\nb = upper(a)", false);
        let vm = VariableManager::new();
        let outcome = perform(&step, &vm).await.unwrap();
        assert_eq!(outcome.extra_vars.get("b").unwrap(), "ABC");
    }
}
