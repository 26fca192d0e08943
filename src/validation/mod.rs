//! # Módulo de Validação - Motor de Assertions (C5)
//!
//! Roda uma lista de `ValidationRule` contra o envelope de resposta de um
//! step e devolve um registro de resultado por regra.
//!
//! ## Para todos entenderem:
//!
//! Depois que um step executa (uma request, uma query, etc.), o core
//! precisa saber se o resultado é o esperado. Cada `ValidationRule` diz
//! "em `path`, compare com `expect` usando o comparador `type`". Este
//! módulo aplica todas as regras, sempre — mesmo que a primeira já tenha
//! falhado — para que o relatório final esteja completo.
//!
//! Grounding: `original_source/.../validation/engine.py`'s `ValidationEngine.validate`
//! (sem short-circuit, captura de erro por regra) e `_extract_value`
//! (JSONPath contra o envelope, caminho especial `$` para o envelope
//! inteiro). O antigo `executors/http.rs`'s `validate_assertions` não foi
//! reaproveitado por estar acoplado à lógica de requisição HTTP.

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::comparators;
use crate::model::ValidationRule;
use crate::model::ValidationOutcome;

/// Roda todas as `rules` contra `response` e devolve um resultado por
/// regra, na mesma ordem. Nunca propaga erro ao chamador: uma falha de
/// extração ou de comparador vira `passed: false` com `error` preenchido.
pub fn validate(rules: &[ValidationRule], response: &Value) -> Vec<ValidationOutcome> {
    rules.iter().map(|rule| validate_one(rule, response)).collect()
}

fn validate_one(rule: &ValidationRule, response: &Value) -> ValidationOutcome {
    let actual = match extract_value(&rule.path, response) {
        Ok(value) => value,
        Err(message) => {
            return ValidationOutcome {
                passed: false,
                rule_type: rule.rule_type.clone(),
                path: rule.path.clone(),
                actual: Value::Null,
                expected: rule.expect.clone(),
                description: rule.description.clone(),
                error: message,
            };
        }
    };

    match comparators::compare(&rule.rule_type, &actual, &rule.expect) {
        Ok(passed) => ValidationOutcome {
            passed,
            rule_type: rule.rule_type.clone(),
            path: rule.path.clone(),
            actual,
            expected: rule.expect.clone(),
            description: rule.description.clone(),
            error: if passed {
                String::new()
            } else {
                error_message(&rule.rule_type, &actual, &rule.expect)
            },
        },
        Err(err) => ValidationOutcome {
            passed: false,
            rule_type: rule.rule_type.clone(),
            path: rule.path.clone(),
            actual,
            expected: rule.expect.clone(),
            description: rule.description.clone(),
            error: err.to_string(),
        },
    }
}

/// Resolve `path` contra o envelope. `$` (ou vazio) significa o envelope
/// inteiro — relevante para `status_code`, cuja regra aponta para o
/// envelope, não para o corpo.
fn extract_value(path: &str, response: &Value) -> Result<Value, String> {
    if path.is_empty() || path == "$" {
        return Ok(response.clone());
    }
    let json_path = JsonPath::parse(path).map_err(|e| format!("JSONPath inválido '{}': {}", path, e))?;
    let matches = json_path.query(response).all();
    matches
        .first()
        .map(|v| (*v).clone())
        .ok_or_else(|| format!("caminho '{}' não encontrado na resposta", path))
}

fn error_message(rule_type: &str, actual: &Value, expected: &Value) -> String {
    format!(
        "assertion '{}' falhou: esperado {}, obtido {}",
        rule_type, expected, actual
    )
}
