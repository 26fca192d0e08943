//! # Módulo de Comparadores - Catálogo de Predicados
//!
//! Um catálogo fechado de predicados `(actual, expected) -> bool` usados
//! pelo motor de validação (`crate::validation`). Cada nome de comparador
//! é total sobre este catálogo; um nome desconhecido é um `ComparatorError`.
//!
//! Grounding: `original_source/.../validation/comparators.py`'s `Comparators`
//! (métodos estáticos) e `get_comparator` (fábrica por nome) — grounding
//! direto e completo, preferido à lógica embutida e acoplada a HTTP do
//! antigo `executors/http.rs`.

use once_cell::sync::Lazy;
use regex::Regex as Re;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComparatorError {
    #[error("comparador desconhecido: '{0}'")]
    Unknown(String),
    #[error("valores não comparáveis numericamente: {0:?} vs {1:?}")]
    NotNumeric(String, String),
    #[error("padrão de regex inválido: '{0}'")]
    InvalidRegex(String),
    #[error("tipo esperado desconhecido: '{0}'")]
    UnknownType(String),
    #[error("'between' espera uma lista [min, max], recebeu {0:?}")]
    InvalidBetweenRange(Value),
}

/// Aplica o comparador `name` entre `actual` e `expected`.
pub fn compare(name: &str, actual: &Value, expected: &Value) -> Result<bool, ComparatorError> {
    match name {
        "eq" => Ok(actual == expected),
        "ne" => Ok(actual != expected),
        "gt" => Ok(as_f64(actual)? > as_f64(expected)?),
        "lt" => Ok(as_f64(actual)? < as_f64(expected)?),
        "ge" => Ok(as_f64(actual)? >= as_f64(expected)?),
        "le" => Ok(as_f64(actual)? <= as_f64(expected)?),
        "contains" => contains(actual, expected),
        "not_contains" => contains(actual, expected).map(|b| !b),
        "regex" => regex_match(actual, expected),
        "type" => type_matches(actual, expected),
        "in" => membership(expected, actual),
        "not_in" => membership(expected, actual).map(|b| !b),
        "length_eq" => Ok(length_of(actual)? == as_usize(expected)?),
        "length_gt" => Ok(length_of(actual)? > as_usize(expected)?),
        "length_lt" => Ok(length_of(actual)? < as_usize(expected)?),
        "is_empty" => Ok(is_empty(actual)),
        "is_null" => Ok(actual.is_null()),
        "exists" => Ok(exists(actual)),
        "status_code" => status_code_matches(actual, expected),
        "between" => between(actual, expected),
        other => Err(ComparatorError::Unknown(other.to_string())),
    }
}

/// A lista de nomes reconhecidos, usada por validadores de documento para
/// checar `type` de uma `ValidationRule` antes de executar.
pub const KNOWN_COMPARATORS: &[&str] = &[
    "eq", "ne", "gt", "lt", "ge", "le", "contains", "not_contains", "regex", "type", "in",
    "not_in", "length_eq", "length_gt", "length_lt", "is_empty", "is_null", "exists",
    "status_code", "between",
];

pub fn is_known(name: &str) -> bool {
    KNOWN_COMPARATORS.contains(&name)
}

fn as_f64(value: &Value) -> Result<f64, ComparatorError> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
        .ok_or_else(|| ComparatorError::NotNumeric(format!("{:?}", value), String::new()))
}

fn as_usize(value: &Value) -> Result<usize, ComparatorError> {
    value
        .as_u64()
        .map(|n| n as usize)
        .or_else(|| value.as_str().and_then(|s| s.parse::<usize>().ok()))
        .ok_or_else(|| ComparatorError::NotNumeric(format!("{:?}", value), String::new()))
}

fn contains(actual: &Value, expected: &Value) -> Result<bool, ComparatorError> {
    match actual {
        Value::String(s) => {
            let needle = expected.as_str().map(|s| s.to_string()).unwrap_or_else(|| expected.to_string());
            Ok(s.contains(&needle))
        }
        Value::Array(items) => Ok(items.contains(expected)),
        Value::Object(map) => {
            let key = expected.as_str().unwrap_or_default();
            Ok(map.contains_key(key))
        }
        _ => Ok(false),
    }
}

fn membership(haystack: &Value, needle: &Value) -> Result<bool, ComparatorError> {
    match haystack.as_array() {
        Some(items) => Ok(items.contains(needle)),
        None => Ok(false),
    }
}

static REGEX_CACHE: Lazy<std::sync::Mutex<std::collections::HashMap<String, Re>>> =
    Lazy::new(|| std::sync::Mutex::new(std::collections::HashMap::new()));

fn regex_match(actual: &Value, expected: &Value) -> Result<bool, ComparatorError> {
    let text = actual.as_str().map(|s| s.to_string()).unwrap_or_else(|| actual.to_string());
    let pattern = expected
        .as_str()
        .ok_or_else(|| ComparatorError::InvalidRegex(format!("{:?}", expected)))?;

    let mut cache = REGEX_CACHE.lock().unwrap();
    if let Some(re) = cache.get(pattern) {
        return Ok(re.is_match(&text));
    }
    let re = Re::new(pattern).map_err(|_| ComparatorError::InvalidRegex(pattern.to_string()))?;
    let matched = re.is_match(&text);
    cache.insert(pattern.to_string(), re);
    Ok(matched)
}

fn type_matches(actual: &Value, expected: &Value) -> Result<bool, ComparatorError> {
    let expected_type = expected
        .as_str()
        .ok_or_else(|| ComparatorError::UnknownType(format!("{:?}", expected)))?;
    let matches = match expected_type {
        "str" | "string" => actual.is_string(),
        "int" | "integer" => actual.is_i64() || actual.is_u64(),
        "float" | "number" => actual.is_number(),
        "bool" | "boolean" => actual.is_boolean(),
        "list" | "array" => actual.is_array(),
        "dict" | "object" => actual.is_object(),
        "null" => actual.is_null(),
        other => return Err(ComparatorError::UnknownType(other.to_string())),
    };
    Ok(matches)
}

fn length_of(actual: &Value) -> Result<usize, ComparatorError> {
    match actual {
        Value::String(s) => Ok(s.chars().count()),
        Value::Array(items) => Ok(items.len()),
        Value::Object(map) => Ok(map.len()),
        other => Err(ComparatorError::NotNumeric(format!("{:?}", other), "length".to_string())),
    }
}

fn is_empty(actual: &Value) -> bool {
    match actual {
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

/// Uma string/lista/mapa vazio conta como "não existe", igual ao
/// `Comparators.exists` original (não só checa `null`).
fn exists(actual: &Value) -> bool {
    match actual {
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
        _ => true,
    }
}

/// Suporta curingas `"Nxx"` (ex.: `"2xx"` casa qualquer status 200-299).
fn status_code_matches(actual: &Value, expected: &Value) -> Result<bool, ComparatorError> {
    if let Some(pattern) = expected.as_str() {
        if let Some(leading) = pattern.strip_suffix("xx") {
            let actual_code = as_usize(actual)?;
            let actual_str = actual_code.to_string();
            return Ok(actual_str.starts_with(leading));
        }
    }
    Ok(as_usize(actual)? == as_usize(expected)?)
}

fn between(actual: &Value, expected: &Value) -> Result<bool, ComparatorError> {
    let bounds = expected
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| ComparatorError::InvalidBetweenRange(expected.clone()))?;
    let lo = as_f64(&bounds[0])?;
    let hi = as_f64(&bounds[1])?;
    let value = as_f64(actual)?;
    Ok(value >= lo && value <= hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_and_ne() {
        assert!(compare("eq", &json!(1), &json!(1)).unwrap());
        assert!(compare("ne", &json!(1), &json!(2)).unwrap());
    }

    #[test]
    fn numeric_comparisons() {
        assert!(compare("gt", &json!(5), &json!(3)).unwrap());
        assert!(compare("le", &json!(3), &json!(3)).unwrap());
        assert!(compare("gt", &json!("5"), &json!(3)).unwrap());
    }

    #[test]
    fn contains_variants() {
        assert!(compare("contains", &json!("hello world"), &json!("world")).unwrap());
        assert!(compare("contains", &json!([1, 2, 3]), &json!(2)).unwrap());
        assert!(compare("contains", &json!({"a": 1}), &json!("a")).unwrap());
        assert!(compare("not_contains", &json!("hello"), &json!("bye")).unwrap());
    }

    #[test]
    fn regex_predicate() {
        assert!(compare("regex", &json!("abc123"), &json!(r"\d+")).unwrap());
        assert!(matches!(
            compare("regex", &json!("x"), &json!("(")),
            Err(ComparatorError::InvalidRegex(_))
        ));
    }

    #[test]
    fn type_predicate() {
        assert!(compare("type", &json!("s"), &json!("str")).unwrap());
        assert!(compare("type", &json!(1), &json!("int")).unwrap());
        assert!(compare("type", &json!([1]), &json!("list")).unwrap());
    }

    #[test]
    fn membership_predicates() {
        assert!(compare("in", &json!(2), &json!([1, 2, 3])).unwrap());
        assert!(compare("not_in", &json!(9), &json!([1, 2, 3])).unwrap());
    }

    #[test]
    fn length_predicates() {
        assert!(compare("length_eq", &json!([1, 2]), &json!(2)).unwrap());
        assert!(compare("length_gt", &json!("abc"), &json!(2)).unwrap());
        assert!(compare("length_lt", &json!({"a":1}), &json!(5)).unwrap());
    }

    #[test]
    fn unary_predicates() {
        assert!(compare("is_empty", &json!(""), &Value::Null).unwrap());
        assert!(compare("is_null", &Value::Null, &Value::Null).unwrap());
        assert!(compare("exists", &json!(1), &Value::Null).unwrap());
        assert!(!compare("exists", &Value::Null, &Value::Null).unwrap());
        assert!(!compare("exists", &json!(""), &Value::Null).unwrap());
        assert!(!compare("exists", &json!([]), &Value::Null).unwrap());
        assert!(!compare("exists", &json!({}), &Value::Null).unwrap());
    }

    #[test]
    fn status_code_wildcard() {
        assert!(compare("status_code", &json!(204), &json!("2xx")).unwrap());
        assert!(!compare("status_code", &json!(404), &json!("2xx")).unwrap());
        assert!(compare("status_code", &json!(200), &json!(200)).unwrap());
    }

    #[test]
    fn between_inclusive_range() {
        assert!(compare("between", &json!(5), &json!([1, 10])).unwrap());
        assert!(!compare("between", &json!(11), &json!([1, 10])).unwrap());
        assert!(matches!(
            compare("between", &json!(5), &json!(1)),
            Err(ComparatorError::InvalidBetweenRange(_))
        ));
    }

    #[test]
    fn unknown_comparator_errors() {
        assert_eq!(
            compare("frobnicate", &json!(1), &json!(1)),
            Err(ComparatorError::Unknown("frobnicate".to_string()))
        );
    }
}
