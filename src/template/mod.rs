//! # Módulo de Template - Expansão de `{{expr}}`
//!
//! Expande ocorrências de `{{expr}}` dentro de strings (e, recursivamente,
//! dentro de mapas/listas JSON) contra um mapa de variáveis.
//!
//! ## Para todos entenderem:
//!
//! Isto NÃO é um motor de templates de propósito geral como Jinja2. A
//! linguagem de expressão é deliberadamente mínima:
//!
//! - busca por caminho com pontos: `{{a.b.c}}`
//! - indexação de lista: `{{items[0]}}`
//! - comparações simples usadas em `skip_if`/`only_if`/`loop_condition`:
//!   `{{status == "ok"}}`
//!
//! Nomes desconhecidos resolvem para string vazia ao renderizar, ou para
//! `false` ao avaliar uma condição. A expansão é de **passagem única**: o
//! texto produzido por uma substituição nunca é re-escaneado em busca de
//! mais `{{...}}`, o que garante término mesmo com valores adversariais.
//!
//! Grounding: estende o regex de interpolação de uma chave (`${var}`) usado
//! no motor anterior para o padrão de duas chaves do formato YAML, com
//! suporte a caminho composto e indexação.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

static EXPR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid template regex")
});

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("expressão de template inválida: '{0}'")]
    InvalidExpression(String),
}

/// Expande todo `{{expr}}` em `input` contra `vars`, retornando uma string.
pub fn render(input: &str, vars: &Value) -> Result<String, TemplateError> {
    if !input.contains("{{") {
        return Ok(input.to_string());
    }

    let mut out = String::with_capacity(input.len());
    let mut last = 0;

    for cap in EXPR_RE.captures_iter(input) {
        let whole = cap.get(0).unwrap();
        out.push_str(&input[last..whole.start()]);
        let expr = cap.get(1).unwrap().as_str();
        let value = eval_expr(expr, vars);
        out.push_str(&value_to_display(&value));
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Expande `{{expr}}` recursivamente dentro de um `Value` (mapa/lista/string).
/// Valores não-string são devolvidos inalterados.
pub fn render_value(input: &Value, vars: &Value) -> Result<Value, TemplateError> {
    match input {
        Value::String(s) => Ok(Value::String(render(s, vars)?)),
        Value::Array(items) => {
            let mut result = Vec::with_capacity(items.len());
            for item in items {
                result.push(render_value(item, vars)?);
            }
            Ok(Value::Array(result))
        }
        Value::Object(map) => {
            let mut new_map = Map::with_capacity(map.len());
            for (k, v) in map {
                new_map.insert(k.clone(), render_value(v, vars)?);
            }
            Ok(Value::Object(new_map))
        }
        other => Ok(other.clone()),
    }
}

/// Avalia uma condição (`skip_if`/`only_if`/`loop_condition`) como booleano.
/// Se a expressão inteira for um único `{{...}}` ou uma expressão "crua"
/// (sem chaves), ela é avaliada diretamente; nomes desconhecidos e erros
/// de avaliação resolvem para `false`.
pub fn eval_condition(input: &str, vars: &Value) -> bool {
    let trimmed = input.trim();
    let expr = trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(trimmed);
    is_truthy(&eval_expr(expr.trim(), vars))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(
            s.to_lowercase().as_str(),
            "true" | "1" | "yes" | "y" | "ok" | "success"
        ),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Null => false,
        _ => true,
    }
}

/// Avalia uma expressão do sub-dialeto: caminho com pontos/índices, com
/// suporte opcional a um único operador de comparação (`==`, `!=`).
fn eval_expr(expr: &str, vars: &Value) -> Value {
    for op in ["==", "!="] {
        if let Some(idx) = expr.find(op) {
            let lhs = expr[..idx].trim();
            let rhs = expr[idx + op.len()..].trim();
            let lhs_val = resolve_path_or_literal(lhs, vars);
            let rhs_val = resolve_path_or_literal(rhs, vars);
            let eq = lhs_val == rhs_val;
            return Value::Bool(if op == "==" { eq } else { !eq });
        }
    }
    resolve_path_or_literal(expr, vars)
}

fn resolve_path_or_literal(token: &str, vars: &Value) -> Value {
    let token = token.trim();
    if let Some(lit) = token
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| token.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
    {
        return Value::String(lit.to_string());
    }
    if let Ok(n) = token.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return Value::Number(num);
        }
    }
    if token == "true" || token == "false" {
        return Value::Bool(token == "true");
    }
    resolve_path(token, vars).unwrap_or(Value::Null)
}

/// Resolve um caminho composto (`a.b.c`, `items[0]`, `items[0].name`)
/// contra o mapa de variáveis. Retorna `None` se qualquer segmento não
/// existir.
fn resolve_path(path: &str, vars: &Value) -> Option<Value> {
    let mut current = vars.clone();
    for segment in split_path(path) {
        match segment {
            PathSegment::Key(key) => {
                current = current.as_object()?.get(&key)?.clone();
            }
            PathSegment::Index(i) => {
                current = current.as_array()?.get(i)?.clone();
            }
        }
    }
    Some(current)
}

enum PathSegment {
    Key(String),
    Index(usize),
}

fn split_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for dotted in path.split('.') {
        let mut rest = dotted;
        loop {
            if let Some(bracket) = rest.find('[') {
                let (key, tail) = rest.split_at(bracket);
                if !key.is_empty() {
                    segments.push(PathSegment::Key(key.to_string()));
                }
                let close = match tail.find(']') {
                    Some(c) => c,
                    None => break,
                };
                let idx_str = &tail[1..close];
                if let Ok(idx) = idx_str.parse::<usize>() {
                    segments.push(PathSegment::Index(idx));
                }
                rest = &tail[close + 1..];
            } else {
                if !rest.is_empty() {
                    segments.push(PathSegment::Key(rest.to_string()));
                }
                break;
            }
        }
    }
    segments
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_is_returned_unchanged() {
        let vars = json!({});
        assert_eq!(render("no placeholders here", &vars).unwrap(), "no placeholders here");
    }

    #[test]
    fn dotted_path_lookup() {
        let vars = json!({"user": {"id": 42, "name": "ana"}});
        assert_eq!(render("id={{user.id}} name={{user.name}}", &vars).unwrap(), "id=42 name=ana");
    }

    #[test]
    fn index_lookup() {
        let vars = json!({"items": ["a", "b", "c"]});
        assert_eq!(render("first={{items[0]}}", &vars).unwrap(), "first=a");
    }

    #[test]
    fn unknown_name_renders_empty_string() {
        let vars = json!({});
        assert_eq!(render("value=[{{missing}}]", &vars).unwrap(), "value=[]");
    }

    #[test]
    fn single_pass_does_not_rerender_output() {
        let vars = json!({"inner": "{{user.id}}", "user": {"id": 1}});
        assert_eq!(render("{{inner}}", &vars).unwrap(), "{{user.id}}");
    }

    #[test]
    fn condition_truthy_tokens() {
        let vars = json!({"ready": "yes", "not_ready": "no"});
        assert!(eval_condition("{{ready}}", &vars));
        assert!(!eval_condition("{{not_ready}}", &vars));
    }

    #[test]
    fn condition_equality_operator() {
        let vars = json!({"status": "ok"});
        assert!(eval_condition("{{status == \"ok\"}}", &vars));
        assert!(!eval_condition("{{status == \"fail\"}}", &vars));
    }

    #[test]
    fn condition_unknown_name_is_false() {
        let vars = json!({});
        assert!(!eval_condition("{{missing}}", &vars));
    }

    #[test]
    fn render_value_walks_nested_structures() {
        let vars = json!({"token": "abc"});
        let input = json!({"headers": {"Authorization": "Bearer {{token}}"}, "count": 3});
        let rendered = render_value(&input, &vars).unwrap();
        assert_eq!(rendered["headers"]["Authorization"], "Bearer abc");
        assert_eq!(rendered["count"], 3);
    }
}
