//! # Módulo de Extração - Captura de Dados da Resposta
//!
//! Implementa a lógica de extração de dados do envelope de resposta de um
//! step para popular a camada `extracted` do gerenciador de variáveis.
//!
//! ## Para todos entenderem:
//!
//! Imagine que você faz login numa API e recebe um token na resposta.
//! Você precisa usar esse token nos próximos requests. A extração faz isso:
//!
//! 1. **Recebe** o envelope de resposta (`{status_code, headers, cookies, url, body}`)
//! 2. **Busca** o dado usando JSONPath, regex, nome de header ou nome de cookie
//! 3. **Devolve** o valor para quem chamou gravar na camada `extracted`
//!
//! Falha ao extrair não falha o step: a variável simplesmente não é
//! gravada e um aviso é logado (ver `crate::executors`).
//!
//! ## Tipos de extração suportados
//!
//! | type | path |
//! |------|------|
//! | `jsonpath` | expressão JSONPath contra o `body` |
//! | `regex` | padrão regex contra o corpo como texto |
//! | `header` | nome do header, busca case-insensitive |
//! | `cookie` | nome do cookie |
//!
//! Grounding: o `header`/`regex` deste módulo vêm do antigo `extractors/mod.rs`;
//! o fechamento em 4 tipos (incluindo `cookie`, ausente do professor) e a
//! fábrica por nome vêm de `original_source/.../extractor/extractor_factory.py`.
//! O JSONPath de verdade (`serde_json_path`) substitui o navegador manual
//! que o próprio professor comentava como provisório.

use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("tipo de extractor desconhecido: '{0}'")]
    UnknownType(String),
    #[error("expressão JSONPath inválida: '{0}'")]
    InvalidJsonPath(String),
    #[error("padrão de regex inválido: '{0}'")]
    InvalidRegex(String),
}

/// Extrai um valor do envelope de resposta usando o extractor descrito.
///
/// Retorna `Ok(None)` quando a extração é sintaticamente válida mas não
/// encontra nenhum valor (índice fora da lista de matches).
pub fn extract(
    extractor_type: &str,
    path: &str,
    index: usize,
    response: &Value,
) -> Result<Option<Value>, ExtractorError> {
    match extractor_type {
        "jsonpath" => extract_jsonpath(path, index, response.get("body").unwrap_or(&Value::Null)),
        "regex" => extract_regex(path, index, response.get("body").unwrap_or(&Value::Null)),
        "header" => Ok(extract_header(path, response)),
        "cookie" => Ok(extract_cookie(path, response)),
        other => Err(ExtractorError::UnknownType(other.to_string())),
    }
}

fn extract_jsonpath(path: &str, index: usize, body: &Value) -> Result<Option<Value>, ExtractorError> {
    let json_path = JsonPath::parse(path).map_err(|_| ExtractorError::InvalidJsonPath(path.to_string()))?;
    let matches = json_path.query(body).all();
    Ok(matches.get(index).map(|v| (*v).clone()))
}

fn extract_regex(path: &str, index: usize, body: &Value) -> Result<Option<Value>, ExtractorError> {
    let text = match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let re = Regex::new(path).map_err(|_| ExtractorError::InvalidRegex(path.to_string()))?;
    let caps = match re.captures(&text) {
        Some(c) => c,
        None => return Ok(None),
    };
    // index 0 é o grupo de captura 1 (o grupo inteiro do match fica em index
    // "virtual" -1, não exposto); se não houver grupos, usa o match inteiro.
    let value = if caps.len() > 1 {
        caps.get(index + 1).map(|m| m.as_str().to_string())
    } else {
        caps.get(0).map(|m| m.as_str().to_string())
    };
    Ok(value.map(Value::String))
}

fn extract_header(name: &str, response: &Value) -> Option<Value> {
    let headers = response.get("headers")?.as_object()?;
    let lower = name.to_lowercase();
    headers
        .iter()
        .find(|(k, _)| k.to_lowercase() == lower)
        .map(|(_, v)| v.clone())
}

fn extract_cookie(name: &str, response: &Value) -> Option<Value> {
    let cookies = response.get("cookies")?.as_object()?;
    cookies.get(name).cloned()
}

pub const KNOWN_EXTRACTOR_TYPES: &[&str] = &["jsonpath", "regex", "header", "cookie"];

pub fn is_known(extractor_type: &str) -> bool {
    KNOWN_EXTRACTOR_TYPES.contains(&extractor_type)
}
