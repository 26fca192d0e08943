//! # Executor de Requisição HTTP (variante `request` do step)
//!
//! Renderiza método/URL/headers/body via C1/C2, envia com `reqwest` e monta
//! o envelope de resposta uniforme `{status_code, headers, cookies, url, body}`
//! sobre o qual C4 (extração) e C5 (validação) operam.
//!
//! Grounding: `original_source/.../executor/api_executor.py`'s `_execute_step`
//! (inferência de forma do body: multipart se `Content-Type` anuncia
//! `multipart/form-data`, json se anuncia `application/json`, form data caso
//! contrário; `_parse_response`) e o antigo `executors/http.rs` (cliente
//! `reqwest` reutilizável, `Method::from_bytes`, medição de `total_time` via
//! `Instant::elapsed`). Ao contrário do antigo executor, as sub-fases de
//! timing (`dns_time`/`tcp_time`/`tls_time`/`server_time`/`download_time`)
//! não são estimadas como frações de `total_time` — ver DESIGN.md: só
//! `total_time` e `size` são medidos de verdade, e são os únicos que o
//! `reqwest` de alto nível nos dá sem instrumentar o transporte.

use std::time::{Duration, Instant};

use reqwest::{Client, Method};
use serde_json::{Map, Value};

use crate::errors::{ErrorCode, StructuredError};
use crate::model::{PerformanceMetrics, Step};
use crate::variables::VariableManager;

use super::PerformOutcome;

pub async fn perform(
    step: &Step,
    vm: &VariableManager,
    timeout: Duration,
) -> Result<PerformOutcome, StructuredError> {
    let (method_str, url_tpl, params, headers_tpl, body) = match step {
        Step::Request {
            method,
            url,
            params,
            headers,
            body,
            ..
        } => (method, url, params, headers, body),
        _ => unreachable!("dispatch_perform só chama request::perform para Step::Request"),
    };

    let url = render_url(url_tpl, params, vm)?;

    let method = Method::from_bytes(method_str.as_bytes()).map_err(|e| {
        StructuredError::new(
            ErrorCode::MISSING_VARIANT_FIELD,
            format!("método HTTP inválido '{}': {}", method_str, e),
        )
        .with_step_name(step.name())
    })?;

    let client = Client::new();
    let mut builder = client.request(method, &url).timeout(timeout);

    let mut rendered_headers: Vec<(String, String)> = Vec::new();
    for (k, v) in headers_tpl {
        let value = vm.render(v).map_err(|e| parsing_error(step, &e.to_string()))?;
        rendered_headers.push((k.clone(), value.clone()));
        builder = builder.header(k, value);
    }

    if let Some(body_value) = body {
        let rendered_body = vm
            .render_value(body_value)
            .map_err(|e| parsing_error(step, &e.to_string()))?;
        let content_type = rendered_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str())
            .unwrap_or("");

        builder = if content_type.contains("multipart/form-data") {
            // Sem um payload de arquivo real para enviar, um corpo multipart
            // é expresso como formulário: o caso de teste descreve campos,
            // não streams de arquivo.
            builder.form(&rendered_body)
        } else if content_type.contains("application/json") || content_type.is_empty() {
            builder.json(&rendered_body)
        } else {
            builder.form(&rendered_body)
        };
    }

    let start = Instant::now();
    let response = builder.send().await.map_err(|e| network_error(step, &e))?;
    let total_time = start.elapsed().as_secs_f64() * 1000.0;

    let status_code = response.status().as_u16();
    let headers_map = headers_to_map(response.headers());
    let cookies_map = cookies_to_map(response.headers());
    let final_url = response.url().to_string();

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let raw_body = response.text().await.map_err(|e| network_error(step, &e))?;
    let size = raw_body.len() as u64;
    let body_value = if content_type.contains("application/json") {
        serde_json::from_str(&raw_body).unwrap_or(Value::String(raw_body))
    } else {
        Value::String(raw_body)
    };

    let envelope = serde_json::json!({
        "status_code": status_code,
        "headers": headers_map,
        "cookies": cookies_map,
        "url": final_url,
        "body": body_value,
    });

    let performance = PerformanceMetrics {
        total_time,
        size,
        ..Default::default()
    };

    Ok(PerformOutcome::new(envelope, performance))
}

fn render_url(
    url_tpl: &str,
    params: &std::collections::HashMap<String, Value>,
    vm: &VariableManager,
) -> Result<String, StructuredError> {
    let mut url = vm
        .render(url_tpl)
        .map_err(|e| StructuredError::new(ErrorCode::INVALID_RESPONSE_JSON, e.to_string()))?;

    if !params.is_empty() {
        let mut parts = Vec::new();
        for (k, v) in params {
            let rendered = match v {
                Value::String(s) => vm
                    .render(s)
                    .map_err(|e| StructuredError::new(ErrorCode::INVALID_RESPONSE_JSON, e.to_string()))?,
                other => other.to_string().trim_matches('"').to_string(),
            };
            parts.push(format!(
                "{}={}",
                urlencoding::encode(k),
                urlencoding::encode(&rendered)
            ));
        }
        let separator = if url.contains('?') { "&" } else { "?" };
        url = format!("{}{}{}", url, separator, parts.join("&"));
    }

    Ok(url)
}

fn headers_to_map(headers: &reqwest::header::HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in headers {
        if let Ok(value) = v.to_str() {
            map.insert(k.as_str().to_string(), Value::String(value.to_string()));
        }
    }
    map
}

fn cookies_to_map(headers: &reqwest::header::HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for cookie_header in headers.get_all(reqwest::header::SET_COOKIE) {
        if let Ok(raw) = cookie_header.to_str() {
            if let Some((name, rest)) = raw.split_once('=') {
                let value = rest.split(';').next().unwrap_or("").to_string();
                map.insert(name.trim().to_string(), Value::String(value));
            }
        }
    }
    map
}

fn network_error(step: &Step, e: &reqwest::Error) -> StructuredError {
    let code = if e.is_timeout() {
        ErrorCode::STEP_TIMEOUT
    } else if e.is_connect() {
        ErrorCode::CONNECTION_REFUSED
    } else {
        ErrorCode::CONNECTION_REFUSED
    };
    StructuredError::new(code, e.to_string()).with_step_name(step.name())
}

fn parsing_error(step: &Step, message: &str) -> StructuredError {
    StructuredError::new(ErrorCode::INVALID_RESPONSE_JSON, message.to_string()).with_step_name(step.name())
}
