//! # Modelo de Dados do Motor de Execução
//!
//! Este módulo define todas as **estruturas de dados** que representam
//! um caso de teste YAML e os resultados da sua execução.
//!
//! ## O que é um caso de teste?
//!
//! Um caso de teste é descrito em YAML com uma estrutura bem definida:
//! - **O quê** testar (requests, queries, waits, loops, blocos concorrentes)
//! - **Como** validar (validations)
//! - **O que extrair** da resposta (extractors)
//!
//! ## Estrutura de um TestCase:
//!
//! ```yaml
//! name: "Login flow"
//! description: "..."
//! config:
//!   active_profile: staging
//!   profiles:
//!     staging:
//!       base_url: "https://staging.example.com"
//! steps:
//!   - name: login
//!     type: request
//!     method: POST
//!     url: /login
//! ```
//!
//! ## Hierarquia de tipos:
//!
//! ```text
//! TestCase
//! ├── GlobalConfig (profiles, variáveis, limites)
//! └── Step[] (uma variante tagueada por `type`)
//!     ├── ValidationRule[] (assertions)
//!     ├── Extractor[] (captura de variáveis)
//!     └── comum: skip_if / only_if / depends_on / timeout / retry_times
//! ```
//!
//! Ao contrário da fonte original, onde todo step é um único dataclass com
//! ~25 campos opcionais, aqui cada tipo de step é uma variante de enum: o
//! compilador garante que um step `wait` nunca carrega campos de `database`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// RAIZ: TEST CASE
// ============================================================================

/// Representa um caso de teste completo, carregado de um documento YAML.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub setup: Option<Hook>,
    #[serde(default)]
    pub teardown: Option<Hook>,
    #[serde(default)]
    pub config: GlobalConfig,
    pub steps: Vec<Step>,
}

fn default_enabled() -> bool {
    true
}

/// Um hook de setup/teardown. O núcleo trata o conteúdo como opaco além de
/// invocá-lo: é uma sequência de steps aninhados, igual ao corpo de um loop.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Hook {
    #[serde(default)]
    pub steps: Vec<Step>,
}

// ============================================================================
// CONFIGURAÇÃO GLOBAL
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub retry_times: u32,
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default = "default_concurrent_threads")]
    pub concurrent_threads: usize,
    /// Se true, a primeira falha interrompe o caso de teste. Ver DESIGN.md
    /// (decisão "fail-fast vs continue-on-failure"): o padrão é continuar.
    #[serde(default)]
    pub fail_fast: bool,
    /// Caminho para um arquivo de dados (CSV/YAML de linhas); quando
    /// `data_iterations` é true o caso roda uma vez por linha.
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub data_iterations: bool,
    #[serde(default)]
    pub variable_prefix: String,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_concurrent_threads() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProfileConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// STEP: VARIANTE TAGUEADA
// ============================================================================

/// Campos compartilhados por toda variante de step.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StepCommon {
    #[serde(default)]
    pub skip_if: Option<String>,
    #[serde(default)]
    pub only_if: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub retry_times: Option<u32>,
    #[serde(default)]
    pub setup: Option<Hook>,
    #[serde(default)]
    pub teardown: Option<Hook>,
    #[serde(default)]
    pub validations: Vec<ValidationRule>,
    #[serde(default)]
    pub extractors: Vec<Extractor>,
}

/// Um passo de execução, uma variante fechada tagueada pelo campo `type`.
///
/// Cada variante carrega `name` e `StepCommon` embutido via `#[serde(flatten)]`,
/// mais os campos específicos daquele tipo de step.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    Request {
        name: String,
        #[serde(flatten)]
        common: StepCommon,
        method: String,
        url: String,
        #[serde(default)]
        params: HashMap<String, Value>,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<Value>,
    },
    Database {
        name: String,
        #[serde(flatten)]
        common: StepCommon,
        database: DatabaseConfig,
        operation: DatabaseOperation,
        sql: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    Wait {
        name: String,
        #[serde(flatten)]
        common: StepCommon,
        #[serde(default)]
        seconds: Option<f64>,
        #[serde(default)]
        condition: Option<String>,
        #[serde(default)]
        interval: Option<f64>,
        #[serde(default)]
        max_wait: Option<f64>,
    },
    Loop {
        name: String,
        #[serde(flatten)]
        common: StepCommon,
        loop_type: LoopType,
        #[serde(default)]
        loop_count: Option<u64>,
        #[serde(default)]
        loop_condition: Option<String>,
        loop_variable: String,
        loop_steps: Vec<Step>,
    },
    Concurrent {
        name: String,
        #[serde(flatten)]
        common: StepCommon,
        #[serde(default)]
        concurrent_threads: Option<usize>,
        steps: Vec<Step>,
    },
    Script {
        name: String,
        #[serde(flatten)]
        common: StepCommon,
        #[serde(default)]
        language: Option<String>,
        source: String,
        #[serde(default)]
        allow_imports: bool,
    },
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Request { name, .. }
            | Step::Database { name, .. }
            | Step::Wait { name, .. }
            | Step::Loop { name, .. }
            | Step::Concurrent { name, .. }
            | Step::Script { name, .. } => name,
        }
    }

    pub fn common(&self) -> &StepCommon {
        match self {
            Step::Request { common, .. }
            | Step::Database { common, .. }
            | Step::Wait { common, .. }
            | Step::Loop { common, .. }
            | Step::Concurrent { common, .. }
            | Step::Script { common, .. } => common,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::Request { .. } => "request",
            Step::Database { .. } => "database",
            Step::Wait { .. } => "wait",
            Step::Loop { .. } => "loop",
            Step::Concurrent { .. } => "concurrent",
            Step::Script { .. } => "script",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoopType {
    For,
    While,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub dialect: String,
    pub dsn: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseOperation {
    Query,
    Exec,
    Executemany,
    Script,
}

// ============================================================================
// VALIDAÇÃO E EXTRAÇÃO
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub path: String,
    pub expect: Value,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Extractor {
    pub name: String,
    #[serde(rename = "type")]
    pub extractor_type: String,
    pub path: String,
    #[serde(default)]
    pub index: usize,
}

// ============================================================================
// RESULTADOS
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
    Error,
    Pending,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PerformanceMetrics {
    pub total_time: f64,
    #[serde(default)]
    pub dns_time: f64,
    #[serde(default)]
    pub tcp_time: f64,
    #[serde(default)]
    pub tls_time: f64,
    #[serde(default)]
    pub server_time: f64,
    #[serde(default)]
    pub download_time: f64,
    #[serde(default)]
    pub upload_time: f64,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Assertion,
    Network,
    Timeout,
    Parsing,
    Business,
    System,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stack_trace: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub path: String,
    #[serde(default)]
    pub actual: Value,
    pub expected: Value,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub extracted_vars: HashMap<String, Value>,
    #[serde(default)]
    pub validation_results: Vec<ValidationOutcome>,
    #[serde(default)]
    pub performance: PerformanceMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub variables_snapshot: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestCaseStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestCaseResult {
    pub name: String,
    pub status: TestCaseStatus,
    pub start_time: String,
    pub end_time: String,
    pub duration: f64,
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub step_results: Vec<StepResult>,
    pub final_variables: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_step_parses_from_yaml() {
        let yaml = r#"
name: fetch_user
type: request
method: GET
url: /users/1
"#;
        let step: Step = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(step.name(), "fetch_user");
        assert_eq!(step.kind(), "request");
        match step {
            Step::Request { method, url, .. } => {
                assert_eq!(method, "GET");
                assert_eq!(url, "/users/1");
            }
            _ => panic!("expected request variant"),
        }
    }

    #[test]
    fn wait_step_parses_conditional_fields() {
        let yaml = r#"
name: poll_ready
type: wait
condition: "{{ready}}"
interval: 0.5
max_wait: 5
"#;
        let step: Step = serde_yaml_ng::from_str(yaml).unwrap();
        match step {
            Step::Wait {
                condition,
                interval,
                max_wait,
                seconds,
                ..
            } => {
                assert_eq!(condition.as_deref(), Some("{{ready}}"));
                assert_eq!(interval, Some(0.5));
                assert_eq!(max_wait, Some(5.0));
                assert!(seconds.is_none());
            }
            _ => panic!("expected wait variant"),
        }
    }

    #[test]
    fn unknown_step_type_fails_to_parse() {
        let yaml = "name: x\ntype: browser_click\n";
        let result: Result<Step, _> = serde_yaml_ng::from_str(yaml);
        assert!(result.is_err());
    }
}
