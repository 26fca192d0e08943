//! # Runner - Motor de Execução de Casos de Teste YAML
//!
//! Ponto de entrada da CLI do motor: carrega um documento YAML (§4.6),
//! roda o caso de teste inteiro (§4.8) através do ciclo de vida
//! compartilhado de step (§4.7), agrega o resultado (§4.9) e serializa o
//! contrato JSON externo estável (§6).
//!
//! ## Subcomandos
//!
//! - `run --cases PATH [-o OUT] [-v] [--profile NAME]` — parseia e
//!   executa; grava o relatório JSON em `OUT` (stdout por padrão).
//! - `validate PATH` — só roda a validação estrutural de C6, sem montar
//!   nenhum executor.
//!
//! ## Exit codes
//!
//! | Código | Significado                                    |
//! |--------|-------------------------------------------------|
//! | 0      | sucesso                                          |
//! | 1      | erro de parsing do arquivo ou de I/O             |
//! | 2      | execução rodou, mas o caso de teste falhou       |
//! | 3      | erro interno inesperado                          |

mod collector;
mod comparators;
mod errors;
mod executors;
mod extractors;
mod limits;
mod loader;
mod model;
mod retry;
mod telemetry;
mod template;
mod testcase;
mod validation;
mod variables;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use uuid::Uuid;

use limits::ExecutionLimits;
use telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "runner")]
#[command(about = "Motor de execução de casos de teste descritos em YAML", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Carrega, valida e executa um caso de teste YAML.
    Run {
        /// Caminho do documento YAML do caso de teste.
        #[arg(long = "cases")]
        cases: PathBuf,

        /// Caminho para salvar o relatório JSON (stdout se omitido).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Nome de perfil a usar no lugar de `config.active_profile`.
        #[arg(long)]
        profile: Option<String>,

        /// Habilita exportação de traces para OpenTelemetry.
        #[arg(long, default_value = "false")]
        otel: bool,

        /// Endpoint do collector OTEL (opcional).
        #[arg(long)]
        otel_endpoint: Option<String>,

        /// Modo silencioso: apenas erros críticos no stderr.
        #[arg(long, short = 's', default_value = "false")]
        silent: bool,

        /// Modo verbose: logs detalhados de debug.
        #[arg(long, short = 'v', default_value = "false")]
        verbose: bool,

        /// ID de execução customizado (UUID); gerado se ausente.
        #[arg(long)]
        execution_id: Option<String>,
    },
    /// Roda apenas a validação estrutural de C6, sem executar nada.
    Validate {
        /// Caminho do documento YAML do caso de teste.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run {
            cases,
            output,
            profile,
            otel,
            otel_endpoint,
            silent,
            verbose,
            execution_id,
        } => {
            let exec_id = execution_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

            let mut telemetry_config = TelemetryConfig::from_env();
            telemetry_config.log_level = if *silent {
                Level::ERROR
            } else if *verbose {
                Level::DEBUG
            } else {
                Level::INFO
            };
            if *otel {
                if let Some(endpoint) = otel_endpoint {
                    telemetry_config.otlp_endpoint = Some(endpoint.clone());
                } else if telemetry_config.otlp_endpoint.is_none() {
                    telemetry_config.otlp_endpoint = Some("http://localhost:4317".to_string());
                }
            }

            if let Err(e) = init_telemetry(telemetry_config) {
                if !*silent {
                    eprintln!("aviso: falha ao inicializar telemetria: {}", e);
                }
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                    .try_init();
            }

            let code = run_case(cases, output, profile.as_deref(), &exec_id, *silent).await;

            shutdown_telemetry();
            code
        }
        Commands::Validate { path } => validate_case(path),
    }
}

/// Carrega e roda um caso de teste, grava o relatório, devolve o código
/// de saída per §6.
async fn run_case(
    cases_path: &PathBuf,
    output_path: &Option<PathBuf>,
    profile_override: Option<&str>,
    execution_id: &str,
    silent: bool,
) -> ExitCode {
    if !silent {
        info!(execution_id = %execution_id, "iniciando execução");
    }

    let test_case = match loader::load_test_case(cases_path) {
        Ok(tc) => tc,
        Err(e) => {
            error!(error = %e, "falha ao carregar caso de teste");
            return ExitCode::from(1);
        }
    };
    if !silent {
        info!(test_case = %test_case.name, step_count = test_case.steps.len(), "caso de teste carregado");
    }

    let limits = ExecutionLimits::from_env();
    let total_retries: u32 = test_case
        .steps
        .iter()
        .map(|s| s.common().retry_times.unwrap_or(test_case.config.retry_times))
        .sum();
    let limit_result = limits::validate_limits(test_case.steps.len(), total_retries, &limits);
    if !limit_result.passed {
        for v in &limit_result.violations {
            error!("{}", v.message);
        }
        return ExitCode::from(1);
    }

    if !silent {
        info!("executando steps");
    }
    let (step_results, _vm) = testcase::run(&test_case, profile_override).await;
    let result = collector::collect(&test_case, step_results);
    if !silent {
        info!(status = ?result.status, "execução finalizada");
    }

    let report = collector::to_report_json(&result, true);
    let json = match serde_json::to_string_pretty(&report) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "falha ao serializar relatório");
            return ExitCode::from(3);
        }
    };

    match output_path {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json) {
                error!(error = %e, path = %path.display(), "falha ao gravar relatório");
                return ExitCode::from(3);
            }
            if !silent {
                info!(path = %path.display(), "relatório salvo");
            }
        }
        None => println!("{}", json),
    }

    if matches!(result.status, model::TestCaseStatus::Failed) {
        ExitCode::from(2)
    } else {
        ExitCode::from(0)
    }
}

/// Roda só a validação estrutural de C6 (sem executar nenhum step).
fn validate_case(path: &PathBuf) -> ExitCode {
    match loader::load_test_case(path) {
        Ok(test_case) => {
            println!(
                "ok: '{}' é estruturalmente válido ({} steps)",
                test_case.name,
                test_case.steps.len()
            );
            ExitCode::from(0)
        }
        Err(loader::LoaderError::Structural(errors)) => {
            for err in &errors {
                eprintln!("- {}", err);
            }
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(1)
        }
    }
}
