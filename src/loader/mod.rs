//! # Módulo de Carregamento - Parser YAML + Validação Estrutural (C6)
//!
//! Lê um documento YAML (ou um diretório de documentos) e devolve o
//! `TestCase` tipado, já estruturalmente validado.
//!
//! ## Validações estruturais
//!
//! 1. `name` e `steps` presentes (garantido pelo `serde`, que falha o
//!    parse se ausentes).
//! 2. Cada step tem `name` e `type` válidos (garantido pelo `serde`, que
//!    rejeita um `type` desconhecido — ver `model::Step`).
//! 3. Toda referência em `depends_on` existe em um step anterior.
//! 4. Sem dependência circular entre steps (detecção DFS 3 cores).
//! 5. `active_profile`, se presente, é uma chave de `profiles`.
//!
//! Um modo "somente validação" roda estas checagens sem montar executores
//! (usado pelo subcomando `validate` da CLI).
//!
//! Grounding: o antigo `loader/mod.rs` só lia JSON (`serde_json::from_str`);
//! a detecção de ciclo DFS 3-cor vem do antigo `validation/mod.rs`
//! (`validate_dag`/`detect_cycle_dfs`), absorvida aqui porque no desenho
//! anterior ela vivia ao lado de checagens de plano que pertencem a este
//! módulo (C6), não ao motor de assertions (C5, agora em `crate::validation`).

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::model::{Step, TestCase};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("falha ao ler '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML inválido em '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml_ng::Error,
    },
    #[error("caso de teste inválido: {0:?}")]
    Structural(Vec<StructuralError>),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("step '{step}': depende de '{dep}', que não existe ou vem depois")]
    UnknownDependency { step: String, dep: String },
    #[error("step '{step}': dependência circular detectada")]
    CircularDependency { step: String },
    #[error("active_profile '{profile}' não existe em config.profiles")]
    UnknownProfile { profile: String },
    #[error("nome de step duplicado: '{step}'")]
    DuplicateStepName { step: String },
}

/// Carrega um único documento YAML de `path` e valida sua estrutura.
pub fn load_test_case(path: impl AsRef<Path>) -> Result<TestCase, LoaderError> {
    let path_ref = path.as_ref();
    let raw = std::fs::read_to_string(path_ref).map_err(|source| LoaderError::Io {
        path: path_ref.display().to_string(),
        source,
    })?;
    let test_case: TestCase = serde_yaml_ng::from_str(&raw).map_err(|source| LoaderError::Yaml {
        path: path_ref.display().to_string(),
        source,
    })?;
    validate_structure(&test_case).map_err(LoaderError::Structural)?;
    Ok(test_case)
}

/// Carrega todo `*.yml`/`*.yaml` dentro de um diretório, em ordem
/// alfabética de arquivo.
pub fn load_test_cases_from_dir(dir: impl AsRef<Path>) -> Result<Vec<TestCase>, LoaderError> {
    let dir_ref = dir.as_ref();
    let mut entries: Vec<_> = std::fs::read_dir(dir_ref)
        .map_err(|source| LoaderError::Io {
            path: dir_ref.display().to_string(),
            source,
        })?
        .filter_map(|e| e.ok())
        .filter(|e| {
            matches!(
                e.path().extension().and_then(|s| s.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    entries.iter().map(|e| load_test_case(e.path())).collect()
}

/// Roda as checagens estruturais de §4.6 sem montar executores.
pub fn validate_structure(test_case: &TestCase) -> Result<(), Vec<StructuralError>> {
    let mut errors = Vec::new();

    check_duplicate_names(&test_case.steps, &mut errors);
    check_dependencies(&test_case.steps, &mut errors);

    if let Some(profile) = &test_case.config.active_profile {
        if !test_case.config.profiles.contains_key(profile) {
            errors.push(StructuralError::UnknownProfile {
                profile: profile.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_duplicate_names(steps: &[Step], errors: &mut Vec<StructuralError>) {
    let mut seen = std::collections::HashSet::new();
    for step in steps {
        if !seen.insert(step.name().to_string()) {
            errors.push(StructuralError::DuplicateStepName {
                step: step.name().to_string(),
            });
        }
    }
}

/// Verifica que todo `depends_on` resolve a um step anterior na lista, e
/// detecta ciclos com DFS de 3 cores (branco=0, cinza=1, preto=2).
fn check_dependencies(steps: &[Step], errors: &mut Vec<StructuralError>) {
    let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();

    for (i, step) in steps.iter().enumerate() {
        for dep in &step.common().depends_on {
            let earlier = names[..i].contains(&dep.as_str());
            if !earlier {
                errors.push(StructuralError::UnknownDependency {
                    step: step.name().to_string(),
                    dep: dep.clone(),
                });
            }
        }
    }

    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in steps {
        let deps: Vec<&str> = step.common().depends_on.iter().map(|s| s.as_str()).collect();
        graph.insert(step.name(), deps);
    }

    let mut color: HashMap<&str, u8> = HashMap::new();
    for step in steps {
        color.insert(step.name(), 0);
    }

    for step in steps {
        if color.get(step.name()) == Some(&0) {
            detect_cycle_dfs(step.name(), &graph, &mut color, errors);
        }
    }
}

fn detect_cycle_dfs<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    color: &mut HashMap<&'a str, u8>,
    errors: &mut Vec<StructuralError>,
) -> bool {
    color.insert(node, 1);

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            match color.get(dep) {
                Some(1) => {
                    errors.push(StructuralError::CircularDependency {
                        step: node.to_string(),
                    });
                    return true;
                }
                Some(0) => {
                    if detect_cycle_dfs(dep, graph, color, errors) {
                        return true;
                    }
                }
                _ => {}
            }
        }
    }

    color.insert(node, 2);
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> TestCase {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn valid_case_passes_structural_checks() {
        let tc = parse(
            r#"
name: simple
steps:
  - name: a
    type: wait
    seconds: 0.1
  - name: b
    type: wait
    seconds: 0.1
    depends_on: [a]
"#,
        );
        assert!(validate_structure(&tc).is_ok());
    }

    #[test]
    fn unknown_dependency_is_reported() {
        let tc = parse(
            r#"
name: simple
steps:
  - name: a
    type: wait
    seconds: 0.1
    depends_on: [ghost]
"#,
        );
        let errors = validate_structure(&tc).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralError::UnknownDependency { .. })));
    }

    #[test]
    fn forward_reference_is_unknown_dependency() {
        let tc = parse(
            r#"
name: simple
steps:
  - name: a
    type: wait
    seconds: 0.1
    depends_on: [b]
  - name: b
    type: wait
    seconds: 0.1
"#,
        );
        let errors = validate_structure(&tc).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralError::UnknownDependency { .. })));
    }

    #[test]
    fn circular_dependency_is_detected() {
        let tc = parse(
            r#"
name: simple
steps:
  - name: a
    type: wait
    seconds: 0.1
    depends_on: [b]
  - name: b
    type: wait
    seconds: 0.1
    depends_on: [a]
"#,
        );
        let errors = validate_structure(&tc).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralError::CircularDependency { .. })));
    }

    #[test]
    fn unknown_active_profile_is_reported() {
        let tc = parse(
            r#"
name: simple
config:
  active_profile: prod
steps:
  - name: a
    type: wait
    seconds: 0.1
"#,
        );
        let errors = validate_structure(&tc).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralError::UnknownProfile { .. })));
    }

    #[test]
    fn duplicate_step_names_are_reported() {
        let tc = parse(
            r#"
name: simple
steps:
  - name: a
    type: wait
    seconds: 0.1
  - name: a
    type: wait
    seconds: 0.2
"#,
        );
        let errors = validate_structure(&tc).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralError::DuplicateStepName { .. })));
    }
}
