//! # Módulo de Variáveis - Gerenciador de Três Camadas
//!
//! Mantém três camadas de variáveis com prioridade de leitura fixa:
//! `extracted > profile > global`. A camada `extracted` é a única mutável
//! durante a execução; `global` e `profile` são só-leitura após a
//! inicialização.
//!
//! ## Para todos entenderem:
//!
//! Pense em três gavetas empilhadas. Quando você procura uma variável,
//! olha primeiro na gaveta de cima (`extracted`, o que foi capturado
//! durante a execução), depois na do meio (`profile`, específica do
//! ambiente ativo) e por fim na de baixo (`global`, o que veio do
//! próprio caso de teste).
//!
//! Grounding: `original_source/.../core/variable_manager.py`'s `VariableManager`
//! (três camadas, `get_variable`, `snapshot`/`restore_snapshot`) e
//! `VariableScope` (context manager `__enter__`/`__exit__`), reescrito aqui
//! como um guarda RAII (`ScopeGuard`).

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::model::GlobalConfig;
use crate::template::{self, TemplateError};

#[derive(Debug, Clone, Default)]
pub struct VariableSnapshot {
    global: HashMap<String, Value>,
    profile: HashMap<String, Value>,
    extracted: HashMap<String, Value>,
}

/// O ambiente de variáveis de um caso de teste em execução.
#[derive(Debug, Clone, Default)]
pub struct VariableManager {
    global: HashMap<String, Value>,
    profile: HashMap<String, Value>,
    extracted: HashMap<String, Value>,
}

impl VariableManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injeta a chave especial `config`, expondo o `GlobalConfig` como um
    /// mapa aninhado para que templates possam referenciar
    /// `{{config.profiles.prod.base_url}}`.
    pub fn inject_config(&mut self, config: &GlobalConfig) {
        let value = serde_json::to_value(config).unwrap_or(Value::Null);
        self.global.insert("config".to_string(), value);
        for (k, v) in &config.variables {
            self.global.insert(k.clone(), v.clone());
        }
    }

    /// Camada global: variáveis não-override, lidas do `GlobalConfig`.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.global.insert(name.into(), value);
    }

    /// Ativa um perfil, substituindo a camada `profile` inteira.
    pub fn set_profile(&mut self, vars: &HashMap<String, Value>) {
        self.profile = vars.clone();
    }

    /// Escreve na camada `extracted` (a única camada mutável em tempo de
    /// execução).
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.extracted.insert(name.into(), value);
    }

    /// Busca com prioridade `extracted > profile > global`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extracted
            .get(name)
            .or_else(|| self.profile.get(name))
            .or_else(|| self.global.get(name))
    }

    /// Retorna todas as variáveis visíveis, já com a prioridade aplicada,
    /// como um único mapa JSON — é isto que é passado ao renderizador C1.
    pub fn all(&self) -> Value {
        let mut merged = Map::new();
        for (k, v) in &self.global {
            merged.insert(k.clone(), v.clone());
        }
        for (k, v) in &self.profile {
            merged.insert(k.clone(), v.clone());
        }
        for (k, v) in &self.extracted {
            merged.insert(k.clone(), v.clone());
        }
        Value::Object(merged)
    }

    /// Apenas a camada extraída — usada para `variables_snapshot` no
    /// relatório e para o merge determinístico do step concorrente.
    pub fn extracted(&self) -> &HashMap<String, Value> {
        &self.extracted
    }

    pub fn render(&self, input: &str) -> Result<String, TemplateError> {
        template::render(input, &self.all())
    }

    pub fn render_value(&self, input: &Value) -> Result<Value, TemplateError> {
        template::render_value(input, &self.all())
    }

    pub fn eval_condition(&self, input: &str) -> bool {
        template::eval_condition(input, &self.all())
    }

    /// Cópia profunda das três camadas, para restaurar depois.
    pub fn snapshot(&self) -> VariableSnapshot {
        VariableSnapshot {
            global: self.global.clone(),
            profile: self.profile.clone(),
            extracted: self.extracted.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: VariableSnapshot) {
        self.global = snapshot.global;
        self.profile = snapshot.profile;
        self.extracted = snapshot.extracted;
    }

    /// Abre um escopo isolado: qualquer mutação feita via `&mut VariableManager`
    /// durante a vida do guarda é revertida quando ele é dropado, a menos
    /// que `commit()` seja chamado antes.
    pub fn scope(&mut self) -> ScopeGuard<'_> {
        let snapshot = self.snapshot();
        ScopeGuard {
            manager: self,
            snapshot: Some(snapshot),
        }
    }
}

/// Guarda de escopo RAII: reverte o `VariableManager` ao sair, a menos que
/// `commit()` tenha sido chamado. Usado pelos executores de loop e
/// concorrente (§4.2/§4.7.4/§4.7.5) para isolar variáveis de iteração.
pub struct ScopeGuard<'a> {
    manager: &'a mut VariableManager,
    snapshot: Option<VariableSnapshot>,
}

impl<'a> ScopeGuard<'a> {
    pub fn manager(&mut self) -> &mut VariableManager {
        self.manager
    }

    /// Descarta o snapshot: as mutações feitas dentro do escopo sobrevivem.
    pub fn commit(mut self) {
        self.snapshot = None;
    }
}

impl<'a> Drop for ScopeGuard<'a> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.manager.restore(snapshot);
        }
    }
}
