//! # Módulo de Códigos de Erro Estruturados
//!
//! Define códigos de erro padronizados para melhor UX e integração
//! com sistemas externos (CI/CD, dashboards, alertas).
//!
//! ## Para todos entenderem:
//!
//! Quando algo dá errado, este módulo fornece códigos únicos
//! que identificam exatamente o que aconteceu.
//!
//! É como ter um "número do erro" que você pode pesquisar
//! na documentação ou passar para o suporte.
//!
//! ## Categorias de Erro
//!
//! As categorias aqui são as seis que o relatório final expõe
//! (`ErrorInfo.category` em `crate::model`), cada uma com sua própria
//! faixa de código:
//!
//! | Faixa  | Categoria    | Descrição                                |
//! |--------|--------------|-------------------------------------------|
//! | E1xxx  | parsing      | Erro de parsing do YAML ou de um JSONPath |
//! | E2xxx  | network      | Erro de conexão, DNS ou TLS               |
//! | E3xxx  | assertion    | Uma validação não passou                  |
//! | E4xxx  | timeout      | Um prazo foi excedido                     |
//! | E5xxx  | business     | Erro lançado por um script de step        |
//! | E6xxx  | system       | Bug interno ou falha não classificada     |
//!
//! O código numérico nunca aparece no relatório externo (veja `model::ErrorInfo`);
//! ele existe para logs e para correlação interna. `ErrorCategory` é derivada
//! do código no momento em que um `StepResult` é montado, nunca o contrário.

use std::fmt;

use crate::model::ErrorCategory as ReportCategory;

// ============================================================================
// CÓDIGO DE ERRO
// ============================================================================

/// Código de erro estruturado com categoria e número.
///
/// O código é um número de 4 dígitos onde:
/// - Primeiro dígito: categoria (1-6)
/// - Últimos 3 dígitos: erro específico (001-999)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // ========================================================================
    // E1xxx: Parsing
    // ========================================================================

    /// Documento YAML malformado.
    pub const YAML_SYNTAX: Self = Self(1001);
    /// Caso de teste sem `name` ou sem `steps`.
    pub const MISSING_REQUIRED_FIELD: Self = Self(1002);
    /// `type` do step não é um dos tipos suportados.
    pub const UNKNOWN_STEP_TYPE: Self = Self(1003);
    /// Campo obrigatório de uma variante de step está ausente.
    pub const MISSING_VARIANT_FIELD: Self = Self(1004);
    /// `depends_on` referencia um step que não existe ou vem depois.
    pub const UNKNOWN_DEPENDENCY: Self = Self(1005);
    /// Dependência circular entre steps.
    pub const CIRCULAR_DEPENDENCY: Self = Self(1006);
    /// `active_profile` não é uma chave de `profiles`.
    pub const UNKNOWN_PROFILE: Self = Self(1007);
    /// Expressão JSONPath inválida num extractor ou numa validation.
    pub const INVALID_JSONPATH: Self = Self(1008);
    /// Resposta não é JSON válido quando um extractor/validation esperava.
    pub const INVALID_RESPONSE_JSON: Self = Self(1009);

    // ========================================================================
    // E2xxx: Rede
    // ========================================================================

    pub const CONNECTION_REFUSED: Self = Self(2001);
    pub const DNS_FAILURE: Self = Self(2002);
    pub const TLS_HANDSHAKE: Self = Self(2003);
    pub const DATABASE_CONNECTION: Self = Self(2004);

    // ========================================================================
    // E3xxx: Assertions
    // ========================================================================

    pub const VALIDATION_FAILED: Self = Self(3001);
    pub const COMPARATOR_ERROR: Self = Self(3002);
    pub const UNKNOWN_COMPARATOR: Self = Self(3003);

    // ========================================================================
    // E4xxx: Timeout
    // ========================================================================

    pub const STEP_TIMEOUT: Self = Self(4001);
    pub const WAIT_TIMEOUT: Self = Self(4002);

    // ========================================================================
    // E5xxx: Business (scripts)
    // ========================================================================

    pub const SCRIPT_ERROR: Self = Self(5001);
    pub const IMPORT_NOT_ALLOWED: Self = Self(5002);

    // ========================================================================
    // E6xxx: Sistema
    // ========================================================================

    pub const INTERNAL_ERROR: Self = Self(6001);
    pub const NO_EXECUTOR_FOR_STEP: Self = Self(6002);
    pub const EXECUTION_LIMIT_EXCEEDED: Self = Self(6003);

    /// Retorna o código numérico.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Retorna o código formatado com prefixo "E".
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    /// Retorna a categoria do erro baseado no primeiro dígito.
    pub fn category(&self) -> ReportCategory {
        match self.0 / 1000 {
            1 => ReportCategory::Parsing,
            2 => ReportCategory::Network,
            3 => ReportCategory::Assertion,
            4 => ReportCategory::Timeout,
            5 => ReportCategory::Business,
            _ => ReportCategory::System,
        }
    }

    /// Sugestão de correção exibida ao usuário, derivada da categoria.
    pub fn suggestion(&self) -> &'static str {
        match self.category() {
            ReportCategory::Parsing => {
                "Verifique a sintaxe do YAML e se todos os campos obrigatórios do step estão presentes."
            }
            ReportCategory::Network => {
                "Confirme que o serviço alvo está acessível e que a URL/DSN está correta."
            }
            ReportCategory::Assertion => {
                "Compare o valor esperado com o valor obtido e ajuste a regra de validação ou a resposta."
            }
            ReportCategory::Timeout => {
                "Aumente o timeout do step ou investigue por que a resposta demorou além do esperado."
            }
            ReportCategory::Business => {
                "Revise o script do step: ele lançou um erro durante a execução."
            }
            ReportCategory::System => "Erro interno inesperado; se persistir, reporte com os logs.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

/// Erro estruturado com código, mensagem e contexto.
#[derive(Debug)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<ErrorContext>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub step_name: Option<String>,
    pub path: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl StructuredError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_step_name(mut self, step_name: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::default);
        ctx.step_name = Some(step_name.into());
        self
    }

    pub fn user_message(&self) -> String {
        let mut msg = format!("[{}] {}", self.code, self.message);

        if let Some(ctx) = &self.context {
            if let Some(step_name) = &ctx.step_name {
                msg.push_str(&format!(" (step: {})", step_name));
            }
            if let (Some(expected), Some(actual)) = (&ctx.expected, &ctx.actual) {
                msg.push_str(&format!(" [esperado: {}, obtido: {}]", expected, actual));
            }
        }

        msg
    }

    /// Monta o `ErrorInfo` que é de fato serializado no relatório externo.
    pub fn to_error_info(&self, error_type: impl Into<String>) -> crate::model::ErrorInfo {
        crate::model::ErrorInfo {
            error_type: error_type.into(),
            category: self.code.category(),
            message: self.message.clone(),
            suggestion: self.code.suggestion().to_string(),
            stack_trace: String::new(),
        }
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for StructuredError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_formatting() {
        assert_eq!(ErrorCode::YAML_SYNTAX.formatted(), "E1001");
        assert_eq!(ErrorCode::CONNECTION_REFUSED.formatted(), "E2001");
        assert_eq!(ErrorCode::VALIDATION_FAILED.formatted(), "E3001");
    }

    #[test]
    fn test_error_code_category_matches_report_categories() {
        assert_eq!(ErrorCode::YAML_SYNTAX.category(), ReportCategory::Parsing);
        assert_eq!(ErrorCode::DNS_FAILURE.category(), ReportCategory::Network);
        assert_eq!(ErrorCode::VALIDATION_FAILED.category(), ReportCategory::Assertion);
        assert_eq!(ErrorCode::WAIT_TIMEOUT.category(), ReportCategory::Timeout);
        assert_eq!(ErrorCode::SCRIPT_ERROR.category(), ReportCategory::Business);
        assert_eq!(ErrorCode::INTERNAL_ERROR.category(), ReportCategory::System);
    }

    #[test]
    fn test_structured_error_display() {
        let err = StructuredError::new(ErrorCode::VALIDATION_FAILED, "status_code não corresponde")
            .with_step_name("get_user");

        let msg = err.user_message();
        assert!(msg.contains("E3001"));
        assert!(msg.contains("get_user"));
    }

    #[test]
    fn test_to_error_info_derives_category_and_suggestion() {
        let err = StructuredError::new(ErrorCode::WAIT_TIMEOUT, "condição não ficou verdadeira a tempo");
        let info = err.to_error_info("TimeoutError");
        assert_eq!(info.category, ReportCategory::Timeout);
        assert!(!info.suggestion.is_empty());
    }
}
